//! Routing helpers for node handlers that select a subset of successors
//! rather than broadcasting to all of them.

use serde_json::Value;
use std::sync::Arc;

use crate::emission::Emission;

/// A predicate router: evaluate `predicate(payload)` against each declared
/// successor name, in order, and emit to the first whose predicate matches.
/// Falls through to `All` if none match — a router with no matching branch
/// degrades to broadcast rather than silently dropping the message.
pub fn predicate_router(
    payload: Value,
    branches: &[(String, Arc<dyn Fn(&Value) -> bool + Send + Sync>)],
) -> Emission {
    for (target, predicate) in branches {
        if predicate(&payload) {
            return Emission::to([target.clone()], payload);
        }
    }
    Emission::All(payload)
}

/// A discriminated-union router: read `payload[discriminant_field]` as a
/// string and look it up in `routes`. Unmatched or non-string discriminant
/// values fall back to `default`, if given, else suppress emission.
pub fn discriminated_router(
    payload: Value,
    discriminant_field: &str,
    routes: &[(String, String)],
    default: Option<&str>,
) -> Emission {
    let discriminant = payload
        .get(discriminant_field)
        .and_then(Value::as_str)
        .map(str::to_string);

    let target = discriminant
        .as_deref()
        .and_then(|d| routes.iter().find(|(key, _)| key == d).map(|(_, node)| node.clone()))
        .or_else(|| default.map(str::to_string));

    match target {
        Some(node) => Emission::to([node], payload),
        None => Emission::None,
    }
}
