//! The routing policy hook: an optional callback that filters, re-orders,
//! or replaces a node's resolved successor set before messages go out.
//!
//! Policies see `headers` and the emitted `payload` only — never `meta` —
//! so routing decisions stay auditable independent of whatever auxiliary
//! bookkeeping a node stashed in `meta` along the way (spec's
//! headers-vs-meta routing invariant). A policy cannot invent a target
//! that wasn't already in the resolved set; it can only narrow or reorder
//! it, so the selective-emission subset law still holds after a policy
//! runs.

use std::sync::Arc;

use crate::headers::Headers;
use serde_json::Value;

/// `(headers, payload, resolved_targets) -> kept_targets`, in the order the
/// policy wants them sent. Any name not already present in
/// `resolved_targets` is ignored.
pub type RoutingPolicy = Arc<dyn Fn(&Headers, &Value, &[String]) -> Vec<String> + Send + Sync>;

/// Apply an optional policy to a resolved `(target, payload)` list,
/// preserving each target's associated payload and re-ordering per the
/// policy's returned name order.
pub fn apply_policy(
    policy: Option<&RoutingPolicy>,
    headers: &Headers,
    representative_payload: &Value,
    resolved: Vec<(String, Value)>,
) -> Vec<(String, Value)> {
    let Some(policy) = policy else {
        return resolved;
    };

    let names: Vec<String> = resolved.iter().map(|(t, _)| t.clone()).collect();
    let kept = policy(headers, representative_payload, &names);

    let mut by_name: std::collections::HashMap<String, Value> = resolved.into_iter().collect();
    kept.into_iter()
        .filter_map(|name| by_name.remove(&name).map(|payload| (name, payload)))
        .collect()
}
