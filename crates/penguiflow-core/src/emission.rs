//! Selective emission: what a node hands back to the worker loop to route
//! downstream.

use serde_json::Value;

/// What a node function returns to the worker after processing a message.
///
/// - `All(value)` emits one copy of `value` to every successor edge.
/// - `Targets { targets, value }` emits one copy of `value` to each named
///   successor, skipping the rest.
/// - `PerTarget(pairs)` emits a distinct payload per named successor.
/// - `None` suppresses emission entirely (e.g. a controller node that has
///   already called `ctx.emit(...)` explicitly and returns nothing further).
#[derive(Debug, Clone)]
pub enum Emission {
    All(Value),
    Targets { targets: Vec<String>, value: Value },
    PerTarget(Vec<(String, Value)>),
    None,
}

impl Emission {
    pub fn all(value: Value) -> Self {
        Emission::All(value)
    }

    pub fn to(targets: impl IntoIterator<Item = impl Into<String>>, value: Value) -> Self {
        Emission::Targets {
            targets: targets.into_iter().map(Into::into).collect(),
            value,
        }
    }

    /// Resolve against the node's declared successor set, producing the
    /// concrete `(target, payload)` pairs to send. A [`crate::error::GraphError::Topology`]
    /// is returned if a named target isn't a declared successor — selective
    /// emission's invariant is that the emitted set is always a subset of
    /// the declared successors.
    pub fn resolve(&self, successors: &[String]) -> crate::error::Result<Vec<(String, Value)>> {
        match self {
            Emission::All(value) => Ok(successors
                .iter()
                .map(|s| (s.clone(), value.clone()))
                .collect()),
            Emission::Targets { targets, value } => {
                for t in targets {
                    if !successors.contains(t) {
                        return Err(crate::error::GraphError::topology(format!(
                            "emission target '{t}' is not a declared successor"
                        )));
                    }
                }
                Ok(targets.iter().map(|t| (t.clone(), value.clone())).collect())
            }
            Emission::PerTarget(pairs) => {
                for (t, _) in pairs {
                    if !successors.contains(t) {
                        return Err(crate::error::GraphError::topology(format!(
                            "emission target '{t}' is not a declared successor"
                        )));
                    }
                }
                Ok(pairs.clone())
            }
            Emission::None => Ok(Vec::new()),
        }
    }
}
