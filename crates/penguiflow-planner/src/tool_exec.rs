//! Direct tool invocation: the planner calls a graph node's handler function
//! the same way a flow worker does (timeout, retry/backoff, input/output
//! validation), but through [`penguiflow_core::Context::Tool`] rather than
//! [`penguiflow_core::Context::Flow`] — there are no successor edges to
//! emit to, because the planner is the caller and the LLM is the router.
//!
//! Grounded in `penguiflow_core::worker::invoke_once`'s shape, generalized
//! to the planner's branch-level partial-failure tracking for `plan`
//! execution (spec §4.11).

use std::time::Instant;

use futures::future::join_all;
use penguiflow_core::{
    CancellationRegistry, Context, ContextCore, Envelope, GraphError, Headers, Node,
    SchemaRegistry, ToolContext, ValidationDirection,
};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::action::{JoinSpec, PlanItem};

/// Pull a single value out of an `Emission`, the shape a direct tool
/// invocation is expected to return. `PerTarget`/`None` have no single
/// output value and are treated as a tool misuse error — a planner tool
/// has nothing to route to, so it must hand back exactly one payload.
fn single_value(emission: penguiflow_core::Emission) -> Result<Value, GraphError> {
    use penguiflow_core::Emission;
    match emission {
        Emission::All(value) => Ok(value),
        Emission::Targets { value, .. } => Ok(value),
        Emission::PerTarget(_) | Emission::None => Err(GraphError::Custom(
            "tool invocation produced no single output value".to_string(),
        )),
    }
}

/// Invoke `node` directly as a planner tool call: validate input per
/// policy, run with timeout/retry/backoff, validate output per policy, and
/// return the resulting value.
pub async fn invoke_tool(
    node: &Node,
    args: Value,
    trace_id: &str,
    headers: &Headers,
    cancellation: &CancellationRegistry,
    registry: &SchemaRegistry,
    branch_index: Option<usize>,
) -> Result<Value, GraphError> {
    if node.policy.validate.validates_input() {
        registry.validate(&node.node_id, ValidationDirection::Input, &args)?;
    }

    let envelope = Envelope::new(args.clone(), headers.clone()).with_trace_id(trace_id.to_string());
    let token = cancellation.token_for(trace_id).await;

    let mut attempt = 0usize;
    loop {
        let core = ContextCore::new(&envelope, cancellation.clone());
        let ctx = Context::Tool(ToolContext {
            core,
            branch_index,
        });

        match invoke_once(node, args.clone(), ctx, &token, attempt).await {
            Ok(emission) => {
                let value = single_value(emission)?;
                if node.policy.validate.validates_output() {
                    registry.validate(&node.node_id, ValidationDirection::Output, &value)?;
                }
                return Ok(value);
            }
            Err(ToolError::Cancelled) => {
                return Err(GraphError::cancelled(trace_id.to_string()));
            }
            Err(ToolError::Timeout(duration)) => {
                let err = GraphError::Timeout {
                    node: node.node_id.clone(),
                    duration_ms: duration.as_millis() as u64,
                };
                if node.policy.should_retry(attempt, &err) {
                    tokio::time::sleep(node.policy.backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(err);
            }
            Err(ToolError::Node(e)) => {
                if node.policy.should_retry(attempt, &e) {
                    tokio::time::sleep(node.policy.backoff_delay(attempt)).await;
                    attempt += 1;
                    continue;
                }
                return Err(e);
            }
        }
    }
}

enum ToolError {
    Cancelled,
    Timeout(std::time::Duration),
    Node(GraphError),
}

async fn invoke_once(
    node: &Node,
    payload: Value,
    ctx: Context,
    token: &CancellationToken,
    attempt: usize,
) -> Result<penguiflow_core::Emission, ToolError> {
    let handler = node.handler.clone();
    let fut = handler(payload, ctx);
    let node_id = node.node_id.clone();

    let invocation = async move {
        match node.policy.timeout {
            Some(duration) => match tokio::time::timeout(duration, fut).await {
                Ok(result) => result.map_err(|e| {
                    ToolError::Node(GraphError::node_execution(node_id, attempt + 1, e.to_string()))
                }),
                Err(_) => Err(ToolError::Timeout(duration)),
            },
            None => fut.await.map_err(|e| {
                ToolError::Node(GraphError::node_execution(node_id, attempt + 1, e.to_string()))
            }),
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ToolError::Cancelled),
        result = invocation => result,
    }
}

/// The outcome of one branch in a parallel plan.
#[derive(Debug, Clone)]
pub enum BranchOutcome {
    Success { node: String, args: Value, output: Value },
    Failure { node: String, args: Value, error: String },
}

impl BranchOutcome {
    pub fn to_json(&self) -> Value {
        match self {
            BranchOutcome::Success { node, args, output } => {
                json!({"node": node, "args": args, "output": output})
            }
            BranchOutcome::Failure { node, args, error } => {
                json!({"node": node, "args": args, "error": error})
            }
        }
    }
}

/// The composite observation handed back to the LLM after a `plan` runs:
/// every branch outcome plus, if invoked, the join outcome.
#[derive(Debug, Clone)]
pub struct PlanExecutionResult {
    pub branches: Vec<BranchOutcome>,
    pub join_output: Option<Value>,
    pub join_skipped_reason: Option<String>,
}

impl PlanExecutionResult {
    pub fn to_json(&self) -> Value {
        let success_count = self
            .branches
            .iter()
            .filter(|b| matches!(b, BranchOutcome::Success { .. }))
            .count();
        let failure_count = self.branches.len() - success_count;

        let mut observation = json!({
            "branches": self.branches.iter().map(BranchOutcome::to_json).collect::<Vec<_>>(),
            "stats": {"success": success_count, "failed": failure_count},
        });

        if let Some(reason) = &self.join_skipped_reason {
            let failures: Vec<Value> = self
                .branches
                .iter()
                .filter_map(|b| match b {
                    BranchOutcome::Failure { node, args, error } => {
                        Some(json!({"node": node, "args": args, "error": error}))
                    }
                    _ => None,
                })
                .collect();
            observation["join"] = json!({"status": "skipped", "reason": reason, "failures": failures});
        } else if let Some(output) = &self.join_output {
            observation["join"] = json!({"status": "invoked", "output": output});
        }

        observation
    }
}

/// Execute a `plan`'s branches concurrently, then (conditionally) the join
/// node, per spec §4.11 steps 2-6.
#[allow(clippy::too_many_arguments)]
pub async fn execute_plan(
    plan: &[PlanItem],
    join: Option<&JoinSpec>,
    resolve_node: impl Fn(&str) -> Option<Node>,
    trace_id: &str,
    headers: &Headers,
    cancellation: &CancellationRegistry,
    registry: &SchemaRegistry,
) -> Result<PlanExecutionResult, GraphError> {
    let branch_futures = plan.iter().enumerate().map(|(index, item)| {
        let node = resolve_node(&item.node);
        let args = item.args.clone();
        let node_name = item.node.clone();
        let trace_id = trace_id.to_string();
        let headers = headers.clone();
        let cancellation = cancellation.clone();
        let registry = registry.clone();
        async move {
            let Some(node) = node else {
                return BranchOutcome::Failure {
                    node: node_name.clone(),
                    args,
                    error: format!("unknown node '{node_name}'"),
                };
            };
            match invoke_tool(
                &node,
                args.clone(),
                &trace_id,
                &headers,
                &cancellation,
                &registry,
                Some(index),
            )
            .await
            {
                Ok(output) => BranchOutcome::Success {
                    node: node_name,
                    args,
                    output,
                },
                Err(e) => BranchOutcome::Failure {
                    node: node_name,
                    args,
                    error: e.to_string(),
                },
            }
        }
    });

    let branches: Vec<BranchOutcome> = join_all(branch_futures).await;
    let any_failed = branches
        .iter()
        .any(|b| matches!(b, BranchOutcome::Failure { .. }));

    let Some(join_spec) = join else {
        return Ok(PlanExecutionResult {
            branches,
            join_output: None,
            join_skipped_reason: None,
        });
    };

    if any_failed {
        return Ok(PlanExecutionResult {
            branches,
            join_output: None,
            join_skipped_reason: Some("branch_failures".to_string()),
        });
    }

    let results: Vec<Value> = branches
        .iter()
        .map(|b| match b {
            BranchOutcome::Success { output, .. } => output.clone(),
            BranchOutcome::Failure { .. } => unreachable!("checked any_failed above"),
        })
        .collect();

    let Some(join_node) = resolve_node(&join_spec.node) else {
        return Err(GraphError::Custom(format!("unknown join node '{}'", join_spec.node)));
    };

    // Auto-injected fields per schema introspection (spec §4.11 step 5):
    // `results` and `expect` are always included (a join node unconditionally
    // needs its branch outputs and the launched count), while `branches`,
    // `failures`, `success_count`, `failure_count` are only injected when the
    // join node's input schema actually declares that property name —
    // `SchemaRegistry::input_wants_field` (a node with no input schema at all
    // is treated as wanting every field, so unschema'd join nodes keep seeing
    // the full bookkeeping as before).
    let mut join_args = json!({
        "results": results,
        "expect": branches.len(),
    });
    let join_args_map = join_args.as_object_mut().expect("json!({}) builds an object");
    if registry.input_wants_field(&join_spec.node, "branches") {
        join_args_map.insert(
            "branches".to_string(),
            json!(branches.iter().map(BranchOutcome::to_json).collect::<Vec<_>>()),
        );
    }
    if registry.input_wants_field(&join_spec.node, "failures") {
        join_args_map.insert("failures".to_string(), json!(Vec::<Value>::new()));
    }
    if registry.input_wants_field(&join_spec.node, "success_count") {
        join_args_map.insert("success_count".to_string(), json!(branches.len()));
    }
    if registry.input_wants_field(&join_spec.node, "failure_count") {
        join_args_map.insert("failure_count".to_string(), json!(0));
    }

    let join_output = invoke_tool(
        &join_node,
        join_args,
        trace_id,
        headers,
        cancellation,
        registry,
        None,
    )
    .await?;

    Ok(PlanExecutionResult {
        branches,
        join_output: Some(join_output),
        join_skipped_reason: None,
    })
}
