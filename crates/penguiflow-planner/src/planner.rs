//! The ReAct planner core: ties the action schema, trajectory, budgets,
//! parallel execution, and pause/resume together into one driven loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use penguiflow_checkpoint::StateStore;
use penguiflow_core::{CancellationRegistry, CatalogEntry, Headers, Node, SchemaRegistry};
use penguiflow_llm::{CallRequest, ChatMessage, LlmClient};
use serde_json::{json, Value};

use crate::action::{repair, Action};
use crate::budget::{allow_all, BudgetExhausted, Budgets, PlanningHints, ToolVisibility};
use crate::error::{PlannerError, Result};
use crate::pause::{detect_pause_request, IdempotencyCache, PauseRecord, PauseReason};
use crate::tool_exec::{execute_plan, invoke_tool};
use crate::trajectory::{truncate_observation, CharCountEstimator, TokenEstimator, Trajectory};

/// Terminal reason a run finished for (spec §4.13), distinct from
/// [`BudgetExhausted`] which nests inside `Finish`'s metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    AnswerComplete,
    NoPath,
    BudgetExhausted,
}

/// What a planner run produces.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Finish {
        reason: FinishReason,
        payload: Value,
        metadata: Value,
    },
    Pause {
        resume_token: String,
        reason: PauseReason,
        payload: Value,
    },
}

const MAX_REVISIONS_PER_HOP: u32 = 2;

/// Assembles a [`Planner`]. Every dependency (LLM client, state store,
/// tools, budgets) is supplied explicitly — the planner has no default
/// notion of "the" LLM provider or "the" store, per spec.md's Non-goals.
pub struct PlannerBuilder {
    nodes: HashMap<String, Node>,
    llm: Arc<dyn LlmClient>,
    state_store: Arc<dyn StateStore>,
    registry: SchemaRegistry,
    budgets: Budgets,
    hints: PlanningHints,
    visibility: ToolVisibility,
    token_estimator: Arc<dyn TokenEstimator>,
    compression_keep_recent: usize,
    max_observation_chars: usize,
    temperature: f32,
    max_tokens: u32,
    stream_final_response: bool,
    chunk_tx: Option<tokio::sync::mpsc::Sender<penguiflow_core::Chunk>>,
}

impl PlannerBuilder {
    pub fn new(llm: Arc<dyn LlmClient>, state_store: Arc<dyn StateStore>, budgets: Budgets) -> Self {
        Self {
            nodes: HashMap::new(),
            llm,
            state_store,
            registry: SchemaRegistry::default(),
            budgets,
            hints: PlanningHints::default(),
            visibility: allow_all(),
            token_estimator: Arc::new(CharCountEstimator::default()),
            compression_keep_recent: 4,
            max_observation_chars: 4000,
            temperature: 0.0,
            max_tokens: 1024,
            stream_final_response: false,
            chunk_tx: None,
        }
    }

    pub fn with_tool(mut self, node: Node) -> Self {
        self.nodes.insert(node.node_id.clone(), node);
        self
    }

    pub fn with_tools(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
        for node in nodes {
            self.nodes.insert(node.node_id.clone(), node);
        }
        self
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_hints(mut self, hints: PlanningHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_visibility(mut self, visibility: ToolVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_token_estimator(mut self, estimator: Arc<dyn TokenEstimator>) -> Self {
        self.token_estimator = estimator;
        self
    }

    pub fn with_compression_keep_recent(mut self, keep_recent: usize) -> Self {
        self.compression_keep_recent = keep_recent;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_stream_final_response(mut self, chunk_tx: tokio::sync::mpsc::Sender<penguiflow_core::Chunk>) -> Self {
        self.stream_final_response = true;
        self.chunk_tx = Some(chunk_tx);
        self
    }

    pub fn build(self) -> Planner {
        Planner {
            nodes: self.nodes,
            llm: self.llm,
            state_store: self.state_store,
            registry: self.registry,
            cancellation: CancellationRegistry::new(),
            budgets: self.budgets,
            hints: self.hints,
            visibility: self.visibility,
            token_estimator: self.token_estimator,
            compression_keep_recent: self.compression_keep_recent,
            max_observation_chars: self.max_observation_chars,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream_final_response: self.stream_final_response,
            chunk_tx: self.chunk_tx,
            idempotency: IdempotencyCache::new(),
        }
    }
}

pub struct Planner {
    nodes: HashMap<String, Node>,
    llm: Arc<dyn LlmClient>,
    state_store: Arc<dyn StateStore>,
    registry: SchemaRegistry,
    cancellation: CancellationRegistry,
    budgets: Budgets,
    hints: PlanningHints,
    visibility: ToolVisibility,
    token_estimator: Arc<dyn TokenEstimator>,
    compression_keep_recent: usize,
    max_observation_chars: usize,
    temperature: f32,
    max_tokens: u32,
    stream_final_response: bool,
    chunk_tx: Option<tokio::sync::mpsc::Sender<penguiflow_core::Chunk>>,
    idempotency: IdempotencyCache,
}

impl Planner {
    /// Start a fresh run for `query`.
    pub async fn run(&self, query: impl Into<String>, headers: Headers, trace_id: impl Into<String>) -> Result<RunOutcome> {
        let query = query.into();
        let trace_id = trace_id.into();
        let mut trajectory = Trajectory::new();
        let mut hops = 0u32;
        self.drive(&mut trajectory, &mut hops, &headers, &trace_id, &query).await
    }

    /// Resume a paused run. Idempotent: a repeated `(token, user_input)`
    /// returns the originally-computed outcome rather than re-executing.
    pub async fn resume(&self, resume_token: &str, user_input: Value) -> Result<RunOutcome> {
        if let Some(cached) = self.idempotency.get(resume_token, &user_input).await {
            return Ok(serde_json::from_value(cached)?);
        }

        let record = self
            .state_store
            .load_pause(resume_token)
            .await?
            .ok_or_else(|| PlannerError::UnknownResumeToken(resume_token.to_string()))?;
        let mut record: PauseRecord = serde_json::from_value(record)?;

        record.trajectory.push_action(
            "resumed with user input".to_string(),
            json!({"next_node": record.pending_node, "args": record.pending_args}),
            user_input,
        );

        let outcome = self
            .drive(&mut record.trajectory, &mut record.hops, &record.headers, resume_token, &record.user_query)
            .await?;

        self.state_store.delete_pause(resume_token).await?;
        self.idempotency
            .put(resume_token, &user_input, serde_json::to_value(&outcome)?)
            .await;
        Ok(outcome)
    }

    fn catalog(&self, headers: &Headers) -> Vec<CatalogEntry> {
        self.nodes
            .values()
            .map(|node| CatalogEntry {
                node_id: node.node_id.clone(),
                name: node.name.clone(),
                description: node.description.clone(),
                input_schema: None,
                output_schema: None,
                side_effects: node.side_effects,
                tags: node.tags.clone(),
                latency_hint_ms: node.latency_hint.map(|d| d.as_millis() as u64),
            })
            .filter(|entry| (self.visibility)(entry, headers))
            .collect()
    }

    fn system_prompt(&self, catalog: &[CatalogEntry], query: &str) -> String {
        let tools = serde_json::to_string_pretty(catalog).unwrap_or_default();
        let hints = json!({
            "max_parallel": self.hints.max_parallel,
            "absolute_max_parallel": self.hints.absolute_max_parallel,
            "sequential_only": self.hints.sequential_only,
            "parallel_groups": self.hints.parallel_groups,
            "ordering": self.hints.ordering,
        });
        format!(
            "You are the planning core of an agent. Available tools:\n{tools}\n\n\
             Planning hints: {hints}\n\n\
             User query: {query}\n\n\
             On every turn, respond with exactly one JSON object: \
             {{\"thought\": ..., \"next_node\": ..., \"args\": ...}} for a single tool call, \
             {{\"thought\": ..., \"plan\": [{{\"node\": ..., \"args\": ...}}, ...], \"join\": {{\"node\": ...}}}} \
             for parallel tool calls, or \
             {{\"thought\": ..., \"final\": {{\"raw_answer\": ...}}}} to finish. \
             Respond with ONLY that JSON object, no surrounding prose.",
        )
    }

    /// `terminal_action_seq` is the `action_seq` this turn would be
    /// assigned if it turns out to be a `Finish` action — used to tag
    /// forwarded streaming chunks per spec §4.8. Non-final turns never
    /// stream: an intermediate "thought" has no business appearing on the
    /// user-facing chunk channel.
    async fn get_action(&self, messages: Vec<ChatMessage>, terminal_action_seq: u64) -> Result<(Action, Value)> {
        let (action, raw) = self.call_llm_for_action(messages).await?;

        if matches!(action, Action::Finish { .. }) {
            if let Some(tx) = &self.chunk_tx {
                if self.stream_final_response {
                    self.stream_terminal_text(tx, terminal_action_seq, &action).await;
                }
            }
        }

        Ok((action, raw))
    }

    async fn stream_terminal_text(
        &self,
        tx: &tokio::sync::mpsc::Sender<penguiflow_core::Chunk>,
        action_seq: u64,
        action: &Action,
    ) {
        let Action::Finish { final_answer, .. } = action else {
            return;
        };
        let Some(text) = &final_answer.raw_answer else {
            return;
        };
        let stream_id = format!("planner-final-{action_seq}");
        let chunk = penguiflow_core::Chunk {
            trace_id: String::new(),
            stream_id,
            seq: 0,
            done: true,
            text: Some(text.clone()),
            artifact_type: None,
            chunk: None,
        };
        let _ = tx.send(chunk).await;
    }

    async fn call_llm_for_action(&self, messages: Vec<ChatMessage>) -> Result<(Action, Value)> {
        let request = CallRequest::new(messages.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_stream(self.stream_final_response);
        let response = self.llm.call(request, None).await?;

        if let Some(value) = repair::extract_json(&response.content) {
            if let Ok(action) = Action::from_value(value.clone()) {
                return Ok((action, value));
            }
        }

        let mut retry_messages = messages;
        retry_messages.push(ChatMessage::assistant(response.content));
        retry_messages.push(ChatMessage::user(
            "That response was not a valid JSON action. Reply with ONLY the corrected JSON object matching the schema, no prose.",
        ));
        let retry_request = CallRequest::new(retry_messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        let retry_response = self.llm.call(retry_request, None).await?;

        let value = repair::extract_json(&retry_response.content)
            .ok_or_else(|| PlannerError::UnparseableAction(retry_response.content.clone()))?;
        let action = Action::from_value(value.clone()).map_err(PlannerError::UnparseableAction)?;
        Ok((action, value))
    }

    /// Produce a cheap synchronous summary of the steps being compressed
    /// away. Runs on the hot path (spec §9 open-question resolution): no
    /// separate async summarizer round-trip to get wrong.
    fn summarize(&self, trajectory: &Trajectory) -> String {
        format!(
            "{} prior step(s) compressed: {}",
            trajectory.steps().len(),
            trajectory.render().chars().take(200).collect::<String>()
        )
    }

    async fn maybe_compress(&self, trajectory: &mut Trajectory) {
        let estimated = trajectory.estimated_tokens(self.token_estimator.as_ref());
        if !self.budgets.tokens_exceeded(estimated) {
            return;
        }
        let summary = self.summarize(trajectory);
        trajectory.compress(self.compression_keep_recent, summary);
    }

    /// The driven loop: check budgets, ask the LLM for the next action,
    /// execute it, repeat.
    async fn drive(
        &self,
        trajectory: &mut Trajectory,
        hops: &mut u32,
        headers: &Headers,
        trace_id: &str,
        query: &str,
    ) -> Result<RunOutcome> {
        loop {
            if let Some(which) = self.budgets.check(*hops) {
                return Ok(RunOutcome::Finish {
                    reason: FinishReason::BudgetExhausted,
                    payload: Value::Null,
                    metadata: json!({"which": budget_which(which)}),
                });
            }

            self.maybe_compress(trajectory).await;

            let catalog = self.catalog(headers);
            let system = self.system_prompt(&catalog, query);
            let mut messages = vec![ChatMessage::system(system)];
            let rendered = trajectory.render();
            if !rendered.is_empty() {
                messages.push(ChatMessage::user(format!("Trajectory so far:\n{rendered}")));
            }

            let mut revision_notes: Vec<String> = Vec::new();
            let mut revisions = 0u32;
            let (action, raw_request) = loop {
                let mut turn_messages = messages.clone();
                for note in &revision_notes {
                    turn_messages.push(ChatMessage::user(note.clone()));
                }
                let (action, raw) = self.get_action(turn_messages, trajectory.next_action_seq()).await?;

                if let Some(violation) = self.validate_action(&action, &catalog) {
                    revisions += 1;
                    if revisions > MAX_REVISIONS_PER_HOP {
                        return Ok(RunOutcome::Finish {
                            reason: FinishReason::NoPath,
                            payload: Value::Null,
                            metadata: json!({"thought": format!("could not produce a valid action: {violation}")}),
                        });
                    }
                    revision_notes.push(format!(
                        "Your previous action was rejected: {violation}. Revise and respond with a corrected JSON action."
                    ));
                    continue;
                }

                break (action, raw);
            };

            match action {
                Action::Finish { thought, final_answer } => {
                    let is_no_path = final_answer.raw_answer.is_none() && final_answer.raw.is_none();
                    if is_no_path {
                        return Ok(RunOutcome::Finish {
                            reason: FinishReason::NoPath,
                            payload: Value::Null,
                            metadata: json!({"thought": thought}),
                        });
                    }
                    return Ok(RunOutcome::Finish {
                        reason: FinishReason::AnswerComplete,
                        payload: serde_json::to_value(&final_answer)?,
                        metadata: json!({"thought": thought}),
                    });
                }
                Action::Sequential { thought, next_node, args } => {
                    let node = self.nodes.get(&next_node).cloned();
                    let Some(node) = node else {
                        return Err(PlannerError::UnknownNode(next_node));
                    };

                    let outcome = invoke_tool(
                        &node,
                        args.clone(),
                        trace_id,
                        headers,
                        &self.cancellation,
                        &self.registry,
                        None,
                    )
                    .await;

                    let observation = match outcome {
                        Ok(value) => {
                            if let Some((reason, payload)) = detect_pause_request(&value) {
                                return self
                                    .pause(trajectory, *hops, headers, trace_id, query, next_node, args, reason, payload)
                                    .await;
                            }
                            value
                        }
                        Err(e) => json!({"node": next_node, "args": args, "error": e.to_string()}),
                    };

                    let truncated = truncate_observation(observation, self.max_observation_chars);
                    trajectory.push_action(thought, raw_request, truncated);
                    *hops += 1;
                }
                Action::Parallel { thought, plan, join } => {
                    let nodes = self.nodes.clone();
                    let result = execute_plan(
                        &plan,
                        join.as_ref(),
                        |id| nodes.get(id).cloned(),
                        trace_id,
                        headers,
                        &self.cancellation,
                        &self.registry,
                    )
                    .await?;

                    let observation = truncate_observation(result.to_json(), self.max_observation_chars);
                    trajectory.push_action(thought, raw_request, observation);
                    *hops += 1;
                }
            }
        }
    }

    fn validate_action(&self, action: &Action, catalog: &[CatalogEntry]) -> Option<String> {
        let known: std::collections::HashSet<&str> = catalog.iter().map(|e| e.node_id.as_str()).collect();
        for node in action.referenced_nodes() {
            if !known.contains(node) {
                return Some(format!("unknown node '{node}'"));
            }
        }
        if let Action::Parallel { plan, .. } = action {
            if let Err(violation) = self.hints.validate_plan(plan) {
                return Some(violation);
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    async fn pause(
        &self,
        trajectory: &mut Trajectory,
        hops: u32,
        headers: &Headers,
        trace_id: &str,
        query: &str,
        pending_node: String,
        pending_args: Value,
        reason: PauseReason,
        payload: Value,
    ) -> Result<RunOutcome> {
        let resume_token = PauseRecord::new_token();
        let record = PauseRecord {
            resume_token: resume_token.clone(),
            reason,
            payload: payload.clone(),
            trajectory: trajectory.clone(),
            hops,
            headers: headers.clone(),
            trace_id: trace_id.to_string(),
            user_query: query.to_string(),
            pending_node,
            pending_args,
        };
        tracing::info!(trace_id, resume_token = %resume_token, ?reason, "planner run paused");
        self.state_store
            .save_pause(&resume_token, serde_json::to_value(&record)?, Duration::from_secs(3600))
            .await?;
        Ok(RunOutcome::Pause {
            resume_token,
            reason,
            payload,
        })
    }
}

fn budget_which(which: BudgetExhausted) -> &'static str {
    match which {
        BudgetExhausted::Hops => "hops",
        BudgetExhausted::Deadline => "deadline",
        BudgetExhausted::Tokens => "tokens",
    }
}
