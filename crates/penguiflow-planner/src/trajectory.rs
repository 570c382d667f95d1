//! The planner's append-only trajectory, its pluggable token estimator, and
//! in-place compression of older steps into summaries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Estimates how many tokens a chunk of prompt text will cost.
///
/// Resolves the "pluggable token counter" open question in favor of a
/// trait with a character-count default, rather than a hard-coded
/// tokenizer dependency — swap in a real tokenizer's counter for a
/// specific provider without touching the rest of the planner.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u64;
}

/// Default estimator: roughly 4 characters per token, the common rule of
/// thumb for English prose and JSON alike.
pub struct CharCountEstimator {
    pub chars_per_token: f64,
}

impl Default for CharCountEstimator {
    fn default() -> Self {
        Self { chars_per_token: 4.0 }
    }
}

impl TokenEstimator for CharCountEstimator {
    fn estimate(&self, text: &str) -> u64 {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as u64
    }
}

/// One entry in the trajectory: either a recorded action + its observation,
/// or a summary standing in for a contiguous run of older steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrajectoryStep {
    Action {
        action_seq: u64,
        thought: String,
        /// The raw action JSON the LLM produced (or the planner recorded
        /// on its behalf, e.g. a synthesized branch request) that drove
        /// this step — kept for prompt replay and audit.
        request: Value,
        observation: Value,
    },
    Summary {
        /// The `action_seq` values this summary stands in for, preserved
        /// so anything downstream (join results, a pause record referring
        /// back to a specific step) that cites an old `action_seq` still
        /// resolves.
        anchors: Vec<u64>,
        summary: String,
    },
}

impl TrajectoryStep {
    fn render(&self) -> String {
        match self {
            TrajectoryStep::Action {
                thought,
                request,
                observation,
                ..
            } => format!(
                "thought: {thought}\naction: {request}\nobservation: {observation}",
                request = request,
                observation = observation
            ),
            TrajectoryStep::Summary { summary, .. } => format!("summary: {summary}"),
        }
    }
}

/// Truncate a JSON observation to a character budget, preferring to keep it
/// structured (as-is) when it fits, and otherwise replacing the value with
/// a marked-truncated string.
pub fn truncate_observation(value: Value, max_chars: usize) -> Value {
    let rendered = value.to_string();
    if rendered.chars().count() <= max_chars {
        return value;
    }
    let truncated: String = rendered.chars().take(max_chars).collect();
    Value::String(format!("{truncated}… [truncated, {} chars total]", rendered.chars().count()))
}

/// The append-only record of everything the planner has done this run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trajectory {
    steps: Vec<TrajectoryStep>,
    next_action_seq: u64,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action step, assigning and returning the next monotonic
    /// `action_seq`.
    pub fn push_action(&mut self, thought: impl Into<String>, request: Value, observation: Value) -> u64 {
        let action_seq = self.next_action_seq;
        self.next_action_seq += 1;
        self.steps.push(TrajectoryStep::Action {
            action_seq,
            thought: thought.into(),
            request,
            observation,
        });
        action_seq
    }

    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn next_action_seq(&self) -> u64 {
        self.next_action_seq
    }

    /// Concatenated textual rendering of every step, the unit the token
    /// estimator measures against.
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(TrajectoryStep::render)
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    pub fn estimated_tokens(&self, estimator: &dyn TokenEstimator) -> u64 {
        estimator.estimate(&self.render())
    }

    /// Replace every step except the most recent `keep_recent` with a single
    /// `Summary` step produced by the caller (typically a cheaper
    /// summarizer LLM call). Runs synchronously on the hot path — no
    /// shadow-copy concurrency to reason about for a first cut. Returns the
    /// `action_seq` anchors folded into the summary, or `None` if there was
    /// nothing to compress.
    pub fn compress(&mut self, keep_recent: usize, summary: impl Into<String>) -> Option<Vec<u64>> {
        if self.steps.len() <= keep_recent {
            return None;
        }

        let split_at = self.steps.len() - keep_recent;
        let older: Vec<TrajectoryStep> = self.steps.drain(..split_at).collect();

        let mut anchors = Vec::new();
        for step in &older {
            match step {
                TrajectoryStep::Action { action_seq, .. } => anchors.push(*action_seq),
                TrajectoryStep::Summary { anchors: inner, .. } => anchors.extend(inner.iter().copied()),
            }
        }

        if anchors.is_empty() {
            return None;
        }

        self.steps.insert(
            0,
            TrajectoryStep::Summary {
                anchors: anchors.clone(),
                summary: summary.into(),
            },
        );
        Some(anchors)
    }
}
