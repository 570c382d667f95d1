//! Per-node execution policy: validation mode, timeout, and retry/backoff.
//!
//! Grounded in the same exponential-backoff-with-jitter shape used
//! throughout the rest of this codebase's lineage, generalized from a
//! single `RetryPolicy` into a full node [`Policy`] bundle (validation mode
//! and timeout alongside retry parameters) per spec §4.2.

use crate::error::GraphError;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Which side(s) of a node invocation get schema-validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validate {
    #[default]
    None,
    In,
    Out,
    Both,
}

impl Validate {
    pub fn validates_input(&self) -> bool {
        matches!(self, Validate::In | Validate::Both)
    }

    pub fn validates_output(&self) -> bool {
        matches!(self, Validate::Out | Validate::Both)
    }
}

/// A predicate deciding whether a raised error should be retried.
///
/// Defaults to "retry everything except cancellation", matching
/// [`GraphError::is_retryable_by_default`].
pub type RetryClassifier = Arc<dyn Fn(&GraphError) -> bool + Send + Sync>;

/// Per-node execution policy.
#[derive(Clone)]
pub struct Policy {
    pub validate: Validate,
    pub timeout: Option<Duration>,
    pub max_retries: usize,
    pub backoff_base: Duration,
    pub backoff_mult: f64,
    pub max_backoff: Duration,
    pub retry_classifier: RetryClassifier,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            validate: Validate::None,
            timeout: None,
            max_retries: 0,
            backoff_base: Duration::from_millis(100),
            backoff_mult: 2.0,
            max_backoff: Duration::from_secs(30),
            retry_classifier: Arc::new(|e| e.is_retryable_by_default()),
        }
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("validate", &self.validate)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("backoff_base", &self.backoff_base)
            .field("backoff_mult", &self.backoff_mult)
            .field("max_backoff", &self.max_backoff)
            .field("retry_classifier", &"<fn>")
            .finish()
    }
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validate(mut self, validate: Validate) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, mult: f64, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_mult = mult;
        self.max_backoff = max;
        self
    }

    pub fn with_retry_classifier(mut self, classifier: RetryClassifier) -> Self {
        self.retry_classifier = classifier;
        self
    }

    /// Should `error`, raised on the 0-indexed attempt number `attempt`
    /// (0 == the first try), trigger another retry?
    pub fn should_retry(&self, attempt: usize, error: &GraphError) -> bool {
        attempt < self.max_retries && (self.retry_classifier)(error)
    }

    /// Exponential backoff with jitter, capped at `max_backoff`.
    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        let base = self.backoff_base.as_secs_f64() * self.backoff_mult.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..=1.5);
        Duration::from_secs_f64((capped * jitter).max(0.0))
    }
}
