use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::handlers::{ErrorKind, HandlerId, HandlerInstance, NotifyError};

/// Why a handler was not attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TagMismatch,
    Disabled,
    Throttled,
    DryRun,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::TagMismatch => "tag_mismatch",
            SkipReason::Disabled => "disabled",
            SkipReason::Throttled => "throttled",
            SkipReason::DryRun => "dry_run",
        }
    }
}

/// Result of one handler in one dispatch
#[derive(Debug, Clone, Serialize)]
pub struct NotifyOutcome {
    pub handler_id: HandlerId,
    pub service: &'static str,
    /// Redacted URL of the handler
    pub target: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    /// Delivery attempts made, retries included
    pub attempts: u32,
    /// Messages sent per attempt (more than one when the body was split)
    pub messages: usize,
    pub dispatched_at: DateTime<Utc>,
}

impl NotifyOutcome {
    fn base(instance: &HandlerInstance) -> Self {
        Self {
            handler_id: instance.id(),
            service: instance.service_name(),
            target: instance.url_redacted(),
            success: false,
            error_kind: None,
            error: None,
            skipped: false,
            skip_reason: None,
            attempts: 0,
            messages: 0,
            dispatched_at: Utc::now(),
        }
    }

    pub fn delivered(instance: &HandlerInstance, attempts: u32, messages: usize) -> Self {
        Self {
            success: true,
            attempts,
            messages,
            ..Self::base(instance)
        }
    }

    pub fn failed(instance: &HandlerInstance, error: &NotifyError, attempts: u32) -> Self {
        Self {
            error_kind: Some(error.kind()),
            error: Some(error.to_string()),
            attempts,
            ..Self::base(instance)
        }
    }

    pub fn skipped(instance: &HandlerInstance, reason: SkipReason) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason),
            ..Self::base(instance)
        }
    }

    /// Attempted and not delivered
    pub fn is_failure(&self) -> bool {
        !self.skipped && !self.success
    }
}

/// Outcomes of one dispatch, in set order
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    outcomes: Vec<NotifyOutcome>,
}

impl DispatchReport {
    pub fn new(outcomes: Vec<NotifyOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[NotifyOutcome] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<NotifyOutcome> {
        self.outcomes
    }

    /// True when no attempted handler failed; vacuously true if none was
    /// attempted.
    pub fn success(&self) -> bool {
        !self.outcomes.iter().any(NotifyOutcome::is_failure)
    }

    /// Number of handlers that were attempted
    pub fn attempted(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.skipped).count()
    }

    /// Number of attempted handlers that failed
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.skipped).count()
    }

    /// `"M of N failed"` over attempted handlers
    pub fn summary(&self) -> String {
        format!("{} of {} failed", self.failed(), self.attempted())
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())?;
        for outcome in self.outcomes.iter().filter(|o| o.is_failure()) {
            let kind = outcome.error_kind.map(|k| k.as_str()).unwrap_or("unknown");
            write!(
                f,
                "\n  {} [{}] {}",
                outcome.target,
                kind,
                outcome.error.as_deref().unwrap_or("")
            )?;
        }
        Ok(())
    }
}
