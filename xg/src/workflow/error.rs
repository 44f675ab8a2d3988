//! Workflow error types
//!
//! Guard violations are their own variants so callers get descriptive,
//! non-mutating rejections; everything else wraps the layer it came from.

use thiserror::Error;

use crate::domain::SessionStatus;
use crate::llm::LlmError;
use crate::scheduler::QueueClosed;
use crate::state::StateError;

/// Errors surfaced by workflow entrypoints and stage execution
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Access denied: {principal} may not use document {document_ref}")]
    AccessDenied { document_ref: String, principal: String },

    #[error("Session not awaiting clarification (currently {actual})")]
    NotAwaitingClarification { actual: SessionStatus },

    #[error("Session not awaiting approval (currently {actual})")]
    NotAwaitingApproval { actual: SessionStatus },

    #[error("Session has no plan to approve")]
    PlanMissing,

    #[error("Clarification limit reached after {rounds} validation rounds")]
    ClarificationLimit { rounds: u32 },

    /// A stage job arrived for a session whose status no longer expects
    /// it. Duplicate scheduler deliveries land here and are dropped.
    #[error("Stale stage trigger: session {session_id} is {actual}, not {expected}")]
    StaleStage {
        session_id: String,
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Prompt rendering failed: {0}")]
    Prompt(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Scheduler(#[from] QueueClosed),
}

impl WorkflowError {
    /// Guard and staleness rejections leave the session untouched
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied { .. }
                | Self::NotAwaitingClarification { .. }
                | Self::NotAwaitingApproval { .. }
                | Self::PlanMissing
                | Self::ClarificationLimit { .. }
                | Self::StaleStage { .. }
        )
    }
}
