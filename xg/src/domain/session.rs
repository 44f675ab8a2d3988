//! Session record and workflow state machine
//!
//! A Session is one end-to-end run of the generation workflow for a
//! single prompt. It only ever moves forward through the state graph,
//! except the clarification loop which returns to `validating`. Terminal
//! states are never left.

use serde::{Deserialize, Serialize};
use sessionstore::{IndexValue, Record, now_ms};
use std::collections::HashMap;

use super::id::generate_id;
use super::plan::Plan;
use super::requirements::Requirements;

/// Workflow position of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Validation stage scheduled or running
    #[default]
    Validating,
    /// Blocked on the teacher answering clarification questions
    AwaitingClarification,
    /// Planning stage scheduled or running
    Planning,
    /// Blocked on the teacher approving the plan
    AwaitingApproval,
    /// Generation stage scheduled or running
    Generating,
    /// Terminal: generation finished (possibly with per-item errors)
    Completed,
    /// Terminal: a stage failed
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => write!(f, "validating"),
            Self::AwaitingClarification => write!(f, "awaiting_clarification"),
            Self::Planning => write!(f, "planning"),
            Self::AwaitingApproval => write!(f, "awaiting_approval"),
            Self::Generating => write!(f, "generating"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl SessionStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal edges of the state graph
    ///
    /// Any non-terminal state may fail; the only back-edge is the
    /// clarification loop returning to `validating`.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        matches!(
            (self, next),
            (Self::Validating, Self::AwaitingClarification)
                | (Self::Validating, Self::Planning)
                | (Self::AwaitingClarification, Self::Validating)
                | (Self::Planning, Self::AwaitingApproval)
                | (Self::AwaitingApproval, Self::Generating)
                | (Self::Generating, Self::Completed)
        )
    }
}

/// An answered clarification round, accumulated across the loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationAnswer {
    /// The question as it was posed to the teacher
    pub question: String,
    /// The teacher's answer
    pub answer: String,
}

/// One end-to-end generation workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier
    pub id: String,

    /// Opaque reference to the target document, owned by the caller
    pub document_ref: String,

    /// Principal who started the session
    pub owner_id: String,

    /// Original free-text instruction, immutable
    pub initial_prompt: String,

    /// AI model for all of this session's stages, immutable once chosen
    pub model: String,

    /// Current workflow position
    pub status: SessionStatus,

    /// Extracted requirements, accumulated across validation rounds;
    /// complete once validation reports ready
    pub requirements: Option<Requirements>,

    /// Exercise plan; set by the planning stage on success
    pub plan: Option<Plan>,

    /// Answered clarification rounds, in order
    pub clarifications: Vec<ClarificationAnswer>,

    /// Running total of AI tokens consumed; monotonically non-decreasing
    pub tokens_used: u64,

    /// Set only when status is failed
    pub error_message: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Session {
    /// Create a new session at `validating`
    pub fn new(
        document_ref: impl Into<String>,
        owner_id: impl Into<String>,
        initial_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let initial_prompt = initial_prompt.into();
        let now = now_ms();
        Self {
            id: generate_id("session", &initial_prompt),
            document_ref: document_ref.into(),
            owner_id: owner_id.into(),
            initial_prompt,
            model: model.into(),
            status: SessionStatus::Validating,
            requirements: None,
            plan: None,
            clarifications: Vec::new(),
            tokens_used: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a session with a specific ID (for testing or recovery)
    pub fn with_id(id: impl Into<String>, document_ref: impl Into<String>, prompt: impl Into<String>) -> Self {
        let mut session = Self::new(document_ref, "owner", prompt, "default-model");
        session.id = id.into();
        session
    }

    /// Update the status
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    /// Move to `failed` with an error message
    pub fn fail(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
        self.set_status(SessionStatus::Failed);
    }

    /// Persist extracted requirements
    pub fn set_requirements(&mut self, requirements: Requirements) {
        self.requirements = Some(requirements);
        self.updated_at = now_ms();
    }

    /// Persist the exercise plan
    pub fn set_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.updated_at = now_ms();
    }

    /// Record answered clarifications for the next validation round
    pub fn add_clarifications(&mut self, answers: Vec<ClarificationAnswer>) {
        self.clarifications.extend(answers);
        self.updated_at = now_ms();
    }

    /// Accumulate tokens consumed by a completed stage
    pub fn add_tokens(&mut self, tokens: u64) {
        self.tokens_used += tokens;
        self.updated_at = now_ms();
    }

    /// Check if the session is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Record for Session {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        "sessions"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields.insert("owner".to_string(), IndexValue::String(self.owner_id.clone()));
        fields.insert("document".to_string(), IndexValue::String(self.document_ref.clone()));
        fields
    }
}
