//! Step record - one stage execution attempt
//!
//! Steps are append-only: a retried stage creates a new Step rather than
//! mutating an old one, and a Step never changes again once it reaches
//! `completed` or `failed`. Inputs and outputs are tagged unions so each
//! stage's payload keeps its concrete type through persistence.

use serde::{Deserialize, Serialize};
use sessionstore::{IndexValue, Record, now_ms};
use std::collections::HashMap;

use super::generate_id;
use super::outcome::{GenerationOutcome, ValidationOutcome};
use super::plan::Plan;
use super::requirements::Requirements;
use super::session::ClarificationAnswer;

/// Which stage a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Validation,
    Planning,
    Generation,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Planning => write!(f, "planning"),
            Self::Generation => write!(f, "generation"),
        }
    }
}

/// Lifecycle of a step record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Snapshot of what was fed into a stage, kept for audit and replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StepInput {
    Validation {
        prompt: String,
        #[serde(default)]
        clarifications: Vec<ClarificationAnswer>,
    },
    Planning {
        requirements: Requirements,
    },
    Generation {
        plan: Plan,
    },
}

impl StepInput {
    /// The stage this input belongs to
    pub fn step_type(&self) -> StepType {
        match self {
            Self::Validation { .. } => StepType::Validation,
            Self::Planning { .. } => StepType::Planning,
            Self::Generation { .. } => StepType::Generation,
        }
    }
}

/// Typed stage result, present only on completed steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StepOutput {
    Validation(ValidationOutcome),
    Planning(Plan),
    Generation(GenerationOutcome),
}

impl StepOutput {
    /// The stage this output belongs to
    pub fn step_type(&self) -> StepType {
        match self {
            Self::Validation(_) => StepType::Validation,
            Self::Planning(_) => StepType::Planning,
            Self::Generation(_) => StepType::Generation,
        }
    }
}

/// An immutable record of one stage execution attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier
    pub id: String,

    /// Owning session
    pub session_id: String,

    pub step_type: StepType,

    pub status: StepStatus,

    /// What the stage was fed
    pub input: StepInput,

    /// Stage result, present only when status is completed
    pub output: Option<StepOutput>,

    /// Tokens consumed by this attempt
    pub tokens_used: u64,

    /// Set when status is failed
    pub error_message: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Completion or failure timestamp
    pub completed_at: Option<i64>,
}

impl Step {
    /// Create a new pending step for a session
    pub fn new(session_id: impl Into<String>, input: StepInput) -> Self {
        let session_id = session_id.into();
        let step_type = input.step_type();
        let now = now_ms();
        Self {
            id: generate_id("step", &format!("{step_type} {session_id}")),
            session_id,
            step_type,
            status: StepStatus::Pending,
            input,
            output: None,
            tokens_used: 0,
            error_message: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// Mark the step as running
    pub fn start(&mut self) {
        self.status = StepStatus::Processing;
    }

    /// Finish the step with its typed output and token count
    pub fn complete(&mut self, output: StepOutput, tokens_used: u64) {
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.tokens_used = tokens_used;
        self.completed_at = Some(now_ms());
    }

    /// Finish the step as failed; no output is recorded
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(now_ms());
    }

    /// Check if the step record is frozen
    pub fn is_final(&self) -> bool {
        matches!(self.status, StepStatus::Completed | StepStatus::Failed)
    }
}

impl Record for Step {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.completed_at.unwrap_or(self.created_at)
    }

    fn collection_name() -> &'static str {
        "steps"
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert("session".to_string(), IndexValue::String(self.session_id.clone()));
        fields.insert("type".to_string(), IndexValue::String(self.step_type.to_string()));
        fields.insert("status".to_string(), IndexValue::String(self.status.to_string()));
        fields
    }
}
