//! Typed stage outcomes
//!
//! Results produced by the validation and generation stages. The
//! planning stage's outcome is the [`crate::domain::Plan`] itself.

use serde::{Deserialize, Serialize};

use super::requirements::Requirements;

/// Verdict of the validation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    /// Requirements are complete; planning may proceed
    Ready,
    /// The prompt under-specifies the request; the teacher must answer
    NeedsClarification,
}

/// A question posed back to the teacher by the validation stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClarificationQuestion {
    /// Requirement field the question is about, when attributable
    #[serde(default)]
    pub field: Option<String>,

    /// The question text
    pub question: String,
}

/// Output of one validation stage attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,

    /// Requirements extracted so far (possibly partial)
    #[serde(default)]
    pub requirements: Option<Requirements>,

    /// Questions to ask when status is needs_clarification
    #[serde(default)]
    pub questions: Vec<ClarificationQuestion>,

    /// Required fields the prompt did not specify
    #[serde(default)]
    pub missing_fields: Vec<String>,

    /// Model's reasoning, kept for audit
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// One successfully generated exercise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedExercise {
    /// The plan item this exercise fulfils
    pub plan_item_id: String,

    pub title: String,

    pub exercise_type: String,

    /// Exercise content (structure varies by exercise type)
    pub content: serde_json::Value,
}

/// A per-item generation failure, isolated from the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub plan_item_id: String,
    pub message: String,
}

/// Output of one generation stage attempt
///
/// `exercises` may be a strict subset of the plan's items; every entry in
/// `errors` names the item that failed. The session completes either way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub exercises: Vec<GeneratedExercise>,
    pub errors: Vec<ItemError>,
    pub total_generated: u32,
}
