//! Read-side session projection
//!
//! Assembles a session and its step history into stage-typed results for
//! a live observer. The per-stage results come from the latest completed
//! step of each type, so a retried stage's newest successful attempt wins
//! and not-yet-run stages stay `None`.

use serde::Serialize;
use tracing::debug;

use crate::domain::{GenerationOutcome, Plan, Session, Step, StepOutput, StepStatus, StepType, ValidationOutcome};

/// Everything an observer needs to render a session's progress
#[derive(Debug, Clone, Serialize)]
pub struct SessionProjection {
    pub session: Session,

    /// Full step history, oldest first
    pub steps: Vec<Step>,

    /// Output of the latest completed validation step, if any
    pub validation_result: Option<ValidationOutcome>,

    /// Output of the latest completed planning step, if any
    pub plan_result: Option<Plan>,

    /// Output of the latest completed generation step, if any
    pub generation_result: Option<GenerationOutcome>,
}

impl SessionProjection {
    /// Build the projection from one consistent session+steps read
    pub fn assemble(session: Session, steps: Vec<Step>) -> Self {
        debug!(session_id = %session.id, step_count = %steps.len(), "assemble: called");

        let validation_result = latest_output(&steps, StepType::Validation).and_then(|output| match output {
            StepOutput::Validation(outcome) => Some(outcome.clone()),
            _ => None,
        });
        let plan_result = latest_output(&steps, StepType::Planning).and_then(|output| match output {
            StepOutput::Planning(plan) => Some(plan.clone()),
            _ => None,
        });
        let generation_result = latest_output(&steps, StepType::Generation).and_then(|output| match output {
            StepOutput::Generation(outcome) => Some(outcome.clone()),
            _ => None,
        });

        Self {
            session,
            steps,
            validation_result,
            plan_result,
            generation_result,
        }
    }
}

/// Output of the latest completed step of a given type
fn latest_output(steps: &[Step], step_type: StepType) -> Option<&StepOutput> {
    steps
        .iter()
        .filter(|s| s.step_type == step_type && s.status == StepStatus::Completed)
        .max_by_key(|s| (s.completed_at, s.created_at))
        .and_then(|s| s.output.as_ref())
}
