//! Domain types for ExerciseGen
//!
//! Core domain types: Session, Step, Plan, Requirements and the typed
//! stage outcomes. Session and Step implement the Record trait for
//! SessionStore persistence.
//!
//! Step payloads are tagged unions - one variant per stage - so the
//! projection layer deserializes them exhaustively instead of parsing
//! opaque blobs.

mod id;
mod outcome;
mod plan;
mod requirements;
mod session;
mod step;

pub use id::{IdResolver, generate_id};
pub use outcome::{
    ClarificationQuestion, GeneratedExercise, GenerationOutcome, ItemError, ValidationOutcome, ValidationStatus,
};
pub use plan::{Plan, PlanItem};
pub use requirements::Requirements;
pub use session::{ClarificationAnswer, Session, SessionStatus};
pub use step::{Step, StepInput, StepOutput, StepStatus, StepType};

// Re-export sessionstore types for convenience
pub use sessionstore::{Filter, FilterOp, IndexValue, Record, Store, now_ms};
