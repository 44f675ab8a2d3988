//! ExerciseGen - durable AI exercise-generation workflow
//!
//! ExerciseGen turns a teacher's free-text instruction ("5 B1 German
//! exercises about food") into structured learning exercises through a
//! staged, resumable workflow:
//!
//! ```text
//! start -> validating -> {awaiting_clarification -> validating}* ->
//!     planning -> awaiting_approval -> generating -> completed | failed
//! ```
//!
//! # Core Concepts
//!
//! - **State in Records**: every session and stage attempt persists in
//!   SessionStore; a restart loses only the in-flight stage, never state
//! - **Decoupled Stages**: entrypoints do a fast guarded transition and
//!   enqueue the stage; a worker loop executes it out-of-band
//! - **Human Gates**: clarification answers and plan approval are explicit
//!   user actions, never inferred
//! - **Partial-Failure Isolation**: one exercise failing to generate never
//!   aborts the batch
//!
//! # Modules
//!
//! - [`domain`] - Session/Step records, plans, requirements, outcomes
//! - [`state`] - StateManager actor owning the persistent store
//! - [`llm`] - structured-generation client trait and Anthropic backend
//! - [`scheduler`] - stage job queue and worker loop
//! - [`workflow`] - the engine: stages, guards, projection
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod access;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod scheduler;
pub mod state;
pub mod workflow;

// Re-export commonly used types
pub use access::{AccessControl, AllowAll};
pub use config::{Config, LlmConfig, StorageConfig, WorkflowConfig};
pub use domain::{
    ClarificationAnswer, ClarificationQuestion, GeneratedExercise, GenerationOutcome, ItemError, Plan, PlanItem,
    Requirements, Session, SessionStatus, Step, StepInput, StepOutput, StepStatus, StepType, ValidationOutcome,
    ValidationStatus,
};
pub use llm::{AnthropicClient, LlmClient, LlmError, StructuredRequest, StructuredResponse, TokenUsage, create_client};
pub use scheduler::{QueueScheduler, StageJob, StageScheduler, run_worker, stage_channel};
pub use state::{StateError, StateManager, StateResponse};
pub use workflow::{SessionProjection, WorkflowEngine, WorkflowError};
