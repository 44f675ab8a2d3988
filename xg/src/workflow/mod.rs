//! Workflow engine: stages, guards, and the read projection
//!
//! Entrypoints ([`WorkflowEngine::start_session`] and friends) do a
//! guarded transition and enqueue the stage; [`WorkflowEngine::run_stage`]
//! is what the worker loop calls to execute the AI-bound work out-of-band.

mod engine;
mod error;
mod projection;
pub mod prompts;
mod stages;

pub use engine::WorkflowEngine;
pub use error::WorkflowError;
pub use projection::SessionProjection;
pub use stages::StageParams;
