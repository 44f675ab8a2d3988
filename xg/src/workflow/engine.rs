//! The workflow engine
//!
//! Owns the wiring between state, LLM client, scheduler, and access
//! policy. Entrypoints are fast: they check guards, apply one state
//! transition, and enqueue the next stage. Stage execution happens in
//! [`WorkflowEngine::run_stage`], driven by the worker loop.
//!
//! Transition discipline: stage results are persisted first with the
//! status untouched, then the status moves via compare-and-swap;
//! caller-supplied fields like clarification answers move together with
//! the status inside the state actor. A duplicate trigger of the same
//! transition loses the CAS and is rejected without mutating anything.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::access::AccessControl;
use crate::config::Config;
use crate::domain::{
    ClarificationAnswer, Session, SessionStatus, Step, StepInput, StepOutput, StepType, ValidationStatus,
};
use crate::llm::LlmClient;
use crate::scheduler::{StageJob, StageScheduler};
use crate::state::{StateError, StateManager};

use super::error::WorkflowError;
use super::projection::SessionProjection;
use super::stages::{self, StageParams};

/// Orchestrates the session workflow end to end
pub struct WorkflowEngine {
    state: StateManager,
    llm: Arc<dyn LlmClient>,
    scheduler: Arc<dyn StageScheduler>,
    access: Arc<dyn AccessControl>,
    config: Config,
}

impl WorkflowEngine {
    pub fn new(
        state: StateManager,
        llm: Arc<dyn LlmClient>,
        scheduler: Arc<dyn StageScheduler>,
        access: Arc<dyn AccessControl>,
        config: Config,
    ) -> Self {
        Self {
            state,
            llm,
            scheduler,
            access,
            config,
        }
    }

    fn stage_params(&self, session: &Session) -> StageParams {
        StageParams {
            model: session.model.clone(),
            max_tokens: self.config.llm.max_tokens,
        }
    }

    // === Entrypoints ===

    /// Create a session at `validating` and enqueue the validation stage
    pub async fn start_session(
        &self,
        document_ref: &str,
        owner_id: &str,
        prompt: &str,
        model: Option<&str>,
    ) -> Result<Session, WorkflowError> {
        debug!(%document_ref, %owner_id, "start_session: called");

        if !self.access.verify_access(document_ref, owner_id).await {
            warn!(%document_ref, %owner_id, "start_session: access denied");
            return Err(WorkflowError::AccessDenied {
                document_ref: document_ref.to_string(),
                principal: owner_id.to_string(),
            });
        }

        let model = model.unwrap_or(&self.config.llm.model);
        let session = Session::new(document_ref, owner_id, prompt, model);
        self.state.create_session(session.clone()).await?;

        self.scheduler
            .schedule(StageJob::new(&session.id, StepType::Validation))
            .await?;

        info!(session_id = %session.id, "start_session: session created");
        Ok(session)
    }

    /// Record the teacher's answers and re-enter validation
    ///
    /// The only back-edge in the state graph. Each round re-runs
    /// validation with the cumulative answers; rounds are bounded by
    /// `workflow.max-clarification-rounds`, after which the session fails
    /// instead of looping forever.
    pub async fn answer_clarifications(
        &self,
        session_id: &str,
        answers: Vec<ClarificationAnswer>,
    ) -> Result<Session, WorkflowError> {
        debug!(%session_id, answer_count = %answers.len(), "answer_clarifications: called");
        let session = self.state.get_session_required(session_id).await?;

        if session.status != SessionStatus::AwaitingClarification {
            return Err(WorkflowError::NotAwaitingClarification { actual: session.status });
        }

        let rounds = self.validation_rounds(session_id).await?;
        if rounds >= self.config.workflow.max_clarification_rounds {
            warn!(%session_id, rounds, "answer_clarifications: clarification limit reached");
            self.fail_session(session_id, format!("Clarification limit reached after {rounds} rounds"))
                .await?;
            return Err(WorkflowError::ClarificationLimit { rounds });
        }

        // Answer recording and the back-edge are one atomic actor
        // command: a duplicate caller that loses the race has written
        // nothing
        let session = match self.state.answer_clarifications(session_id, answers).await {
            Ok(session) => session,
            Err(StateError::Conflict { actual, .. }) => {
                return Err(WorkflowError::NotAwaitingClarification { actual });
            }
            Err(e) => return Err(e.into()),
        };

        self.scheduler
            .schedule(StageJob::new(session_id, StepType::Validation))
            .await?;

        info!(%session_id, "answer_clarifications: validation re-entered");
        Ok(session)
    }

    /// Approve the plan and enqueue generation
    ///
    /// A pure transition, no AI call. Exists to put a human decision
    /// between "plan created" and the cost of generating it.
    pub async fn approve_plan(&self, session_id: &str) -> Result<Session, WorkflowError> {
        debug!(%session_id, "approve_plan: called");
        let session = self.state.get_session_required(session_id).await?;

        if session.status != SessionStatus::AwaitingApproval {
            return Err(WorkflowError::NotAwaitingApproval { actual: session.status });
        }
        if session.plan.is_none() {
            return Err(WorkflowError::PlanMissing);
        }

        let session = self
            .transition(session_id, SessionStatus::AwaitingApproval, SessionStatus::Generating)
            .await?;

        self.scheduler
            .schedule(StageJob::new(session_id, StepType::Generation))
            .await?;

        info!(%session_id, "approve_plan: generation scheduled");
        Ok(session)
    }

    /// Read-only projection of a session's progress
    pub async fn get_session(&self, session_id: &str, caller_id: &str) -> Result<SessionProjection, WorkflowError> {
        debug!(%session_id, %caller_id, "get_session: called");
        let (session, steps) = self.state.snapshot(session_id).await?;

        if !self.access.verify_access(&session.document_ref, caller_id).await {
            warn!(%session_id, %caller_id, "get_session: access denied");
            return Err(WorkflowError::AccessDenied {
                document_ref: session.document_ref,
                principal: caller_id.to_string(),
            });
        }

        Ok(SessionProjection::assemble(session, steps))
    }

    // === Stage execution (called by the worker loop) ===

    /// Execute one stage for a session
    ///
    /// Re-checks the session status against the stage's expected status
    /// first, so an at-least-once scheduler delivering the same job twice
    /// produces a [`WorkflowError::StaleStage`] rejection instead of a
    /// double execution.
    pub async fn run_stage(&self, session_id: &str, stage: StepType) -> Result<(), WorkflowError> {
        debug!(%session_id, %stage, "run_stage: called");
        let session = self.state.get_session_required(session_id).await?;

        let expected = match stage {
            StepType::Validation => SessionStatus::Validating,
            StepType::Planning => SessionStatus::Planning,
            StepType::Generation => SessionStatus::Generating,
        };
        if session.status != expected {
            debug!(%session_id, %stage, actual = %session.status, "run_stage: stale trigger, dropping");
            return Err(WorkflowError::StaleStage {
                session_id: session_id.to_string(),
                expected,
                actual: session.status,
            });
        }

        match stage {
            StepType::Validation => self.run_validation(session).await,
            StepType::Planning => self.run_planning(session).await,
            StepType::Generation => self.run_generation(session).await,
        }
    }

    async fn run_validation(&self, session: Session) -> Result<(), WorkflowError> {
        debug!(session_id = %session.id, "run_validation: called");
        let mut step = Step::new(
            &session.id,
            StepInput::Validation {
                prompt: session.initial_prompt.clone(),
                clarifications: session.clarifications.clone(),
            },
        );
        step.start();
        self.state.create_step(step.clone()).await?;

        let params = self.stage_params(&session);
        let result = stages::execute_validation(
            self.llm.as_ref(),
            &params,
            &session.initial_prompt,
            &session.clarifications,
        )
        .await;

        let (outcome, tokens) = match result {
            Ok(ok) => ok,
            Err(e) => return self.fail_stage(&session.id, step, e).await,
        };

        step.complete(StepOutput::Validation(outcome.clone()), tokens);
        self.state.update_step(step).await?;

        let mut session = self.state.get_session_required(&session.id).await?;
        session.add_tokens(tokens);

        // Each round merges what it extracted over the rounds before it,
        // so a later round only needs to fill the gaps
        let mut requirements = session.requirements.clone().unwrap_or_default();
        if let Some(extracted) = outcome.requirements.clone() {
            requirements.merge(extracted);
        }

        match outcome.status {
            ValidationStatus::Ready => {
                if !requirements.is_complete() {
                    let missing = requirements.missing_fields().join(", ");
                    session.fail(format!("Validation reported ready but requirements lack: {missing}"));
                    self.state.update_session(session).await?;
                    return Ok(());
                }

                session.set_requirements(requirements);
                let session_id = session.id.clone();
                self.state.update_session(session).await?;

                self.transition(&session_id, SessionStatus::Validating, SessionStatus::Planning)
                    .await?;
                self.scheduler
                    .schedule(StageJob::new(&session_id, StepType::Planning))
                    .await?;

                info!(session_id = %session_id, "run_validation: ready, planning scheduled");
            }
            ValidationStatus::NeedsClarification => {
                // Keep the partial extraction for the next round
                session.set_requirements(requirements);
                let session_id = session.id.clone();
                self.state.update_session(session).await?;

                // No further work is scheduled; the workflow blocks here
                // until a human answers.
                self.transition(
                    &session_id,
                    SessionStatus::Validating,
                    SessionStatus::AwaitingClarification,
                )
                .await?;

                info!(
                    session_id = %session_id,
                    question_count = %outcome.questions.len(),
                    "run_validation: awaiting clarification"
                );
            }
        }

        Ok(())
    }

    async fn run_planning(&self, session: Session) -> Result<(), WorkflowError> {
        debug!(session_id = %session.id, "run_planning: called");
        let Some(requirements) = session.requirements.clone() else {
            // Contract violation: validation must set requirements first
            self.fail_session(&session.id, "Planning started without requirements").await?;
            return Ok(());
        };

        let mut step = Step::new(
            &session.id,
            StepInput::Planning {
                requirements: requirements.clone(),
            },
        );
        step.start();
        self.state.create_step(step.clone()).await?;

        let params = self.stage_params(&session);
        let result = stages::execute_planning(
            self.llm.as_ref(),
            &params,
            &requirements,
            self.config.workflow.max_plan_items,
        )
        .await;

        let (plan, tokens) = match result {
            Ok(ok) => ok,
            Err(e) => return self.fail_stage(&session.id, step, e).await,
        };

        step.complete(StepOutput::Planning(plan.clone()), tokens);
        self.state.update_step(step).await?;

        let mut session = self.state.get_session_required(&session.id).await?;
        session.add_tokens(tokens);
        session.set_plan(plan);
        let session_id = session.id.clone();
        self.state.update_session(session).await?;

        self.transition(&session_id, SessionStatus::Planning, SessionStatus::AwaitingApproval)
            .await?;

        info!(session_id = %session_id, "run_planning: plan ready, awaiting approval");
        Ok(())
    }

    async fn run_generation(&self, session: Session) -> Result<(), WorkflowError> {
        debug!(session_id = %session.id, "run_generation: called");
        let (Some(requirements), Some(plan)) = (session.requirements.clone(), session.plan.clone()) else {
            self.fail_session(&session.id, "Generation started without requirements or plan")
                .await?;
            return Ok(());
        };

        let mut step = Step::new(&session.id, StepInput::Generation { plan: plan.clone() });
        step.start();
        self.state.create_step(step.clone()).await?;

        let params = self.stage_params(&session);
        let (outcome, tokens) = stages::execute_generation(self.llm.as_ref(), &params, &requirements, &plan).await;

        step.complete(StepOutput::Generation(outcome.clone()), tokens);
        self.state.update_step(step).await?;

        let mut session = self.state.get_session_required(&session.id).await?;
        session.add_tokens(tokens);
        let session_id = session.id.clone();
        self.state.update_session(session).await?;

        // Per-item errors never fail the session; partial success is
        // still a completed session with its error list exposed.
        self.transition(&session_id, SessionStatus::Generating, SessionStatus::Completed)
            .await?;

        info!(
            session_id = %session_id,
            total_generated = %outcome.total_generated,
            error_count = %outcome.errors.len(),
            "run_generation: session completed"
        );
        Ok(())
    }

    // === Helpers ===

    /// Compare-and-swap transition, mapping CAS conflicts onto the
    /// matching guard error
    async fn transition(
        &self,
        session_id: &str,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> Result<Session, WorkflowError> {
        match self.state.transition_session(session_id, expected, next).await {
            Ok(session) => Ok(session),
            Err(StateError::Conflict { actual, .. }) => Err(match expected {
                SessionStatus::AwaitingApproval => WorkflowError::NotAwaitingApproval { actual },
                SessionStatus::AwaitingClarification => WorkflowError::NotAwaitingClarification { actual },
                _ => WorkflowError::StaleStage {
                    session_id: session_id.to_string(),
                    expected,
                    actual,
                },
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Record a stage-level failure: freeze the step as failed, fail the
    /// session. No automatic retry; recovery is an explicit user action.
    async fn fail_stage(&self, session_id: &str, mut step: Step, error: WorkflowError) -> Result<(), WorkflowError> {
        warn!(%session_id, step_id = %step.id, error = %error, "fail_stage: stage failed");
        step.fail(error.to_string());
        self.state.update_step(step).await?;
        self.fail_session(session_id, error.to_string()).await
    }

    async fn fail_session(&self, session_id: &str, message: impl Into<String>) -> Result<(), WorkflowError> {
        let mut session = self.state.get_session_required(session_id).await?;
        if session.is_terminal() {
            debug!(%session_id, "fail_session: already terminal, skipping");
            return Ok(());
        }
        session.fail(message);
        self.state.update_session(session).await?;
        Ok(())
    }

    /// Number of validation attempts made so far
    async fn validation_rounds(&self, session_id: &str) -> Result<u32, WorkflowError> {
        let steps = self.state.list_steps(session_id).await?;
        Ok(steps.iter().filter(|s| s.step_type == StepType::Validation).count() as u32)
    }
}
