//! Commands and errors for the StateManager actor

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{ClarificationAnswer, Session, SessionStatus, Step};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session {session_id} is {actual}, expected {expected}")]
    Conflict {
        session_id: String,
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Session {session_id} cannot move from {from} to {to}")]
    IllegalTransition {
        session_id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Step {0} is final and cannot be modified")]
    StepFinal(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("State manager channel closed")]
    ChannelError,
}

/// Result type for state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands processed by the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    CreateSession {
        session: Session,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetSession {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Session>>>,
    },
    UpdateSession {
        session: Session,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    /// Compare-and-swap on the session status: fails with Conflict when
    /// the stored status does not match `expected`
    TransitionSession {
        id: String,
        expected: SessionStatus,
        next: SessionStatus,
        reply: oneshot::Sender<StateResponse<Session>>,
    },
    /// Append answered clarifications and return the session to
    /// `validating` in one compare-and-swap: a caller that loses the
    /// race writes nothing
    AnswerClarifications {
        id: String,
        answers: Vec<ClarificationAnswer>,
        reply: oneshot::Sender<StateResponse<Session>>,
    },
    ListSessions {
        status_filter: Option<String>,
        owner_filter: Option<String>,
        reply: oneshot::Sender<StateResponse<Vec<Session>>>,
    },
    CreateStep {
        step: Step,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    UpdateStep {
        step: Step,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListSteps {
        session_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Step>>>,
    },
    /// One consistent read of a session plus all of its steps
    Snapshot {
        session_id: String,
        reply: oneshot::Sender<StateResponse<(Session, Vec<Step>)>>,
    },
    Shutdown,
}
