//! StateManager - actor that owns the SessionStore
//!
//! Processes commands via channels for thread-safe access to persistent
//! state. Because a single task owns the store, the compare-and-swap
//! transition and the session+steps snapshot are atomic with respect to
//! every other state operation.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use sessionstore::{Filter, Store};

use crate::domain::{ClarificationAnswer, Record, Session, SessionStatus, Step};

use super::messages::{StateCommand, StateError, StateResponse};

/// Handle to send commands to the StateManager actor
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor over a store directory
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let store = Store::open(store_path.as_ref())?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));

        info!("StateManager spawned");
        Ok(Self { tx })
    }

    async fn send<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Session operations ===

    /// Create a new Session record
    pub async fn create_session(&self, session: Session) -> StateResponse<String> {
        debug!(session_id = %session.id, "create_session: called");
        self.send(|reply| StateCommand::CreateSession { session, reply }).await
    }

    /// Get a Session by ID
    pub async fn get_session(&self, id: &str) -> StateResponse<Option<Session>> {
        debug!(%id, "get_session: called");
        let id = id.to_string();
        self.send(|reply| StateCommand::GetSession { id, reply }).await
    }

    /// Get a Session by ID, returning an error if not found
    pub async fn get_session_required(&self, id: &str) -> StateResponse<Session> {
        debug!(%id, "get_session_required: called");
        self.get_session(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Session {id}")))
    }

    /// Update a Session record
    pub async fn update_session(&self, session: Session) -> StateResponse<()> {
        debug!(session_id = %session.id, status = %session.status, "update_session: called");
        self.send(|reply| StateCommand::UpdateSession { session, reply }).await
    }

    /// Atomically move a session from `expected` to `next`
    ///
    /// Fails with [`StateError::Conflict`] when the stored status is not
    /// `expected` - a duplicate trigger observably loses the race instead
    /// of double-transitioning.
    pub async fn transition_session(
        &self,
        id: &str,
        expected: SessionStatus,
        next: SessionStatus,
    ) -> StateResponse<Session> {
        debug!(%id, %expected, %next, "transition_session: called");
        let id = id.to_string();
        self.send(|reply| StateCommand::TransitionSession {
            id,
            expected,
            next,
            reply,
        })
        .await
    }

    /// Record answered clarifications and resume validation atomically
    ///
    /// The status check, the answer append and the move back to
    /// `validating` happen as one actor command, so a duplicate caller
    /// that loses the race leaves the session untouched.
    pub async fn answer_clarifications(
        &self,
        id: &str,
        answers: Vec<ClarificationAnswer>,
    ) -> StateResponse<Session> {
        debug!(%id, count = answers.len(), "answer_clarifications: called");
        let id = id.to_string();
        self.send(|reply| StateCommand::AnswerClarifications { id, answers, reply })
            .await
    }

    /// List sessions with optional status/owner filters
    pub async fn list_sessions(
        &self,
        status_filter: Option<String>,
        owner_filter: Option<String>,
    ) -> StateResponse<Vec<Session>> {
        debug!(?status_filter, ?owner_filter, "list_sessions: called");
        self.send(|reply| StateCommand::ListSessions {
            status_filter,
            owner_filter,
            reply,
        })
        .await
    }

    // === Step operations ===

    /// Create a new Step record
    pub async fn create_step(&self, step: Step) -> StateResponse<String> {
        debug!(step_id = %step.id, step_type = %step.step_type, "create_step: called");
        self.send(|reply| StateCommand::CreateStep { step, reply }).await
    }

    /// Update a Step record; rejected once the step is final
    pub async fn update_step(&self, step: Step) -> StateResponse<()> {
        debug!(step_id = %step.id, status = %step.status, "update_step: called");
        self.send(|reply| StateCommand::UpdateStep { step, reply }).await
    }

    /// List all steps of a session, oldest first
    pub async fn list_steps(&self, session_id: &str) -> StateResponse<Vec<Step>> {
        debug!(%session_id, "list_steps: called");
        let session_id = session_id.to_string();
        self.send(|reply| StateCommand::ListSteps { session_id, reply }).await
    }

    /// Read a session and all its steps in one consistent pass
    pub async fn snapshot(&self, session_id: &str) -> StateResponse<(Session, Vec<Step>)> {
        debug!(%session_id, "snapshot: called");
        let session_id = session_id.to_string();
        self.send(|reply| StateCommand::Snapshot { session_id, reply }).await
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

fn store_err(e: sessionstore::StoreError) -> StateError {
    StateError::StoreError(e.to_string())
}

/// The actor loop that owns the Store and processes commands
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::CreateSession { session, reply } => {
                debug!(session_id = %session.id, "actor_loop: CreateSession command");
                let result = store.create(session).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::GetSession { id, reply } => {
                debug!(%id, "actor_loop: GetSession command");
                let result: StateResponse<Option<Session>> = store.get(&id).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::UpdateSession { session, reply } => {
                debug!(session_id = %session.id, "actor_loop: UpdateSession command");
                let result = store.update(session).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::TransitionSession {
                id,
                expected,
                next,
                reply,
            } => {
                debug!(%id, %expected, %next, "actor_loop: TransitionSession command");
                let _ = reply.send(transition(&mut store, &id, expected, next));
            }

            StateCommand::AnswerClarifications { id, answers, reply } => {
                debug!(%id, count = answers.len(), "actor_loop: AnswerClarifications command");
                let _ = reply.send(answer_clarifications(&mut store, &id, answers));
            }

            StateCommand::ListSessions {
                status_filter,
                owner_filter,
                reply,
            } => {
                debug!(?status_filter, ?owner_filter, "actor_loop: ListSessions command");
                let mut filters = Vec::new();
                if let Some(status) = status_filter {
                    filters.push(Filter::eq("status", status));
                }
                if let Some(owner) = owner_filter {
                    filters.push(Filter::eq("owner", owner));
                }
                let result: StateResponse<Vec<Session>> = store.list(&filters).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::CreateStep { step, reply } => {
                debug!(step_id = %step.id, "actor_loop: CreateStep command");
                let result = store.create(step).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::UpdateStep { step, reply } => {
                debug!(step_id = %step.id, "actor_loop: UpdateStep command");
                let _ = reply.send(update_step(&mut store, step));
            }

            StateCommand::ListSteps { session_id, reply } => {
                debug!(%session_id, "actor_loop: ListSteps command");
                let result: StateResponse<Vec<Step>> =
                    store.list(&[Filter::eq("session", session_id)]).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::Snapshot { session_id, reply } => {
                debug!(%session_id, "actor_loop: Snapshot command");
                let result = snapshot(&store, &session_id);
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

/// Compare-and-swap on the session status, inside the actor
fn transition(store: &mut Store, id: &str, expected: SessionStatus, next: SessionStatus) -> StateResponse<Session> {
    let mut session: Session = store
        .get(id)
        .map_err(store_err)?
        .ok_or_else(|| StateError::NotFound(format!("Session {id}")))?;

    if session.status != expected {
        warn!(
            session_id = %id,
            %expected,
            actual = %session.status,
            "transition: status mismatch, rejecting"
        );
        return Err(StateError::Conflict {
            session_id: id.to_string(),
            expected,
            actual: session.status,
        });
    }

    // Even with a matching expectation, only edges of the state graph
    // are allowed through
    if !session.status.can_transition_to(next) {
        warn!(
            session_id = %id,
            from = %session.status,
            to = %next,
            "transition: illegal edge, rejecting"
        );
        return Err(StateError::IllegalTransition {
            session_id: id.to_string(),
            from: session.status,
            to: next,
        });
    }

    session.set_status(next);
    store.update(session.clone()).map_err(store_err)?;
    Ok(session)
}

/// Append clarification answers and resume validation, inside the actor
fn answer_clarifications(store: &mut Store, id: &str, answers: Vec<ClarificationAnswer>) -> StateResponse<Session> {
    let mut session: Session = store
        .get(id)
        .map_err(store_err)?
        .ok_or_else(|| StateError::NotFound(format!("Session {id}")))?;

    if session.status != SessionStatus::AwaitingClarification {
        warn!(
            session_id = %id,
            actual = %session.status,
            "answer_clarifications: session is not awaiting answers, rejecting"
        );
        return Err(StateError::Conflict {
            session_id: id.to_string(),
            expected: SessionStatus::AwaitingClarification,
            actual: session.status,
        });
    }

    session.add_clarifications(answers);
    session.set_status(SessionStatus::Validating);
    store.update(session.clone()).map_err(store_err)?;
    Ok(session)
}

/// Update a step, enforcing immutability of final step records
fn update_step(store: &mut Store, step: Step) -> StateResponse<()> {
    let existing: Option<Step> = store.get(&step.id).map_err(store_err)?;
    match existing {
        None => Err(StateError::NotFound(format!("Step {}", step.id))),
        Some(prev) if prev.is_final() => Err(StateError::StepFinal(step.id)),
        Some(_) => store.update(step).map_err(store_err),
    }
}

/// Read a session plus all of its steps in one pass
fn snapshot(store: &Store, session_id: &str) -> StateResponse<(Session, Vec<Step>)> {
    let session: Session = store
        .get(session_id)
        .map_err(store_err)?
        .ok_or_else(|| StateError::NotFound(format!("Session {session_id}")))?;
    let steps: Vec<Step> = store
        .list(&[Filter::eq("session", session_id)])
        .map_err(store_err)?;
    Ok((session, steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StepInput;
    use tempfile::tempdir;

    fn session(id: &str) -> Session {
        Session::with_id(id, "doc-1", "5 B1 German exercises about food")
    }

    #[tokio::test]
    async fn test_session_crud() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();

        let id = manager.create_session(session("s-1")).await.unwrap();
        assert_eq!(id, "s-1");

        let got = manager.get_session("s-1").await.unwrap().unwrap();
        assert_eq!(got.status, SessionStatus::Validating);

        let mut updated = got.clone();
        updated.add_tokens(100);
        manager.update_session(updated).await.unwrap();

        let got = manager.get_session_required("s-1").await.unwrap();
        assert_eq!(got.tokens_used, 100);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();

        assert!(manager.get_session("ghost").await.unwrap().is_none());
        assert!(matches!(
            manager.get_session_required("ghost").await.unwrap_err(),
            StateError::NotFound(_)
        ));

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transition_cas_succeeds_once() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        manager.create_session(session("s-1")).await.unwrap();

        let updated = manager
            .transition_session("s-1", SessionStatus::Validating, SessionStatus::Planning)
            .await
            .unwrap();
        assert_eq!(updated.status, SessionStatus::Planning);

        // Second identical transition loses the race
        let err = manager
            .transition_session("s-1", SessionStatus::Validating, SessionStatus::Planning)
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict { .. }));

        // Session state was not disturbed by the losing caller
        let got = manager.get_session_required("s-1").await.unwrap();
        assert_eq!(got.status, SessionStatus::Planning);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transition_rejects_illegal_edge() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        manager.create_session(session("s-1")).await.unwrap();

        // Expectation matches, but validating cannot jump to generating
        let err = manager
            .transition_session("s-1", SessionStatus::Validating, SessionStatus::Generating)
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::IllegalTransition { .. }));

        let got = manager.get_session_required("s-1").await.unwrap();
        assert_eq!(got.status, SessionStatus::Validating);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_answer_clarifications_loser_writes_nothing() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        manager.create_session(session("s-1")).await.unwrap();
        manager
            .transition_session("s-1", SessionStatus::Validating, SessionStatus::AwaitingClarification)
            .await
            .unwrap();

        let answer = |q: &str, a: &str| ClarificationAnswer {
            question: q.to_string(),
            answer: a.to_string(),
        };

        let winner = manager
            .answer_clarifications("s-1", vec![answer("A", "B1")])
            .await
            .unwrap();
        assert_eq!(winner.status, SessionStatus::Validating);

        // A duplicate caller arriving after the winner is rejected and
        // must not overwrite the winner's answers
        let err = manager
            .answer_clarifications("s-1", vec![answer("B", "A2")])
            .await
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict { .. }));

        let got = manager.get_session_required("s-1").await.unwrap();
        assert_eq!(got.clarifications.len(), 1);
        assert_eq!(got.clarifications[0].question, "A");
        assert_eq!(got.clarifications[0].answer, "B1");

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_step_immutable_once_final() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        manager.create_session(session("s-1")).await.unwrap();

        let mut step = Step::new(
            "s-1",
            StepInput::Validation {
                prompt: "prompt".to_string(),
                clarifications: vec![],
            },
        );
        step.start();
        manager.create_step(step.clone()).await.unwrap();

        step.fail("provider down");
        manager.update_step(step.clone()).await.unwrap();

        // The record is now frozen
        step.error_message = Some("rewritten".to_string());
        let err = manager.update_step(step).await.unwrap_err();
        assert!(matches!(err, StateError::StepFinal(_)));

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_steps_by_session() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        manager.create_session(session("s-1")).await.unwrap();
        manager.create_session(session("s-2")).await.unwrap();

        for sid in ["s-1", "s-1", "s-2"] {
            let step = Step::new(
                sid,
                StepInput::Validation {
                    prompt: "p".to_string(),
                    clarifications: vec![],
                },
            );
            manager.create_step(step).await.unwrap();
        }

        assert_eq!(manager.list_steps("s-1").await.unwrap().len(), 2);
        assert_eq!(manager.list_steps("s-2").await.unwrap().len(), 1);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_returns_session_and_steps() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();
        manager.create_session(session("s-1")).await.unwrap();
        manager
            .create_step(Step::new(
                "s-1",
                StepInput::Validation {
                    prompt: "p".to_string(),
                    clarifications: vec![],
                },
            ))
            .await
            .unwrap();

        let (session, steps) = manager.snapshot("s-1").await.unwrap();
        assert_eq!(session.id, "s-1");
        assert_eq!(steps.len(), 1);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_sessions_with_status_filter() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path()).unwrap();

        manager.create_session(session("s-1")).await.unwrap();
        let mut failed = session("s-2");
        failed.fail("boom");
        manager.create_session(failed).await.unwrap();

        let validating = manager
            .list_sessions(Some("validating".to_string()), None)
            .await
            .unwrap();
        assert_eq!(validating.len(), 1);
        assert_eq!(validating[0].id, "s-1");

        manager.shutdown().await.unwrap();
    }
}
