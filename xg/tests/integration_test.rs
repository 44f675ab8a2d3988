//! Integration tests for ExerciseGen
//!
//! These drive the engine and worker loop end-to-end against a real
//! on-disk store, with a scripted LLM standing in for the provider.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use exercisegen::config::Config;
use exercisegen::domain::{ClarificationAnswer, Session, SessionStatus, StepType};
use exercisegen::llm::{LlmClient, LlmError, StructuredRequest, StructuredResponse, TokenUsage};
use exercisegen::scheduler::{run_worker, stage_channel};
use exercisegen::state::{StateError, StateManager};
use exercisegen::workflow::{SessionProjection, WorkflowEngine};
use exercisegen::access::AllowAll;

// =============================================================================
// Scripted LLM
// =============================================================================

/// Plays back a fixed sequence of structured responses
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<Value, LlmError>>>,
}

impl ScriptedLlm {
    fn new(replies: Vec<Result<Value, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate_structured(&self, _request: StructuredRequest) -> Result<StructuredResponse, LlmError> {
        let reply = self
            .replies
            .lock()
            .map_err(|_| LlmError::InvalidResponse("script lock poisoned".to_string()))?
            .pop_front()
            .ok_or_else(|| LlmError::InvalidResponse("script exhausted".to_string()))?;

        reply.map(|value| StructuredResponse {
            value,
            usage: TokenUsage::new(200, 100),
        })
    }
}

fn ready_validation() -> Result<Value, LlmError> {
    Ok(json!({
        "status": "ready",
        "requirements": {"language": "German", "level": "B1", "topic": "food"},
        "reasoning": "all required fields present"
    }))
}

fn needs_clarification() -> Result<Value, LlmError> {
    Ok(json!({
        "status": "needs_clarification",
        "requirements": {"language": "German", "topic": "food"},
        "questions": [{"field": "level", "question": "Which proficiency level?"}],
        "missing_fields": ["level"]
    }))
}

fn two_item_plan() -> Result<Value, LlmError> {
    Ok(json!({
        "items": [
            {"id": "item-1", "exercise_type": "cloze", "title": "Vocabulary warm-up", "description": "d", "estimated_minutes": 5},
            {"id": "item-2", "exercise_type": "dialogue", "title": "Ordering food", "description": "d", "estimated_minutes": 15}
        ],
        "rationale": "vocabulary before production",
        "objectives": ["food vocabulary"],
        "total_minutes": 20
    }))
}

fn exercise() -> Result<Value, LlmError> {
    Ok(json!({
        "title": "Cloze: meals",
        "exercise_type": "cloze",
        "content": {"text": "Ich esse ___"}
    }))
}

// =============================================================================
// Harness
// =============================================================================

fn test_config(store_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.store_dir = store_dir.to_string_lossy().into_owned();
    config
}

/// Spawn a fresh engine plus worker over the given store directory
fn spawn_engine(
    store_dir: &Path,
    replies: Vec<Result<Value, LlmError>>,
) -> (Arc<WorkflowEngine>, StateManager, JoinHandle<()>) {
    let state = StateManager::spawn(store_dir).expect("Failed to spawn StateManager");
    let (scheduler, rx) = stage_channel();

    let engine = Arc::new(WorkflowEngine::new(
        state.clone(),
        Arc::new(ScriptedLlm::new(replies)),
        Arc::new(scheduler),
        Arc::new(AllowAll),
        test_config(store_dir),
    ));
    let worker = tokio::spawn(run_worker(rx, engine.clone()));

    (engine, state, worker)
}

/// Poll until the session reaches the expected status
async fn wait_for_status(
    engine: &WorkflowEngine,
    session_id: &str,
    expected: SessionStatus,
) -> SessionProjection {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let projection = engine
            .get_session(session_id, "teacher-1")
            .await
            .expect("Failed to read session");
        if projection.session.status == expected {
            return projection;
        }
        assert_ne!(
            projection.session.status,
            SessionStatus::Failed,
            "session failed while waiting for {:?}: {:?}",
            expected,
            projection.session.error_message
        );
        if tokio::time::Instant::now() > deadline {
            panic!(
                "timed out waiting for {:?}, session is {:?}",
                expected, projection.session.status
            );
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Workflow Tests
// =============================================================================

#[tokio::test]
async fn test_full_workflow_end_to_end() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (engine, state, worker) = spawn_engine(
        temp_dir.path(),
        vec![ready_validation(), two_item_plan(), exercise(), exercise()],
    );

    let session = engine
        .start_session("doc-1", "teacher-1", "5 B1 German exercises about food", None)
        .await
        .expect("Failed to start session");

    // Validation runs in the background and lands at the approval gate
    let projection = wait_for_status(&engine, &session.id, SessionStatus::AwaitingApproval).await;
    let plan = projection.plan_result.as_ref().expect("plan missing");
    assert_eq!(plan.items.len(), 2);
    assert_eq!(
        projection.session.requirements.as_ref().unwrap().level.as_deref(),
        Some("B1")
    );

    engine.approve_plan(&session.id).await.expect("Failed to approve");

    let projection = wait_for_status(&engine, &session.id, SessionStatus::Completed).await;
    let generation = projection.generation_result.as_ref().expect("generation missing");
    assert_eq!(generation.total_generated, 2);
    assert!(generation.errors.is_empty());

    // Four LLM calls at 300 tokens each
    assert_eq!(projection.session.tokens_used, 1200);

    // One step per stage, all final
    assert_eq!(projection.steps.len(), 3);
    assert!(projection.steps.iter().all(|s| s.is_final()));

    worker.abort();
    state.shutdown().await.ok();
}

#[tokio::test]
async fn test_clarification_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (engine, state, worker) = spawn_engine(
        temp_dir.path(),
        vec![
            needs_clarification(),
            ready_validation(),
            two_item_plan(),
            exercise(),
            exercise(),
        ],
    );

    let session = engine
        .start_session("doc-1", "teacher-1", "German exercises about food", None)
        .await
        .expect("Failed to start session");

    let projection = wait_for_status(&engine, &session.id, SessionStatus::AwaitingClarification).await;
    let validation = projection.validation_result.as_ref().expect("validation missing");
    assert_eq!(validation.questions.len(), 1);
    assert_eq!(validation.missing_fields, vec!["level"]);

    engine
        .answer_clarifications(
            &session.id,
            vec![ClarificationAnswer {
                question: "Which proficiency level?".to_string(),
                answer: "B1".to_string(),
            }],
        )
        .await
        .expect("Failed to answer");

    let projection = wait_for_status(&engine, &session.id, SessionStatus::AwaitingApproval).await;
    assert_eq!(projection.session.clarifications.len(), 1);

    // Two validation attempts persisted, both final
    let validations: Vec<_> = projection
        .steps
        .iter()
        .filter(|s| s.step_type == StepType::Validation)
        .collect();
    assert_eq!(validations.len(), 2);
    assert!(validations.iter().all(|s| s.is_final()));

    engine.approve_plan(&session.id).await.expect("Failed to approve");
    wait_for_status(&engine, &session.id, SessionStatus::Completed).await;

    worker.abort();
    state.shutdown().await.ok();
}

#[tokio::test]
async fn test_restart_resumes_at_approval_gate() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    // First process: run up to the approval gate, then go away
    let (engine, state, worker) = spawn_engine(temp_dir.path(), vec![ready_validation(), two_item_plan()]);
    let session = engine
        .start_session("doc-1", "teacher-1", "5 B1 German exercises about food", None)
        .await
        .expect("Failed to start session");
    wait_for_status(&engine, &session.id, SessionStatus::AwaitingApproval).await;

    worker.abort();
    state.shutdown().await.expect("Failed to shut down state");
    drop(engine);
    // Shutdown is acknowledged before the actor drops the store lock
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Second process over the same store: the gate survived the restart
    let (engine, state, worker) = spawn_engine(temp_dir.path(), vec![exercise(), exercise()]);
    let projection = engine
        .get_session(&session.id, "teacher-1")
        .await
        .expect("Failed to read session");
    assert_eq!(projection.session.status, SessionStatus::AwaitingApproval);
    assert!(projection.plan_result.is_some());

    engine.approve_plan(&session.id).await.expect("Failed to approve");
    let projection = wait_for_status(&engine, &session.id, SessionStatus::Completed).await;
    assert_eq!(
        projection.generation_result.as_ref().map(|g| g.total_generated),
        Some(2)
    );

    worker.abort();
    state.shutdown().await.ok();
}

#[tokio::test]
async fn test_validation_failure_marks_session_failed() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let (engine, state, worker) = spawn_engine(
        temp_dir.path(),
        vec![Err(LlmError::ApiError {
            status: 400,
            message: "invalid request".to_string(),
        })],
    );

    let session = engine
        .start_session("doc-1", "teacher-1", "5 B1 German exercises about food", None)
        .await
        .expect("Failed to start session");

    // Poll directly, wait_for_status treats Failed as fatal
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let projection = loop {
        let projection = engine
            .get_session(&session.id, "teacher-1")
            .await
            .expect("Failed to read session");
        if projection.session.status == SessionStatus::Failed {
            break projection;
        }
        assert!(tokio::time::Instant::now() < deadline, "session never failed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    };

    assert!(projection.session.error_message.is_some());
    assert_eq!(projection.steps.len(), 1);
    assert!(projection.steps[0].error_message.is_some());
    assert!(projection.steps[0].output.is_none());

    // Failed is terminal: no further approval possible
    assert!(engine.approve_plan(&session.id).await.is_err());

    worker.abort();
    state.shutdown().await.ok();
}

// =============================================================================
// StateManager Tests
// =============================================================================

#[tokio::test]
async fn test_sessions_survive_state_manager_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let session_id = {
        let state = StateManager::spawn(temp_dir.path()).expect("Failed to spawn StateManager");
        let session = Session::new("doc-1", "teacher-1", "prompt", "model-x");
        let id = state.create_session(session).await.expect("Failed to create");

        state
            .transition_session(&id, SessionStatus::Validating, SessionStatus::AwaitingClarification)
            .await
            .expect("Failed to transition");

        state.shutdown().await.expect("Failed to shut down");
        id
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let state = StateManager::spawn(temp_dir.path()).expect("Failed to respawn StateManager");
    let session = state
        .get_session_required(&session_id)
        .await
        .expect("Session lost across restart");
    assert_eq!(session.status, SessionStatus::AwaitingClarification);
    assert_eq!(session.initial_prompt, "prompt");

    state.shutdown().await.ok();
}

#[tokio::test]
async fn test_transition_conflict_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let state = StateManager::spawn(temp_dir.path()).expect("Failed to spawn StateManager");

    let session = Session::new("doc-1", "teacher-1", "prompt", "model-x");
    let id = state.create_session(session).await.expect("Failed to create");

    // Session is Validating, so a Planning-based transition must lose
    let result = state
        .transition_session(&id, SessionStatus::Planning, SessionStatus::AwaitingApproval)
        .await;

    match result {
        Err(StateError::Conflict { expected, actual, .. }) => {
            assert_eq!(expected, SessionStatus::Planning);
            assert_eq!(actual, SessionStatus::Validating);
        }
        other => panic!("expected Conflict, got {:?}", other),
    }

    // Status untouched by the losing transition
    let session = state.get_session_required(&id).await.expect("Failed to read");
    assert_eq!(session.status, SessionStatus::Validating);

    state.shutdown().await.ok();
}
