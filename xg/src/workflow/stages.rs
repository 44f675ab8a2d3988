//! Stage execution against the LLM client
//!
//! Each function performs the AI-bound work of one stage: render the
//! prompt, make the structured call, deserialize and sanity-check the
//! output. State handling (steps, transitions, scheduling) stays in the
//! engine; these functions only know about domain inputs and outputs.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::{
    ClarificationAnswer, GeneratedExercise, GenerationOutcome, ItemError, Plan, Requirements, ValidationOutcome,
};
use crate::llm::{LlmClient, LlmError, StructuredRequest};

use super::error::WorkflowError;
use super::prompts;

/// Model and budget shared by every stage call of a session
#[derive(Debug, Clone)]
pub struct StageParams {
    pub model: String,
    pub max_tokens: u32,
}

/// Run one validation call, returning the outcome and tokens consumed
pub async fn execute_validation(
    llm: &dyn LlmClient,
    params: &StageParams,
    prompt: &str,
    clarifications: &[ClarificationAnswer],
) -> Result<(ValidationOutcome, u64), WorkflowError> {
    debug!(clarification_count = %clarifications.len(), "execute_validation: called");
    let user_prompt =
        prompts::render_validation(prompt, clarifications).map_err(|e| WorkflowError::Prompt(e.to_string()))?;

    let response = llm
        .generate_structured(StructuredRequest {
            model: params.model.clone(),
            system_prompt: prompts::SYSTEM.to_string(),
            user_prompt,
            schema_name: "validation_result".to_string(),
            schema: prompts::validation_schema(),
            max_tokens: params.max_tokens,
        })
        .await?;

    let outcome: ValidationOutcome = serde_json::from_value(response.value).map_err(|e| {
        LlmError::SchemaMismatch {
            schema: "validation_result".to_string(),
            message: e.to_string(),
        }
    })?;

    debug!(status = ?outcome.status, "execute_validation: outcome parsed");
    Ok((outcome, response.usage.total()))
}

/// Run one planning call, returning the plan and tokens consumed
pub async fn execute_planning(
    llm: &dyn LlmClient,
    params: &StageParams,
    requirements: &Requirements,
    max_plan_items: usize,
) -> Result<(Plan, u64), WorkflowError> {
    debug!("execute_planning: called");
    let user_prompt = prompts::render_planning(requirements).map_err(|e| WorkflowError::Prompt(e.to_string()))?;

    let response = llm
        .generate_structured(StructuredRequest {
            model: params.model.clone(),
            system_prompt: prompts::SYSTEM.to_string(),
            user_prompt,
            schema_name: "exercise_plan".to_string(),
            schema: prompts::plan_schema(),
            max_tokens: params.max_tokens,
        })
        .await?;

    let plan: Plan = serde_json::from_value(response.value).map_err(|e| LlmError::SchemaMismatch {
        schema: "exercise_plan".to_string(),
        message: e.to_string(),
    })?;

    plan.validate().map_err(|message| LlmError::SchemaMismatch {
        schema: "exercise_plan".to_string(),
        message,
    })?;

    if plan.items.len() > max_plan_items {
        return Err(LlmError::SchemaMismatch {
            schema: "exercise_plan".to_string(),
            message: format!("plan has {} items, limit is {}", plan.items.len(), max_plan_items),
        }
        .into());
    }

    debug!(item_count = %plan.items.len(), "execute_planning: plan parsed");
    Ok((plan, response.usage.total()))
}

/// What a generation call returns for one item, before the stage keys it
#[derive(Deserialize)]
struct ExercisePayload {
    title: String,
    exercise_type: String,
    content: serde_json::Value,
}

/// Run the per-item generation loop
///
/// Sequential by design: bounds concurrent provider calls, keeps
/// error-to-item attribution deterministic, and satisfies items' soft
/// dependencies on earlier items by ordering alone. A failing item is
/// recorded in the errors list and the loop continues; this function
/// itself never fails once the plan is in hand.
pub async fn execute_generation(
    llm: &dyn LlmClient,
    params: &StageParams,
    requirements: &Requirements,
    plan: &Plan,
) -> (GenerationOutcome, u64) {
    debug!(item_count = %plan.items.len(), "execute_generation: called");
    let mut outcome = GenerationOutcome::default();
    let mut tokens: u64 = 0;

    for item in &plan.items {
        debug!(item_id = %item.id, exercise_type = %item.exercise_type, "execute_generation: generating item");
        match generate_item(llm, params, requirements, plan, item).await {
            Ok((exercise, item_tokens)) => {
                debug!(item_id = %item.id, "execute_generation: item succeeded");
                outcome.exercises.push(exercise);
                tokens += item_tokens;
            }
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "execute_generation: item failed, continuing");
                outcome.errors.push(ItemError {
                    plan_item_id: item.id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    outcome.total_generated = outcome.exercises.len() as u32;
    debug!(
        total_generated = %outcome.total_generated,
        error_count = %outcome.errors.len(),
        "execute_generation: loop finished"
    );
    (outcome, tokens)
}

async fn generate_item(
    llm: &dyn LlmClient,
    params: &StageParams,
    requirements: &Requirements,
    plan: &Plan,
    item: &crate::domain::PlanItem,
) -> Result<(GeneratedExercise, u64), WorkflowError> {
    let user_prompt =
        prompts::render_generation(requirements, plan, item).map_err(|e| WorkflowError::Prompt(e.to_string()))?;

    let response = llm
        .generate_structured(StructuredRequest {
            model: params.model.clone(),
            system_prompt: prompts::SYSTEM.to_string(),
            user_prompt,
            schema_name: "exercise_content".to_string(),
            schema: prompts::exercise_schema(),
            max_tokens: params.max_tokens,
        })
        .await?;

    let payload: ExercisePayload = serde_json::from_value(response.value).map_err(|e| {
        LlmError::SchemaMismatch {
            schema: "exercise_content".to_string(),
            message: e.to_string(),
        }
    })?;

    Ok((
        GeneratedExercise {
            plan_item_id: item.id.clone(),
            title: payload.title,
            exercise_type: payload.exercise_type,
            content: payload.content,
        },
        response.usage.total(),
    ))
}
