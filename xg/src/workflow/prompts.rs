//! Stage prompt templates and output schemas
//!
//! Templates are compiled into the binary from .pmt files and rendered
//! with Handlebars. Each stage also declares the JSON schema its LLM call
//! is forced to satisfy; the schemas mirror the domain types the outputs
//! deserialize into.

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use crate::domain::{ClarificationAnswer, Plan, PlanItem, Requirements};

/// Validation stage prompt
pub const VALIDATION: &str = include_str!("../../prompts/validation.pmt");

/// Planning stage prompt
pub const PLANNING: &str = include_str!("../../prompts/planning.pmt");

/// Per-item generation prompt
pub const GENERATION: &str = include_str!("../../prompts/generation.pmt");

/// Shared system prompt for all structured stage calls
pub const SYSTEM: &str = "You are part of an exercise-generation pipeline for language teachers. \
    Record your result by calling the provided tool exactly once, fully populating its schema.";

#[derive(Serialize)]
struct ValidationContext<'a> {
    prompt: &'a str,
    has_clarifications: bool,
    clarifications: &'a [ClarificationAnswer],
}

/// Render the validation prompt with accumulated clarification answers
pub fn render_validation(prompt: &str, clarifications: &[ClarificationAnswer]) -> Result<String> {
    debug!(clarification_count = %clarifications.len(), "render_validation: called");
    render(
        "validation",
        VALIDATION,
        &ValidationContext {
            prompt,
            has_clarifications: !clarifications.is_empty(),
            clarifications,
        },
    )
}

#[derive(Serialize)]
struct PlanningContext<'a> {
    language: &'a str,
    level: &'a str,
    topic: &'a str,
    duration_minutes: Option<u32>,
    has_exercise_types: bool,
    exercise_types: String,
    context: Option<&'a str>,
}

/// Render the planning prompt from complete requirements
pub fn render_planning(requirements: &Requirements) -> Result<String> {
    debug!("render_planning: called");
    render(
        "planning",
        PLANNING,
        &PlanningContext {
            language: requirements.language.as_deref().unwrap_or("unspecified"),
            level: requirements.level.as_deref().unwrap_or("unspecified"),
            topic: requirements.topic.as_deref().unwrap_or("unspecified"),
            duration_minutes: requirements.duration_minutes,
            has_exercise_types: !requirements.exercise_types.is_empty(),
            exercise_types: requirements.exercise_types.join(", "),
            context: requirements.context.as_deref(),
        },
    )
}

#[derive(Serialize)]
struct GenerationContext<'a> {
    language: &'a str,
    level: &'a str,
    topic: &'a str,
    rationale: &'a str,
    item_id: &'a str,
    exercise_type: &'a str,
    title: &'a str,
    description: &'a str,
    has_parameters: bool,
    parameters: String,
    has_dependencies: bool,
    dependencies: String,
}

/// Render the per-item generation prompt
pub fn render_generation(requirements: &Requirements, plan: &Plan, item: &PlanItem) -> Result<String> {
    debug!(item_id = %item.id, "render_generation: called");
    let has_parameters = !item.parameters.is_null();
    render(
        "generation",
        GENERATION,
        &GenerationContext {
            language: requirements.language.as_deref().unwrap_or("unspecified"),
            level: requirements.level.as_deref().unwrap_or("unspecified"),
            topic: requirements.topic.as_deref().unwrap_or("unspecified"),
            rationale: &plan.rationale,
            item_id: &item.id,
            exercise_type: &item.exercise_type,
            title: &item.title,
            description: &item.description,
            has_parameters,
            parameters: if has_parameters { item.parameters.to_string() } else { String::new() },
            has_dependencies: !item.dependencies.is_empty(),
            dependencies: item.dependencies.join(", "),
        },
    )
}

fn render<T: Serialize>(name: &str, template: &str, context: &T) -> Result<String> {
    Handlebars::new()
        .render_template(template, context)
        .map_err(|e| eyre!("Failed to render template {}: {}", name, e))
}

/// Schema for the validation stage's output, mirrors ValidationOutcome
pub fn validation_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "status": {
                "type": "string",
                "enum": ["ready", "needs_clarification"],
                "description": "Whether the requirements are complete enough to plan"
            },
            "requirements": {
                "type": "object",
                "properties": {
                    "language": { "type": ["string", "null"] },
                    "level": { "type": ["string", "null"] },
                    "topic": { "type": ["string", "null"] },
                    "duration_minutes": { "type": ["integer", "null"] },
                    "exercise_types": { "type": "array", "items": { "type": "string" } },
                    "context": { "type": ["string", "null"] }
                }
            },
            "questions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "field": { "type": ["string", "null"] },
                        "question": { "type": "string" }
                    },
                    "required": ["question"]
                }
            },
            "missing_fields": { "type": "array", "items": { "type": "string" } },
            "reasoning": { "type": ["string", "null"] }
        },
        "required": ["status"]
    })
}

/// Schema for the planning stage's output, mirrors Plan
pub fn plan_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "exercise_type": { "type": "string" },
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "estimated_minutes": { "type": "integer" },
                        "parameters": { "type": "object" },
                        "dependencies": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["id", "exercise_type", "title", "description"]
                }
            },
            "rationale": { "type": "string" },
            "objectives": { "type": "array", "items": { "type": "string" } },
            "total_minutes": { "type": "integer" }
        },
        "required": ["items", "rationale"]
    })
}

/// Schema for one generated exercise, mirrors GeneratedExercise minus
/// the plan item id the stage fills in itself
pub fn exercise_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "exercise_type": { "type": "string" },
            "content": {
                "type": "object",
                "description": "Complete exercise content: instructions, body, and solution"
            }
        },
        "required": ["title", "exercise_type", "content"]
    })
}
