//! Structured-generation request/response types
//!
//! These model the Anthropic Messages API's tool-forcing trick for
//! structured output but are provider-agnostic: a request carries a
//! named JSON schema, a response carries the object that satisfied it.

use serde::{Deserialize, Serialize};

/// A structured-generation request - everything needed for one LLM call
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    /// Model identifier for this call
    pub model: String,

    /// System prompt (rendered from a Handlebars template)
    pub system_prompt: String,

    /// User-turn content
    pub user_prompt: String,

    /// Name of the output schema (also used as the forced tool name)
    pub schema_name: String,

    /// JSON schema the output object must satisfy
    pub schema: serde_json::Value,

    /// Max tokens for the response
    pub max_tokens: u32,
}

/// Response from a structured-generation request
#[derive(Debug, Clone)]
pub struct StructuredResponse {
    /// The object the provider produced against the schema
    pub value: serde_json::Value,

    /// Token usage for cost tracking
    pub usage: TokenUsage,
}

/// Token usage for cost tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens consumed by the call
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
