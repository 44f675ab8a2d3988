//! LlmClient trait definition

use async_trait::async_trait;

use super::{LlmError, StructuredRequest, StructuredResponse};

/// Stateless structured-generation client - each call is independent
///
/// This is the core abstraction the workflow stages call. Each request is
/// self-contained: prompt plus output schema in, one object plus token
/// usage out. Providers may throw on network errors, API errors, or
/// output that does not satisfy the schema; the stages translate those
/// into stage- or item-level failures.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Perform one structured-generation call
    async fn generate_structured(&self, request: StructuredRequest) -> Result<StructuredResponse, LlmError>;
}
