//! Document access control
//!
//! Sessions are created against a document reference on behalf of an
//! owner. The engine checks access at session creation and on every read;
//! deployments plug in their own policy by implementing [`AccessControl`].

use async_trait::async_trait;
use tracing::debug;

/// Policy deciding whether a principal may generate exercises for a document
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Check whether `principal` may use `document_ref`
    async fn verify_access(&self, document_ref: &str, principal: &str) -> bool;
}

/// Permissive policy for single-user and local setups
pub struct AllowAll;

#[async_trait]
impl AccessControl for AllowAll {
    async fn verify_access(&self, document_ref: &str, principal: &str) -> bool {
        debug!(%document_ref, %principal, "verify_access: called (allow-all)");
        true
    }
}
