//! Credential capabilities consumed by the registration engine and the retry transport.
//!
//! The administrative API adapter implements both; tests substitute minimal fakes.

use async_trait::async_trait;

use crate::errors::AdminError;
use crate::transport::RequestContext;

/// Produces one-time initial access tokens for the registration endpoint.
#[async_trait]
pub trait RegistrationTokenSource: Send + Sync {
    async fn token_for_registration(&self, ctx: &RequestContext) -> Result<String, AdminError>;
}

/// Produces a fresh registration access token for a registered client.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Fails with [`AdminError::ClientNotFound`] when no client carries `client_id`.
    async fn refresh_token(
        &self,
        ctx: &RequestContext,
        client_id: &str,
    ) -> Result<String, AdminError>;
}
