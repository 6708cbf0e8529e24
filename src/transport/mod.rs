//! Pluggable request execution.
//!
//! [`Transport`] abstracts sending a `reqwest::Request`, so the registration
//! engine can be composed with [`AuthRetryTransport`] and tested with fakes.

use async_trait::async_trait;
use reqwest::{Client, Request, Response};

use crate::errors::TransportError;

pub mod auth_retry;
pub mod context;

pub use auth_retry::AuthRetryTransport;
pub use context::RequestContext;

/// Sends a single HTTP request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<Response, TransportError>;
}

/// Transport backed by a shared `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<Response, TransportError> {
        tracing::debug!(method = %request.method(), url = %request.url(), "dispatching request");

        ctx.run(self.client.execute(request))
            .await
            .ok_or(TransportError::Cancelled)?
            .map_err(TransportError::Request)
    }
}
