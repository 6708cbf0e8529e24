//! Transport decorator that refreshes an expired registration access token once.
//!
//! On a 401 the client identity carried by the [`RequestContext`] is handed to
//! the [`TokenRefresher`], and the request is replayed a single time with the
//! new bearer token. Retry state lives entirely in one `execute` call; nothing
//! is shared between concurrent requests, and refreshed tokens are not cached.

use async_trait::async_trait;
use http::StatusCode;
use http::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Response};
use std::sync::Arc;

use super::{RequestContext, Transport};
use crate::credentials::TokenRefresher;
use crate::errors::TransportError;

pub struct AuthRetryTransport {
    inner: Arc<dyn Transport>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl AuthRetryTransport {
    pub fn new(inner: Arc<dyn Transport>, refresher: Option<Arc<dyn TokenRefresher>>) -> Self {
        Self { inner, refresher }
    }
}

#[async_trait]
impl Transport for AuthRetryTransport {
    async fn execute(
        &self,
        ctx: &RequestContext,
        request: Request,
    ) -> Result<Response, TransportError> {
        let (Some(refresher), Some(client_id)) = (self.refresher.as_ref(), ctx.client_id()) else {
            return self.inner.execute(ctx, request).await;
        };

        // Streaming bodies yield None here and cannot be replayed.
        let replay = request.try_clone();

        let response = self.inner.execute(ctx, request).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(client_id, "registration access token rejected, refreshing");

        let token = match ctx.run(refresher.refresh_token(ctx, client_id)).await {
            None => return Err(TransportError::Cancelled),
            Some(Err(err)) if err.is_cancelled() => return Err(TransportError::Cancelled),
            Some(Err(err)) => {
                tracing::warn!(client_id, error = ?err, "registration access token refresh failed");
                return Ok(response);
            }
            Some(Ok(token)) => token,
        };

        drop(response);

        let mut retry = replay.ok_or(TransportError::BodyNotReplayable)?;
        let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(TransportError::InvalidCredential)?;
        authorization.set_sensitive(true);
        retry.headers_mut().insert(AUTHORIZATION, authorization);

        tracing::debug!(client_id, "replaying request with refreshed token");
        self.inner.execute(ctx, retry).await
    }
}
