//! Per-request execution context.

use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Values scoped to a single outgoing request and the calls it triggers.
///
/// The client identity tells the retry transport whose registration access
/// token to refresh after a 401. The cancellation token aborts every
/// suspension point of the request.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    client_id: Option<String>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            client_id: None,
            cancellation,
        }
    }

    /// Derives a context for `client_id` sharing this context's cancellation.
    pub fn for_client(&self, client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            cancellation: self.cancellation.clone(),
        }
    }

    /// Derives a context with no client identity.
    pub fn anonymous(&self) -> Self {
        Self {
            client_id: None,
            cancellation: self.cancellation.clone(),
        }
    }

    /// The client identity, treating an empty or blank value as absent.
    pub fn client_id(&self) -> Option<&str> {
        self.client_id
            .as_deref()
            .filter(|client_id| !client_id.trim().is_empty())
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Drives `future` to completion unless the context is cancelled first.
    ///
    /// Returns `None` on cancellation; the future is dropped at that point.
    pub async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => None,
            output = future => Some(output),
        }
    }
}
