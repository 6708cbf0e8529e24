//! Application state shared by the webhook handlers.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::admission::RealmValidator;
use crate::transport::RequestContext;

#[derive(Clone)]
pub struct AppState {
    pub validator: Arc<RealmValidator>,
    /// Cancelled on shutdown; aborts in-flight identity provider lookups
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(validator: Arc<RealmValidator>, shutdown: CancellationToken) -> Self {
        Self {
            validator,
            shutdown,
        }
    }

    /// A fresh context for one admission request.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::with_cancellation(self.shutdown.child_token())
    }
}
