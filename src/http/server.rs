//! Router configuration for the admission webhook.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use super::{
    context::AppState, handler_admission::handle_validate_realmconfigs,
    handler_healthz::handle_healthz,
};

/// Build the application router
pub fn build_router(ctx: AppState) -> Router {
    Router::new()
        .route("/validate/realmconfigs", post(handle_validate_realmconfigs))
        .route("/healthz", get(handle_healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
