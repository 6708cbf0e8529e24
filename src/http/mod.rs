//! Axum HTTP server for the realm admission webhook.

pub mod context;
mod handler_admission;
mod handler_healthz;
pub mod server;

pub use context::AppState;
pub use server::build_router;
