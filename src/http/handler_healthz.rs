//! Handles GET /healthz - liveness probe

pub async fn handle_healthz() -> &'static str {
    "ok"
}
