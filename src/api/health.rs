use crate::api::AppState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    postgres_connected: bool,
    plugins: usize,
    write_mode: String,
    uptime_seconds: u64,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = state.registry.gateway();
    let postgres_connected = gateway.ping().await.is_ok();

    Json(HealthResponse {
        status: if postgres_connected {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        postgres_connected,
        plugins: state.registry.len(),
        write_mode: gateway.write_mode().to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
