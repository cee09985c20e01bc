use {
    axum::{
        Router,
        extract::State,
        response::Json,
        routing::get,
    },
    serde::Serialize,
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use huddle_sessions::RegistryStats;

use crate::{callback, state::AppState};

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/status", get(status_handler))
        .route(
            "/wecom/callback",
            get(callback::verify).post(callback::inbound),
        )
        .layer(cors)
        .with_state(state)
}

/// Serve the app on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "gateway listening");
    }
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[derive(Serialize)]
struct StatusResponse {
    uptime_secs: u64,
    scheduler_running: bool,
    scheduler_ticks: u64,
    sessions: RegistryStats,
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let (scheduler_running, scheduler_ticks) = state
        .scheduler
        .as_ref()
        .map_or((false, 0), |s| (s.running(), s.ticks()));

    Json(StatusResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        scheduler_running,
        scheduler_ticks,
        sessions: state.registry.stats(),
    })
}
