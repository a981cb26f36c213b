use axum::{extract::State, routing::get, Json, Router};
use crate::models::{AppState, HealthResponse, SellerIdentityStatus};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .with_state(state)
}

/// Liveness plus seller identity state. Never triggers identity creation.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let seller_identity = SellerIdentityStatus {
        state: state.identity.state().await,
        identity: state.identity.peek().await,
        last_error: state.identity.last_error().await,
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        network: state.config.payment.network.clone(),
        x402_enabled: state.config.payment.x402_enabled,
        seller_identity,
    })
}
