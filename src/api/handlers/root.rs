use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "fanledger",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Payment transactions and subscription reconciliation",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "payment": "/payment"
        }
    }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let integrations: Vec<_> = state
        .service_context
        .integration_manager
        .health_check_all()
        .await
        .into_iter()
        .map(|(name, result)| json!({ "name": name, "healthy": result.is_ok() }))
        .collect();

    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "integrations": integrations
    })))
}
