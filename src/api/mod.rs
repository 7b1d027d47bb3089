pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(
    service_context: Arc<ServiceContext>,
    settings: Arc<Settings>,
) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        .nest("/payment", payment_routes())

        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        .merge(webhook_routes())
        .merge(purchase_routes())
        .merge(cancel_routes())
        .merge(admin_routes())
}

/// Provider callbacks: no caller identity, always answered with 200.
fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/ccbill/callhook", post(handlers::webhooks::ccbill_callhook))
        .route("/moonlight/webhook", post(handlers::webhooks::moonlight_webhook))
}

fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route("/subscribe/performers", post(handlers::purchases::subscribe_performer))
        .route("/send-tip", post(handlers::purchases::send_tip))
        .route("/purchase-gallery/:gallery_id", post(handlers::purchases::purchase_gallery))
        .route("/purchase-video/:video_id", post(handlers::purchases::purchase_video))
        .route("/purchase-products", post(handlers::purchases::purchase_products))
        .route_layer(axum::middleware::from_fn(middleware::auth::require_auth))
}

fn cancel_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/ccbill/cancel-subscription/:performer_id",
            post(handlers::subscriptions::ccbill_cancel_own),
        )
        .route(
            "/moonlight/cancel-subscription/:performer_id",
            post(handlers::subscriptions::moonlight_cancel_own),
        )
        .route_layer(axum::middleware::from_fn(middleware::auth::require_auth))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/ccbill/admin/cancel-subscription/:subscription_id",
            post(handlers::subscriptions::ccbill_admin_cancel),
        )
        .route(
            "/moonlight/admin/cancel-subscription/:subscription_id",
            post(handlers::subscriptions::moonlight_admin_cancel),
        )
        .route_layer(axum::middleware::from_fn(middleware::auth::require_admin))
}
