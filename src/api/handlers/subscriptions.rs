use axum::{
    extract::{Extension, Path, State},
    Json,
};

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{ObjectId, PaymentGateway},
    error::Result,
    payments::CancelOutcome,
};

async fn cancel_own(
    state: AppState,
    gateway: PaymentGateway,
    user: CurrentUser,
    performer_id: String,
) -> Result<Json<CancelOutcome>> {
    let performer_id = ObjectId::parse(&performer_id)?;

    let outcome = state
        .service_context
        .cancellation
        .cancel_for_user(gateway, &performer_id, &user.id)
        .await?;

    Ok(Json(outcome))
}

async fn admin_cancel(
    state: AppState,
    gateway: PaymentGateway,
    admin: CurrentUser,
    subscription_id: String,
) -> Result<Json<CancelOutcome>> {
    let subscription_id = ObjectId::parse(&subscription_id)?;
    tracing::info!("Admin {} cancelling subscription {}", admin.id, subscription_id);

    let outcome = state
        .service_context
        .cancellation
        .cancel_by_admin(gateway, &subscription_id)
        .await?;

    Ok(Json(outcome))
}

pub async fn ccbill_cancel_own(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(performer_id): Path<String>,
) -> Result<Json<CancelOutcome>> {
    cancel_own(state, PaymentGateway::Ccbill, user, performer_id).await
}

pub async fn moonlight_cancel_own(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(performer_id): Path<String>,
) -> Result<Json<CancelOutcome>> {
    cancel_own(state, PaymentGateway::Moonlight, user, performer_id).await
}

pub async fn ccbill_admin_cancel(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(subscription_id): Path<String>,
) -> Result<Json<CancelOutcome>> {
    admin_cancel(state, PaymentGateway::Ccbill, admin, subscription_id).await
}

pub async fn moonlight_admin_cancel(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Path(subscription_id): Path<String>,
) -> Result<Json<CancelOutcome>> {
    admin_cancel(state, PaymentGateway::Moonlight, admin, subscription_id).await
}
