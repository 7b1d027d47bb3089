use axum::{
    extract::{Extension, Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{ObjectId, PaymentGateway, TransactionType},
    error::Result,
    service::ledger::{CartItem, Checkout, PurchaseOptions},
};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Monthly,
    Yearly,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    #[validate(length(equal = 24))]
    pub performer_id: String,
    #[serde(rename = "type")]
    pub plan: SubscriptionPlan,
    pub payment_gateway: Option<PaymentGateway>,
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: Option<String>,
    #[validate(length(min = 1))]
    pub payment_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TipRequest {
    #[validate(length(equal = 24))]
    pub performer_id: String,
    pub price: Decimal,
    #[validate(length(max = 500))]
    pub message: Option<String>,
    pub payment_gateway: Option<PaymentGateway>,
    #[validate(length(min = 1))]
    pub payment_token: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SinglePurchaseRequest {
    pub payment_gateway: Option<PaymentGateway>,
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: Option<String>,
    #[validate(length(min = 1))]
    pub payment_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    #[validate(length(equal = 24))]
    pub product_id: String,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductsRequest {
    #[validate(length(min = 1, max = 50), nested)]
    pub products: Vec<CartLine>,
    pub payment_gateway: Option<PaymentGateway>,
    #[validate(length(min = 1, max = 64))]
    pub coupon_code: Option<String>,
    #[validate(length(min = 1))]
    pub payment_token: Option<String>,
    #[validate(length(max = 500))]
    pub delivery_address: Option<String>,
}

fn options(
    state: &AppState,
    gateway: Option<PaymentGateway>,
    coupon_code: Option<String>,
    payment_token: Option<String>,
) -> PurchaseOptions {
    PurchaseOptions {
        gateway: gateway.unwrap_or(state.settings.payment.default_gateway),
        coupon_code,
        payment_token,
    }
}

pub async fn subscribe_performer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Json<Checkout>> {
    request.validate()?;
    let performer_id = ObjectId::parse(&request.performer_id)?;
    let transaction_type = match request.plan {
        SubscriptionPlan::Monthly => TransactionType::MonthlySubscription,
        SubscriptionPlan::Yearly => TransactionType::YearlySubscription,
    };

    let checkout = state
        .service_context
        .ledger
        .subscribe(
            user.party(),
            &performer_id,
            transaction_type,
            options(&state, request.payment_gateway, request.coupon_code, request.payment_token),
        )
        .await?;

    Ok(Json(checkout))
}

pub async fn send_tip(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<TipRequest>,
) -> Result<Json<Checkout>> {
    request.validate()?;
    let performer_id = ObjectId::parse(&request.performer_id)?;

    let checkout = state
        .service_context
        .ledger
        .send_tip(
            user.party(),
            &performer_id,
            request.price,
            request.message,
            options(&state, request.payment_gateway, None, request.payment_token),
        )
        .await?;

    Ok(Json(checkout))
}

pub async fn purchase_gallery(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(gallery_id): Path<String>,
    body: Option<Json<SinglePurchaseRequest>>,
) -> Result<Json<Checkout>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let gallery_id = ObjectId::parse(&gallery_id)?;

    let checkout = state
        .service_context
        .ledger
        .purchase_gallery(
            user.party(),
            &gallery_id,
            options(&state, request.payment_gateway, request.coupon_code, request.payment_token),
        )
        .await?;

    Ok(Json(checkout))
}

pub async fn purchase_video(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(video_id): Path<String>,
    body: Option<Json<SinglePurchaseRequest>>,
) -> Result<Json<Checkout>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let video_id = ObjectId::parse(&video_id)?;

    let checkout = state
        .service_context
        .ledger
        .purchase_video(
            user.party(),
            &video_id,
            options(&state, request.payment_gateway, request.coupon_code, request.payment_token),
        )
        .await?;

    Ok(Json(checkout))
}

pub async fn purchase_products(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<ProductsRequest>,
) -> Result<Json<Checkout>> {
    request.validate()?;
    let items = request
        .products
        .iter()
        .map(|line| {
            Ok(CartItem {
                product_id: ObjectId::parse(&line.product_id)?,
                quantity: line.quantity,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let checkout = state
        .service_context
        .ledger
        .purchase_products(
            user.party(),
            &items,
            request.delivery_address,
            options(&state, request.payment_gateway, request.coupon_code, request.payment_token),
        )
        .await?;

    Ok(Json(checkout))
}
