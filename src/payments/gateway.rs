use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    domain::{
        CCBillSettings, MoonlightSettings, ObjectId, PaymentGateway, PaymentSettings,
        PerformerPaymentSettings, ResponseInfo,
    },
    error::{AppError, Result},
};

/// What the ledger asks a gateway to charge.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub transaction_id: ObjectId,
    pub price: Decimal,
    /// Rebill period; `None` for single purchases.
    pub period_days: Option<u32>,
    /// Client-side tokenized card, required by server-to-server gateways.
    pub payment_token: Option<String>,
    pub description: String,
}

/// What the client has to do (or what already happened) to pay.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckoutInstructions {
    /// Send the buyer to a hosted payment form.
    Redirect { url: String },
    /// The gateway charged the card directly; settlement arrives by webhook.
    Charged { response: ResponseInfo },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub success: bool,
}

/// Resolved credentials for one gateway call.
#[derive(Debug, Clone)]
pub enum GatewayAccount {
    CCBill(CCBillSettings),
    Moonlight(MoonlightSettings),
}

impl GatewayAccount {
    /// Performer overrides layered over the global snapshot, field by field.
    pub fn resolve(
        gateway: PaymentGateway,
        performer: &PerformerPaymentSettings,
        global: &PaymentSettings,
    ) -> GatewayAccount {
        match gateway {
            PaymentGateway::Ccbill => {
                let own: CCBillSettings = performer
                    .ccbill
                    .as_ref()
                    .and_then(|value| decode_override(value, "ccbill"))
                    .unwrap_or_default();
                GatewayAccount::CCBill(own.or(&global.ccbill))
            }
            PaymentGateway::Moonlight => {
                let own: MoonlightSettings = performer
                    .moonlight
                    .as_ref()
                    .and_then(|value| decode_override(value, "moonlight"))
                    .unwrap_or_default();
                GatewayAccount::Moonlight(own.or(&global.moonlight))
            }
        }
    }
}

fn decode_override<T: serde::de::DeserializeOwned>(value: &serde_json::Value, gateway: &str) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(settings) => Some(settings),
        Err(e) => {
            tracing::warn!("Ignoring malformed {} performer settings: {}", gateway, e);
            None
        }
    }
}

/// A payment processor. Implementations validate their credentials before
/// any network call and fail with [`AppError::MissingConfig`].
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    fn kind(&self) -> PaymentGateway;

    /// Checks that `account` carries what a checkout of this kind needs,
    /// without touching the network.
    fn validate_account(&self, account: &GatewayAccount, subscription: bool) -> Result<()>;

    async fn subscription_checkout(
        &self,
        account: &GatewayAccount,
        request: &CheckoutRequest,
    ) -> Result<CheckoutInstructions>;

    async fn single_purchase_checkout(
        &self,
        account: &GatewayAccount,
        request: &CheckoutRequest,
    ) -> Result<CheckoutInstructions>;

    /// Transport or provider failures yield `success: false`, not an error.
    async fn cancel_subscription(
        &self,
        account: &GatewayAccount,
        subscription_id: &str,
    ) -> Result<CancelOutcome>;
}

/// The configured gateways, selected once per call by the transaction's
/// `payment_gateway`.
#[derive(Clone, Default)]
pub struct Gateways {
    gateways: HashMap<PaymentGateway, Arc<dyn CheckoutGateway>>,
}

impl Gateways {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gateway: Arc<dyn CheckoutGateway>) -> Self {
        self.gateways.insert(gateway.kind(), gateway);
        self
    }

    pub fn get(&self, kind: PaymentGateway) -> Result<Arc<dyn CheckoutGateway>> {
        self.gateways
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::MissingConfig(format!("{} gateway is not enabled", kind.as_str())))
    }
}

pub(crate) fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::MissingConfig(name.to_string()))
}
