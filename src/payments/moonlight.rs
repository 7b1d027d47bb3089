use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    domain::{PaymentGateway, ResponseInfo},
    error::{AppError, Result},
    payments::{
        ccbill::format_price,
        gateway::{
            require, CancelOutcome, CheckoutGateway, CheckoutInstructions, CheckoutRequest,
            GatewayAccount,
        },
    },
};

/// Server-to-server transact API; every call is a form-encoded POST answered
/// with a form-encoded body whose `response` is `1` on approval.
pub struct MoonlightGateway {
    http: reqwest::Client,
    transact_url: String,
}

impl MoonlightGateway {
    pub fn new(http: reqwest::Client, transact_url: String) -> Self {
        Self { http, transact_url }
    }

    fn security_key(account: &GatewayAccount) -> Result<&str> {
        match account {
            GatewayAccount::Moonlight(settings) => require(&settings.security_key, "moonlight security key"),
            _ => Err(AppError::MissingConfig("moonlight account".to_string())),
        }
    }

    fn payment_token(request: &CheckoutRequest) -> Result<&str> {
        request
            .payment_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Validation("Missing payment token".to_string()))
    }

    async fn transact(&self, form: &[(&str, String)]) -> Result<TransactResponse> {
        let response = self.http.post(&self.transact_url).form(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::ExternalGateway(format!(
                "Moonlight returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        TransactResponse::parse(&body)
    }

    async fn charge(&self, form: &[(&str, String)]) -> Result<CheckoutInstructions> {
        let response = self.transact(form).await?;
        if !response.is_approved() {
            return Err(AppError::ExternalGateway(format!(
                "Moonlight declined: {}",
                response.text().unwrap_or("no reason given")
            )));
        }
        Ok(CheckoutInstructions::Charged {
            response: response.into_info(),
        })
    }
}

/// Parsed `key=value&...` reply.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactResponse {
    fields: BTreeMap<String, String>,
}

impl TransactResponse {
    pub fn parse(body: &str) -> Result<Self> {
        let fields: BTreeMap<String, String> = serde_urlencoded::from_str(body.trim())
            .map_err(|e| AppError::ExternalGateway(format!("Unparsable Moonlight response: {}", e)))?;
        if !fields.contains_key("response") {
            return Err(AppError::ExternalGateway(
                "Moonlight response has no response code".to_string(),
            ));
        }
        Ok(Self { fields })
    }

    pub fn is_approved(&self) -> bool {
        self.get("response") == Some("1")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn text(&self) -> Option<&str> {
        self.get("responsetext")
    }

    pub fn into_info(self) -> ResponseInfo {
        self.fields
            .into_iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| (k, Value::String(v)))
            .collect()
    }
}

#[async_trait]
impl CheckoutGateway for MoonlightGateway {
    fn kind(&self) -> PaymentGateway {
        PaymentGateway::Moonlight
    }

    fn validate_account(&self, account: &GatewayAccount, _subscription: bool) -> Result<()> {
        Self::security_key(account).map(|_| ())
    }

    async fn subscription_checkout(
        &self,
        account: &GatewayAccount,
        request: &CheckoutRequest,
    ) -> Result<CheckoutInstructions> {
        let security_key = Self::security_key(account)?;
        let payment_token = Self::payment_token(request)?;
        let period = request
            .period_days
            .ok_or_else(|| AppError::Validation("Subscription checkout needs a period".to_string()))?;
        let price = format_price(request.price);

        self.charge(&[
            ("type", "sale".to_string()),
            ("amount", price.clone()),
            ("billing_method", "recurring".to_string()),
            ("recurring", "add_subscription".to_string()),
            ("plan_payments", "0".to_string()),
            ("plan_amount", price),
            ("day_frequency", period.to_string()),
            ("payment_token", payment_token.to_string()),
            ("security_key", security_key.to_string()),
            ("orderid", request.transaction_id.to_string()),
            ("order_description", request.description.clone()),
        ])
        .await
    }

    async fn single_purchase_checkout(
        &self,
        account: &GatewayAccount,
        request: &CheckoutRequest,
    ) -> Result<CheckoutInstructions> {
        let security_key = Self::security_key(account)?;
        let payment_token = Self::payment_token(request)?;

        self.charge(&[
            ("type", "sale".to_string()),
            ("amount", format_price(request.price)),
            ("payment_token", payment_token.to_string()),
            ("security_key", security_key.to_string()),
            ("orderid", request.transaction_id.to_string()),
            ("order_description", request.description.clone()),
        ])
        .await
    }

    async fn cancel_subscription(
        &self,
        account: &GatewayAccount,
        subscription_id: &str,
    ) -> Result<CancelOutcome> {
        let security_key = Self::security_key(account)?;

        let result = self
            .transact(&[
                ("recurring", "delete_subscription".to_string()),
                ("subscription_id", subscription_id.to_string()),
                ("security_key", security_key.to_string()),
            ])
            .await;

        match result {
            Ok(response) if response.is_approved() => Ok(CancelOutcome { success: true }),
            Ok(response) => {
                tracing::warn!(
                    "Moonlight refused cancel of {}: {}",
                    subscription_id,
                    response.text().unwrap_or_default()
                );
                Ok(CancelOutcome { success: false })
            }
            Err(e) => {
                tracing::warn!("Moonlight cancel failed for {}: {:?}", subscription_id, e);
                Ok(CancelOutcome { success: false })
            }
        }
    }
}
