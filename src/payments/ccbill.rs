use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::Url;
use rust_decimal::Decimal;

use crate::{
    domain::{round2, CCBillSettings, PaymentGateway},
    error::{AppError, Result},
    payments::gateway::{
        require, CancelOutcome, CheckoutGateway, CheckoutInstructions, CheckoutRequest,
        GatewayAccount,
    },
};

/// Number of rebills requested for recurring flexforms.
pub const NUM_REBILLS: u32 = 99;
/// Access period granted by a single-purchase flexform.
pub const SINGLE_PURCHASE_PERIOD_DAYS: u32 = 30;
const DEFAULT_CURRENCY_CODE: &str = "840";

/// Hosted flexform checkout plus DataLink subscription management.
pub struct CCBillGateway {
    http: reqwest::Client,
    flexform_url: String,
    datalink_url: String,
}

impl CCBillGateway {
    pub fn new(http: reqwest::Client, flexform_url: String, datalink_url: String) -> Self {
        Self {
            http,
            flexform_url,
            datalink_url,
        }
    }

    fn settings(account: &GatewayAccount) -> Result<&CCBillSettings> {
        match account {
            GatewayAccount::CCBill(settings) => Ok(settings),
            _ => Err(AppError::MissingConfig("ccbill account".to_string())),
        }
    }

    /// Salt, flexform id and sub account for one kind of checkout. Single
    /// purchases prefer their own sub account when one is configured.
    fn form_credentials(settings: &CCBillSettings, subscription: bool) -> Result<(&str, &str, &str)> {
        let salt = require(&settings.salt, "ccbill salt")?;
        let form_id = require(&settings.flexform_id, "ccbill flexform id")?;
        let sub_account = match settings.single_sub_account.as_deref() {
            Some(v) if !subscription && !v.trim().is_empty() => v,
            _ => require(&settings.sub_account, "ccbill sub account")?,
        };
        Ok((salt, form_id, sub_account))
    }

    fn flexform_url(&self, form_id: &str, params: &[(&str, String)]) -> Result<String> {
        let base = format!("{}/{}", self.flexform_url.trim_end_matches('/'), form_id);
        let url = Url::parse_with_params(&base, params)
            .map_err(|e| AppError::Internal(format!("Invalid CCBill flexform url: {}", e)))?;
        Ok(url.into())
    }
}

pub fn format_price(price: Decimal) -> String {
    format!("{:.2}", round2(price))
}

/// `md5(initialPrice initialPeriod recurringPrice recurringPeriod numRebills currencyCode salt)`
pub fn subscription_form_digest(price: &str, period: u32, currency_code: &str, salt: &str) -> String {
    md5_hex(&format!(
        "{price}{period}{price}{period}{NUM_REBILLS}{currency_code}{salt}"
    ))
}

/// `md5(initialPrice initialPeriod currencyCode salt)`
pub fn single_form_digest(price: &str, period: u32, currency_code: &str, salt: &str) -> String {
    md5_hex(&format!("{price}{period}{currency_code}{salt}"))
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// DataLink answers a successful cancel with a `results` header followed by
/// a `1` row.
pub fn is_cancel_confirmed(body: &str) -> bool {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains("\"results\"\"1\"") || compact.contains("results1")
}

#[async_trait]
impl CheckoutGateway for CCBillGateway {
    fn kind(&self) -> PaymentGateway {
        PaymentGateway::Ccbill
    }

    fn validate_account(&self, account: &GatewayAccount, subscription: bool) -> Result<()> {
        Self::form_credentials(Self::settings(account)?, subscription).map(|_| ())
    }

    async fn subscription_checkout(
        &self,
        account: &GatewayAccount,
        request: &CheckoutRequest,
    ) -> Result<CheckoutInstructions> {
        let settings = Self::settings(account)?;
        let (salt, form_id, sub_account) = Self::form_credentials(settings, true)?;
        let currency_code = settings.currency_code.as_deref().unwrap_or(DEFAULT_CURRENCY_CODE);
        let period = request
            .period_days
            .ok_or_else(|| AppError::Validation("Subscription checkout needs a period".to_string()))?;

        let price = format_price(request.price);
        let digest = subscription_form_digest(&price, period, currency_code, salt);
        let url = self.flexform_url(
            form_id,
            &[
                ("transactionId", request.transaction_id.to_string()),
                ("clientSubacc", sub_account.to_string()),
                ("initialPrice", price.clone()),
                ("initialPeriod", period.to_string()),
                ("recurringPrice", price),
                ("recurringPeriod", period.to_string()),
                ("numRebills", NUM_REBILLS.to_string()),
                ("currencyCode", currency_code.to_string()),
                ("formDigest", digest),
            ],
        )?;

        Ok(CheckoutInstructions::Redirect { url })
    }

    async fn single_purchase_checkout(
        &self,
        account: &GatewayAccount,
        request: &CheckoutRequest,
    ) -> Result<CheckoutInstructions> {
        let settings = Self::settings(account)?;
        let (salt, form_id, sub_account) = Self::form_credentials(settings, false)?;
        let currency_code = settings.currency_code.as_deref().unwrap_or(DEFAULT_CURRENCY_CODE);

        let price = format_price(request.price);
        let digest = single_form_digest(&price, SINGLE_PURCHASE_PERIOD_DAYS, currency_code, salt);
        let url = self.flexform_url(
            form_id,
            &[
                ("transactionId", request.transaction_id.to_string()),
                ("clientSubacc", sub_account.to_string()),
                ("initialPrice", price),
                ("initialPeriod", SINGLE_PURCHASE_PERIOD_DAYS.to_string()),
                ("currencyCode", currency_code.to_string()),
                ("formDigest", digest),
            ],
        )?;

        Ok(CheckoutInstructions::Redirect { url })
    }

    async fn cancel_subscription(
        &self,
        account: &GatewayAccount,
        subscription_id: &str,
    ) -> Result<CancelOutcome> {
        let settings = Self::settings(account)?;
        let account_number = require(&settings.account_number, "ccbill account number")?;
        let sub_account = require(&settings.sub_account, "ccbill sub account")?;
        let username = require(&settings.datalink_username, "ccbill datalink username")?;
        let password = require(&settings.datalink_password, "ccbill datalink password")?;

        let response = self
            .http
            .get(&self.datalink_url)
            .query(&[
                ("clientAccnum", account_number),
                ("clientSubacc", sub_account),
                ("usingSubacc", sub_account),
                ("username", username),
                ("password", password),
                ("subscriptionId", subscription_id),
                ("action", "cancelSubscription"),
            ])
            .send()
            .await;

        let body = match response {
            Ok(resp) => match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("CCBill cancel response unreadable for {}: {}", subscription_id, e);
                    return Ok(CancelOutcome { success: false });
                }
            },
            Err(e) => {
                tracing::warn!("CCBill cancel request failed for {}: {}", subscription_id, e);
                return Ok(CancelOutcome { success: false });
            }
        };

        let success = is_cancel_confirmed(&body);
        if !success {
            tracing::warn!("CCBill refused cancel of {}: {}", subscription_id, body.trim());
        }
        Ok(CancelOutcome { success })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObjectId;
    use std::str::FromStr;

    fn gateway() -> CCBillGateway {
        CCBillGateway::new(
            reqwest::Client::new(),
            "https://api.ccbill.com/wap-frontflex/flexforms".to_string(),
            "http://127.0.0.1:9/utils/subscriptionManagement.cgi".to_string(),
        )
    }

    fn account() -> GatewayAccount {
        GatewayAccount::CCBill(CCBillSettings {
            account_number: Some("951492".to_string()),
            sub_account: Some("0001".to_string()),
            flexform_id: Some("form-123".to_string()),
            salt: Some("abc".to_string()),
            currency_code: Some("840".to_string()),
            datalink_username: Some("dl".to_string()),
            datalink_password: Some("pw".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn digests_match_flexform_contract() {
        assert_eq!(
            subscription_form_digest("9.99", 30, "840", "abc"),
            "93ef7b179ad0d35365453ea4fe7f9348"
        );
        assert_eq!(
            single_form_digest("10.00", 30, "840", "abc"),
            "fc48f0ccb39886d6517061ffa1127700"
        );
    }

    #[test]
    fn prices_always_have_two_decimals() {
        assert_eq!(format_price(Decimal::from_str("10").unwrap()), "10.00");
        assert_eq!(format_price(Decimal::from_str("9.999").unwrap()), "10.00");
    }

    #[tokio::test]
    async fn subscription_url_carries_recurring_fields() {
        let id = ObjectId::new();
        let request = CheckoutRequest {
            transaction_id: id.clone(),
            price: Decimal::from_str("9.99").unwrap(),
            period_days: Some(30),
            payment_token: None,
            description: "Monthly subscription".to_string(),
        };

        let CheckoutInstructions::Redirect { url } =
            gateway().subscription_checkout(&account(), &request).await.unwrap()
        else {
            panic!("expected redirect");
        };

        assert!(url.starts_with("https://api.ccbill.com/wap-frontflex/flexforms/form-123?"));
        assert!(url.contains(&format!("transactionId={}", id)));
        assert!(url.contains("recurringPeriod=30"));
        assert!(url.contains("numRebills=99"));
        assert!(url.contains("formDigest=93ef7b179ad0d35365453ea4fe7f9348"));
    }

    #[tokio::test]
    async fn missing_salt_fails_before_network() {
        let account = GatewayAccount::CCBill(CCBillSettings {
            flexform_id: Some("form-123".to_string()),
            sub_account: Some("0001".to_string()),
            ..Default::default()
        });
        let request = CheckoutRequest {
            transaction_id: ObjectId::new(),
            price: Decimal::from_str("5").unwrap(),
            period_days: None,
            payment_token: None,
            description: String::new(),
        };

        let err = gateway().single_purchase_checkout(&account, &request).await.unwrap_err();
        assert!(matches!(err, AppError::MissingConfig(_)));

        let err = gateway().cancel_subscription(&account, "123").await.unwrap_err();
        assert!(matches!(err, AppError::MissingConfig(_)));
    }

    #[test]
    fn single_purchases_may_use_their_own_sub_account() {
        let single_only = GatewayAccount::CCBill(CCBillSettings {
            flexform_id: Some("form-123".to_string()),
            salt: Some("abc".to_string()),
            single_sub_account: Some("0002".to_string()),
            ..Default::default()
        });

        assert!(gateway().validate_account(&single_only, false).is_ok());
        assert!(matches!(
            gateway().validate_account(&single_only, true),
            Err(AppError::MissingConfig(_))
        ));
        assert!(gateway().validate_account(&account(), true).is_ok());
    }

    #[tokio::test]
    async fn transport_failure_is_not_an_error() {
        let outcome = gateway().cancel_subscription(&account(), "0115000001").await.unwrap();
        assert_eq!(outcome, CancelOutcome { success: false });
    }

    #[test]
    fn recognises_datalink_confirmation() {
        assert!(is_cancel_confirmed("\"results\"\n\"1\"\n"));
        assert!(!is_cancel_confirmed("\"results\"\n\"0\"\n"));
        assert!(!is_cancel_confirmed("\"results\"\n\"-9\"\n"));
    }
}
