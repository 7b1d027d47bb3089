use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::CommissionSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSetting {
    pub key: String,
    pub value: String,
    pub value_type: SettingType,
    pub category: String,
    pub description: Option<String>,
    pub is_sensitive: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettingType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "number")]
    Number,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "json")]
    Json,
}

/// CCBill credentials. Every field is optional so performer overrides and
/// global settings can be layered field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CCBillSettings {
    pub account_number: Option<String>,
    pub sub_account: Option<String>,
    pub single_sub_account: Option<String>,
    pub flexform_id: Option<String>,
    pub salt: Option<String>,
    pub currency_code: Option<String>,
    pub datalink_username: Option<String>,
    pub datalink_password: Option<String>,
}

impl CCBillSettings {
    /// Fields set on `self` win; gaps are filled from `fallback`.
    pub fn or(self, fallback: &CCBillSettings) -> CCBillSettings {
        CCBillSettings {
            account_number: non_empty(self.account_number).or_else(|| fallback.account_number.clone()),
            sub_account: non_empty(self.sub_account).or_else(|| fallback.sub_account.clone()),
            single_sub_account: non_empty(self.single_sub_account)
                .or_else(|| fallback.single_sub_account.clone()),
            flexform_id: non_empty(self.flexform_id).or_else(|| fallback.flexform_id.clone()),
            salt: non_empty(self.salt).or_else(|| fallback.salt.clone()),
            currency_code: non_empty(self.currency_code).or_else(|| fallback.currency_code.clone()),
            datalink_username: non_empty(self.datalink_username)
                .or_else(|| fallback.datalink_username.clone()),
            datalink_password: non_empty(self.datalink_password)
                .or_else(|| fallback.datalink_password.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoonlightSettings {
    pub security_key: Option<String>,
}

impl MoonlightSettings {
    pub fn or(self, fallback: &MoonlightSettings) -> MoonlightSettings {
        MoonlightSettings {
            security_key: non_empty(self.security_key).or_else(|| fallback.security_key.clone()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Immutable view of the payment-related settings rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentSettings {
    pub ccbill: CCBillSettings,
    pub moonlight: MoonlightSettings,
    pub commission: CommissionSettings,
}

impl PaymentSettings {
    pub fn from_settings(settings: &[AppSetting]) -> Self {
        let mut config = PaymentSettings::default();

        for setting in settings {
            let value = || non_empty(Some(setting.value.clone()));
            let fraction = || parse_fraction(&setting.key, &setting.value);
            match setting.key.as_str() {
                "payment.ccbill.account_number" => config.ccbill.account_number = value(),
                "payment.ccbill.sub_account" => config.ccbill.sub_account = value(),
                "payment.ccbill.single_sub_account" => config.ccbill.single_sub_account = value(),
                "payment.ccbill.flexform_id" => config.ccbill.flexform_id = value(),
                "payment.ccbill.salt" => config.ccbill.salt = value(),
                "payment.ccbill.currency_code" => config.ccbill.currency_code = value(),
                "payment.ccbill.datalink_username" => config.ccbill.datalink_username = value(),
                "payment.ccbill.datalink_password" => config.ccbill.datalink_password = value(),
                "payment.moonlight.security_key" => config.moonlight.security_key = value(),
                "commission.monthly_subscription" => config.commission.monthly_subscription = fraction(),
                "commission.yearly_subscription" => config.commission.yearly_subscription = fraction(),
                "commission.sale_video" => config.commission.sale_video = fraction(),
                "commission.sale_gallery" => config.commission.sale_gallery = fraction(),
                "commission.send_tip" => config.commission.send_tip = fraction(),
                "commission.product" => config.commission.product = fraction(),
                _ => {}
            }
        }

        config
    }
}

fn parse_fraction(key: &str, value: &str) -> Option<Decimal> {
    match Decimal::from_str(value.trim()) {
        Ok(v) if v >= Decimal::ZERO && v <= Decimal::ONE => Some(v),
        _ => {
            tracing::warn!("Ignoring invalid commission value {:?} for {}", value, key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setting(key: &str, value: &str) -> AppSetting {
        AppSetting {
            key: key.to_string(),
            value: value.to_string(),
            value_type: SettingType::String,
            category: "payment".to_string(),
            description: None,
            is_sensitive: false,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn builds_snapshot_from_rows() {
        let snapshot = PaymentSettings::from_settings(&[
            setting("payment.ccbill.salt", "s3cret"),
            setting("payment.ccbill.flexform_id", ""),
            setting("commission.sale_video", "0.25"),
            setting("commission.send_tip", "1.5"),
        ]);

        assert_eq!(snapshot.ccbill.salt.as_deref(), Some("s3cret"));
        assert_eq!(snapshot.ccbill.flexform_id, None);
        assert_eq!(snapshot.commission.sale_video, Some(Decimal::new(25, 2)));
        assert_eq!(snapshot.commission.send_tip, None);
    }

    #[test]
    fn performer_fields_override_global_fields() {
        let global = CCBillSettings {
            salt: Some("global-salt".to_string()),
            flexform_id: Some("global-form".to_string()),
            ..Default::default()
        };
        let performer = CCBillSettings {
            flexform_id: Some("performer-form".to_string()),
            salt: Some(" ".to_string()),
            ..Default::default()
        };

        let merged = performer.or(&global);
        assert_eq!(merged.flexform_id.as_deref(), Some("performer-form"));
        assert_eq!(merged.salt.as_deref(), Some("global-salt"));
    }
}
