use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::ObjectId;
use crate::error::AppError;

pub type ResponseInfo = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: ObjectId,
    pub source: Party,
    pub target: TargetKind,
    pub target_id: ObjectId,
    pub performer_id: ObjectId,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub original_price: Decimal,
    pub total_price: Decimal,
    pub products: Vec<PaymentProduct>,
    pub payment_gateway: PaymentGateway,
    pub payment_response_info: ResponseInfo,
    pub coupon_info: Option<CouponSnapshot>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    /// Provider subscription id recorded by checkout or by the first webhook.
    pub fn gateway_subscription_id(&self) -> Option<&str> {
        info_str(&self.payment_response_info, SUBSCRIPTION_ID_KEYS)
    }

    pub fn gateway_transaction_id(&self) -> Option<&str> {
        info_str(&self.payment_response_info, TRANSACTION_ID_KEYS)
    }

    pub fn buyer_id(&self) -> &ObjectId {
        self.source.id()
    }
}

/// Fields a ledger creation method needs; ids and timestamps are assigned by
/// the ledger.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub source: Party,
    pub target: TargetKind,
    pub target_id: ObjectId,
    pub performer_id: ObjectId,
    pub transaction_type: TransactionType,
    pub original_price: Decimal,
    pub total_price: Decimal,
    pub products: Vec<PaymentProduct>,
    pub payment_gateway: PaymentGateway,
    pub payment_response_info: ResponseInfo,
    pub coupon_info: Option<CouponSnapshot>,
    pub description: String,
}

/// The paying actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "sourceId", rename_all = "lowercase")]
pub enum Party {
    User(ObjectId),
    Performer(ObjectId),
}

impl Party {
    pub fn id(&self) -> &ObjectId {
        match self {
            Party::User(id) | Party::Performer(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Party::User(_) => "user",
            Party::Performer(_) => "performer",
        }
    }

    pub fn from_parts(kind: &str, id: ObjectId) -> Result<Self, AppError> {
        match kind {
            "user" => Ok(Party::User(id)),
            "performer" => Ok(Party::Performer(id)),
            _ => Err(AppError::Database(format!("Invalid transaction source: {}", kind))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Performer,
    Tip,
    Video,
    Gallery,
    Product,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    MonthlySubscription,
    YearlySubscription,
    SaleVideo,
    SaleGallery,
    Product,
    SendTip,
}

impl TransactionType {
    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            TransactionType::MonthlySubscription | TransactionType::YearlySubscription
        )
    }

    /// Billing period in days for subscription types.
    pub fn period_days(&self) -> Option<u32> {
        match self {
            TransactionType::MonthlySubscription => Some(30),
            TransactionType::YearlySubscription => Some(180),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Success,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentGateway {
    Ccbill,
    Moonlight,
}

/// One purchased line on a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProduct {
    pub product_id: ObjectId,
    pub product_type: ProductType,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    MonthlySubscription,
    YearlySubscription,
    Tip,
    SaleVideo,
    SaleGallery,
    Physical,
    Digital,
}

/// Coupon as it was when the transaction was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSnapshot {
    pub coupon_id: ObjectId,
    pub code: String,
    pub value: Decimal,
}

/// Key under which the ledger itself records a provider subscription id.
pub const SUBSCRIPTION_ID_KEY: &str = "subscriptionId";

const SUBSCRIPTION_ID_KEYS: &[&str] = &[SUBSCRIPTION_ID_KEY, "subscription_id"];
const TRANSACTION_ID_KEYS: &[&str] = &["transactionId", "transactionid", "transaction_id"];

fn info_str<'a>(info: &'a ResponseInfo, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| info.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        })
}

pub fn subscription_id_of(info: &ResponseInfo) -> Option<String> {
    info_str(info, SUBSCRIPTION_ID_KEYS).map(str::to_string).or_else(|| {
        SUBSCRIPTION_ID_KEYS
            .iter()
            .filter_map(|key| info.get(*key))
            .find_map(|value| value.as_u64().map(|n| n.to_string()))
    })
}

pub fn transaction_id_of(info: &ResponseInfo) -> Option<String> {
    info_str(info, TRANSACTION_ID_KEYS).map(str::to_string).or_else(|| {
        TRANSACTION_ID_KEYS
            .iter()
            .filter_map(|key| info.get(*key))
            .find_map(|value| value.as_u64().map(|n| n.to_string()))
    })
}

/// Adds keys from `incoming` that `existing` does not have yet. Recorded
/// values are never overwritten.
pub fn merge_response_info(existing: &ResponseInfo, incoming: &ResponseInfo) -> ResponseInfo {
    let mut merged = existing.clone();
    for (key, value) in incoming {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

macro_rules! str_enum {
    ($ty:ty { $($variant:path => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $text),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($variant),)+
                    _ => Err(AppError::Validation(format!(
                        "Invalid {}: {}",
                        stringify!($ty),
                        s
                    ))),
                }
            }
        }
    };
}

str_enum!(TargetKind {
    TargetKind::Performer => "performer",
    TargetKind::Tip => "tip",
    TargetKind::Video => "video",
    TargetKind::Gallery => "gallery",
    TargetKind::Product => "product",
});

str_enum!(TransactionType {
    TransactionType::MonthlySubscription => "monthly_subscription",
    TransactionType::YearlySubscription => "yearly_subscription",
    TransactionType::SaleVideo => "sale_video",
    TransactionType::SaleGallery => "sale_gallery",
    TransactionType::Product => "product",
    TransactionType::SendTip => "send_tip",
});

str_enum!(TransactionStatus {
    TransactionStatus::Pending => "pending",
    TransactionStatus::Success => "success",
    TransactionStatus::Cancelled => "cancelled",
});

str_enum!(ProductType {
    ProductType::MonthlySubscription => "monthly_subscription",
    ProductType::YearlySubscription => "yearly_subscription",
    ProductType::Tip => "tip",
    ProductType::SaleVideo => "sale_video",
    ProductType::SaleGallery => "sale_gallery",
    ProductType::Physical => "physical",
    ProductType::Digital => "digital",
});

str_enum!(PaymentGateway {
    PaymentGateway::Ccbill => "ccbill",
    PaymentGateway::Moonlight => "moonlight",
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(value: Value) -> ResponseInfo {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_keeps_recorded_subscription_id() {
        let existing = info(json!({ "subscriptionId": "0115000001000000123" }));
        let incoming = info(json!({
            "subscriptionId": "999",
            "nextRenewalDate": "2026-11-15"
        }));

        let merged = merge_response_info(&existing, &incoming);
        assert_eq!(merged["subscriptionId"], "0115000001000000123");
        assert_eq!(merged["nextRenewalDate"], "2026-11-15");
    }

    #[test]
    fn reads_numeric_provider_ids() {
        let payload = info(json!({ "subscription_id": 7001, "transactionid": "88" }));
        assert_eq!(subscription_id_of(&payload).as_deref(), Some("7001"));
        assert_eq!(transaction_id_of(&payload).as_deref(), Some("88"));
    }

    #[test]
    fn subscription_periods() {
        assert_eq!(TransactionType::MonthlySubscription.period_days(), Some(30));
        assert_eq!(TransactionType::YearlySubscription.period_days(), Some(180));
        assert_eq!(TransactionType::SendTip.period_days(), None);
        assert_eq!(
            "sale_gallery".parse::<TransactionType>().unwrap(),
            TransactionType::SaleGallery
        );
    }
}
