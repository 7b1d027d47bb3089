use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ObjectId, PaymentGateway, TransactionType};

/// Derived access record, one per (performer, user).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: ObjectId,
    pub performer_id: ObjectId,
    pub user_id: ObjectId,
    pub subscription_type: SubscriptionType,
    pub status: SubscriptionStatus,
    pub expired_at: DateTime<Utc>,
    pub start_recurring_date: DateTime<Utc>,
    pub next_recurring_date: DateTime<Utc>,
    pub transaction_id: Option<ObjectId>,
    pub payment_gateway: Option<PaymentGateway>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Monthly,
    Semiannual,
    System,
    Free,
}

impl SubscriptionType {
    pub fn from_transaction(transaction_type: TransactionType) -> Option<Self> {
        match transaction_type {
            TransactionType::MonthlySubscription => Some(SubscriptionType::Monthly),
            TransactionType::YearlySubscription => Some(SubscriptionType::Semiannual),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionType::Monthly => "monthly",
            SubscriptionType::Semiannual => "semiannual",
            SubscriptionType::System => "system",
            SubscriptionType::Free => "free",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monthly" => Some(SubscriptionType::Monthly),
            "semiannual" => Some(SubscriptionType::Semiannual),
            "system" => Some(SubscriptionType::System),
            "free" => Some(SubscriptionType::Free),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Deactivated,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Deactivated => "deactivated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "deactivated" => Some(SubscriptionStatus::Deactivated),
            _ => None,
        }
    }
}

/// Values written by the synchronizer when a subscription transaction
/// succeeds.
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert {
    pub performer_id: ObjectId,
    pub user_id: ObjectId,
    pub subscription_type: SubscriptionType,
    pub expired_at: DateTime<Utc>,
    pub start_recurring_date: DateTime<Utc>,
    pub next_recurring_date: DateTime<Utc>,
    pub transaction_id: ObjectId,
    pub payment_gateway: PaymentGateway,
}
