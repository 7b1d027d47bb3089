use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::{
    domain::{PaymentTransaction, ResponseInfo, SubscriptionType, SubscriptionUpsert},
    error::Result,
    events::{EventSubscriber, LedgerEvent},
    repository::SubscriptionRepository,
};

const START_DATE_KEYS: &[&str] = &["renewalDate", "timestamp"];
const NEXT_DATE_KEYS: &[&str] = &["nextRenewalDate"];

/// Keeps the (performer, user) subscription row in step with successful
/// subscription transactions and cancellations.
pub struct SubscriptionSynchronizer {
    subscriptions: Arc<dyn SubscriptionRepository>,
}

impl SubscriptionSynchronizer {
    pub fn new(subscriptions: Arc<dyn SubscriptionRepository>) -> Self {
        Self { subscriptions }
    }

    async fn on_success(&self, transaction: &PaymentTransaction) -> Result<()> {
        let (Some(subscription_type), Some(period)) = (
            SubscriptionType::from_transaction(transaction.transaction_type),
            transaction.transaction_type.period_days(),
        ) else {
            return Ok(());
        };

        let upsert = build_upsert(transaction, subscription_type, period, Utc::now());
        let (subscription, created) = self.subscriptions.upsert(upsert).await?;

        tracing::info!(
            "{} subscription {} for performer {} user {} until {}",
            if created { "Created" } else { "Renewed" },
            subscription.id,
            subscription.performer_id,
            subscription.user_id,
            subscription.expired_at
        );
        Ok(())
    }
}

fn build_upsert(
    transaction: &PaymentTransaction,
    subscription_type: SubscriptionType,
    period_days: u32,
    now: DateTime<Utc>,
) -> SubscriptionUpsert {
    let expired_at = now + Duration::days(i64::from(period_days));
    let info = &transaction.payment_response_info;

    SubscriptionUpsert {
        performer_id: transaction.performer_id.clone(),
        user_id: transaction.buyer_id().clone(),
        subscription_type,
        expired_at,
        start_recurring_date: payload_date(info, START_DATE_KEYS).unwrap_or(now),
        next_recurring_date: payload_date(info, NEXT_DATE_KEYS).unwrap_or(expired_at),
        transaction_id: transaction.id.clone(),
        payment_gateway: transaction.payment_gateway,
    }
}

fn payload_date(info: &ResponseInfo, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| info.get(*key))
        .filter_map(Value::as_str)
        .find_map(parse_gateway_date)
}

/// Gateways send either `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
fn parse_gateway_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl EventSubscriber for SubscriptionSynchronizer {
    fn name(&self) -> &str {
        "SubscriptionSynchronizer"
    }

    async fn handle(&self, event: &LedgerEvent) -> Result<()> {
        match event {
            LedgerEvent::TransactionSucceeded { transaction, .. } => self.on_success(transaction).await,
            LedgerEvent::SubscriptionCancelled {
                performer_id,
                user_id,
                ..
            } => {
                // Access stays valid until the current expiry.
                if let Some(subscription) = self.subscriptions.deactivate(performer_id, user_id).await? {
                    tracing::info!(
                        "Deactivated subscription {} (expires {})",
                        subscription.id,
                        subscription.expired_at
                    );
                }
                Ok(())
            }
        }
    }
}
