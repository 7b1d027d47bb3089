use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::*;
use crate::error::{AppError, Result};

pub mod transaction_repository;
pub mod subscription_repository;
pub mod earning_repository;
pub mod order_repository;
pub mod catalog_repository;

pub use transaction_repository::SqliteTransactionRepository;
pub use subscription_repository::SqliteSubscriptionRepository;
pub use earning_repository::SqliteEarningRepository;
pub use order_repository::SqliteOrderRepository;
pub use catalog_repository::SqliteCatalogRepository;

/// The ledger. Status changes go through the conditional `mark_*` methods
/// only; there is no general update.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn create(&self, transaction: PaymentTransaction) -> Result<PaymentTransaction>;
    /// Inserts unless the provider transaction id was already recorded for
    /// the gateway; returns `None` on that conflict.
    async fn create_if_new(&self, transaction: PaymentTransaction) -> Result<Option<PaymentTransaction>>;
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentTransaction>>;
    async fn find_latest_by_subscription_id(
        &self,
        gateway: PaymentGateway,
        subscription_id: &str,
    ) -> Result<Option<PaymentTransaction>>;
    /// Append-only merge into `payment_response_info`, whatever the status.
    async fn record_response_info(&self, id: &ObjectId, info: &ResponseInfo) -> Result<()>;
    /// `pending -> success`. Returns `None` when the row was not pending.
    async fn mark_success(&self, id: &ObjectId, info: &ResponseInfo) -> Result<Option<PaymentTransaction>>;
    /// `pending|success -> cancelled`. Returns `false` when already cancelled.
    async fn mark_cancelled(&self, id: &ObjectId) -> Result<bool>;
    async fn count_successful_subscriptions(
        &self,
        user_id: &ObjectId,
        performer_id: &ObjectId,
    ) -> Result<i64>;
}

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts or overwrites the (performer, user) row. The flag is `true`
    /// when a new row was inserted.
    async fn upsert(&self, upsert: SubscriptionUpsert) -> Result<(Subscription, bool)>;
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Subscription>>;
    async fn find_by_performer_and_user(
        &self,
        performer_id: &ObjectId,
        user_id: &ObjectId,
    ) -> Result<Option<Subscription>>;
    async fn deactivate(&self, performer_id: &ObjectId, user_id: &ObjectId) -> Result<Option<Subscription>>;
}

#[async_trait]
pub trait EarningRepository: Send + Sync {
    /// Returns `false` when an earning for the transaction already exists.
    async fn create_once(&self, earning: Earning) -> Result<bool>;
    async fn find_by_transaction(&self, transaction_id: &ObjectId) -> Result<Option<Earning>>;
    async fn list_by_performer(&self, performer_id: &ObjectId) -> Result<Vec<Earning>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_once(&self, order: Order) -> Result<bool>;
    async fn list_by_transaction(&self, transaction_id: &ObjectId) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait PerformerRepository: Send + Sync {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Performer>>;
    async fn find_payment_settings(&self, id: &ObjectId) -> Result<PerformerPaymentSettings>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_gallery(&self, id: &ObjectId) -> Result<Option<Gallery>>;
    async fn find_video(&self, id: &ObjectId) -> Result<Option<Video>>;
    async fn find_products(&self, ids: &[ObjectId]) -> Result<Vec<Product>>;
    /// Returns `false` when stock is insufficient.
    async fn decrement_stock(&self, product_id: &ObjectId, quantity: u32) -> Result<bool>;
}

#[async_trait]
pub trait CouponRepository: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>>;
    async fn count_usages(&self, coupon_id: &ObjectId, user_id: &ObjectId) -> Result<i64>;
    /// Records a use of the coupon by `user_id`. Returns `false` when the
    /// coupon is single-use and the user already holds a usage.
    async fn claim_usage(
        &self,
        coupon_id: &ObjectId,
        user_id: &ObjectId,
        transaction_id: &ObjectId,
    ) -> Result<bool>;
    /// Voids the usage recorded for a transaction that never reached checkout.
    async fn release_usage(&self, transaction_id: &ObjectId) -> Result<()>;
}

pub(crate) fn parse_id(value: &str) -> Result<ObjectId> {
    ObjectId::parse(value).map_err(|e| AppError::Database(e.to_string()))
}

pub(crate) fn parse_decimal(value: &str) -> Result<Decimal> {
    Decimal::from_str(value).map_err(|e| AppError::Database(format!("Invalid decimal {}: {}", value, e)))
}

pub(crate) fn parse_enum<T: FromStr<Err = AppError>>(value: &str) -> Result<T> {
    value.parse().map_err(|e: AppError| AppError::Database(e.to_string()))
}

pub(crate) fn to_utc(value: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(value, Utc)
}
