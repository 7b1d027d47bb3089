use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::{
    domain::{ObjectId, Subscription, SubscriptionStatus, SubscriptionType, SubscriptionUpsert},
    error::{AppError, Result},
    repository::{parse_enum, parse_id, to_utc, SubscriptionRepository},
};

#[derive(FromRow)]
struct SubscriptionRow {
    id: String,
    performer_id: String,
    user_id: String,
    subscription_type: String,
    status: String,
    expired_at: NaiveDateTime,
    start_recurring_date: NaiveDateTime,
    next_recurring_date: NaiveDateTime,
    transaction_id: Option<String>,
    payment_gateway: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_subscription(row: SubscriptionRow) -> Result<Subscription> {
        Ok(Subscription {
            id: parse_id(&row.id)?,
            performer_id: parse_id(&row.performer_id)?,
            user_id: parse_id(&row.user_id)?,
            subscription_type: SubscriptionType::parse(&row.subscription_type).ok_or_else(|| {
                AppError::Database(format!("Invalid subscription type: {}", row.subscription_type))
            })?,
            status: SubscriptionStatus::parse(&row.status).ok_or_else(|| {
                AppError::Database(format!("Invalid subscription status: {}", row.status))
            })?,
            expired_at: to_utc(row.expired_at),
            start_recurring_date: to_utc(row.start_recurring_date),
            next_recurring_date: to_utc(row.next_recurring_date),
            transaction_id: row.transaction_id.as_deref().map(parse_id).transpose()?,
            payment_gateway: row.payment_gateway.as_deref().map(parse_enum).transpose()?,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn upsert(&self, upsert: SubscriptionUpsert) -> Result<(Subscription, bool)> {
        let existing = self
            .find_by_performer_and_user(&upsert.performer_id, &upsert.user_id)
            .await?;
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, performer_id, user_id, subscription_type, status, expired_at,
                start_recurring_date, next_recurring_date, transaction_id,
                payment_gateway, created_at, updated_at
            ) VALUES (?, ?, ?, ?, 'active', ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(performer_id, user_id) DO UPDATE SET
                subscription_type = excluded.subscription_type,
                status = 'active',
                expired_at = excluded.expired_at,
                start_recurring_date = excluded.start_recurring_date,
                next_recurring_date = excluded.next_recurring_date,
                transaction_id = excluded.transaction_id,
                payment_gateway = excluded.payment_gateway,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(ObjectId::new().as_str())
        .bind(upsert.performer_id.as_str())
        .bind(upsert.user_id.as_str())
        .bind(upsert.subscription_type.as_str())
        .bind(upsert.expired_at.naive_utc())
        .bind(upsert.start_recurring_date.naive_utc())
        .bind(upsert.next_recurring_date.naive_utc())
        .bind(upsert.transaction_id.as_str())
        .bind(upsert.payment_gateway.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let subscription = self
            .find_by_performer_and_user(&upsert.performer_id, &upsert.user_id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve upserted subscription".to_string()))?;

        Ok((subscription, existing.is_none()))
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, performer_id, user_id, subscription_type, status, expired_at,
                   start_recurring_date, next_recurring_date, transaction_id,
                   payment_gateway, created_at, updated_at
            FROM subscriptions
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_subscription).transpose()
    }

    async fn find_by_performer_and_user(
        &self,
        performer_id: &ObjectId,
        user_id: &ObjectId,
    ) -> Result<Option<Subscription>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, performer_id, user_id, subscription_type, status, expired_at,
                   start_recurring_date, next_recurring_date, transaction_id,
                   payment_gateway, created_at, updated_at
            FROM subscriptions
            WHERE performer_id = ? AND user_id = ?
            "#,
        )
        .bind(performer_id.as_str())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_subscription).transpose()
    }

    async fn deactivate(&self, performer_id: &ObjectId, user_id: &ObjectId) -> Result<Option<Subscription>> {
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'deactivated', updated_at = ?
            WHERE performer_id = ? AND user_id = ?
            "#,
        )
        .bind(Utc::now().naive_utc())
        .bind(performer_id.as_str())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await?;

        self.find_by_performer_and_user(performer_id, user_id).await
    }
}
