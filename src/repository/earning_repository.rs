use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{FromRow, SqlitePool};

use crate::{
    domain::{Earning, ObjectId},
    error::Result,
    repository::{parse_decimal, parse_enum, parse_id, to_utc, EarningRepository},
};

#[derive(FromRow)]
struct EarningRow {
    id: String,
    transaction_id: String,
    performer_id: String,
    user_id: String,
    source_type: String,
    payment_gateway: String,
    gross_price: String,
    net_price: String,
    commission: String,
    is_paid: bool,
    paid_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteEarningRepository {
    pool: SqlitePool,
}

impl SqliteEarningRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_earning(row: EarningRow) -> Result<Earning> {
        Ok(Earning {
            id: parse_id(&row.id)?,
            transaction_id: parse_id(&row.transaction_id)?,
            performer_id: parse_id(&row.performer_id)?,
            user_id: parse_id(&row.user_id)?,
            source_type: parse_enum(&row.source_type)?,
            payment_gateway: parse_enum(&row.payment_gateway)?,
            gross_price: parse_decimal(&row.gross_price)?,
            net_price: parse_decimal(&row.net_price)?,
            commission: parse_decimal(&row.commission)?,
            is_paid: row.is_paid,
            paid_at: row.paid_at.map(to_utc),
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }
}

#[async_trait]
impl EarningRepository for SqliteEarningRepository {
    async fn create_once(&self, earning: Earning) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO earnings (
                id, transaction_id, performer_id, user_id, source_type, payment_gateway,
                gross_price, net_price, commission, is_paid, paid_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(transaction_id) DO NOTHING
            "#,
        )
        .bind(earning.id.as_str())
        .bind(earning.transaction_id.as_str())
        .bind(earning.performer_id.as_str())
        .bind(earning.user_id.as_str())
        .bind(earning.source_type.as_str())
        .bind(earning.payment_gateway.as_str())
        .bind(earning.gross_price.to_string())
        .bind(earning.net_price.to_string())
        .bind(earning.commission.to_string())
        .bind(earning.is_paid)
        .bind(earning.paid_at.map(|dt| dt.naive_utc()))
        .bind(earning.created_at.naive_utc())
        .bind(earning.updated_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_transaction(&self, transaction_id: &ObjectId) -> Result<Option<Earning>> {
        let row = sqlx::query_as::<_, EarningRow>(
            r#"
            SELECT id, transaction_id, performer_id, user_id, source_type, payment_gateway,
                   gross_price, net_price, commission, is_paid, paid_at, created_at, updated_at
            FROM earnings
            WHERE transaction_id = ?
            "#,
        )
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_earning).transpose()
    }

    async fn list_by_performer(&self, performer_id: &ObjectId) -> Result<Vec<Earning>> {
        let rows = sqlx::query_as::<_, EarningRow>(
            r#"
            SELECT id, transaction_id, performer_id, user_id, source_type, payment_gateway,
                   gross_price, net_price, commission, is_paid, paid_at, created_at, updated_at
            FROM earnings
            WHERE performer_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(performer_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_earning).collect()
    }
}
