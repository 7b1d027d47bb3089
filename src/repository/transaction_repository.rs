use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::{
    domain::{
        merge_response_info, subscription_id_of, transaction_id_of, ObjectId, Party,
        PaymentGateway, PaymentTransaction, ResponseInfo, TransactionStatus,
    },
    error::{AppError, Result},
    repository::{parse_decimal, parse_enum, parse_id, to_utc, TransactionRepository},
};

const SELECT_TRANSACTION: &str = r#"
    SELECT id, source_type, source_id, target_type, target_id, performer_id,
           type AS transaction_type, status, original_price, total_price,
           products, payment_gateway, payment_response_info, coupon_info,
           description, created_at, updated_at
    FROM payment_transactions
"#;

const MERGE_ATTEMPTS: usize = 5;

#[derive(FromRow)]
struct TransactionRow {
    id: String,
    source_type: String,
    source_id: String,
    target_type: String,
    target_id: String,
    performer_id: String,
    transaction_type: String,
    status: String,
    original_price: String,
    total_price: String,
    products: String,
    payment_gateway: String,
    payment_response_info: String,
    coupon_info: Option<String>,
    description: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteTransactionRepository {
    pool: SqlitePool,
}

impl SqliteTransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_transaction(row: TransactionRow) -> Result<PaymentTransaction> {
        let json_err = |e: serde_json::Error| AppError::Database(e.to_string());

        Ok(PaymentTransaction {
            id: parse_id(&row.id)?,
            source: Party::from_parts(&row.source_type, parse_id(&row.source_id)?)?,
            target: parse_enum(&row.target_type)?,
            target_id: parse_id(&row.target_id)?,
            performer_id: parse_id(&row.performer_id)?,
            transaction_type: parse_enum(&row.transaction_type)?,
            status: parse_enum(&row.status)?,
            original_price: parse_decimal(&row.original_price)?,
            total_price: parse_decimal(&row.total_price)?,
            products: serde_json::from_str(&row.products).map_err(json_err)?,
            payment_gateway: parse_enum(&row.payment_gateway)?,
            payment_response_info: serde_json::from_str(&row.payment_response_info).map_err(json_err)?,
            coupon_info: row
                .coupon_info
                .as_deref()
                .map(serde_json::from_str::<crate::domain::CouponSnapshot>)
                .transpose()
                .map_err(json_err)?,
            description: row.description,
            created_at: to_utc(row.created_at),
            updated_at: to_utc(row.updated_at),
        })
    }

    async fn insert(&self, tx: &PaymentTransaction, ignore_conflict: bool) -> Result<bool> {
        let products = serde_json::to_string(&tx.products)?;
        let info = serde_json::to_string(&tx.payment_response_info)?;
        let coupon = tx.coupon_info.as_ref().map(serde_json::to_string).transpose()?;
        let sql = format!(
            r#"
            INSERT INTO payment_transactions (
                id, source_type, source_id, target_type, target_id, performer_id,
                type, status, original_price, total_price, products, payment_gateway,
                payment_response_info, gateway_subscription_id, gateway_transaction_id,
                coupon_info, description, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            {}
            "#,
            if ignore_conflict { "ON CONFLICT DO NOTHING" } else { "" }
        );

        let result = sqlx::query(&sql)
            .bind(tx.id.as_str())
            .bind(tx.source.kind())
            .bind(tx.source.id().as_str())
            .bind(tx.target.as_str())
            .bind(tx.target_id.as_str())
            .bind(tx.performer_id.as_str())
            .bind(tx.transaction_type.as_str())
            .bind(tx.status.as_str())
            .bind(tx.original_price.to_string())
            .bind(tx.total_price.to_string())
            .bind(products)
            .bind(tx.payment_gateway.as_str())
            .bind(info)
            .bind(subscription_id_of(&tx.payment_response_info))
            .bind(transaction_id_of(&tx.payment_response_info))
            .bind(coupon)
            .bind(&tx.description)
            .bind(tx.created_at.naive_utc())
            .bind(tx.updated_at.naive_utc())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Raw stored response info and status. Merges compare against the raw
    /// text so a concurrent merge is never overwritten.
    async fn fetch_response_info(&self, id: &ObjectId) -> Result<Option<(String, String)>> {
        let row = sqlx::query_as::<_, (String, String)>(
            "SELECT payment_response_info, status FROM payment_transactions WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn fetch_one_where(&self, clause: &str, binds: &[&str]) -> Result<Option<PaymentTransaction>> {
        let sql = format!("{} {}", SELECT_TRANSACTION, clause);
        let mut query = sqlx::query_as::<_, TransactionRow>(&sql);
        for value in binds {
            query = query.bind(*value);
        }

        match query.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Self::row_to_transaction(row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TransactionRepository for SqliteTransactionRepository {
    async fn create(&self, transaction: PaymentTransaction) -> Result<PaymentTransaction> {
        self.insert(&transaction, false).await?;

        self.find_by_id(&transaction.id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created transaction".to_string())
        })
    }

    async fn create_if_new(&self, transaction: PaymentTransaction) -> Result<Option<PaymentTransaction>> {
        if !self.insert(&transaction, true).await? {
            return Ok(None);
        }
        self.find_by_id(&transaction.id).await
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentTransaction>> {
        self.fetch_one_where("WHERE id = ?", &[id.as_str()]).await
    }

    async fn find_latest_by_subscription_id(
        &self,
        gateway: PaymentGateway,
        subscription_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        self.fetch_one_where(
            r#"
            WHERE payment_gateway = ? AND gateway_subscription_id = ? AND status = 'success'
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
            &[gateway.as_str(), subscription_id],
        )
        .await
    }

    async fn record_response_info(&self, id: &ObjectId, info: &ResponseInfo) -> Result<()> {
        for _ in 0..MERGE_ATTEMPTS {
            let Some((raw, _)) = self.fetch_response_info(id).await? else {
                return Err(AppError::NotFound(format!("Transaction {} not found", id)));
            };
            let current: ResponseInfo = serde_json::from_str(&raw)?;
            let merged = merge_response_info(&current, info);
            if merged == current {
                return Ok(());
            }

            let result = sqlx::query(
                r#"
                UPDATE payment_transactions
                SET payment_response_info = ?,
                    gateway_subscription_id = COALESCE(gateway_subscription_id, ?),
                    gateway_transaction_id = COALESCE(gateway_transaction_id, ?),
                    updated_at = ?
                WHERE id = ? AND payment_response_info = ?
                "#,
            )
            .bind(serde_json::to_string(&merged)?)
            .bind(subscription_id_of(&merged))
            .bind(transaction_id_of(&merged))
            .bind(Utc::now().naive_utc())
            .bind(id.as_str())
            .bind(&raw)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(());
            }
        }

        Err(AppError::Database(format!(
            "Response info of transaction {} kept changing",
            id
        )))
    }

    async fn mark_success(&self, id: &ObjectId, info: &ResponseInfo) -> Result<Option<PaymentTransaction>> {
        for _ in 0..MERGE_ATTEMPTS {
            let Some((raw, status)) = self.fetch_response_info(id).await? else {
                return Ok(None);
            };
            if status != TransactionStatus::Pending.as_str() {
                return Ok(None);
            }
            let current: ResponseInfo = serde_json::from_str(&raw)?;
            let merged = merge_response_info(&current, info);
            let now = Utc::now().naive_utc();

            // The status predicate is the idempotency gate: of two concurrent
            // deliveries only one sees a row affected.
            let result = sqlx::query(
                r#"
                UPDATE payment_transactions
                SET status = 'success',
                    payment_response_info = ?,
                    gateway_subscription_id = COALESCE(gateway_subscription_id, ?),
                    gateway_transaction_id = COALESCE(gateway_transaction_id, ?),
                    settled_at = ?,
                    updated_at = ?
                WHERE id = ? AND status = 'pending' AND payment_response_info = ?
                "#,
            )
            .bind(serde_json::to_string(&merged)?)
            .bind(subscription_id_of(&merged))
            .bind(transaction_id_of(&merged))
            .bind(now)
            .bind(now)
            .bind(id.as_str())
            .bind(&raw)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return self.find_by_id(id).await;
            }
        }

        Err(AppError::Database(format!(
            "Response info of transaction {} kept changing",
            id
        )))
    }

    async fn mark_cancelled(&self, id: &ObjectId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = 'cancelled', updated_at = ?
            WHERE id = ? AND status IN ('pending', 'success')
            "#,
        )
        .bind(Utc::now().naive_utc())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_successful_subscriptions(
        &self,
        user_id: &ObjectId,
        performer_id: &ObjectId,
    ) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM payment_transactions
            WHERE source_id = ? AND performer_id = ?
              AND type IN ('monthly_subscription', 'yearly_subscription')
              AND settled_at IS NOT NULL
            "#,
        )
        .bind(user_id.as_str())
        .bind(performer_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
