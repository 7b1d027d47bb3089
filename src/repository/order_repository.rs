use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{FromRow, SqlitePool};

use crate::{
    domain::{ObjectId, Order},
    error::Result,
    repository::{parse_decimal, parse_enum, parse_id, to_utc, OrderRepository},
};

#[derive(FromRow)]
struct OrderRow {
    id: String,
    transaction_id: String,
    performer_id: String,
    buyer_id: String,
    product_id: String,
    product_type: String,
    quantity: i64,
    unit_price: String,
    total_price: String,
    delivery_address: Option<String>,
    status: String,
    created_at: NaiveDateTime,
}

pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: OrderRow) -> Result<Order> {
        Ok(Order {
            id: parse_id(&row.id)?,
            transaction_id: parse_id(&row.transaction_id)?,
            performer_id: parse_id(&row.performer_id)?,
            buyer_id: parse_id(&row.buyer_id)?,
            product_id: parse_id(&row.product_id)?,
            product_type: parse_enum(&row.product_type)?,
            quantity: row.quantity as u32,
            unit_price: parse_decimal(&row.unit_price)?,
            total_price: parse_decimal(&row.total_price)?,
            delivery_address: row.delivery_address,
            status: row.status,
            created_at: to_utc(row.created_at),
        })
    }
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn create_once(&self, order: Order) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (
                id, transaction_id, performer_id, buyer_id, product_id, product_type,
                quantity, unit_price, total_price, delivery_address, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(transaction_id, product_id) DO NOTHING
            "#,
        )
        .bind(order.id.as_str())
        .bind(order.transaction_id.as_str())
        .bind(order.performer_id.as_str())
        .bind(order.buyer_id.as_str())
        .bind(order.product_id.as_str())
        .bind(order.product_type.as_str())
        .bind(order.quantity as i64)
        .bind(order.unit_price.to_string())
        .bind(order.total_price.to_string())
        .bind(&order.delivery_address)
        .bind(&order.status)
        .bind(order.created_at.naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_transaction(&self, transaction_id: &ObjectId) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, transaction_id, performer_id, buyer_id, product_id, product_type,
                   quantity, unit_price, total_price, delivery_address, status, created_at
            FROM orders
            WHERE transaction_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(transaction_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}
