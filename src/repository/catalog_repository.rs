use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::{
    domain::{
        CatalogProductType, CommissionSettings, Coupon, Gallery, ObjectId, Performer,
        PerformerPaymentSettings, Product, Video, WelcomeMediaType, WelcomeMessage,
    },
    error::{AppError, Result},
    repository::{
        parse_decimal, parse_id, to_utc, CatalogRepository, CouponRepository, PerformerRepository,
    },
};

#[derive(FromRow)]
struct PerformerRow {
    id: String,
    username: String,
    display_name: String,
    monthly_price: String,
    yearly_price: String,
    welcome_message_enabled: bool,
    welcome_message_text: Option<String>,
    welcome_media_type: Option<String>,
    welcome_media_id: Option<String>,
}

#[derive(FromRow)]
struct CommissionRow {
    monthly_subscription: Option<String>,
    yearly_subscription: Option<String>,
    sale_video: Option<String>,
    sale_gallery: Option<String>,
    send_tip: Option<String>,
    product: Option<String>,
}

#[derive(FromRow)]
struct GatewaySettingsRow {
    gateway: String,
    settings: String,
}

#[derive(FromRow)]
struct GalleryRow {
    id: String,
    performer_id: String,
    title: String,
    is_sale_gallery: bool,
    price: String,
}

#[derive(FromRow)]
struct VideoRow {
    id: String,
    performer_id: String,
    title: String,
    is_sale: bool,
    price: String,
}

#[derive(FromRow)]
struct ProductRow {
    id: String,
    performer_id: String,
    name: String,
    description: Option<String>,
    product_type: String,
    price: String,
    stock: i64,
}

#[derive(FromRow)]
struct CouponRow {
    id: String,
    code: String,
    value: String,
    expired_at: NaiveDateTime,
    single_use: bool,
    status: String,
}

/// Lookups into tables owned by the profile, media and shop services.
pub struct SqliteCatalogRepository {
    pool: SqlitePool,
}

impl SqliteCatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_performer(row: PerformerRow) -> Result<Performer> {
        let welcome_message = if row.welcome_message_enabled {
            Some(WelcomeMessage {
                text: row.welcome_message_text.unwrap_or_default(),
                media_type: match row.welcome_media_type.as_deref() {
                    Some("image") => Some(WelcomeMediaType::Image),
                    Some("video") => Some(WelcomeMediaType::Video),
                    _ => None,
                },
                media_id: row.welcome_media_id,
            })
        } else {
            None
        };

        Ok(Performer {
            id: parse_id(&row.id)?,
            username: row.username,
            display_name: row.display_name,
            monthly_price: parse_decimal(&row.monthly_price)?,
            yearly_price: parse_decimal(&row.yearly_price)?,
            welcome_message,
        })
    }

    fn row_to_commission(row: CommissionRow) -> Result<CommissionSettings> {
        let parse = |v: Option<String>| v.as_deref().map(parse_decimal).transpose();
        Ok(CommissionSettings {
            monthly_subscription: parse(row.monthly_subscription)?,
            yearly_subscription: parse(row.yearly_subscription)?,
            sale_video: parse(row.sale_video)?,
            sale_gallery: parse(row.sale_gallery)?,
            send_tip: parse(row.send_tip)?,
            product: parse(row.product)?,
        })
    }

    fn row_to_product(row: ProductRow) -> Result<Product> {
        let product_type = match row.product_type.as_str() {
            "physical" => CatalogProductType::Physical,
            "digital" => CatalogProductType::Digital,
            other => return Err(AppError::Database(format!("Invalid product type: {}", other))),
        };

        Ok(Product {
            id: parse_id(&row.id)?,
            performer_id: parse_id(&row.performer_id)?,
            name: row.name,
            description: row.description,
            product_type,
            price: parse_decimal(&row.price)?,
            stock: row.stock,
        })
    }
}

#[async_trait]
impl PerformerRepository for SqliteCatalogRepository {
    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<Performer>> {
        let row = sqlx::query_as::<_, PerformerRow>(
            r#"
            SELECT id, username, display_name, monthly_price, yearly_price,
                   welcome_message_enabled, welcome_message_text,
                   welcome_media_type, welcome_media_id
            FROM performers
            WHERE id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_performer).transpose()
    }

    async fn find_payment_settings(&self, id: &ObjectId) -> Result<PerformerPaymentSettings> {
        let commission = sqlx::query_as::<_, CommissionRow>(
            r#"
            SELECT monthly_subscription, yearly_subscription, sale_video,
                   sale_gallery, send_tip, product
            FROM performer_commissions
            WHERE performer_id = ?
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_commission)
        .transpose()?
        .unwrap_or_default();

        let gateway_rows = sqlx::query_as::<_, GatewaySettingsRow>(
            "SELECT gateway, settings FROM performer_gateway_settings WHERE performer_id = ?",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut settings = PerformerPaymentSettings {
            commission,
            ..Default::default()
        };
        for row in gateway_rows {
            let value: serde_json::Value = serde_json::from_str(&row.settings)
                .map_err(|e| AppError::Database(e.to_string()))?;
            match row.gateway.as_str() {
                "ccbill" => settings.ccbill = Some(value),
                "moonlight" => settings.moonlight = Some(value),
                other => tracing::warn!("Ignoring gateway settings for unknown gateway {}", other),
            }
        }

        Ok(settings)
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    async fn find_gallery(&self, id: &ObjectId) -> Result<Option<Gallery>> {
        let row = sqlx::query_as::<_, GalleryRow>(
            "SELECT id, performer_id, title, is_sale_gallery, price FROM galleries WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(Gallery {
                id: parse_id(&r.id)?,
                performer_id: parse_id(&r.performer_id)?,
                title: r.title,
                is_sale_gallery: r.is_sale_gallery,
                price: parse_decimal(&r.price)?,
            })
        })
        .transpose()
    }

    async fn find_video(&self, id: &ObjectId) -> Result<Option<Video>> {
        let row = sqlx::query_as::<_, VideoRow>(
            "SELECT id, performer_id, title, is_sale, price FROM videos WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(Video {
                id: parse_id(&r.id)?,
                performer_id: parse_id(&r.performer_id)?,
                title: r.title,
                is_sale: r.is_sale,
                price: parse_decimal(&r.price)?,
            })
        })
        .transpose()
    }

    async fn find_products(&self, ids: &[ObjectId]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, performer_id, name, description, product_type, price, stock FROM products WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = builder
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn decrement_stock(&self, product_id: &ObjectId, quantity: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET stock = stock - ? WHERE id = ? AND stock >= ?",
        )
        .bind(quantity as i64)
        .bind(product_id.as_str())
        .bind(quantity as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CouponRepository for SqliteCatalogRepository {
    async fn find_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row = sqlx::query_as::<_, CouponRow>(
            "SELECT id, code, value, expired_at, single_use, status FROM coupons WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(Coupon {
                id: parse_id(&r.id)?,
                code: r.code,
                value: parse_decimal(&r.value)?,
                expired_at: to_utc(r.expired_at),
                single_use: r.single_use,
                active: r.status == "active",
            })
        })
        .transpose()
    }

    async fn count_usages(&self, coupon_id: &ObjectId, user_id: &ObjectId) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = ? AND user_id = ?",
        )
        .bind(coupon_id.as_str())
        .bind(user_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn claim_usage(
        &self,
        coupon_id: &ObjectId,
        user_id: &ObjectId,
        transaction_id: &ObjectId,
    ) -> Result<bool> {
        // A single statement, so the single-use check and the insert cannot
        // interleave with another claim.
        let result = sqlx::query(
            r#"
            INSERT INTO coupon_usages (coupon_id, user_id, transaction_id, created_at)
            SELECT c.id, ?, ?, ?
            FROM coupons c
            WHERE c.id = ?
              AND (c.single_use = 0 OR NOT EXISTS (
                  SELECT 1 FROM coupon_usages u
                  WHERE u.coupon_id = c.id AND u.user_id = ?
              ))
            "#,
        )
        .bind(user_id.as_str())
        .bind(transaction_id.as_str())
        .bind(Utc::now().naive_utc())
        .bind(coupon_id.as_str())
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_usage(&self, transaction_id: &ObjectId) -> Result<()> {
        sqlx::query("DELETE FROM coupon_usages WHERE transaction_id = ?")
            .bind(transaction_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
