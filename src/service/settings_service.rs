use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tokio::sync::RwLock;

use crate::{
    domain::{AppSetting, PaymentSettings, SettingType},
    error::Result,
};

#[derive(FromRow)]
struct SettingRow {
    key: String,
    value: String,
    value_type: String,
    category: String,
    description: Option<String>,
    is_sensitive: bool,
    updated_at: NaiveDateTime,
}

/// Key/value store backing runtime payment settings.
pub struct SettingsService {
    pool: SqlitePool,
}

impl SettingsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_setting(&self, row: SettingRow) -> AppSetting {
        AppSetting {
            key: row.key,
            value: row.value,
            value_type: self.parse_setting_type(&row.value_type),
            category: row.category,
            description: row.description,
            is_sensitive: row.is_sensitive,
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        }
    }

    fn parse_setting_type(&self, type_str: &str) -> SettingType {
        match type_str {
            "number" => SettingType::Number,
            "boolean" => SettingType::Boolean,
            "json" => SettingType::Json,
            _ => SettingType::String,
        }
    }

    pub async fn get_settings_by_category(&self, category: &str) -> Result<Vec<AppSetting>> {
        let rows = sqlx::query_as::<_, SettingRow>(
            r#"
            SELECT key, value, value_type, category, description, is_sensitive, updated_at
            FROM app_settings
            WHERE category = ?
            ORDER BY key
            "#
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| self.row_to_setting(r)).collect())
    }

    /// Inserts or replaces a setting row.
    pub async fn set_value(&self, key: &str, value: &str, category: &str, is_sensitive: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, value_type, category, is_sensitive, updated_at)
            VALUES (?, ?, 'string', ?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#
        )
        .bind(key)
        .bind(value)
        .bind(category)
        .bind(is_sensitive)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn load_payment_settings(&self) -> Result<PaymentSettings> {
        let mut settings = self.get_settings_by_category("payment").await?;
        settings.extend(self.get_settings_by_category("commission").await?);
        Ok(PaymentSettings::from_settings(&settings))
    }
}

/// Shared, periodically refreshed copy of [`PaymentSettings`]. Consumers
/// take a cheap clone per operation instead of querying the store.
#[derive(Clone)]
pub struct SettingsSnapshot {
    current: Arc<RwLock<Arc<PaymentSettings>>>,
}

impl SettingsSnapshot {
    pub fn new(initial: PaymentSettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub async fn load(service: &SettingsService) -> Result<Self> {
        Ok(Self::new(service.load_payment_settings().await?))
    }

    pub async fn current(&self) -> Arc<PaymentSettings> {
        self.current.read().await.clone()
    }

    pub async fn refresh(&self, service: &SettingsService) -> Result<()> {
        let fresh = service.load_payment_settings().await?;
        let mut current = self.current.write().await;
        if **current != fresh {
            tracing::info!("Payment settings changed, snapshot refreshed");
        }
        *current = Arc::new(fresh);
        Ok(())
    }

    /// Refreshes the snapshot every `every` until the runtime shuts down.
    pub fn spawn_refresh(&self, service: Arc<SettingsService>, every: Duration) -> tokio::task::JoinHandle<()> {
        let snapshot = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick completes immediately; the snapshot was just loaded.
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = snapshot.refresh(&service).await {
                    tracing::warn!("Failed to refresh payment settings: {:?}", e);
                }
            }
        })
    }
}
