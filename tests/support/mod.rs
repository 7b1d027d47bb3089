#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fanledger::{
    domain::*,
    error::{AppError, Result},
    events,
    integrations::{Integration, IntegrationManager, NotificationEvent},
    payments::{
        CancelOutcome, CheckoutGateway, CheckoutInstructions, CheckoutRequest, GatewayAccount,
        Gateways, IpRange,
    },
    repository::{SqliteTransactionRepository, TransactionRepository},
    service::{
        ledger::PurchaseOptions, settings_service::SettingsSnapshot, Repositories, ServiceContext,
    },
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    // A single connection that never recycles keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub fn dec(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

pub fn info(value: Value) -> ResponseInfo {
    value.as_object().cloned().unwrap_or_default()
}

/// Gateway double: CCBill-style redirects or Moonlight-style charges, with
/// switchable checkout and cancel results.
pub struct ScriptedGateway {
    kind: PaymentGateway,
    checkout_declined: AtomicBool,
    cancel_succeeds: AtomicBool,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub cancelled: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(kind: PaymentGateway) -> Self {
        Self {
            kind,
            checkout_declined: AtomicBool::new(false),
            cancel_succeeds: AtomicBool::new(true),
            checkouts: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    pub fn set_cancel_succeeds(&self, succeeds: bool) {
        self.cancel_succeeds.store(succeeds, Ordering::SeqCst);
    }

    pub fn set_checkout_declined(&self, declined: bool) {
        self.checkout_declined.store(declined, Ordering::SeqCst);
    }

    fn instructions(&self, request: &CheckoutRequest) -> Result<CheckoutInstructions> {
        self.checkouts.lock().unwrap().push(request.clone());
        if self.checkout_declined.load(Ordering::SeqCst) {
            return Err(AppError::ExternalGateway("Card declined".to_string()));
        }
        Ok(match self.kind {
            PaymentGateway::Ccbill => CheckoutInstructions::Redirect {
                url: format!("https://flexforms.test/form?transactionId={}", request.transaction_id),
            },
            PaymentGateway::Moonlight => CheckoutInstructions::Charged {
                response: info(json!({
                    "response": "1",
                    "transactionid": format!("ml-{}", request.transaction_id),
                    "subscription_id": format!("mls-{}", request.transaction_id),
                })),
            },
        })
    }
}

#[async_trait]
impl CheckoutGateway for ScriptedGateway {
    fn kind(&self) -> PaymentGateway {
        self.kind
    }

    fn validate_account(&self, _account: &GatewayAccount, _subscription: bool) -> Result<()> {
        Ok(())
    }

    async fn subscription_checkout(
        &self,
        _account: &GatewayAccount,
        request: &CheckoutRequest,
    ) -> Result<CheckoutInstructions> {
        self.instructions(request)
    }

    async fn single_purchase_checkout(
        &self,
        _account: &GatewayAccount,
        request: &CheckoutRequest,
    ) -> Result<CheckoutInstructions> {
        self.instructions(request)
    }

    async fn cancel_subscription(
        &self,
        _account: &GatewayAccount,
        subscription_id: &str,
    ) -> Result<CancelOutcome> {
        self.cancelled.lock().unwrap().push(subscription_id.to_string());
        Ok(CancelOutcome {
            success: self.cancel_succeeds.load(Ordering::SeqCst),
        })
    }
}

/// Captures everything the notification trigger sends.
#[derive(Default)]
pub struct RecordingIntegration {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingIntegration {
    pub fn snapshot(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Notifications are sent from a spawned task.
    pub async fn wait_for(&self, count: usize) -> Vec<NotificationEvent> {
        for _ in 0..100 {
            let events = self.snapshot();
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.snapshot()
    }
}

#[async_trait]
impl Integration for RecordingIntegration {
    fn name(&self) -> &str {
        "Recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn handle_event(&self, event: &NotificationEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// SQLite ledger that counts read lookups.
pub struct CountingTransactions {
    inner: SqliteTransactionRepository,
    pub lookups: AtomicUsize,
}

impl CountingTransactions {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            inner: SqliteTransactionRepository::new(pool),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.lookups.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransactionRepository for CountingTransactions {
    async fn create(&self, transaction: PaymentTransaction) -> Result<PaymentTransaction> {
        self.inner.create(transaction).await
    }

    async fn create_if_new(&self, transaction: PaymentTransaction) -> Result<Option<PaymentTransaction>> {
        self.inner.create_if_new(transaction).await
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<PaymentTransaction>> {
        self.count();
        self.inner.find_by_id(id).await
    }

    async fn find_latest_by_subscription_id(
        &self,
        gateway: PaymentGateway,
        subscription_id: &str,
    ) -> Result<Option<PaymentTransaction>> {
        self.count();
        self.inner.find_latest_by_subscription_id(gateway, subscription_id).await
    }

    async fn record_response_info(&self, id: &ObjectId, info: &ResponseInfo) -> Result<()> {
        self.inner.record_response_info(id, info).await
    }

    async fn mark_success(&self, id: &ObjectId, info: &ResponseInfo) -> Result<Option<PaymentTransaction>> {
        self.count();
        self.inner.mark_success(id, info).await
    }

    async fn mark_cancelled(&self, id: &ObjectId) -> Result<bool> {
        self.inner.mark_cancelled(id).await
    }

    async fn count_successful_subscriptions(
        &self,
        user_id: &ObjectId,
        performer_id: &ObjectId,
    ) -> Result<i64> {
        self.inner.count_successful_subscriptions(user_id, performer_id).await
    }
}

/// A fully wired service context over an in-memory database with scripted
/// gateways.
pub struct TestApp {
    pub pool: SqlitePool,
    pub ctx: Arc<ServiceContext>,
    pub ccbill: Arc<ScriptedGateway>,
    pub moonlight: Arc<ScriptedGateway>,
    pub transactions: Arc<CountingTransactions>,
    pub notifications: Arc<RecordingIntegration>,
}

impl TestApp {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_settings(PaymentSettings::default()).await
    }

    pub async fn with_settings(settings: PaymentSettings) -> anyhow::Result<Self> {
        let pool = test_pool().await?;
        let transactions = Arc::new(CountingTransactions::new(pool.clone()));
        let mut repos = Repositories::sqlite(pool.clone());
        repos.transactions = transactions.clone() as Arc<dyn TransactionRepository>;

        let ccbill = Arc::new(ScriptedGateway::new(PaymentGateway::Ccbill));
        let moonlight = Arc::new(ScriptedGateway::new(PaymentGateway::Moonlight));
        let gateways = Gateways::new().with(ccbill.clone()).with(moonlight.clone());

        let notifications = Arc::new(RecordingIntegration::default());
        let integration_manager = Arc::new(IntegrationManager::new());
        integration_manager.register(notifications.clone()).await;

        let ranges: Vec<IpRange> = vec![
            "104.192.32.81-104.192.32.87".parse()?,
            "104.192.36.81-104.192.36.87".parse()?,
        ];

        let ctx = Arc::new(ServiceContext::new(
            repos,
            gateways,
            SettingsSnapshot::new(settings),
            integration_manager,
            ranges,
            pool.clone(),
        ));
        events::register_consumers(&ctx).await;

        Ok(Self {
            pool,
            ctx,
            ccbill,
            moonlight,
            transactions,
            notifications,
        })
    }

    pub async fn transaction(&self, id: &ObjectId) -> anyhow::Result<PaymentTransaction> {
        self.ctx
            .repos
            .transactions
            .find_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("transaction {} missing", id))
    }

    /// Delivers a CCBill `NewSaleSuccess` for `id`.
    pub async fn ccbill_sale(&self, id: &ObjectId, provider_txn: &str, subscription_id: Option<&str>) -> bool {
        let mut payload = json!({
            "X-transactionId": id.as_str(),
            "transactionId": provider_txn,
            "timestamp": "2026-10-16 12:00:00",
        });
        if let Some(sub) = subscription_id {
            payload["subscriptionId"] = json!(sub);
        }
        self.ctx
            .reconciler
            .handle_ccbill(Some("NewSaleSuccess"), info(payload))
            .await
    }
}

pub fn ccbill() -> PurchaseOptions {
    PurchaseOptions {
        gateway: PaymentGateway::Ccbill,
        coupon_code: None,
        payment_token: None,
    }
}

pub fn moonlight() -> PurchaseOptions {
    PurchaseOptions {
        gateway: PaymentGateway::Moonlight,
        coupon_code: None,
        payment_token: Some("tok_test".to_string()),
    }
}

pub async fn insert_performer(
    pool: &SqlitePool,
    monthly: &str,
    yearly: &str,
    welcome: Option<&str>,
) -> anyhow::Result<ObjectId> {
    let id = ObjectId::new();
    sqlx::query(
        r#"
        INSERT INTO performers (
            id, username, display_name, monthly_price, yearly_price,
            welcome_message_enabled, welcome_message_text, welcome_media_type
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.as_str())
    .bind(format!("performer_{}", id))
    .bind("Test Performer")
    .bind(monthly)
    .bind(yearly)
    .bind(welcome.is_some())
    .bind(welcome)
    .bind(welcome.map(|_| "image"))
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn insert_gallery(
    pool: &SqlitePool,
    performer_id: &ObjectId,
    price: &str,
    for_sale: bool,
) -> anyhow::Result<ObjectId> {
    let id = ObjectId::new();
    sqlx::query("INSERT INTO galleries (id, performer_id, title, is_sale_gallery, price) VALUES (?, ?, ?, ?, ?)")
        .bind(id.as_str())
        .bind(performer_id.as_str())
        .bind("Beach set")
        .bind(for_sale)
        .bind(price)
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn insert_video(pool: &SqlitePool, performer_id: &ObjectId, price: &str) -> anyhow::Result<ObjectId> {
    let id = ObjectId::new();
    sqlx::query("INSERT INTO videos (id, performer_id, title, is_sale, price) VALUES (?, ?, ?, 1, ?)")
        .bind(id.as_str())
        .bind(performer_id.as_str())
        .bind("Behind the scenes")
        .bind(price)
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn insert_product(
    pool: &SqlitePool,
    performer_id: &ObjectId,
    product_type: &str,
    price: &str,
    stock: i64,
) -> anyhow::Result<ObjectId> {
    let id = ObjectId::new();
    sqlx::query(
        "INSERT INTO products (id, performer_id, name, description, product_type, price, stock) VALUES (?, ?, ?, NULL, ?, ?, ?)",
    )
    .bind(id.as_str())
    .bind(performer_id.as_str())
    .bind(format!("{} item", product_type))
    .bind(product_type)
    .bind(price)
    .bind(stock)
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn insert_coupon(
    pool: &SqlitePool,
    code: &str,
    value: &str,
    single_use: bool,
    expired_at: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO coupons (id, code, value, expired_at, single_use, status) VALUES (?, ?, ?, ?, ?, 'active')")
        .bind(ObjectId::new().as_str())
        .bind(code)
        .bind(value)
        .bind(expired_at.naive_utc())
        .bind(single_use)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_performer_commission(
    pool: &SqlitePool,
    performer_id: &ObjectId,
    sale_video: &str,
) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO performer_commissions (performer_id, sale_video) VALUES (?, ?)")
        .bind(performer_id.as_str())
        .bind(sale_video)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> anyhow::Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?)
}
