pub mod cancellation;
pub mod earning_calculator;
pub mod ledger;
pub mod notification_trigger;
pub mod order_creator;
pub mod settings_service;
pub mod subscription_sync;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::repository::*;
use crate::events::EventBus;
use crate::integrations::IntegrationManager;
use crate::payments::{Gateways, IpRange, WebhookReconciler};
use cancellation::CancellationService;
use ledger::TransactionLedger;
use settings_service::{SettingsService, SettingsSnapshot};

/// Repositories the services are built over; swapped for fakes in tests.
#[derive(Clone)]
pub struct Repositories {
    pub transactions: Arc<dyn TransactionRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub earnings: Arc<dyn EarningRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub performers: Arc<dyn PerformerRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub coupons: Arc<dyn CouponRepository>,
}

impl Repositories {
    pub fn sqlite(pool: SqlitePool) -> Self {
        let catalog = Arc::new(SqliteCatalogRepository::new(pool.clone()));
        Self {
            transactions: Arc::new(SqliteTransactionRepository::new(pool.clone())),
            subscriptions: Arc::new(SqliteSubscriptionRepository::new(pool.clone())),
            earnings: Arc::new(SqliteEarningRepository::new(pool.clone())),
            orders: Arc::new(SqliteOrderRepository::new(pool)),
            performers: catalog.clone(),
            catalog: catalog.clone(),
            coupons: catalog,
        }
    }
}

pub struct ServiceContext {
    pub repos: Repositories,
    pub settings_service: Arc<SettingsService>,
    pub settings: SettingsSnapshot,
    pub gateways: Gateways,
    pub bus: Arc<EventBus>,
    pub integration_manager: Arc<IntegrationManager>,
    pub ledger: Arc<TransactionLedger>,
    pub reconciler: Arc<WebhookReconciler>,
    pub cancellation: Arc<CancellationService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    pub fn new(
        repos: Repositories,
        gateways: Gateways,
        settings: SettingsSnapshot,
        integration_manager: Arc<IntegrationManager>,
        moonlight_ranges: Vec<IpRange>,
        db_pool: SqlitePool,
    ) -> Self {
        let settings_service = Arc::new(SettingsService::new(db_pool.clone()));
        let bus = Arc::new(EventBus::new());

        let ledger = Arc::new(TransactionLedger::new(
            repos.transactions.clone(),
            repos.performers.clone(),
            repos.catalog.clone(),
            repos.coupons.clone(),
            gateways.clone(),
            settings.clone(),
        ));
        let reconciler = Arc::new(WebhookReconciler::new(
            repos.transactions.clone(),
            ledger.clone(),
            bus.clone(),
            moonlight_ranges,
        ));
        let cancellation = Arc::new(CancellationService::new(
            repos.subscriptions.clone(),
            repos.transactions.clone(),
            repos.performers.clone(),
            gateways.clone(),
            settings.clone(),
            bus.clone(),
        ));

        Self {
            repos,
            settings_service,
            settings,
            gateways,
            bus,
            integration_manager,
            ledger,
            reconciler,
            cancellation,
            db_pool,
        }
    }
}
