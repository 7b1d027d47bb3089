use std::sync::Arc;
use std::time::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fanledger::{
    api,
    config::Settings,
    events,
    integrations::{IntegrationManager, messenger::MessengerIntegration},
    payments::{CCBillGateway, Gateways, MoonlightGateway, WebhookReconciler},
    service::{
        settings_service::{SettingsService, SettingsSnapshot},
        Repositories, ServiceContext,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fanledger=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let settings = Settings::new().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        Settings::default()
    });

    tracing::info!("Starting fanledger on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    // Runtime payment settings, refreshed in the background
    let settings_service = Arc::new(SettingsService::new(db_pool.clone()));
    let snapshot = SettingsSnapshot::load(&settings_service).await?;
    snapshot.spawn_refresh(
        settings_service,
        Duration::from_secs(settings.payment.settings_refresh_secs.max(1)),
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let gateways = Gateways::new()
        .with(Arc::new(CCBillGateway::new(
            http.clone(),
            settings.payment.ccbill_flexform_url.clone(),
            settings.payment.ccbill_datalink_url.clone(),
        )))
        .with(Arc::new(MoonlightGateway::new(
            http.clone(),
            settings.payment.moonlight_transact_url.clone(),
        )));

    // Initialize integration manager
    let integration_manager = Arc::new(IntegrationManager::new());

    if let Some(messenger) = MessengerIntegration::new(http, &settings.messaging) {
        integration_manager.register(Arc::new(messenger)).await;
    }

    let health_results = integration_manager.health_check_all().await;
    for (name, result) in health_results {
        match result {
            Ok(_) => tracing::info!("Integration {} is healthy", name),
            Err(e) => tracing::warn!("Integration {} health check failed: {:?}", name, e),
        }
    }

    // Create service context and wire the ledger consumers
    let service_context = Arc::new(ServiceContext::new(
        Repositories::sqlite(db_pool.clone()),
        gateways,
        snapshot,
        integration_manager,
        WebhookReconciler::parse_ranges(&settings.payment.moonlight_allowed_ips),
        db_pool,
    ));
    events::register_consumers(&service_context).await;

    let app = api::create_app(service_context, Arc::new(settings.clone()));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    axum::serve(listener, app).await?;

    Ok(())
}
