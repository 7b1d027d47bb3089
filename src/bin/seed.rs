use clap::Parser;
use chrono::{Duration, Utc};
use fake::{
    faker::{internet::en::Username, lorem::en::Words, name::en::Name},
    Fake,
};
use rand::Rng;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use fanledger::{domain::ObjectId, service::settings_service::SettingsService};

/// Populates a local database with performers, sellable content, coupons
/// and sandbox payment settings.
#[derive(Parser, Debug)]
#[command(name = "seed")]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://fanledger.db?mode=rwc")]
    database_url: String,

    /// Number of performers to create
    #[arg(long, default_value_t = 3)]
    performers: usize,

    /// CCBill salt written to the settings table
    #[arg(long, default_value = "sandbox-salt")]
    ccbill_salt: String,

    /// Moonlight security key written to the settings table
    #[arg(long, default_value = "sandbox-security-key")]
    moonlight_key: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    println!("🌱 Starting database seeding...");

    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&args.database_url)
        .await?;

    println!("📋 Running migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    println!("⚙️  Writing payment settings...");
    seed_settings(&SettingsService::new(db_pool.clone()), &args).await?;

    println!("🎭 Creating performers...");
    for _ in 0..args.performers {
        let performer_id = seed_performer(&db_pool).await?;
        seed_catalog(&db_pool, &performer_id).await?;
        println!("  ✅ Performer {}", performer_id);
    }

    println!("🎟️  Creating coupons...");
    seed_coupon(&db_pool, "WELCOME15", "0.15", true).await?;
    seed_coupon(&db_pool, "HALFOFF", "0.5", false).await?;

    println!("✨ Seeding complete");
    Ok(())
}

async fn seed_settings(settings: &SettingsService, args: &Args) -> anyhow::Result<()> {
    let entries: &[(&str, &str, &str, bool)] = &[
        ("payment.ccbill.account_number", "900000", "payment", false),
        ("payment.ccbill.sub_account", "0000", "payment", false),
        ("payment.ccbill.single_sub_account", "0001", "payment", false),
        ("payment.ccbill.flexform_id", "sandbox-flexform", "payment", false),
        ("payment.ccbill.salt", &args.ccbill_salt, "payment", true),
        ("payment.ccbill.currency_code", "840", "payment", false),
        ("payment.ccbill.datalink_username", "datalink", "payment", false),
        ("payment.ccbill.datalink_password", "datalink-password", "payment", true),
        ("payment.moonlight.security_key", &args.moonlight_key, "payment", true),
        ("commission.monthly_subscription", "0.2", "commission", false),
        ("commission.yearly_subscription", "0.2", "commission", false),
        ("commission.sale_video", "0.2", "commission", false),
        ("commission.sale_gallery", "0.2", "commission", false),
        ("commission.send_tip", "0.1", "commission", false),
        ("commission.product", "0.2", "commission", false),
    ];

    for (key, value, category, sensitive) in entries {
        settings.set_value(key, value, category, *sensitive).await?;
    }
    Ok(())
}

async fn seed_performer(pool: &SqlitePool) -> anyhow::Result<ObjectId> {
    let id = ObjectId::new();
    let display_name: String = Name().fake();
    let username: String = Username().fake();
    let welcome = rand::thread_rng().gen_bool(0.5);

    sqlx::query(
        r#"
        INSERT INTO performers (
            id, username, display_name, monthly_price, yearly_price,
            welcome_message_enabled, welcome_message_text
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.as_str())
    .bind(format!("{}_{}", username, &id.as_str()[18..]))
    .bind(&display_name)
    .bind("9.99")
    .bind("49.99")
    .bind(welcome)
    .bind(welcome.then(|| format!("Thanks for subscribing! - {}", display_name)))
    .execute(pool)
    .await?;

    Ok(id)
}

fn title() -> String {
    let words: Vec<String> = Words(2..5).fake();
    words.join(" ")
}

fn price(rng: &mut impl Rng) -> String {
    format!("{}.99", rng.gen_range(4..40))
}

async fn seed_catalog(pool: &SqlitePool, performer_id: &ObjectId) -> anyhow::Result<()> {
    let mut rng = rand::thread_rng();

    for _ in 0..2 {
        sqlx::query("INSERT INTO galleries (id, performer_id, title, is_sale_gallery, price) VALUES (?, ?, ?, 1, ?)")
            .bind(ObjectId::new().as_str())
            .bind(performer_id.as_str())
            .bind(title())
            .bind(price(&mut rng))
            .execute(pool)
            .await?;

        sqlx::query("INSERT INTO videos (id, performer_id, title, is_sale, price) VALUES (?, ?, ?, 1, ?)")
            .bind(ObjectId::new().as_str())
            .bind(performer_id.as_str())
            .bind(title())
            .bind(price(&mut rng))
            .execute(pool)
            .await?;
    }

    for (product_type, stock) in [("physical", rng.gen_range(1..20)), ("digital", 0)] {
        sqlx::query(
            "INSERT INTO products (id, performer_id, name, description, product_type, price, stock) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(ObjectId::new().as_str())
        .bind(performer_id.as_str())
        .bind(title())
        .bind(title())
        .bind(product_type)
        .bind(price(&mut rng))
        .bind(stock as i64)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn seed_coupon(pool: &SqlitePool, code: &str, value: &str, single_use: bool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO coupons (id, code, value, expired_at, single_use, status)
        VALUES (?, ?, ?, ?, ?, 'active')
        ON CONFLICT(code) DO NOTHING
        "#,
    )
    .bind(ObjectId::new().as_str())
    .bind(code)
    .bind(value)
    .bind((Utc::now() + Duration::days(90)).naive_utc())
    .bind(single_use)
    .execute(pool)
    .await?;

    Ok(())
}
