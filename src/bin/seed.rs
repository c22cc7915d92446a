//! デモデータ投入
//!
//! `cargo run --bin seed` / `cargo run --bin seed -- --reset`

use std::env;

use anyhow::Context;
use tracing::info;

use storefront_api::config::AppConfig;
use storefront_api::db;
use storefront_api::seed::{self, SeedOptions, ADMIN_EMAIL, CUSTOMER_EMAIL};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    let pool = db::init_db(&config.database_url, config.db_max_connections)
        .await
        .context("failed to initialize database")?;

    let opts = SeedOptions {
        reset: env::args().any(|arg| arg == "--reset"),
        admin_password: env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string()),
        customer_password: env::var("SEED_CUSTOMER_PASSWORD")
            .unwrap_or_else(|_| "Customer@123".to_string()),
        bcrypt_cost: config.bcrypt_cost,
    };

    let summary = seed::seed_demo_data(&pool, &opts)
        .await
        .context("seeding failed")?;

    info!("✅ Seed completed: {:?}", summary);
    info!("Login: {} (admin) / {} (customer)", ADMIN_EMAIL, CUSTOMER_EMAIL);
    Ok(())
}
