use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use storefront_api::config::AppConfig;
use storefront_api::payment::MockGateway;
use storefront_api::{build_app, db, AppState};

// ========================================
// メイン
// ========================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化
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

    let payments = Arc::new(MockGateway::new(config.payment_decline_every));
    let addr = config.bind_addr();
    let env = config.env.clone();
    let state = Arc::new(AppState::new(pool, config, payments));

    // ルーター構築
    let app = build_app(state);

    info!("🚀 Storefront API Server listening on {} ({})", addr, env);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
