//! Health API Handler
//! /api/health エンドポイント

use std::sync::Arc;

use axum::{extract::State, response::Json};
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub env: String,
    /// 起動からの秒数
    pub uptime: u64,
    pub version: String,
    pub db: String,
    pub time: String,
}

/// GET /api/health - ヘルスチェック
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected",
        Err(e) => {
            warn!("Health check DB ping failed: {}", e);
            "disconnected"
        }
    };

    Json(HealthResponse {
        ok: true,
        service: "storefront-api".to_string(),
        env: state.config.env.clone(),
        uptime: state.started_at.elapsed().as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        db: db.to_string(),
        time: chrono::Utc::now().to_rfc3339(),
    })
}
