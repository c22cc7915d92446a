//! Configuration
//! 環境変数からサーバー設定を読み込む

use std::env;

/// サーバー設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub cors_origin: String,
    /// N 回に 1 回決済を拒否する（0 = 拒否しない）
    pub payment_decline_every: u64,
    /// bcrypt のコスト（4〜31）
    pub bcrypt_cost: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: "development".to_string(),
            host: "0.0.0.0".to_string(),
            port: 4000,
            database_url: "sqlite:storefront.db?mode=rwc".to_string(),
            db_max_connections: 5,
            cors_origin: "*".to_string(),
            payment_decline_every: 3,
            bcrypt_cost: 10,
        }
    }
}

impl AppConfig {
    /// 環境変数を読み込み、未設定の項目はデフォルト値を使う
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            env: env::var("APP_ENV").unwrap_or(defaults.env),
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_var("PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS")
                .unwrap_or(defaults.db_max_connections),
            cors_origin: env::var("CORS_ORIGIN").unwrap_or(defaults.cors_origin),
            payment_decline_every: parse_var("PAYMENT_DECLINE_EVERY")
                .unwrap_or(defaults.payment_decline_every),
            bcrypt_cost: parse_var("BCRYPT_COST")
                .filter(|c| (4..=31).contains(c))
                .unwrap_or(defaults.bcrypt_cost),
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={}", key, raw);
            None
        }
    }
}
