//! Storefront API
//! 商品カタログ・カート・チェックアウト・在庫管理の REST API

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod inventory;
pub mod models;
pub mod payment;
pub mod pricing;
pub mod seed;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    http::HeaderValue,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::payment::PaymentGateway;

// ========================================
// アプリケーション状態
// ========================================

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub payments: Arc<dyn PaymentGateway>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig, payments: Arc<dyn PaymentGateway>) -> Self {
        Self {
            db,
            config,
            payments,
            started_at: Instant::now(),
        }
    }
}

// ========================================
// ルーター構築
// ========================================

pub fn build_app(state: Arc<AppState>) -> Router {
    use handlers::{admin, auth, cart, health, orders, products, users};

    let api = Router::new()
        .route("/health", get(health::health_check))
        // Auth
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        // Products
        .route("/products", get(products::list_products))
        .route("/products/search", get(products::search_products))
        .route("/products/filter", get(products::filter_products))
        .route("/products/sort", get(products::sort_products))
        .route("/products/:productId", get(products::get_product))
        // Cart
        .route("/cart", post(cart::create_cart))
        .route("/cart/:cartId", get(cart::get_cart).delete(cart::clear_cart))
        .route("/cart/:cartId/items", put(cart::add_item))
        .route(
            "/cart/:cartId/items/:productId",
            patch(cart::set_item_quantity).delete(cart::remove_item),
        )
        // Orders
        .route("/orders", post(orders::create_order))
        .route("/orders/user/:userId", get(orders::get_user_orders))
        .route("/orders/:orderId", get(orders::get_order))
        .route("/orders/:orderId/status", put(orders::update_order_status))
        .route("/orders/:orderId/payment", put(orders::update_payment))
        // Users
        .route("/users/:userId", get(users::get_user))
        .route("/users/:userId/address", put(users::update_address))
        .route("/users/:userId/payment-methods", post(users::add_payment_method))
        .route(
            "/users/:userId/payment-methods/:paymentId",
            delete(users::remove_payment_method),
        )
        .route(
            "/users/:userId/wishlist/:productId",
            post(users::add_to_wishlist).delete(users::remove_from_wishlist),
        )
        // Admin
        .route("/admin/orders", get(admin::list_orders))
        .route("/admin/orders/filter", get(admin::filter_orders))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:userId", put(admin::update_user))
        .route("/admin/users/:userId/orders", get(admin::user_orders))
        .route(
            "/admin/products",
            get(admin::list_products).post(admin::create_product),
        )
        .route(
            "/admin/products/:productId",
            put(admin::update_product).delete(admin::deactivate_product),
        )
        .route("/admin/inventory/:productId", put(admin::adjust_inventory))
        .route("/admin/inventory-logs", get(admin::list_inventory_logs))
        .route(
            "/admin/inventory-logs/product/:productId",
            get(admin::product_inventory_logs),
        );

    let cors = cors_layer(&state.config.cors_origin);

    Router::new()
        .nest("/api", api)
        .fallback(error::route_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `*` は permissive、それ以外は指定オリジンのみ（cookie 送信可）
fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }

    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
        Err(_) => {
            warn!("Invalid CORS_ORIGIN={}, falling back to permissive", origin);
            CorsLayer::permissive()
        }
    }
}
