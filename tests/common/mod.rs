//! 結合テスト用ヘルパー
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use storefront_api::auth::hash_password;
use storefront_api::config::AppConfig;
use storefront_api::db::{self, DbPool};
use storefront_api::payment::FixedGateway;
use storefront_api::{build_app, AppState};

pub const PASSWORD: &str = "password123";
/// テストでは最小コスト
pub const BCRYPT_COST: u32 = 4;

pub struct TestApp {
    pub router: Router,
    pub db: DbPool,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// インメモリDB + 固定結果の決済ゲートウェイ
pub async fn spawn_app(approve_payments: bool) -> TestApp {
    let pool = db::init_memory_db().await.unwrap();
    let config = AppConfig {
        bcrypt_cost: BCRYPT_COST,
        ..AppConfig::default()
    };
    let state = Arc::new(AppState::new(
        pool.clone(),
        config,
        Arc::new(FixedGateway { approve: approve_payments }),
    ));
    TestApp {
        router: build_app(state),
        db: pool,
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse { status, headers, body }
    }

    pub async fn seed_user(&self, email: &str, role: &str) -> String {
        let user_id = uuid::Uuid::new_v4().to_string();
        sqlx::query(r#"
            INSERT INTO users (user_id, firstname, lastname, email, password_hash, role, created_at_ms, updated_at_ms)
            VALUES (?, 'Test', 'User', ?, ?, ?, 0, 0)
        "#)
        .bind(&user_id)
        .bind(email)
        .bind(hash_password(PASSWORD, BCRYPT_COST).unwrap())
        .bind(role)
        .execute(&self.db)
        .await
        .unwrap();
        user_id
    }

    pub async fn seed_product(&self, name: &str, price_cents: i64, stock: i64) -> String {
        let product_id = uuid::Uuid::new_v4().to_string();
        sqlx::query(r#"
            INSERT INTO products (product_id, name, price_cents, stock_quantity, is_active, created_at_ms, updated_at_ms)
            VALUES (?, ?, ?, ?, 1, 0, 0)
        "#)
        .bind(&product_id)
        .bind(name)
        .bind(price_cents)
        .bind(stock)
        .execute(&self.db)
        .await
        .unwrap();
        product_id
    }

    pub async fn stock_of(&self, product_id: &str) -> i64 {
        let (stock,): (i64,) = sqlx::query_as("SELECT stock_quantity FROM products WHERE product_id = ?")
            .bind(product_id)
            .fetch_one(&self.db)
            .await
            .unwrap();
        stock
    }

    pub async fn count(&self, sql: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(sql).fetch_one(&self.db).await.unwrap();
        n
    }

    /// ユーザーの open カート ID（なければ作成される）
    pub async fn user_cart_id(&self, user_id: &str) -> String {
        let res = self
            .send(request(Method::GET, &format!("/api/cart/{}", user_id), Some(user_id), None))
            .await;
        assert_eq!(res.status, StatusCode::OK);
        res.body["cart"]["id"].as_str().unwrap().to_string()
    }

    pub async fn add_to_cart(&self, user_id: &str, cart_id: &str, product_id: &str, quantity: i64) -> TestResponse {
        self.send(request(
            Method::PUT,
            &format!("/api/cart/{}/items", cart_id),
            Some(user_id),
            Some(json!({ "productId": product_id, "quantity": quantity })),
        ))
        .await
    }

    pub async fn checkout(&self, user_id: &str) -> TestResponse {
        self.send(request(Method::POST, "/api/orders", Some(user_id), Some(checkout_body(user_id))))
            .await
    }
}

pub fn request(method: Method, uri: &str, user_id: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(id) = user_id {
        builder = builder.header("x-user-id", id);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn address() -> Value {
    json!({
        "fullName": "Ada Lovelace",
        "line1": "12 Analytical Row",
        "city": "London",
        "state": "LDN",
        "postalCode": "N1 9GU",
        "country": "UK"
    })
}

pub fn checkout_body(user_id: &str) -> Value {
    json!({
        "userId": user_id,
        "shippingAddress": address(),
        "billingAddress": address(),
        "billingInfo": {
            "cardNumber": "4111 1111 1111 1111",
            "expiryMonth": 12,
            "expiryYear": 2030,
            "nameOnCard": "Ada Lovelace"
        }
    })
}

/// Set-Cookie から cart_token の値を取り出す
pub fn cart_token_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::SET_COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .next()?
        .strip_prefix("cart_token=")
        .map(str::to_string)
}

/// 浮動小数の金額比較
pub fn assert_amount(value: &Value, expected: f64) {
    let actual = value.as_f64().unwrap_or_else(|| panic!("not a number: {}", value));
    assert!((actual - expected).abs() < 1e-9, "expected {}, got {}", expected, actual);
}
