//! デモデータ投入の結合テスト

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use storefront_api::seed::{seed_demo_data, SeedOptions, SeedSummary, ADMIN_EMAIL, CUSTOMER_EMAIL};

use common::{request, spawn_app, BCRYPT_COST};

fn options(reset: bool) -> SeedOptions {
    SeedOptions {
        reset,
        admin_password: "admin123".to_string(),
        customer_password: "Customer@123".to_string(),
        bcrypt_cost: BCRYPT_COST,
    }
}

#[tokio::test]
async fn seeding_twice_creates_nothing_new() {
    let app = spawn_app(true).await;

    let first = seed_demo_data(&app.db, &options(false)).await.unwrap();
    assert_eq!(
        first,
        SeedSummary {
            products_created: 5,
            orders_created: 1,
            cart_items_added: 2,
        }
    );

    let second = seed_demo_data(&app.db, &options(false)).await.unwrap();
    assert_eq!(second, SeedSummary::default());

    assert_eq!(app.count("SELECT COUNT(*) FROM products").await, 5);
    assert_eq!(app.count("SELECT COUNT(*) FROM users").await, 2);
    assert_eq!(app.count("SELECT COUNT(*) FROM orders").await, 1);
}

#[tokio::test]
async fn stock_always_matches_the_inventory_log() {
    let app = spawn_app(true).await;
    seed_demo_data(&app.db, &options(false)).await.unwrap();

    let rows: Vec<(String, i64, i64)> = sqlx::query_as(r#"
        SELECT p.slug, p.stock_quantity, COALESCE(SUM(l.quantity_change), 0)
        FROM products p
        LEFT JOIN inventory_logs l ON l.product_id = p.product_id
        GROUP BY p.product_id
        ORDER BY p.slug
    "#)
    .fetch_all(&app.db)
    .await
    .unwrap();

    assert_eq!(rows.len(), 5);
    for (slug, stock, logged) in &rows {
        assert_eq!(stock, logged, "{}", slug);
    }

    let stock = |slug: &str| rows.iter().find(|(s, _, _)| s == slug).map(|(_, q, _)| *q);
    // 注文 1 台・破損 1 台・キャンセル戻し 1 台
    assert_eq!(stock("thinkpad-x1-carbon-gen-13"), Some(14));
    assert_eq!(stock("slim-7i-14-intel"), Some(9));
    assert_eq!(stock("loq-15-amd-rtx-5060"), Some(9));
}

#[tokio::test]
async fn reset_rebuilds_the_demo_data() {
    let app = spawn_app(true).await;
    seed_demo_data(&app.db, &options(false)).await.unwrap();
    app.seed_product("Leftover", 100, 1).await;

    let summary = seed_demo_data(&app.db, &options(true)).await.unwrap();
    assert_eq!(summary.products_created, 5);
    assert_eq!(app.count("SELECT COUNT(*) FROM products").await, 5);
    assert_eq!(app.count("SELECT COUNT(*) FROM orders").await, 1);
}

#[tokio::test]
async fn seeded_accounts_can_log_in() {
    let app = spawn_app(true).await;
    seed_demo_data(&app.db, &options(false)).await.unwrap();

    let res = app
        .send(request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": ADMIN_EMAIL, "password": "admin123" })),
        ))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["user"]["role"], json!("admin"));

    let res = app
        .send(request(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": CUSTOMER_EMAIL, "password": "Customer@123" })),
        ))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["cart"]["items"].as_array().unwrap().len(), 2);
    assert_eq!(res.body["cart"]["itemCount"], json!(3));

    let customer_id = res.body["user"]["id"].as_str().unwrap().to_string();
    let res = app
        .send(request(Method::GET, &format!("/api/users/{}", customer_id), Some(&customer_id), None))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["paymentMethods"][0]["last4"], json!("4242"));
    assert!(res.body["user"]["shippingAddress"].is_object());
}
