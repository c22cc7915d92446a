//! 公開カタログの結合テスト

mod common;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use common::{request, spawn_app, TestApp};

async fn seed_catalog(app: &TestApp) {
    let rows = [
        ("Laptop Pro", "Computers", "Lenovo", 189_900),
        ("Laptop Air", "Computers", "Apple", 129_900),
        ("Wireless Mouse", "Accessories", "Logitech", 4_999),
        ("Retired Dock", "Accessories", "Lenovo", 9_900),
    ];
    for (name, category, brand, price_cents) in rows {
        let id = app.seed_product(name, price_cents, 5).await;
        sqlx::query("UPDATE products SET category = ?, brand = ?, description = ? WHERE product_id = ?")
            .bind(category)
            .bind(brand)
            .bind(format!("{} by {}", name, brand))
            .bind(&id)
            .execute(&app.db)
            .await
            .unwrap();
    }
    sqlx::query("UPDATE products SET is_active = 0 WHERE name = 'Retired Dock'")
        .execute(&app.db)
        .await
        .unwrap();
}

fn names(body: &Value) -> Vec<String> {
    body["products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn listing_hides_inactive_products() {
    let app = spawn_app(true).await;
    seed_catalog(&app).await;

    let res = app.send(request(Method::GET, "/api/products", None, None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["total"], json!(3));
    assert!(!names(&res.body).contains(&"Retired Dock".to_string()));
}

#[tokio::test]
async fn search_matches_name_description_and_brand() {
    let app = spawn_app(true).await;
    seed_catalog(&app).await;

    let res = app
        .send(request(Method::GET, "/api/products/search?keyword=laptop", None, None))
        .await;
    assert_eq!(names(&res.body), vec!["Laptop Air", "Laptop Pro"]);

    let res = app
        .send(request(Method::GET, "/api/products/search?keyword=Logitech", None, None))
        .await;
    assert_eq!(names(&res.body), vec!["Wireless Mouse"]);

    let res = app
        .send(request(Method::GET, "/api/products/search", None, None))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn filter_by_category_brand_and_price() {
    let app = spawn_app(true).await;
    seed_catalog(&app).await;

    let res = app
        .send(request(Method::GET, "/api/products/filter?category=Computers&maxPrice=1500", None, None))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(names(&res.body), vec!["Laptop Air"]);

    let res = app
        .send(request(Method::GET, "/api/products/filter?brand=Lenovo", None, None))
        .await;
    assert_eq!(names(&res.body), vec!["Laptop Pro"]);

    let res = app
        .send(request(Method::GET, "/api/products/filter?minPrice=100&maxPrice=10", None, None))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sort_by_price_and_name() {
    let app = spawn_app(true).await;
    seed_catalog(&app).await;

    let res = app
        .send(request(Method::GET, "/api/products/sort?sortBy=price&order=desc", None, None))
        .await;
    assert_eq!(names(&res.body), vec!["Laptop Pro", "Laptop Air", "Wireless Mouse"]);

    let res = app
        .send(request(Method::GET, "/api/products/sort?sortBy=name", None, None))
        .await;
    assert_eq!(names(&res.body), vec!["Laptop Air", "Laptop Pro", "Wireless Mouse"]);

    let res = app
        .send(request(Method::GET, "/api/products/sort?sortBy=rating", None, None))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_product_is_404() {
    let app = spawn_app(true).await;

    let res = app.send(request(Method::GET, "/api/products/nope", None, None)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body, json!({ "ok": false, "error": "Product not found" }));
}

#[tokio::test]
async fn health_reports_database_status() {
    let app = spawn_app(true).await;

    let res = app.send(request(Method::GET, "/api/health", None, None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["ok"], json!(true));
    assert_eq!(res.body["db"], json!("connected"));
    assert_eq!(res.body["env"], json!("development"));
}

#[tokio::test]
async fn malformed_query_and_unknown_routes_use_the_error_envelope() {
    let app = spawn_app(true).await;

    let res = app
        .send(request(Method::GET, "/api/products/filter?minPrice=abc", None, None))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["ok"], json!(false));
    assert!(res.body["error"].is_string());

    let res = app.send(request(Method::GET, "/api/nope", None, None)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body, json!({ "ok": false, "error": "Not Found" }));

    let res = app.send(request(Method::GET, "/elsewhere", None, None)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], json!("Not Found"));
}
