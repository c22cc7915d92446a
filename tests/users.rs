//! ユーザープロフィール・住所・支払い方法・ウィッシュリストの結合テスト

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use storefront_api::error::ApiError;

use common::{address, request, spawn_app};

#[tokio::test]
async fn profile_is_visible_to_self_and_admin_only() {
    let app = spawn_app(true).await;
    let ada = app.seed_user("ada@example.com", "customer").await;
    let bob = app.seed_user("bob@example.com", "customer").await;
    let admin = app.seed_user("admin@example.com", "admin").await;
    let uri = format!("/api/users/{}", ada);

    let res = app.send(request(Method::GET, &uri, Some(&ada), None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["email"], json!("ada@example.com"));
    assert_eq!(res.body["user"]["paymentMethods"], json!([]));
    assert!(res.body["user"].get("passwordHash").is_none());

    let res = app.send(request(Method::GET, &uri, Some(&bob), None)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.send(request(Method::GET, &uri, Some(&admin), None)).await;
    assert_eq!(res.status, StatusCode::OK);
}

#[tokio::test]
async fn default_addresses_are_updated_by_type() {
    let app = spawn_app(true).await;
    let ada = app.seed_user("ada@example.com", "customer").await;
    let uri = format!("/api/users/{}/address", ada);

    let res = app
        .send(request(
            Method::PUT,
            &uri,
            Some(&ada),
            Some(json!({ "type": "shipping", "address": address() })),
        ))
        .await;
    assert_eq!(res.status, StatusCode::OK, "{}", res.body);
    assert_eq!(res.body["user"]["shippingAddress"]["city"], json!("London"));
    assert_eq!(res.body["user"]["billingAddress"], json!(null));

    let mut incomplete = address();
    incomplete["city"] = json!("");
    let res = app
        .send(request(
            Method::PUT,
            &uri,
            Some(&ada),
            Some(json!({ "type": "billing", "address": incomplete })),
        ))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_methods_keep_only_brand_and_last_four() {
    let app = spawn_app(true).await;
    let ada = app.seed_user("ada@example.com", "customer").await;
    let uri = format!("/api/users/{}/payment-methods", ada);

    let res = app
        .send(request(
            Method::POST,
            &uri,
            Some(&ada),
            Some(json!({
                "cardNumber": "4111 1111 1111 1111",
                "expiryMonth": 12,
                "expiryYear": 2030,
                "label": "Personal",
                "isDefault": true
            })),
        ))
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
    let method = &res.body["user"]["paymentMethods"][0];
    assert_eq!(method["cardBrand"], json!("Visa"));
    assert_eq!(method["last4"], json!("1111"));
    assert_eq!(method["isDefault"], json!(true));
    assert!(!res.body.to_string().contains("4111 1111"));
    assert!(!res.body.to_string().contains("4111111111111111"));

    // 2 枚目を既定にすると 1 枚目は既定でなくなる
    let res = app
        .send(request(
            Method::POST,
            &uri,
            Some(&ada),
            Some(json!({ "cardNumber": "5555-5555-5555-4444", "isDefault": true })),
        ))
        .await;
    assert_eq!(res.status, StatusCode::CREATED);
    let methods = res.body["user"]["paymentMethods"].as_array().unwrap();
    assert_eq!(methods.len(), 2);
    assert_eq!(methods[0]["isDefault"], json!(false));
    assert_eq!(methods[1]["cardBrand"], json!("Mastercard"));
    assert_eq!(methods[1]["isDefault"], json!(true));

    // DB にも全桁は残らない
    let stored: Vec<(String, String)> =
        sqlx::query_as("SELECT card_brand, last4 FROM user_payment_methods ORDER BY rowid")
            .fetch_all(&app.db)
            .await
            .unwrap();
    assert_eq!(
        stored,
        vec![
            ("Visa".to_string(), "1111".to_string()),
            ("Mastercard".to_string(), "4444".to_string()),
        ]
    );

    let res = app
        .send(request(Method::POST, &uri, Some(&ada), Some(json!({ "cardNumber": "4111 1111 1111 1112" }))))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app
        .send(request(
            Method::POST,
            &uri,
            Some(&ada),
            Some(json!({ "cardNumber": "4111 1111 1111 1111", "expiryMonth": 13 })),
        ))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.count("SELECT COUNT(*) FROM user_payment_methods").await, 2);
}

#[tokio::test]
async fn payment_method_removal() {
    let app = spawn_app(true).await;
    let ada = app.seed_user("ada@example.com", "customer").await;
    let bob = app.seed_user("bob@example.com", "customer").await;

    let res = app
        .send(request(
            Method::POST,
            &format!("/api/users/{}/payment-methods", ada),
            Some(&ada),
            Some(json!({ "cardNumber": "4111 1111 1111 1111" })),
        ))
        .await;
    let payment_id = res.body["user"]["paymentMethods"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/users/{}/payment-methods/{}", ada, payment_id);

    let res = app.send(request(Method::DELETE, &uri, Some(&bob), None)).await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.send(request(Method::DELETE, &uri, Some(&ada), None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["paymentMethods"], json!([]));

    let res = app.send(request(Method::DELETE, &uri, Some(&ada), None)).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], json!("Payment method not found"));
}

#[tokio::test]
async fn wishlist_add_is_idempotent_and_remove_works() {
    let app = spawn_app(true).await;
    let ada = app.seed_user("ada@example.com", "customer").await;
    let lamp = app.seed_product("Desk Lamp", 4500, 3).await;
    let uri = format!("/api/users/{}/wishlist/{}", ada, lamp);

    for _ in 0..2 {
        let res = app.send(request(Method::POST, &uri, Some(&ada), None)).await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["user"]["wishlist"], json!([lamp]));
    }

    let res = app
        .send(request(
            Method::POST,
            &format!("/api/users/{}/wishlist/missing", ada),
            Some(&ada),
            None,
        ))
        .await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.body["error"], json!("Product not found"));

    let res = app.send(request(Method::DELETE, &uri, Some(&ada), None)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["user"]["wishlist"], json!([]));
}

#[tokio::test]
async fn duplicate_email_insert_maps_to_validation_error() {
    let app = spawn_app(true).await;
    app.seed_user("ada@example.com", "customer").await;

    // 事前チェックをすり抜けた同時登録と同じ状況
    let err = sqlx::query(r#"
        INSERT INTO users (user_id, firstname, lastname, email, password_hash, role, created_at_ms, updated_at_ms)
        VALUES ('other', 'Ada', 'L', 'ada@example.com', 'x', 'customer', 0, 0)
    "#)
    .execute(&app.db)
    .await
    .unwrap_err();

    let mapped = ApiError::from_unique_violation(err, "Email is already registered");
    assert_eq!(mapped.status(), StatusCode::BAD_REQUEST);
    assert_eq!(mapped.to_string(), "Email is already registered");
}
