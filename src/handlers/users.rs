//! Users API Handlers
//! /api/users エンドポイント - プロフィール / 住所 / 支払い方法 / ウィッシュリスト

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{find_user, AuthUser};
use crate::db::DbPool;
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult};
use crate::models::{
    AddPaymentMethodRequest, AddressType, PaymentMethod, PaymentMethodResponse,
    UpdateAddressRequest, User, UserResponse,
};
use crate::payment;
use crate::AppState;

#[derive(Serialize)]
pub struct UserEnvelope {
    pub ok: bool,
    pub user: UserResponse,
}

// ========================================
// Handlers
// ========================================

/// GET /api/users/:userId - プロフィール取得
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<String>,
    auth: AuthUser,
) -> ApiResult<Json<UserEnvelope>> {
    auth.ensure_self_or_admin(&user_id)?;
    envelope(&state.db, &user_id).await
}

/// PUT /api/users/:userId/address - 既定の請求先 / 配送先住所を更新
pub async fn update_address(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<String>,
    auth: AuthUser,
    ApiJson(req): ApiJson<UpdateAddressRequest>,
) -> ApiResult<Json<UserEnvelope>> {
    auth.ensure_self_or_admin(&user_id)?;
    req.address
        .validate(req.address_type.as_str())
        .map_err(ApiError::Validation)?;

    let sql = match req.address_type {
        AddressType::Shipping => "UPDATE users SET shipping_address = ?, updated_at_ms = ? WHERE user_id = ?",
        AddressType::Billing => "UPDATE users SET billing_address = ?, updated_at_ms = ? WHERE user_id = ?",
    };

    let result = sqlx::query(sql)
        .bind(serde_json::to_string(&req.address)?)
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(&user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("User"));
    }

    info!("Address updated: user_id={}, type={}", user_id, req.address_type);
    envelope(&state.db, &user_id).await
}

/// POST /api/users/:userId/payment-methods - 支払い方法を追加（ブランドと下 4 桁のみ保存）
pub async fn add_payment_method(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<String>,
    auth: AuthUser,
    ApiJson(req): ApiJson<AddPaymentMethodRequest>,
) -> ApiResult<(StatusCode, Json<UserEnvelope>)> {
    auth.ensure_self_or_admin(&user_id)?;
    find_user(&state.db, &user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    if !payment::validate_card(&req.card_number) {
        return Err(ApiError::validation("Invalid card number"));
    }
    if let Some(month) = req.expiry_month {
        if !(1..=12).contains(&month) {
            return Err(ApiError::validation("expiryMonth must be between 1 and 12"));
        }
    }

    let method = PaymentMethod {
        payment_id: Uuid::new_v4().to_string(),
        user_id: user_id.clone(),
        card_brand: payment::card_brand(&req.card_number).to_string(),
        last4: payment::last_four(&req.card_number),
        expiry_month: req.expiry_month.map(i64::from),
        expiry_year: req.expiry_year.map(i64::from),
        label: req.label,
        is_default: i32::from(req.is_default),
        created_at_ms: chrono::Utc::now().timestamp_millis(),
    };

    let mut tx = state.db.begin().await?;

    // 既定は 1 件のみ
    if req.is_default {
        sqlx::query("UPDATE user_payment_methods SET is_default = 0 WHERE user_id = ?")
            .bind(&user_id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(r#"
        INSERT INTO user_payment_methods
            (payment_id, user_id, card_brand, last4, expiry_month, expiry_year, label, is_default, created_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&method.payment_id)
    .bind(&method.user_id)
    .bind(&method.card_brand)
    .bind(&method.last4)
    .bind(method.expiry_month)
    .bind(method.expiry_year)
    .bind(&method.label)
    .bind(method.is_default)
    .bind(method.created_at_ms)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Payment method added: user_id={}, brand={}, last4={}",
        user_id, method.card_brand, method.last4
    );

    let Json(body) = envelope(&state.db, &user_id).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// DELETE /api/users/:userId/payment-methods/:paymentId - 支払い方法を削除
pub async fn remove_payment_method(
    State(state): State<Arc<AppState>>,
    ApiPath((user_id, payment_id)): ApiPath<(String, String)>,
    auth: AuthUser,
) -> ApiResult<Json<UserEnvelope>> {
    auth.ensure_self_or_admin(&user_id)?;

    let result = sqlx::query("DELETE FROM user_payment_methods WHERE payment_id = ? AND user_id = ?")
        .bind(&payment_id)
        .bind(&user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Payment method"));
    }

    info!("Payment method removed: user_id={}, payment_id={}", user_id, payment_id);
    envelope(&state.db, &user_id).await
}

/// POST /api/users/:userId/wishlist/:productId - ウィッシュリストに追加
pub async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    ApiPath((user_id, product_id)): ApiPath<(String, String)>,
    auth: AuthUser,
) -> ApiResult<Json<UserEnvelope>> {
    auth.ensure_self_or_admin(&user_id)?;

    let exists: Option<(String,)> = sqlx::query_as("SELECT product_id FROM products WHERE product_id = ?")
        .bind(&product_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(ApiError::ProductNotFound);
    }

    sqlx::query("INSERT OR IGNORE INTO wishlist (user_id, product_id, added_at_ms) VALUES (?, ?, ?)")
        .bind(&user_id)
        .bind(&product_id)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&state.db)
        .await?;

    envelope(&state.db, &user_id).await
}

/// DELETE /api/users/:userId/wishlist/:productId - ウィッシュリストから削除
pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    ApiPath((user_id, product_id)): ApiPath<(String, String)>,
    auth: AuthUser,
) -> ApiResult<Json<UserEnvelope>> {
    auth.ensure_self_or_admin(&user_id)?;

    sqlx::query("DELETE FROM wishlist WHERE user_id = ? AND product_id = ?")
        .bind(&user_id)
        .bind(&product_id)
        .execute(&state.db)
        .await?;

    envelope(&state.db, &user_id).await
}

// ========================================
// Helpers
// ========================================

async fn envelope(db: &DbPool, user_id: &str) -> ApiResult<Json<UserEnvelope>> {
    let user = find_user(db, user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    Ok(Json(UserEnvelope {
        ok: true,
        user: user_response(db, &user).await?,
    }))
}

/// 支払い方法とウィッシュリストを含むユーザー情報
pub(crate) async fn user_response(db: &DbPool, user: &User) -> ApiResult<UserResponse> {
    let methods: Vec<PaymentMethod> = sqlx::query_as(
        "SELECT * FROM user_payment_methods WHERE user_id = ? ORDER BY created_at_ms, rowid"
    )
    .bind(&user.user_id)
    .fetch_all(db)
    .await?;

    let wishlist: Vec<(String,)> =
        sqlx::query_as("SELECT product_id FROM wishlist WHERE user_id = ? ORDER BY added_at_ms, rowid")
            .bind(&user.user_id)
            .fetch_all(db)
            .await?;

    Ok(UserResponse::from_user(
        user,
        methods.iter().map(PaymentMethodResponse::from_row).collect(),
        wishlist.into_iter().map(|(id,)| id).collect(),
    ))
}
