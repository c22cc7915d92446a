//! Orders API Handlers
//! /api/orders エンドポイント - チェックアウト / 注文履歴 / 管理者によるステータス更新

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
};
use serde::Serialize;
use tracing::info;

use crate::auth::{AdminUser, AuthUser};
use crate::checkout;
use crate::db::DbPool;
use crate::error::{ApiError, ApiJson, ApiPath, ApiResult};
use crate::models::{
    CheckoutRequest, Order, OrderItem, OrderResponse, UpdateOrderStatusRequest, UpdatePaymentRequest,
};
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct OrderEnvelope {
    pub ok: bool,
    pub order: OrderResponse,
}

#[derive(Serialize)]
pub struct OrderListResponse {
    pub ok: bool,
    pub orders: Vec<OrderResponse>,
    pub total: usize,
}

impl OrderListResponse {
    pub fn new(orders: Vec<OrderResponse>) -> Self {
        Self {
            ok: true,
            total: orders.len(),
            orders,
        }
    }
}

// ========================================
// Handlers
// ========================================

/// POST /api/orders - チェックアウト
///
/// body の userId が優先。省略時は認証ヘッダーのユーザー。
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: Option<AuthUser>,
    ApiJson(mut req): ApiJson<CheckoutRequest>,
) -> ApiResult<Json<OrderEnvelope>> {
    if let Some(auth) = &auth {
        match req.user_id.clone() {
            None => req.user_id = Some(auth.0.user_id.clone()),
            Some(body_id) => auth.ensure_self_or_admin(&body_id)?,
        }
    }

    let order = checkout::checkout(&state.db, state.payments.as_ref(), req).await?;

    Ok(Json(OrderEnvelope { ok: true, order }))
}

/// GET /api/orders/:orderId - 注文詳細（本人または管理者）
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    ApiPath(order_id): ApiPath<String>,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<OrderEnvelope>> {
    let order = find_order(&state.db, &order_id).await?;

    // 他人の注文は存在しないものとして扱う
    if order.user_id != user.user_id && !user.is_admin() {
        return Err(ApiError::NotFound("Order"));
    }

    Ok(Json(OrderEnvelope {
        ok: true,
        order: order_response(&state.db, &order).await?,
    }))
}

/// GET /api/orders/user/:userId - 注文履歴（新しい順）
pub async fn get_user_orders(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<String>,
    auth: AuthUser,
) -> ApiResult<Json<OrderListResponse>> {
    auth.ensure_self_or_admin(&user_id)?;

    let rows: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at_ms DESC, rowid DESC"
    )
    .bind(&user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(OrderListResponse::new(order_responses(&state.db, &rows).await?)))
}

/// PUT /api/orders/:orderId/status - 注文ステータス更新（管理者）
pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    ApiPath(order_id): ApiPath<String>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<UpdateOrderStatusRequest>,
) -> ApiResult<Json<OrderEnvelope>> {
    let result = sqlx::query("UPDATE orders SET order_status = ?, updated_at_ms = ? WHERE order_id = ?")
        .bind(req.status.as_str())
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(&order_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Order"));
    }

    info!(
        "Order status updated: order_id={}, status={}, admin_id={}",
        order_id, req.status, admin.user_id
    );

    let order = find_order(&state.db, &order_id).await?;
    Ok(Json(OrderEnvelope {
        ok: true,
        order: order_response(&state.db, &order).await?,
    }))
}

/// PUT /api/orders/:orderId/payment - 決済情報更新（管理者）
pub async fn update_payment(
    State(state): State<Arc<AppState>>,
    ApiPath(order_id): ApiPath<String>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<UpdatePaymentRequest>,
) -> ApiResult<Json<OrderEnvelope>> {
    let details = req.payment_details;
    if details.transaction_id.trim().is_empty() {
        return Err(ApiError::validation("transactionId is required"));
    }

    let result = sqlx::query(r#"
        UPDATE orders
        SET transaction_id = ?, payment_status = ?, payment_date_ms = ?, updated_at_ms = ?
        WHERE order_id = ?
    "#)
    .bind(&details.transaction_id)
    .bind(details.payment_status.as_str())
    .bind(details.payment_date.timestamp_millis())
    .bind(chrono::Utc::now().timestamp_millis())
    .bind(&order_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Order"));
    }

    info!(
        "Order payment updated: order_id={}, payment_status={}, admin_id={}",
        order_id, details.payment_status, admin.user_id
    );

    let order = find_order(&state.db, &order_id).await?;
    Ok(Json(OrderEnvelope {
        ok: true,
        order: order_response(&state.db, &order).await?,
    }))
}

// ========================================
// Helpers（admin からも使用）
// ========================================

async fn find_order(db: &DbPool, order_id: &str) -> ApiResult<Order> {
    let order: Option<Order> = sqlx::query_as("SELECT * FROM orders WHERE order_id = ?")
        .bind(order_id)
        .fetch_optional(db)
        .await?;
    order.ok_or(ApiError::NotFound("Order"))
}

pub(crate) async fn order_response(db: &DbPool, order: &Order) -> ApiResult<OrderResponse> {
    let items: Vec<OrderItem> =
        sqlx::query_as("SELECT * FROM order_items WHERE order_id = ? ORDER BY position")
            .bind(&order.order_id)
            .fetch_all(db)
            .await?;
    OrderResponse::from_order(order, &items)
}

pub(crate) async fn order_responses(db: &DbPool, orders: &[Order]) -> ApiResult<Vec<OrderResponse>> {
    let mut responses = Vec::with_capacity(orders.len());
    for order in orders {
        responses.push(order_response(db, order).await?);
    }
    Ok(responses)
}
