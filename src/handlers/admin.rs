//! Admin API Handlers
//! /api/admin エンドポイント - 注文・ユーザー・商品・在庫の管理（role = admin のみ）

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{find_user, AdminUser};
use crate::error::{ApiError, ApiJson, ApiPath, ApiQuery, ApiResult};
use crate::handlers::auth::{is_valid_email, EMAIL_TAKEN};
use crate::handlers::orders::{order_responses, OrderListResponse};
use crate::handlers::users::user_response;
use crate::inventory;
use crate::models::{
    CreateProductRequest, InventoryAction, InventoryAdjustRequest, InventoryLogResponse, Order,
    Product, ProductResponse, UpdateProductRequest, UpdateUserRequest, User, UserResponse,
};
use crate::pricing::decimal_to_cents;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct UserListResponse {
    pub ok: bool,
    pub users: Vec<UserResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct UserUpdateResponse {
    pub ok: bool,
    pub user: UserResponse,
}

#[derive(Serialize)]
pub struct AdminProductListResponse {
    pub ok: bool,
    pub products: Vec<ProductResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct AdminProductResponse {
    pub ok: bool,
    pub product: ProductResponse,
}

#[derive(Serialize)]
pub struct InventoryAdjustResponse {
    pub ok: bool,
    pub product: ProductResponse,
    pub log: InventoryLogResponse,
}

#[derive(Serialize)]
pub struct InventoryLogListResponse {
    pub ok: bool,
    pub logs: Vec<InventoryLogResponse>,
    pub total: usize,
}

impl InventoryLogListResponse {
    fn new(logs: Vec<InventoryLogResponse>) -> Self {
        Self {
            ok: true,
            total: logs.len(),
            logs,
        }
    }
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilterQuery {
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

// ========================================
// Orders
// ========================================

/// GET /api/admin/orders - 全注文（新しい順）
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<OrderListResponse>> {
    let rows: Vec<Order> = sqlx::query_as("SELECT * FROM orders ORDER BY created_at_ms DESC, rowid DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(OrderListResponse::new(order_responses(&state.db, &rows).await?)))
}

/// GET /api/admin/orders/filter?userId&productId&startDate&endDate - 注文の絞り込み
pub async fn filter_orders(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    ApiQuery(query): ApiQuery<OrderFilterQuery>,
) -> ApiResult<Json<OrderListResponse>> {
    let start_ms = query
        .start_date
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_date_bound(s, false))
        .transpose()?;
    let end_ms = query
        .end_date
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_date_bound(s, true))
        .transpose()?;
    let user_id = query.user_id.filter(|s| !s.trim().is_empty());
    let product_id = query.product_id.filter(|s| !s.trim().is_empty());

    let rows: Vec<Order> = sqlx::query_as(r#"
        SELECT * FROM orders o
        WHERE (? IS NULL OR o.user_id = ?)
          AND (? IS NULL OR EXISTS (
                SELECT 1 FROM order_items oi
                WHERE oi.order_id = o.order_id AND oi.product_id = ?))
          AND (? IS NULL OR o.created_at_ms >= ?)
          AND (? IS NULL OR o.created_at_ms <= ?)
        ORDER BY o.created_at_ms DESC, o.rowid DESC
    "#)
    .bind(&user_id)
    .bind(&user_id)
    .bind(&product_id)
    .bind(&product_id)
    .bind(start_ms)
    .bind(start_ms)
    .bind(end_ms)
    .bind(end_ms)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(OrderListResponse::new(order_responses(&state.db, &rows).await?)))
}

// ========================================
// Users
// ========================================

/// GET /api/admin/users - 全ユーザー
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<UserListResponse>> {
    let rows: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at_ms, rowid")
        .fetch_all(&state.db)
        .await?;

    let users: Vec<UserResponse> = rows.iter().map(UserResponse::summary).collect();
    Ok(Json(UserListResponse {
        ok: true,
        total: users.len(),
        users,
    }))
}

/// PUT /api/admin/users/:userId - 名前・メール・ロールの更新
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<String>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<UserUpdateResponse>> {
    let user = find_user(&state.db, &user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let firstname = non_empty(req.firstname, "firstname")?;
    let lastname = non_empty(req.lastname, "lastname")?;
    let email = req.email.map(|e| e.trim().to_lowercase());

    if let Some(email) = &email {
        if !is_valid_email(email) {
            return Err(ApiError::validation("Invalid email address"));
        }
        let taken: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM users WHERE email = ? AND user_id != ?")
                .bind(email)
                .bind(&user_id)
                .fetch_optional(&state.db)
                .await?;
        if taken.is_some() {
            return Err(ApiError::validation(EMAIL_TAKEN));
        }
    }

    sqlx::query(r#"
        UPDATE users
        SET firstname = ?, lastname = ?, email = ?, role = ?, updated_at_ms = ?
        WHERE user_id = ?
    "#)
    .bind(firstname.unwrap_or(user.firstname))
    .bind(lastname.unwrap_or(user.lastname))
    .bind(email.unwrap_or(user.email))
    .bind(req.role.map_or(user.role, |r| r.as_str().to_string()))
    .bind(chrono::Utc::now().timestamp_millis())
    .bind(&user_id)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::from_unique_violation(e, EMAIL_TAKEN))?;

    info!("User updated: user_id={}, admin_id={}", user_id, admin.user_id);

    let user = find_user(&state.db, &user_id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(UserUpdateResponse {
        ok: true,
        user: user_response(&state.db, &user).await?,
    }))
}

/// GET /api/admin/users/:userId/orders - ユーザーの注文履歴
pub async fn user_orders(
    State(state): State<Arc<AppState>>,
    ApiPath(user_id): ApiPath<String>,
    _admin: AdminUser,
) -> ApiResult<Json<OrderListResponse>> {
    let rows: Vec<Order> = sqlx::query_as(
        "SELECT * FROM orders WHERE user_id = ? ORDER BY created_at_ms DESC, rowid DESC"
    )
    .bind(&user_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(OrderListResponse::new(order_responses(&state.db, &rows).await?)))
}

// ========================================
// Products
// ========================================

/// GET /api/admin/products - 全商品（非公開を含む）
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<AdminProductListResponse>> {
    let rows: Vec<Product> = sqlx::query_as("SELECT * FROM products ORDER BY created_at_ms DESC, rowid DESC")
        .fetch_all(&state.db)
        .await?;

    let products: Vec<ProductResponse> = rows.iter().map(ProductResponse::from_product).collect();
    Ok(Json(AdminProductListResponse {
        ok: true,
        total: products.len(),
        products,
    }))
}

/// POST /api/admin/products - 商品作成（初期在庫は RESTOCK として記録）
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<AdminProductResponse>)> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::validation("Product name is required"));
    }
    let price_cents = decimal_to_cents(req.price)
        .ok_or_else(|| ApiError::validation("Price must be a non-negative amount"))?;
    if req.stock_quantity < 0 {
        return Err(ApiError::validation("Stock quantity cannot be negative"));
    }
    if req.low_stock_threshold < 0 {
        return Err(ApiError::validation("Low stock threshold cannot be negative"));
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let product = Product {
        product_id: Uuid::new_v4().to_string(),
        name,
        slug: req.slug,
        description: req.description,
        category: req.category,
        brand: req.brand,
        price_cents,
        stock_quantity: req.stock_quantity,
        low_stock_threshold: req.low_stock_threshold,
        thumbnail_img: req.thumbnail_img,
        image_gallery: serde_json::to_string(&req.image_gallery)?,
        specs: serde_json::to_string(&req.specs)?,
        is_active: i32::from(req.is_active),
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    };

    let mut tx = state.db.begin().await?;

    sqlx::query(r#"
        INSERT INTO products (
            product_id, name, slug, description, category, brand,
            price_cents, stock_quantity, low_stock_threshold,
            thumbnail_img, image_gallery, specs, is_active,
            created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&product.product_id)
    .bind(&product.name)
    .bind(&product.slug)
    .bind(&product.description)
    .bind(&product.category)
    .bind(&product.brand)
    .bind(product.price_cents)
    .bind(product.stock_quantity)
    .bind(product.low_stock_threshold)
    .bind(&product.thumbnail_img)
    .bind(&product.image_gallery)
    .bind(&product.specs)
    .bind(product.is_active)
    .bind(product.created_at_ms)
    .bind(product.updated_at_ms)
    .execute(&mut *tx)
    .await?;

    if product.stock_quantity > 0 {
        sqlx::query(r#"
            INSERT INTO inventory_logs (log_id, product_id, admin_id, action_type, quantity_change, reason, created_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#)
        .bind(Uuid::new_v4().to_string())
        .bind(&product.product_id)
        .bind(&admin.user_id)
        .bind(InventoryAction::Restock.as_str())
        .bind(product.stock_quantity)
        .bind("Initial stock")
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        "Product created: product_id={}, name={}, stock={}, admin_id={}",
        product.product_id, product.name, product.stock_quantity, admin.user_id
    );

    Ok((
        StatusCode::CREATED,
        Json(AdminProductResponse {
            ok: true,
            product: ProductResponse::from_product(&product),
        }),
    ))
}

/// PUT /api/admin/products/:productId - 商品更新（在庫数は対象外）
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    ApiPath(product_id): ApiPath<String>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<UpdateProductRequest>,
) -> ApiResult<Json<AdminProductResponse>> {
    let name = non_empty(req.name, "name")?;
    let price_cents = req
        .price
        .map(|p| decimal_to_cents(p).ok_or_else(|| ApiError::validation("Price must be a non-negative amount")))
        .transpose()?;
    if req.low_stock_threshold.map_or(false, |t| t < 0) {
        return Err(ApiError::validation("Low stock threshold cannot be negative"));
    }
    let image_gallery = req.image_gallery.map(|v| serde_json::to_string(&v)).transpose()?;
    let specs = req.specs.map(|v| serde_json::to_string(&v)).transpose()?;

    let result = sqlx::query(r#"
        UPDATE products SET
            name = COALESCE(?, name),
            slug = COALESCE(?, slug),
            description = COALESCE(?, description),
            category = COALESCE(?, category),
            brand = COALESCE(?, brand),
            price_cents = COALESCE(?, price_cents),
            low_stock_threshold = COALESCE(?, low_stock_threshold),
            thumbnail_img = COALESCE(?, thumbnail_img),
            image_gallery = COALESCE(?, image_gallery),
            specs = COALESCE(?, specs),
            is_active = COALESCE(?, is_active),
            updated_at_ms = ?
        WHERE product_id = ?
    "#)
    .bind(name)
    .bind(req.slug)
    .bind(req.description)
    .bind(req.category)
    .bind(req.brand)
    .bind(price_cents)
    .bind(req.low_stock_threshold)
    .bind(req.thumbnail_img)
    .bind(image_gallery)
    .bind(specs)
    .bind(req.is_active.map(i32::from))
    .bind(chrono::Utc::now().timestamp_millis())
    .bind(&product_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::ProductNotFound);
    }

    info!("Product updated: product_id={}, admin_id={}", product_id, admin.user_id);

    let product = load_product(&state, &product_id).await?;
    Ok(Json(AdminProductResponse {
        ok: true,
        product: ProductResponse::from_product(&product),
    }))
}

/// DELETE /api/admin/products/:productId - 商品を非公開にする（論理削除）
pub async fn deactivate_product(
    State(state): State<Arc<AppState>>,
    ApiPath(product_id): ApiPath<String>,
    AdminUser(admin): AdminUser,
) -> ApiResult<Json<AdminProductResponse>> {
    let result = sqlx::query("UPDATE products SET is_active = 0, updated_at_ms = ? WHERE product_id = ?")
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(&product_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::ProductNotFound);
    }

    info!("Product deactivated: product_id={}, admin_id={}", product_id, admin.user_id);

    let product = load_product(&state, &product_id).await?;
    Ok(Json(AdminProductResponse {
        ok: true,
        product: ProductResponse::from_product(&product),
    }))
}

// ========================================
// Inventory
// ========================================

/// PUT /api/admin/inventory/:productId - 在庫数を設定し、差分をログに記録
pub async fn adjust_inventory(
    State(state): State<Arc<AppState>>,
    ApiPath(product_id): ApiPath<String>,
    AdminUser(admin): AdminUser,
    ApiJson(req): ApiJson<InventoryAdjustRequest>,
) -> ApiResult<Json<InventoryAdjustResponse>> {
    // body の adminId は認証ユーザーと一致する場合のみ受け付ける
    if let Some(admin_id) = req.admin_id.as_deref() {
        if admin_id != admin.user_id {
            return Err(ApiError::validation("adminId does not match the authenticated admin"));
        }
    }

    let adjustment = inventory::adjust_stock(
        &state.db,
        &product_id,
        req.quantity,
        &admin.user_id,
        req.action_type,
        req.reason,
    )
    .await?;

    Ok(Json(InventoryAdjustResponse {
        ok: true,
        product: ProductResponse::from_product(&adjustment.product),
        log: InventoryLogResponse::from_log(&adjustment.log)?,
    }))
}

/// GET /api/admin/inventory-logs - 全在庫ログ
pub async fn list_inventory_logs(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<InventoryLogListResponse>> {
    let logs = inventory::list_logs(&state.db).await?;
    Ok(Json(InventoryLogListResponse::new(logs)))
}

/// GET /api/admin/inventory-logs/product/:productId - 商品ごとの在庫ログ
pub async fn product_inventory_logs(
    State(state): State<Arc<AppState>>,
    ApiPath(product_id): ApiPath<String>,
    _admin: AdminUser,
) -> ApiResult<Json<InventoryLogListResponse>> {
    let logs = inventory::logs_for_product(&state.db, &product_id).await?;
    Ok(Json(InventoryLogListResponse::new(logs)))
}

// ========================================
// Helpers
// ========================================

async fn load_product(state: &AppState, product_id: &str) -> ApiResult<Product> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
        .bind(product_id)
        .fetch_optional(&state.db)
        .await?;
    product.ok_or(ApiError::ProductNotFound)
}

/// 指定されていれば空文字不可
fn non_empty(value: Option<String>, field: &str) -> ApiResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Err(ApiError::validation(format!("{} cannot be empty", field))),
        other => Ok(other),
    }
}

/// RFC 3339 または YYYY-MM-DD（日付のみの終了日はその日の終わり）を epoch ms に変換
fn parse_date_bound(raw: &str, end_of_day: bool) -> ApiResult<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::validation(format!("Invalid date: {}", raw)))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| ApiError::Internal("Invalid time of day".to_string()))?;

    Ok(date.and_time(time).and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn date_only_bounds_cover_the_whole_day() {
        let start = parse_date_bound("2024-03-01", false).unwrap();
        let end = parse_date_bound("2024-03-01", true).unwrap();
        assert_eq!(end - start, 24 * 60 * 60 * 1000 - 1);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap().timestamp_millis());
    }

    #[test]
    fn rfc3339_bounds_are_exact() {
        let ms = parse_date_bound("2024-03-01T12:00:00Z", true).unwrap();
        assert_eq!(ms, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap().timestamp_millis());
    }

    #[test]
    fn bad_dates_are_validation_errors() {
        assert!(matches!(parse_date_bound("March 1st", false), Err(ApiError::Validation(_))));
    }

    #[test]
    fn blank_updates_are_rejected() {
        assert!(non_empty(Some("  ".into()), "name").is_err());
        assert_eq!(non_empty(Some(" Ada ".into()), "name").unwrap().as_deref(), Some("Ada"));
        assert_eq!(non_empty(None, "name").unwrap(), None);
    }
}
