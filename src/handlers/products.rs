//! Products API Handlers
//! /api/products エンドポイント - 公開カタログ（is_active = 1 のみ）

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiPath, ApiQuery, ApiResult};
use crate::models::{Product, ProductResponse};
use crate::pricing::decimal_to_cents;
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct ProductListResponse {
    pub ok: bool,
    pub products: Vec<ProductResponse>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct ProductDetailResponse {
    pub ok: bool,
    pub product: ProductResponse,
}

impl ProductListResponse {
    fn from_rows(rows: &[Product]) -> Self {
        let products: Vec<ProductResponse> = rows.iter().map(ProductResponse::from_product).collect();
        Self {
            ok: true,
            total: products.len(),
            products,
        }
    }
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortQuery {
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

// ========================================
// Handlers
// ========================================

/// GET /api/products - 公開商品一覧
pub async fn list_products(State(state): State<Arc<AppState>>) -> ApiResult<Json<ProductListResponse>> {
    let rows: Vec<Product> = sqlx::query_as(
        "SELECT * FROM products WHERE is_active = 1 ORDER BY created_at_ms DESC, rowid DESC"
    )
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ProductListResponse::from_rows(&rows)))
}

/// GET /api/products/search?keyword= - 名前・説明・ブランドで検索
pub async fn search_products(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<ProductListResponse>> {
    let keyword = query
        .keyword
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::validation("Keyword is required"))?;
    let pattern = format!("%{}%", keyword);

    let rows: Vec<Product> = sqlx::query_as(r#"
        SELECT * FROM products
        WHERE is_active = 1
          AND (name LIKE ? OR description LIKE ? OR brand LIKE ?)
        ORDER BY name
    "#)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ProductListResponse::from_rows(&rows)))
}

/// GET /api/products/filter - カテゴリ・ブランド・価格帯で絞り込み
pub async fn filter_products(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<FilterQuery>,
) -> ApiResult<Json<ProductListResponse>> {
    let min_cents = price_bound(query.min_price, "minPrice")?;
    let max_cents = price_bound(query.max_price, "maxPrice")?;
    if let (Some(min), Some(max)) = (min_cents, max_cents) {
        if min > max {
            return Err(ApiError::validation("minPrice must not exceed maxPrice"));
        }
    }

    let category = query.category.filter(|c| !c.trim().is_empty());
    let brand = query.brand.filter(|b| !b.trim().is_empty());

    let rows: Vec<Product> = sqlx::query_as(r#"
        SELECT * FROM products
        WHERE is_active = 1
          AND (? IS NULL OR category = ?)
          AND (? IS NULL OR brand = ?)
          AND (? IS NULL OR price_cents >= ?)
          AND (? IS NULL OR price_cents <= ?)
        ORDER BY price_cents, name
    "#)
    .bind(&category)
    .bind(&category)
    .bind(&brand)
    .bind(&brand)
    .bind(min_cents)
    .bind(min_cents)
    .bind(max_cents)
    .bind(max_cents)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ProductListResponse::from_rows(&rows)))
}

/// GET /api/products/sort?sortBy=price|name&order=asc|desc - 並び替え
pub async fn sort_products(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SortQuery>,
) -> ApiResult<Json<ProductListResponse>> {
    let sql = match (
        query.sort_by.as_deref().unwrap_or("name"),
        query.order.as_deref().unwrap_or("asc"),
    ) {
        ("price", "asc") => "SELECT * FROM products WHERE is_active = 1 ORDER BY price_cents ASC, name",
        ("price", "desc") => "SELECT * FROM products WHERE is_active = 1 ORDER BY price_cents DESC, name",
        ("name", "asc") => "SELECT * FROM products WHERE is_active = 1 ORDER BY name ASC",
        ("name", "desc") => "SELECT * FROM products WHERE is_active = 1 ORDER BY name DESC",
        (sort_by, order) => {
            return Err(ApiError::validation(format!(
                "Unsupported sort: sortBy={}, order={}",
                sort_by, order
            )))
        }
    };

    let rows: Vec<Product> = sqlx::query_as(sql).fetch_all(&state.db).await?;

    Ok(Json(ProductListResponse::from_rows(&rows)))
}

/// GET /api/products/:productId - 商品詳細
pub async fn get_product(
    State(state): State<Arc<AppState>>,
    ApiPath(product_id): ApiPath<String>,
) -> ApiResult<Json<ProductDetailResponse>> {
    let product: Option<Product> =
        sqlx::query_as("SELECT * FROM products WHERE product_id = ? AND is_active = 1")
            .bind(&product_id)
            .fetch_optional(&state.db)
            .await?;

    let product = product.ok_or(ApiError::ProductNotFound)?;

    Ok(Json(ProductDetailResponse {
        ok: true,
        product: ProductResponse::from_product(&product),
    }))
}

fn price_bound(price: Option<Decimal>, name: &str) -> ApiResult<Option<i64>> {
    match price {
        None => Ok(None),
        Some(p) => decimal_to_cents(p)
            .map(Some)
            .ok_or_else(|| ApiError::validation(format!("{} must be a non-negative amount", name))),
    }
}
