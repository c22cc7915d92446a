//! Cart store
//! カートの取得・作成・明細更新・ゲストカートのマージ

use sqlx::{Executor, Sqlite};
use tracing::info;
use uuid::Uuid;

use crate::auth::hash_cart_token;
use crate::db::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::models::{Cart, CartLine, CartResponse, CartStatus, Product};

const LINES_SQL: &str = r#"
    SELECT ci.product_id, ci.quantity, p.name, p.price_cents, p.thumbnail_img,
           p.stock_quantity, p.is_active
    FROM cart_items ci
    JOIN products p ON p.product_id = ci.product_id
    WHERE ci.cart_id = ?
    ORDER BY ci.position
"#;

// ========================================
// Lookup / Create
// ========================================

pub async fn get_cart(db: &DbPool, cart_id: &str) -> ApiResult<Cart> {
    let cart: Option<Cart> = sqlx::query_as("SELECT * FROM carts WHERE cart_id = ?")
        .bind(cart_id)
        .fetch_optional(db)
        .await?;
    cart.ok_or(ApiError::NotFound("Cart"))
}

/// ユーザーの open カート
pub async fn active_user_cart<'e, E>(ex: E, user_id: &str) -> ApiResult<Option<Cart>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let cart = sqlx::query_as("SELECT * FROM carts WHERE user_id = ? AND status = 'open'")
        .bind(user_id)
        .fetch_optional(ex)
        .await?;
    Ok(cart)
}

/// ゲストトークンの open カート
pub async fn active_guest_cart(db: &DbPool, token: &str) -> ApiResult<Option<Cart>> {
    let cart = sqlx::query_as("SELECT * FROM carts WHERE guest_token_hash = ? AND status = 'open'")
        .bind(hash_cart_token(token))
        .fetch_optional(db)
        .await?;
    Ok(cart)
}

/// ユーザーの open カートを取得、なければ作成
pub async fn get_or_create_user_cart(db: &DbPool, user_id: &str) -> ApiResult<Cart> {
    if let Some(cart) = active_user_cart(db, user_id).await? {
        return Ok(cart);
    }

    insert_cart(db, Some(user_id), None).await?;
    active_user_cart(db, user_id)
        .await?
        .ok_or_else(|| ApiError::Internal("Cart was not created".to_string()))
}

/// ゲストの open カートを取得、なければ作成
pub async fn get_or_create_guest_cart(db: &DbPool, token: &str) -> ApiResult<Cart> {
    if let Some(cart) = active_guest_cart(db, token).await? {
        return Ok(cart);
    }

    insert_cart(db, None, Some(&hash_cart_token(token))).await?;
    active_guest_cart(db, token)
        .await?
        .ok_or_else(|| ApiError::Internal("Cart was not created".to_string()))
}

/// open カートはオーナーごとに 1 つ（部分ユニークインデックスで重複は無視される）
async fn insert_cart(db: &DbPool, user_id: Option<&str>, guest_token_hash: Option<&str>) -> ApiResult<()> {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let cart_id = Uuid::new_v4().to_string();

    let result = sqlx::query(r#"
        INSERT OR IGNORE INTO carts (cart_id, user_id, guest_token_hash, status, created_at_ms, updated_at_ms)
        VALUES (?, ?, ?, 'open', ?, ?)
    "#)
    .bind(&cart_id)
    .bind(user_id)
    .bind(guest_token_hash)
    .bind(now_ms)
    .bind(now_ms)
    .execute(db)
    .await?;

    if result.rows_affected() > 0 {
        info!(
            "Cart created: cart_id={}, owner={}",
            cart_id,
            if user_id.is_some() { "user" } else { "guest" }
        );
    }
    Ok(())
}

pub async fn load_lines<'e, E>(ex: E, cart_id: &str) -> ApiResult<Vec<CartLine>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let lines = sqlx::query_as(LINES_SQL)
        .bind(cart_id)
        .fetch_all(ex)
        .await?;
    Ok(lines)
}

pub async fn to_response(db: &DbPool, cart: &Cart) -> ApiResult<CartResponse> {
    let lines = load_lines(db, &cart.cart_id).await?;
    Ok(CartResponse::from_cart(cart, &lines))
}

fn ensure_open(cart: &Cart) -> ApiResult<()> {
    if cart.is_open() {
        Ok(())
    } else {
        Err(ApiError::validation(format!("Cart is {} and can no longer be modified", cart.status)))
    }
}

async fn find_product(db: &DbPool, product_id: &str) -> ApiResult<Product> {
    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
        .bind(product_id)
        .fetch_optional(db)
        .await?;
    product.ok_or(ApiError::ProductNotFound)
}

async fn touch(db: &DbPool, cart_id: &str) -> ApiResult<()> {
    sqlx::query("UPDATE carts SET updated_at_ms = ? WHERE cart_id = ?")
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(cart_id)
        .execute(db)
        .await?;
    Ok(())
}

// ========================================
// Item Mutations
// ========================================

/// 明細追加（既存数量 + 追加数量が在庫以下であること。在庫の確保はしない）
pub async fn add_item(db: &DbPool, cart: &Cart, product_id: &str, quantity: i64) -> ApiResult<()> {
    ensure_open(cart)?;
    if quantity < 1 {
        return Err(ApiError::validation("Quantity must be at least 1"));
    }

    let product = find_product(db, product_id).await?;
    if !product.active() {
        return Err(ApiError::validation("Product is not available"));
    }

    let current: Option<(i64,)> =
        sqlx::query_as("SELECT quantity FROM cart_items WHERE cart_id = ? AND product_id = ?")
            .bind(&cart.cart_id)
            .bind(product_id)
            .fetch_optional(db)
            .await?;
    let current = current.map_or(0, |(q,)| q);

    // オーバーフローも在庫不足として扱う
    let wanted = current.checked_add(quantity);
    if wanted.map_or(true, |w| product.stock_quantity < w) {
        return Err(ApiError::InsufficientStock {
            message: format!(
                "Insufficient stock for {}. Available: {}, In cart: {}, Requested: {}",
                product.name, product.stock_quantity, current, quantity
            ),
            product: product.name,
        });
    }

    upsert_line(db, &cart.cart_id, product_id, quantity).await?;
    touch(db, &cart.cart_id).await?;

    info!("Cart item added: cart_id={}, product_id={}, qty={}", cart.cart_id, product_id, quantity);
    Ok(())
}

/// 数量を加算、なければ末尾に追加
async fn upsert_line<'e, E>(ex: E, cart_id: &str, product_id: &str, quantity: i64) -> ApiResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(r#"
        INSERT INTO cart_items (cart_id, product_id, quantity, position)
        VALUES (?, ?, ?, (SELECT COALESCE(MAX(position), -1) + 1 FROM cart_items WHERE cart_id = ?))
        ON CONFLICT(cart_id, product_id) DO UPDATE SET
            quantity = cart_items.quantity + excluded.quantity
    "#)
    .bind(cart_id)
    .bind(product_id)
    .bind(quantity)
    .bind(cart_id)
    .execute(ex)
    .await?;
    Ok(())
}

/// 明細の数量を指定値に変更
pub async fn set_item_quantity(db: &DbPool, cart: &Cart, product_id: &str, quantity: i64) -> ApiResult<()> {
    ensure_open(cart)?;
    if quantity < 1 {
        return Err(ApiError::validation("Quantity must be at least 1"));
    }

    let product = find_product(db, product_id).await?;
    if product.stock_quantity < quantity {
        return Err(ApiError::InsufficientStock {
            message: format!(
                "Insufficient stock for {}. Available: {}, Requested: {}",
                product.name, product.stock_quantity, quantity
            ),
            product: product.name,
        });
    }

    let result = sqlx::query("UPDATE cart_items SET quantity = ? WHERE cart_id = ? AND product_id = ?")
        .bind(quantity)
        .bind(&cart.cart_id)
        .bind(product_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound("Cart item"));
    }
    touch(db, &cart.cart_id).await?;

    info!("Cart item updated: cart_id={}, product_id={}, qty={}", cart.cart_id, product_id, quantity);
    Ok(())
}

pub async fn remove_item(db: &DbPool, cart: &Cart, product_id: &str) -> ApiResult<()> {
    ensure_open(cart)?;

    sqlx::query("DELETE FROM cart_items WHERE cart_id = ? AND product_id = ?")
        .bind(&cart.cart_id)
        .bind(product_id)
        .execute(db)
        .await?;
    touch(db, &cart.cart_id).await?;

    info!("Cart item removed: cart_id={}, product_id={}", cart.cart_id, product_id);
    Ok(())
}

pub async fn clear(db: &DbPool, cart: &Cart) -> ApiResult<()> {
    ensure_open(cart)?;

    sqlx::query("DELETE FROM cart_items WHERE cart_id = ?")
        .bind(&cart.cart_id)
        .execute(db)
        .await?;
    touch(db, &cart.cart_id).await?;

    info!("Cart cleared: cart_id={}", cart.cart_id);
    Ok(())
}

// ========================================
// Status
// ========================================

/// open → converted（open 以外なら false）
pub async fn mark_converted<'e, E>(ex: E, cart_id: &str) -> ApiResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "UPDATE carts SET status = ?, updated_at_ms = ? WHERE cart_id = ? AND status = ?"
    )
    .bind(CartStatus::Converted.as_str())
    .bind(chrono::Utc::now().timestamp_millis())
    .bind(cart_id)
    .bind(CartStatus::Open.as_str())
    .execute(ex)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// ゲストカートをユーザーカートにマージ（マージした場合 true）
///
/// 同じ商品は数量を合算、それ以外は末尾に追加。在庫チェックはしない（チェックアウト時に検証）。
/// ゲストカートは削除せず converted にする。先に converted へ更新できたトランザクションだけが明細を移す。
pub async fn merge_guest_cart(db: &DbPool, user_cart: &Cart, guest_cart: &Cart) -> ApiResult<bool> {
    if user_cart.cart_id == guest_cart.cart_id || !guest_cart.is_open() {
        return Ok(false);
    }

    let mut tx = db.begin().await?;

    if !mark_converted(&mut *tx, &guest_cart.cart_id).await? {
        info!("Guest cart already merged: guest_cart={}", guest_cart.cart_id);
        return Ok(false);
    }

    let guest_lines = load_lines(&mut *tx, &guest_cart.cart_id).await?;
    for line in &guest_lines {
        upsert_line(&mut *tx, &user_cart.cart_id, &line.product_id, line.quantity).await?;
    }

    sqlx::query("UPDATE carts SET updated_at_ms = ? WHERE cart_id = ?")
        .bind(chrono::Utc::now().timestamp_millis())
        .bind(&user_cart.cart_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        "Guest cart merged: guest_cart={}, user_cart={}, lines={}",
        guest_cart.cart_id,
        user_cart.cart_id,
        guest_lines.len()
    );
    Ok(true)
}
