//! Inventory
//! 管理者による在庫数変更と在庫ログの参照

use tracing::info;
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::models::{InventoryAction, InventoryLog, InventoryLogResponse, Product};

/// 在庫数変更の結果
#[derive(Debug)]
pub struct Adjustment {
    pub product: Product,
    pub log: InventoryLog,
}

/// 在庫数を指定値に変更し、差分をログに記録する（同一トランザクション）
///
/// `action` 省略時は CORRECTION。
pub async fn adjust_stock(
    db: &DbPool,
    product_id: &str,
    new_quantity: i64,
    admin_id: &str,
    action: Option<InventoryAction>,
    reason: Option<String>,
) -> ApiResult<Adjustment> {
    if new_quantity < 0 {
        return Err(ApiError::validation("Quantity cannot be negative"));
    }

    let mut tx = db.begin().await?;

    let product: Option<Product> = sqlx::query_as("SELECT * FROM products WHERE product_id = ?")
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;
    let product = product.ok_or(ApiError::ProductNotFound)?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    let delta = new_quantity - product.stock_quantity;

    sqlx::query("UPDATE products SET stock_quantity = ?, updated_at_ms = ? WHERE product_id = ?")
        .bind(new_quantity)
        .bind(now_ms)
        .bind(product_id)
        .execute(&mut *tx)
        .await?;

    let log = InventoryLog {
        log_id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        admin_id: Some(admin_id.to_string()),
        action_type: action.unwrap_or(InventoryAction::Correction).as_str().to_string(),
        quantity_change: delta,
        reason,
        created_at_ms: now_ms,
    };

    sqlx::query(r#"
        INSERT INTO inventory_logs (log_id, product_id, admin_id, action_type, quantity_change, reason, created_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&log.log_id)
    .bind(&log.product_id)
    .bind(&log.admin_id)
    .bind(&log.action_type)
    .bind(log.quantity_change)
    .bind(&log.reason)
    .bind(log.created_at_ms)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        "Stock adjusted: product_id={}, {} -> {}, delta={}, action={}, admin_id={}",
        product_id, product.stock_quantity, new_quantity, delta, log.action_type, admin_id
    );

    let product = Product {
        stock_quantity: new_quantity,
        updated_at_ms: now_ms,
        ..product
    };
    Ok(Adjustment { product, log })
}

/// 全在庫ログ（新しい順）
pub async fn list_logs(db: &DbPool) -> ApiResult<Vec<InventoryLogResponse>> {
    let logs: Vec<InventoryLog> = sqlx::query_as(
        "SELECT * FROM inventory_logs ORDER BY created_at_ms DESC, rowid DESC"
    )
    .fetch_all(db)
    .await?;

    logs.iter().map(InventoryLogResponse::from_log).collect()
}

/// 商品ごとの在庫ログ（新しい順）
pub async fn logs_for_product(db: &DbPool, product_id: &str) -> ApiResult<Vec<InventoryLogResponse>> {
    let logs: Vec<InventoryLog> = sqlx::query_as(
        "SELECT * FROM inventory_logs WHERE product_id = ? ORDER BY created_at_ms DESC, rowid DESC"
    )
    .bind(product_id)
    .fetch_all(db)
    .await?;

    logs.iter().map(InventoryLogResponse::from_log).collect()
}
