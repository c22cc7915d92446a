//! Checkout workflow
//! カート → 注文への変換
//!
//! 1. ユーザー確認（ゲスト不可）
//! 2. open カートと明細の取得
//! 3. 明細ごとの在庫チェック
//! 4. 現在価格で小計・税・送料・合計を計算
//! 5. 決済承認（拒否なら何も書き込まない）
//! 6. 1 トランザクションで 注文作成 → 在庫減算 + SALE ログ → カート converted

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::find_user;
use crate::cart;
use crate::db::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    CartLine, CheckoutRequest, InventoryAction, Order, OrderItem, OrderResponse, OrderStatus,
    PaymentStatus,
};
use crate::payment::{self, PaymentGateway};
use crate::pricing::{cents_to_decimal, decimal_to_units, Totals};

pub async fn checkout(
    db: &DbPool,
    gateway: &dyn PaymentGateway,
    req: CheckoutRequest,
) -> ApiResult<OrderResponse> {
    // ログイン必須
    let user_id = match req.user_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() && id != "guest" => id.to_string(),
        _ => return Err(ApiError::unauthenticated("Login required to checkout")),
    };
    let user = find_user(db, &user_id)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("Invalid user"))?;

    req.shipping_address.validate("shipping").map_err(ApiError::Validation)?;
    req.billing_address.validate("billing").map_err(ApiError::Validation)?;
    if !payment::validate_card(&req.billing_info.card_number) {
        return Err(ApiError::validation("Invalid card number"));
    }

    let cart = cart::active_user_cart(db, &user.user_id)
        .await?
        .ok_or(ApiError::EmptyCart)?;
    let lines = cart::load_lines(db, &cart.cart_id).await?;
    if lines.is_empty() {
        return Err(ApiError::EmptyCart);
    }

    check_stock(&lines)?;

    let totals = Totals::from_lines(
        lines
            .iter()
            .map(|l| (cents_to_decimal(l.price_cents), l.quantity)),
    )
    .ok_or_else(|| ApiError::validation("Order total is too large"))?;

    let payment_details = gateway.authorize(&req.billing_info, totals.total);
    if payment_details.payment_status != PaymentStatus::Approved {
        warn!(
            "Payment declined: user_id={}, cart_id={}, transaction_id={}",
            user.user_id, cart.cart_id, payment_details.transaction_id
        );
        return Err(ApiError::PaymentDeclined(payment_details));
    }

    let now_ms = chrono::Utc::now().timestamp_millis();
    let order_id = Uuid::new_v4().to_string();
    let card_brand = req
        .billing_info
        .card_brand
        .clone()
        .filter(|b| !b.trim().is_empty())
        .unwrap_or_else(|| payment::card_brand(&req.billing_info.card_number).to_string());

    let order = Order {
        order_id: order_id.clone(),
        user_id: user.user_id.clone(),
        user_email: user.email.clone(),
        cart_id: cart.cart_id.clone(),
        subtotal_e4: to_units(totals.subtotal)?,
        tax_e4: to_units(totals.tax)?,
        shipping_e4: to_units(totals.shipping)?,
        total_e4: to_units(totals.total)?,
        shipping_address: serde_json::to_string(&req.shipping_address)?,
        billing_address: serde_json::to_string(&req.billing_address)?,
        card_brand,
        last_four_digits: payment::last_four(&req.billing_info.card_number),
        order_status: OrderStatus::Paid.as_str().to_string(),
        transaction_id: payment_details.transaction_id.clone(),
        payment_status: payment_details.payment_status.as_str().to_string(),
        payment_date_ms: payment_details.payment_date.timestamp_millis(),
        created_at_ms: now_ms,
        updated_at_ms: now_ms,
    };

    let items: Vec<OrderItem> = lines
        .iter()
        .enumerate()
        .map(|(position, l)| OrderItem {
            order_id: order_id.clone(),
            position: position as i64,
            product_id: l.product_id.clone(),
            product_name: l.name.clone(),
            product_price_cents: l.price_cents,
            thumbnail_img: l.thumbnail_img.clone(),
            quantity: l.quantity,
        })
        .collect();

    let mut tx = db.begin().await?;

    insert_order(&mut tx, &order).await?;

    for item in &items {
        insert_order_item(&mut tx, item).await?;

        // 在庫が足りない場合は 0 行更新 → ロールバック
        let result = sqlx::query(r#"
            UPDATE products SET stock_quantity = stock_quantity - ?, updated_at_ms = ?
            WHERE product_id = ? AND stock_quantity >= ?
        "#)
        .bind(item.quantity)
        .bind(now_ms)
        .bind(&item.product_id)
        .bind(item.quantity)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            warn!("Stock changed during checkout: product_id={}", item.product_id);
            return Err(ApiError::insufficient_stock(item.product_name.clone()));
        }

        sqlx::query(r#"
            INSERT INTO inventory_logs (log_id, product_id, admin_id, action_type, quantity_change, reason, created_at_ms)
            VALUES (?, ?, NULL, ?, ?, ?, ?)
        "#)
        .bind(Uuid::new_v4().to_string())
        .bind(&item.product_id)
        .bind(InventoryAction::Sale.as_str())
        .bind(-item.quantity)
        .bind(format!("Order {}", order_id))
        .bind(now_ms)
        .execute(&mut *tx)
        .await?;
    }

    // 同じカートでの二重注文を防ぐ
    if !cart::mark_converted(&mut *tx, &cart.cart_id).await? {
        return Err(ApiError::validation("Cart has already been checked out"));
    }

    tx.commit().await?;

    info!(
        "Order placed: order_id={}, user_id={}, items={}, total={}",
        order_id,
        user.user_id,
        items.len(),
        totals.total
    );

    OrderResponse::from_order(&order, &items)
}

/// 全明細の在庫チェック（非公開商品も購入不可）
fn check_stock(lines: &[CartLine]) -> ApiResult<()> {
    for line in lines {
        if line.is_active != 1 {
            return Err(ApiError::InsufficientStock {
                message: format!("{} is no longer available", line.name),
                product: line.name.clone(),
            });
        }
        if line.stock_quantity < line.quantity {
            return Err(ApiError::insufficient_stock(line.name.clone()));
        }
    }
    Ok(())
}

fn to_units(amount: rust_decimal::Decimal) -> ApiResult<i64> {
    decimal_to_units(amount).ok_or_else(|| ApiError::Internal(format!("Amount out of range: {}", amount)))
}

async fn insert_order(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, order: &Order) -> ApiResult<()> {
    sqlx::query(r#"
        INSERT INTO orders (
            order_id, user_id, user_email, cart_id,
            subtotal_e4, tax_e4, shipping_e4, total_e4,
            shipping_address, billing_address, card_brand, last_four_digits,
            order_status, transaction_id, payment_status, payment_date_ms,
            created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&order.order_id)
    .bind(&order.user_id)
    .bind(&order.user_email)
    .bind(&order.cart_id)
    .bind(order.subtotal_e4)
    .bind(order.tax_e4)
    .bind(order.shipping_e4)
    .bind(order.total_e4)
    .bind(&order.shipping_address)
    .bind(&order.billing_address)
    .bind(&order.card_brand)
    .bind(&order.last_four_digits)
    .bind(&order.order_status)
    .bind(&order.transaction_id)
    .bind(&order.payment_status)
    .bind(order.payment_date_ms)
    .bind(order.created_at_ms)
    .bind(order.updated_at_ms)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_order_item(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, item: &OrderItem) -> ApiResult<()> {
    sqlx::query(r#"
        INSERT INTO order_items (
            order_id, position, product_id, product_name,
            product_price_cents, thumbnail_img, quantity
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&item.order_id)
    .bind(item.position)
    .bind(&item.product_id)
    .bind(&item.product_name)
    .bind(item.product_price_cents)
    .bind(&item.thumbnail_img)
    .bind(item.quantity)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &str, qty: i64, stock: i64, active: bool) -> CartLine {
        CartLine {
            product_id: format!("id-{}", name),
            quantity: qty,
            name: name.to_string(),
            price_cents: 1000,
            thumbnail_img: None,
            stock_quantity: stock,
            is_active: i32::from(active),
        }
    }

    #[test]
    fn stock_check_names_first_short_product() {
        let lines = vec![line("A", 1, 5, true), line("B", 3, 2, true)];
        match check_stock(&lines) {
            Err(ApiError::InsufficientStock { product, .. }) => assert_eq!(product, "B"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn stock_check_rejects_inactive_products() {
        let lines = vec![line("Retired", 1, 10, false)];
        assert!(matches!(check_stock(&lines), Err(ApiError::InsufficientStock { .. })));
    }

    #[test]
    fn stock_check_accepts_exact_quantity() {
        assert!(check_stock(&[line("A", 5, 5, true)]).is_ok());
    }
}
