//! Data Models
//! User, Product, Cart, Order, InventoryLog などのデータ構造定義

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::{cents_to_decimal, units_to_decimal};

// ========================================
// Enums
// ========================================

/// 文字列カラムと相互変換する enum を定義する
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("invalid {}: {}", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Role {
    Customer => "customer",
    Admin => "admin",
});

text_enum!(CartStatus {
    Open => "open",
    Converted => "converted",
    Abandoned => "abandoned",
});

text_enum!(OrderStatus {
    Pending => "pending",
    Paid => "paid",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
    Failed => "failed",
});

text_enum!(PaymentStatus {
    Approved => "Approved",
    Declined => "Declined",
    Pending => "Pending",
    Refunded => "Refunded",
    Failed => "Failed",
});

text_enum!(
    /// 在庫ログの種別
    InventoryAction {
        Restock => "RESTOCK",
        Sale => "SALE",
        Correction => "CORRECTION",
        CancelledOrder => "CANCELLED_ORDER",
    }
);

text_enum!(AddressType {
    Billing => "billing",
    Shipping => "shipping",
});

/// DB の文字列を enum に変換（不正値は内部エラー扱い）
pub fn parse_column<T: FromStr<Err = String>>(raw: &str) -> Result<T, crate::error::ApiError> {
    raw.parse().map_err(crate::error::ApiError::Internal)
}

// ========================================
// Address / Payment
// ========================================

/// 住所（users と orders に JSON として保存）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    pub fn validate(&self, label: &str) -> Result<(), String> {
        let required = [
            &self.full_name,
            &self.line1,
            &self.city,
            &self.state,
            &self.postal_code,
            &self.country,
        ];
        if required.iter().any(|f| f.trim().is_empty()) {
            return Err(format!("Complete {} address required", label));
        }
        Ok(())
    }
}

/// 決済入力（カード番号はレスポンス・DBに残さない）
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingInfo {
    pub card_number: String,
    pub card_brand: Option<String>,
    pub expiry_month: Option<u32>,
    pub expiry_year: Option<i32>,
    pub name_on_card: Option<String>,
}

impl fmt::Debug for BillingInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BillingInfo")
            .field("card_number", &"****")
            .field("card_brand", &self.card_brand)
            .finish_non_exhaustive()
    }
}

/// 注文に保存するマスク済み決済情報
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSummary {
    pub last_four_digits: String,
    pub card_brand: String,
}

/// 決済結果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub transaction_id: String,
    pub payment_status: PaymentStatus,
    pub payment_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ========================================
// User
// ========================================

/// User (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub user_id: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin.as_str()
    }
}

/// 保存済み支払い方法 (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PaymentMethod {
    pub payment_id: String,
    pub user_id: String,
    pub card_brand: String,
    pub last4: String,
    pub expiry_month: Option<i64>,
    pub expiry_year: Option<i64>,
    pub label: Option<String>,
    pub is_default: i32,
    pub created_at_ms: i64,
}

/// サインアップリクエスト（camelCase / lowercase どちらも受け付ける）
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(alias = "firstName")]
    pub firstname: String,
    #[serde(alias = "lastName")]
    pub lastname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 管理者によるユーザー更新
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(alias = "firstName")]
    pub firstname: Option<String>,
    #[serde(alias = "lastName")]
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAddressRequest {
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub address: Address,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPaymentMethodRequest {
    pub card_number: String,
    pub expiry_month: Option<u32>,
    pub expiry_year: Option<i32>,
    pub label: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethodResponse {
    pub id: String,
    pub card_brand: String,
    pub last4: String,
    pub expiry_month: Option<i64>,
    pub expiry_year: Option<i64>,
    pub label: Option<String>,
    pub is_default: bool,
}

impl PaymentMethodResponse {
    pub fn from_row(row: &PaymentMethod) -> Self {
        Self {
            id: row.payment_id.clone(),
            card_brand: row.card_brand.clone(),
            last4: row.last4.clone(),
            expiry_month: row.expiry_month,
            expiry_year: row.expiry_year,
            label: row.label.clone(),
            is_default: row.is_default == 1,
        }
    }
}

/// User レスポンス（password_hash は含めない）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub role: String,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub payment_methods: Vec<PaymentMethodResponse>,
    pub wishlist: Vec<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl UserResponse {
    pub fn from_user(
        user: &User,
        payment_methods: Vec<PaymentMethodResponse>,
        wishlist: Vec<String>,
    ) -> Self {
        Self {
            id: user.user_id.clone(),
            firstname: user.firstname.clone(),
            lastname: user.lastname.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            shipping_address: parse_address(user.shipping_address.as_deref()),
            billing_address: parse_address(user.billing_address.as_deref()),
            payment_methods,
            wishlist,
            created_at_ms: user.created_at_ms,
            updated_at_ms: user.updated_at_ms,
        }
    }

    /// 一覧用（支払い方法・ウィッシュリストは省略）
    pub fn summary(user: &User) -> Self {
        Self::from_user(user, Vec::new(), Vec::new())
    }
}

fn parse_address(raw: Option<&str>) -> Option<Address> {
    raw.and_then(|s| serde_json::from_str(s).ok())
}

// ========================================
// Product
// ========================================

/// Product (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Product {
    pub product_id: String,
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub price_cents: i64,
    pub stock_quantity: i64,
    pub low_stock_threshold: i64,
    pub thumbnail_img: Option<String>,
    pub image_gallery: String,
    pub specs: String,
    pub is_active: i32,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Product {
    pub fn active(&self) -> bool {
        self.is_active == 1
    }
}

/// Product 作成リクエスト
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default = "default_low_stock_threshold")]
    pub low_stock_threshold: i64,
    pub thumbnail_img: Option<String>,
    #[serde(default = "empty_array")]
    pub image_gallery: serde_json::Value,
    #[serde(default = "empty_object")]
    pub specs: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_low_stock_threshold() -> i64 { 5 }
fn default_true() -> bool { true }
fn empty_array() -> serde_json::Value { serde_json::Value::Array(Vec::new()) }
fn empty_object() -> serde_json::Value { serde_json::Value::Object(Default::default()) }

/// Product 更新リクエスト（在庫数は /admin/inventory でのみ変更）
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    pub low_stock_threshold: Option<i64>,
    pub thumbnail_img: Option<String>,
    pub image_gallery: Option<serde_json::Value>,
    pub specs: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

/// Product レスポンス
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub id: String,
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub stock_quantity: i64,
    pub low_stock_threshold: i64,
    pub thumbnail_img: Option<String>,
    pub image_gallery: serde_json::Value,
    pub specs: serde_json::Value,
    pub is_active: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl ProductResponse {
    pub fn from_product(p: &Product) -> Self {
        Self {
            id: p.product_id.clone(),
            name: p.name.clone(),
            slug: p.slug.clone(),
            description: p.description.clone(),
            category: p.category.clone(),
            brand: p.brand.clone(),
            price: cents_to_decimal(p.price_cents),
            stock_quantity: p.stock_quantity,
            low_stock_threshold: p.low_stock_threshold,
            thumbnail_img: p.thumbnail_img.clone(),
            image_gallery: serde_json::from_str(&p.image_gallery).unwrap_or_else(|_| empty_array()),
            specs: serde_json::from_str(&p.specs).unwrap_or_else(|_| empty_object()),
            is_active: p.active(),
            created_at_ms: p.created_at_ms,
            updated_at_ms: p.updated_at_ms,
        }
    }
}

// ========================================
// Cart
// ========================================

/// Cart (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Cart {
    pub cart_id: String,
    pub user_id: Option<String>,
    pub guest_token_hash: Option<String>,
    pub status: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Cart {
    pub fn is_open(&self) -> bool {
        self.status == CartStatus::Open.as_str()
    }
}

/// Cart 明細 + 商品情報 (JOIN row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
    pub name: String,
    pub price_cents: i64,
    pub thumbnail_img: Option<String>,
    pub stock_quantity: i64,
    pub is_active: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCartRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemRequest {
    pub product_id: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 { 1 }

#[derive(Debug, Deserialize)]
pub struct SetCartItemRequest {
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProductSummary {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub thumbnail_img: Option<String>,
    pub stock_quantity: i64,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub product_id: String,
    pub quantity: i64,
    pub product: CartProductSummary,
}

/// Cart レスポンス（ゲストトークンは cookie のみで返す）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub id: String,
    pub user_id: Option<String>,
    pub is_guest: bool,
    pub status: String,
    pub items: Vec<CartItemResponse>,
    pub item_count: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl CartResponse {
    pub fn from_cart(cart: &Cart, lines: &[CartLine]) -> Self {
        let items: Vec<CartItemResponse> = lines
            .iter()
            .map(|l| CartItemResponse {
                product_id: l.product_id.clone(),
                quantity: l.quantity,
                product: CartProductSummary {
                    name: l.name.clone(),
                    price: cents_to_decimal(l.price_cents),
                    thumbnail_img: l.thumbnail_img.clone(),
                    stock_quantity: l.stock_quantity,
                    is_active: l.is_active == 1,
                },
            })
            .collect();
        let subtotal_cents = lines
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.price_cents.saturating_mul(l.quantity)));

        Self {
            id: cart.cart_id.clone(),
            user_id: cart.user_id.clone(),
            is_guest: cart.guest_token_hash.is_some(),
            status: cart.status.clone(),
            item_count: lines.iter().fold(0i64, |acc, l| acc.saturating_add(l.quantity)),
            items,
            subtotal: cents_to_decimal(subtotal_cents),
            created_at_ms: cart.created_at_ms,
            updated_at_ms: cart.updated_at_ms,
        }
    }
}

// ========================================
// Order
// ========================================

/// Order (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub order_id: String,
    pub user_id: String,
    pub user_email: String,
    pub cart_id: String,
    pub subtotal_e4: i64,
    pub tax_e4: i64,
    pub shipping_e4: i64,
    pub total_e4: i64,
    pub shipping_address: String,
    pub billing_address: String,
    pub card_brand: String,
    pub last_four_digits: String,
    pub order_status: String,
    pub transaction_id: String,
    pub payment_status: String,
    pub payment_date_ms: i64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Order 明細スナップショット (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrderItem {
    pub order_id: String,
    pub position: i64,
    pub product_id: String,
    pub product_name: String,
    pub product_price_cents: i64,
    pub thumbnail_img: Option<String>,
    pub quantity: i64,
}

/// チェックアウトリクエスト
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub user_id: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub billing_info: BillingInfo,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentRequest {
    pub payment_details: PaymentDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub product_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub product_price: Decimal,
    pub thumbnail_img: Option<String>,
    pub quantity: i64,
}

/// Order レスポンス
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub user: String,
    pub user_email: String,
    pub items_ordered: Vec<OrderItemResponse>,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub shipping_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub billing_info: BillingSummary,
    pub order_status: OrderStatus,
    pub payment_details: PaymentDetails,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl OrderResponse {
    pub fn from_order(order: &Order, items: &[OrderItem]) -> Result<Self, crate::error::ApiError> {
        let payment_date = DateTime::<Utc>::from_timestamp_millis(order.payment_date_ms)
            .unwrap_or_default();

        Ok(Self {
            id: order.order_id.clone(),
            user: order.user_id.clone(),
            user_email: order.user_email.clone(),
            items_ordered: items
                .iter()
                .map(|i| OrderItemResponse {
                    product_id: i.product_id.clone(),
                    product_name: i.product_name.clone(),
                    product_price: cents_to_decimal(i.product_price_cents),
                    thumbnail_img: i.thumbnail_img.clone(),
                    quantity: i.quantity,
                })
                .collect(),
            subtotal: units_to_decimal(order.subtotal_e4),
            tax_price: units_to_decimal(order.tax_e4),
            shipping_price: units_to_decimal(order.shipping_e4),
            total_amount: units_to_decimal(order.total_e4),
            shipping_address: parse_address(Some(&order.shipping_address)),
            billing_address: parse_address(Some(&order.billing_address)),
            billing_info: BillingSummary {
                last_four_digits: order.last_four_digits.clone(),
                card_brand: order.card_brand.clone(),
            },
            order_status: parse_column(&order.order_status)?,
            payment_details: PaymentDetails {
                transaction_id: order.transaction_id.clone(),
                payment_status: parse_column(&order.payment_status)?,
                payment_date,
                message: None,
            },
            created_at_ms: order.created_at_ms,
            updated_at_ms: order.updated_at_ms,
        })
    }
}

// ========================================
// Inventory Log
// ========================================

/// InventoryLog (DB row)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct InventoryLog {
    pub log_id: String,
    pub product_id: String,
    pub admin_id: Option<String>,
    pub action_type: String,
    pub quantity_change: i64,
    pub reason: Option<String>,
    pub created_at_ms: i64,
}

/// 在庫数変更リクエスト
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAdjustRequest {
    pub quantity: i64,
    pub admin_id: Option<String>,
    pub action_type: Option<InventoryAction>,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLogResponse {
    pub id: String,
    pub product_id: String,
    pub admin_id: Option<String>,
    pub action_type: InventoryAction,
    pub quantity_change: i64,
    pub reason: Option<String>,
    pub created_at_ms: i64,
}

impl InventoryLogResponse {
    pub fn from_log(log: &InventoryLog) -> Result<Self, crate::error::ApiError> {
        Ok(Self {
            id: log.log_id.clone(),
            product_id: log.product_id.clone(),
            admin_id: log.admin_id.clone(),
            action_type: parse_column(&log.action_type)?,
            quantity_change: log.quantity_change,
            reason: log.reason.clone(),
            created_at_ms: log.created_at_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_column_text() {
        assert_eq!("CANCELLED_ORDER".parse::<InventoryAction>(), Ok(InventoryAction::CancelledOrder));
        assert_eq!(PaymentStatus::Approved.as_str(), "Approved");
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn enums_use_wire_names_in_json() {
        let json = serde_json::to_string(&InventoryAction::Restock).unwrap();
        assert_eq!(json, "\"RESTOCK\"");
        let status: OrderStatus = serde_json::from_str("\"delivered\"").unwrap();
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn address_requires_core_fields() {
        let mut address = Address {
            full_name: "Ada Lovelace".into(),
            line1: "1 Analytical Way".into(),
            line2: None,
            city: "London".into(),
            state: "LDN".into(),
            postal_code: "N1".into(),
            country: "UK".into(),
        };
        assert!(address.validate("shipping").is_ok());

        address.city = "  ".into();
        assert_eq!(
            address.validate("shipping"),
            Err("Complete shipping address required".to_string())
        );
    }

    #[test]
    fn billing_info_debug_hides_card_number() {
        let info: BillingInfo =
            serde_json::from_str(r#"{"cardNumber":"4111111111111111","cardBrand":"Visa"}"#).unwrap();
        let printed = format!("{:?}", info);
        assert!(!printed.contains("4111111111111111"));
    }
}
