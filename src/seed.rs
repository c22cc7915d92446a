//! Demo data
//! デモ用のカタログ・ユーザー・カート・注文・在庫ログを投入する
//!
//! 在庫はすべて `inventory::adjust_stock` 経由で設定するので、
//! 商品ごとのログ合計は常に現在の在庫数と一致する。何度実行しても重複しない。

use tracing::info;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::cart;
use crate::checkout;
use crate::db::DbPool;
use crate::error::{ApiError, ApiResult};
use crate::inventory;
use crate::models::{Address, BillingInfo, CheckoutRequest, InventoryAction, Role};
use crate::payment::FixedGateway;

pub const ADMIN_EMAIL: &str = "admin@storefront.local";
pub const CUSTOMER_EMAIL: &str = "customer@storefront.local";

#[derive(Debug, Clone)]
pub struct SeedOptions {
    /// 既存データを全削除してから投入
    pub reset: bool,
    pub admin_password: String,
    pub customer_password: String,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub products_created: usize,
    pub orders_created: usize,
    pub cart_items_added: usize,
}

struct DemoProduct {
    name: &'static str,
    slug: &'static str,
    category: &'static str,
    brand: &'static str,
    description: &'static str,
    price_cents: i64,
    stock: i64,
    low_stock_threshold: i64,
    specs: &'static [(&'static str, &'static str)],
}

const CATALOG: &[DemoProduct] = &[
    DemoProduct {
        name: "ThinkPad X1 Carbon Gen 13 (14'')",
        slug: "thinkpad-x1-carbon-gen-13",
        category: "business",
        brand: "Lenovo",
        description: "Premium business ultrabook. Lightweight, powerful, and built for productivity.",
        price_cents: 189_900,
        stock: 15,
        low_stock_threshold: 5,
        specs: &[("Processor", "Intel Core Ultra 7"), ("RAM", "16GB LPDDR5"), ("Storage", "512GB NVMe SSD")],
    },
    DemoProduct {
        name: "Yoga Slim 7x (14'' Snapdragon)",
        slug: "yoga-slim-7x-snapdragon",
        category: "ultrabook",
        brand: "Lenovo",
        description: "Ultra-thin laptop with a Snapdragon X Elite processor.",
        price_cents: 129_900,
        stock: 20,
        low_stock_threshold: 5,
        specs: &[("Processor", "Snapdragon X Elite"), ("RAM", "16GB LPDDR5x"), ("Display", "14.5\" 3K OLED")],
    },
    DemoProduct {
        name: "LOQ (15'' AMD) RTX 5060",
        slug: "loq-15-amd-rtx-5060",
        category: "gaming",
        brand: "Lenovo",
        description: "Gaming laptop with an AMD Ryzen processor and RTX 5060 graphics.",
        price_cents: 139_900,
        stock: 8,
        low_stock_threshold: 3,
        specs: &[("Processor", "AMD Ryzen 7 8845HS"), ("Graphics", "GeForce RTX 5060 8GB")],
    },
    DemoProduct {
        name: "Yoga 7i 2-in-1 (16'' Intel)",
        slug: "yoga-7i-2in1-16-intel",
        category: "2-in-1",
        brand: "Lenovo",
        description: "Convertible laptop with a 16-inch touch display.",
        price_cents: 149_900,
        stock: 12,
        low_stock_threshold: 4,
        specs: &[("Processor", "Intel Core Ultra 7 155H"), ("Display", "16\" WUXGA Touch")],
    },
    DemoProduct {
        name: "Slim 7i (14'' Intel)",
        slug: "slim-7i-14-intel",
        category: "ultrabook",
        brand: "Lenovo",
        description: "Sleek ultrabook with a 2.8K OLED display.",
        price_cents: 159_900,
        stock: 10,
        low_stock_threshold: 3,
        specs: &[("Processor", "Intel Core Ultra 7 258V"), ("RAM", "32GB LPDDR5x")],
    },
];

// ========================================
// Entry
// ========================================

pub async fn seed_demo_data(db: &DbPool, opts: &SeedOptions) -> ApiResult<SeedSummary> {
    if opts.reset {
        reset(db).await?;
    }

    let mut summary = SeedSummary::default();

    let admin_id = upsert_user(db, ADMIN_EMAIL, "Admin", "User", Role::Admin, &opts.admin_password, opts.bcrypt_cost).await?;
    let customer_id = upsert_user(
        db,
        CUSTOMER_EMAIL,
        "Test",
        "Customer",
        Role::Customer,
        &opts.customer_password,
        opts.bcrypt_cost,
    )
    .await?;
    seed_customer_profile(db, &customer_id).await?;

    // 商品（新規作成分のみ在庫履歴を作る）
    let mut ids = Vec::with_capacity(CATALOG.len());
    for demo in CATALOG {
        let (product_id, created) = ensure_product(db, demo, &admin_id).await?;
        if created {
            summary.products_created += 1;
        }
        ids.push((demo.slug, product_id, created));
    }
    let id_of = |slug: &str| {
        ids.iter()
            .find(|(s, _, _)| *s == slug)
            .map(|(_, id, _)| id.clone())
            .ok_or_else(|| ApiError::Internal(format!("Demo product missing: {}", slug)))
    };

    if ids.iter().any(|(s, _, created)| *s == "slim-7i-14-intel" && *created) {
        let id = id_of("slim-7i-14-intel")?;
        shift_stock(db, &id, -1, &admin_id, InventoryAction::Correction, "Damaged unit removed").await?;
    }
    if ids.iter().any(|(s, _, created)| *s == "loq-15-amd-rtx-5060" && *created) {
        let id = id_of("loq-15-amd-rtx-5060")?;
        shift_stock(db, &id, 1, &admin_id, InventoryAction::CancelledOrder, "Order cancelled - stock returned").await?;
    }

    // 過去の注文（チェックアウト経由）
    let (orders,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = ?")
        .bind(&customer_id)
        .fetch_one(db)
        .await?;
    if orders == 0 {
        let cart = cart::get_or_create_user_cart(db, &customer_id).await?;
        cart::clear(db, &cart).await?;
        cart::add_item(db, &cart, &id_of("thinkpad-x1-carbon-gen-13")?, 1).await?;
        checkout::checkout(db, &FixedGateway::approving(), demo_checkout(&customer_id)).await?;
        summary.orders_created += 1;
    }

    // 現在のカート
    let cart = cart::get_or_create_user_cart(db, &customer_id).await?;
    if cart::load_lines(db, &cart.cart_id).await?.is_empty() {
        cart::add_item(db, &cart, &id_of("yoga-slim-7x-snapdragon")?, 1).await?;
        cart::add_item(db, &cart, &id_of("loq-15-amd-rtx-5060")?, 2).await?;
        summary.cart_items_added += 2;
    }

    info!(
        "Demo data seeded: products_created={}, orders_created={}, cart_items_added={}",
        summary.products_created, summary.orders_created, summary.cart_items_added
    );
    Ok(summary)
}

// ========================================
// Helpers
// ========================================

async fn reset(db: &DbPool) -> ApiResult<()> {
    let mut tx = db.begin().await?;
    for table in [
        "order_items",
        "orders",
        "inventory_logs",
        "cart_items",
        "carts",
        "wishlist",
        "user_payment_methods",
        "users",
        "products",
    ] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!("Database reset before seeding");
    Ok(())
}

async fn upsert_user(
    db: &DbPool,
    email: &str,
    firstname: &str,
    lastname: &str,
    role: Role,
    password: &str,
    cost: u32,
) -> ApiResult<String> {
    let password = password.to_string();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hash task failed: {}", e)))??;
    let now_ms = chrono::Utc::now().timestamp_millis();

    let existing: Option<(String,)> = sqlx::query_as("SELECT user_id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await?;

    if let Some((user_id,)) = existing {
        sqlx::query("UPDATE users SET password_hash = ?, role = ?, updated_at_ms = ? WHERE user_id = ?")
            .bind(&password_hash)
            .bind(role.as_str())
            .bind(now_ms)
            .bind(&user_id)
            .execute(db)
            .await?;
        return Ok(user_id);
    }

    let user_id = Uuid::new_v4().to_string();
    sqlx::query(r#"
        INSERT INTO users (user_id, firstname, lastname, email, password_hash, role, created_at_ms, updated_at_ms)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
    "#)
    .bind(&user_id)
    .bind(firstname)
    .bind(lastname)
    .bind(email)
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(now_ms)
    .bind(now_ms)
    .execute(db)
    .await?;
    Ok(user_id)
}

fn demo_address() -> Address {
    Address {
        full_name: "Test Customer".to_string(),
        line1: "123 Main Street".to_string(),
        line2: Some("Apt 4B".to_string()),
        city: "Toronto".to_string(),
        state: "ON".to_string(),
        postal_code: "M5V 2H1".to_string(),
        country: "Canada".to_string(),
    }
}

fn demo_checkout(user_id: &str) -> CheckoutRequest {
    CheckoutRequest {
        user_id: Some(user_id.to_string()),
        shipping_address: demo_address(),
        billing_address: demo_address(),
        billing_info: BillingInfo {
            card_number: "4242 4242 4242 4242".to_string(),
            card_brand: None,
            expiry_month: Some(12),
            expiry_year: Some(2030),
            name_on_card: Some("Test Customer".to_string()),
        },
    }
}

/// 住所と既定カード（ブランド + 下 4 桁のみ）
async fn seed_customer_profile(db: &DbPool, user_id: &str) -> ApiResult<()> {
    let address = serde_json::to_string(&demo_address())?;
    sqlx::query("UPDATE users SET shipping_address = ?, billing_address = ? WHERE user_id = ?")
        .bind(&address)
        .bind(&address)
        .bind(user_id)
        .execute(db)
        .await?;

    sqlx::query(r#"
        INSERT INTO user_payment_methods
            (payment_id, user_id, card_brand, last4, expiry_month, expiry_year, label, is_default, created_at_ms)
        SELECT ?, ?, 'Visa', '4242', 12, 2030, 'Personal Visa', 1, ?
        WHERE NOT EXISTS (SELECT 1 FROM user_payment_methods WHERE user_id = ?)
    "#)
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(chrono::Utc::now().timestamp_millis())
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(())
}

/// slug で検索し、なければ在庫 0 で作成して RESTOCK する
async fn ensure_product(db: &DbPool, demo: &DemoProduct, admin_id: &str) -> ApiResult<(String, bool)> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT product_id FROM products WHERE slug = ?")
        .bind(demo.slug)
        .fetch_optional(db)
        .await?;
    if let Some((product_id,)) = existing {
        return Ok((product_id, false));
    }

    let specs: serde_json::Map<String, serde_json::Value> = demo
        .specs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
        .collect();
    let product_id = Uuid::new_v4().to_string();
    let now_ms = chrono::Utc::now().timestamp_millis();

    sqlx::query(r#"
        INSERT INTO products (
            product_id, name, slug, description, category, brand,
            price_cents, stock_quantity, low_stock_threshold, specs, is_active,
            created_at_ms, updated_at_ms
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, 1, ?, ?)
    "#)
    .bind(&product_id)
    .bind(demo.name)
    .bind(demo.slug)
    .bind(demo.description)
    .bind(demo.category)
    .bind(demo.brand)
    .bind(demo.price_cents)
    .bind(demo.low_stock_threshold)
    .bind(serde_json::to_string(&specs)?)
    .bind(now_ms)
    .bind(now_ms)
    .execute(db)
    .await?;

    inventory::adjust_stock(
        db,
        &product_id,
        demo.stock,
        admin_id,
        Some(InventoryAction::Restock),
        Some("Initial inventory load".to_string()),
    )
    .await?;

    Ok((product_id, true))
}

async fn shift_stock(
    db: &DbPool,
    product_id: &str,
    delta: i64,
    admin_id: &str,
    action: InventoryAction,
    reason: &str,
) -> ApiResult<()> {
    let (current,): (i64,) = sqlx::query_as("SELECT stock_quantity FROM products WHERE product_id = ?")
        .bind(product_id)
        .fetch_one(db)
        .await?;
    inventory::adjust_stock(db, product_id, current + delta, admin_id, Some(action), Some(reason.to_string())).await?;
    Ok(())
}
