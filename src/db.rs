//! Database Module
//! SQLite を使用した users/products/carts/orders/inventory_logs の管理

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// データベース接続プール
pub type DbPool = Pool<Sqlite>;

/// データベースを初期化
pub async fn init_db(database_url: &str, max_connections: u32) -> Result<DbPool> {
    info!("Initializing database: {}", database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    create_schema(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// インメモリDB（テスト用）
///
/// `:memory:` は接続ごとに別DBになるため、接続を 1 本に固定して閉じないようにする。
pub async fn init_memory_db() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// スキーマ作成
async fn create_schema(pool: &DbPool) -> Result<()> {
    // users テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            firstname TEXT NOT NULL,
            lastname TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'customer' CHECK (role IN ('customer', 'admin')),
            shipping_address TEXT,
            billing_address TEXT,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // user_payment_methods テーブル（カード番号は保存しない）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS user_payment_methods (
            payment_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            card_brand TEXT NOT NULL,
            last4 TEXT NOT NULL,
            expiry_month INTEGER,
            expiry_year INTEGER,
            label TEXT,
            is_default INTEGER NOT NULL DEFAULT 0,
            created_at_ms INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(user_id)
        )
    "#)
    .execute(pool)
    .await?;

    // products テーブル（price は cents で保持）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS products (
            product_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT,
            description TEXT,
            category TEXT,
            brand TEXT,
            price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
            stock_quantity INTEGER NOT NULL DEFAULT 0 CHECK (stock_quantity >= 0),
            low_stock_threshold INTEGER NOT NULL DEFAULT 5,
            thumbnail_img TEXT,
            image_gallery TEXT NOT NULL DEFAULT '[]',
            specs TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // wishlist テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS wishlist (
            user_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            added_at_ms INTEGER NOT NULL,
            PRIMARY KEY (user_id, product_id),
            FOREIGN KEY (user_id) REFERENCES users(user_id),
            FOREIGN KEY (product_id) REFERENCES products(product_id)
        )
    "#)
    .execute(pool)
    .await?;

    // carts テーブル（user_id と guest_token_hash はどちらか一方のみ。トークンは SHA-256 で保存）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS carts (
            cart_id TEXT PRIMARY KEY,
            user_id TEXT,
            guest_token_hash TEXT,
            status TEXT NOT NULL DEFAULT 'open' CHECK (status IN ('open', 'converted', 'abandoned')),
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            CHECK ((user_id IS NULL) <> (guest_token_hash IS NULL)),
            FOREIGN KEY (user_id) REFERENCES users(user_id)
        )
    "#)
    .execute(pool)
    .await?;

    // cart_items テーブル（position で追加順を保持）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS cart_items (
            cart_id TEXT NOT NULL,
            product_id TEXT NOT NULL,
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            position INTEGER NOT NULL,
            PRIMARY KEY (cart_id, product_id),
            FOREIGN KEY (cart_id) REFERENCES carts(cart_id),
            FOREIGN KEY (product_id) REFERENCES products(product_id)
        )
    "#)
    .execute(pool)
    .await?;

    // orders テーブル（金額は 1/10000 単位。税を丸めずに保持する）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS orders (
            order_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            user_email TEXT NOT NULL,
            cart_id TEXT NOT NULL,
            subtotal_e4 INTEGER NOT NULL,
            tax_e4 INTEGER NOT NULL,
            shipping_e4 INTEGER NOT NULL,
            total_e4 INTEGER NOT NULL,
            shipping_address TEXT NOT NULL,
            billing_address TEXT NOT NULL,
            card_brand TEXT NOT NULL,
            last_four_digits TEXT NOT NULL,
            order_status TEXT NOT NULL,
            transaction_id TEXT NOT NULL,
            payment_status TEXT NOT NULL,
            payment_date_ms INTEGER NOT NULL,
            created_at_ms INTEGER NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(user_id),
            FOREIGN KEY (cart_id) REFERENCES carts(cart_id)
        )
    "#)
    .execute(pool)
    .await?;

    // order_items テーブル（購入時点のスナップショット）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS order_items (
            order_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            product_id TEXT NOT NULL,
            product_name TEXT NOT NULL,
            product_price_cents INTEGER NOT NULL,
            thumbnail_img TEXT,
            quantity INTEGER NOT NULL CHECK (quantity >= 1),
            PRIMARY KEY (order_id, position),
            FOREIGN KEY (order_id) REFERENCES orders(order_id)
        )
    "#)
    .execute(pool)
    .await?;

    // inventory_logs テーブル（追記のみ）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS inventory_logs (
            log_id TEXT PRIMARY KEY,
            product_id TEXT NOT NULL,
            admin_id TEXT,
            action_type TEXT NOT NULL CHECK (action_type IN ('RESTOCK', 'SALE', 'CORRECTION', 'CANCELLED_ORDER')),
            quantity_change INTEGER NOT NULL,
            reason TEXT,
            created_at_ms INTEGER NOT NULL,
            FOREIGN KEY (product_id) REFERENCES products(product_id)
        )
    "#)
    .execute(pool)
    .await?;

    // open カートはオーナーごとに 1 つまで
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_carts_open_user ON carts(user_id) WHERE status = 'open' AND user_id IS NOT NULL")
        .execute(pool).await?;
    sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_carts_open_guest ON carts(guest_token_hash) WHERE status = 'open' AND guest_token_hash IS NOT NULL")
        .execute(pool).await?;

    // インデックス作成
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_is_active ON products(is_active)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_created ON orders(created_at_ms)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_order_items_product ON order_items(product_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_inventory_logs_product ON inventory_logs(product_id)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_payment_methods_user ON user_payment_methods(user_id)")
        .execute(pool).await?;

    Ok(())
}
