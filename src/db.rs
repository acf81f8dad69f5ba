use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::info;

use crate::commands::{catalog, kv, orders, stock};
use crate::error::{Result, StockError};
use crate::matcher::StockItemRef;
use crate::models::{CatalogProduct, NewStockRecord, Order, StockFigures, StockRecord};
use crate::priority::KvStore;
use crate::providers::{CatalogProvider, OrderProvider, StockBackend};

pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened stock database");

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Database {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Locks the connection. A poisoned lock still yields the connection;
    /// every statement is self-contained so no half-applied state survives a panic.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock();

        conn.execute_batch(
            "
            -- Catalog entries, optionally restricted to one location
            CREATE TABLE IF NOT EXISTS catalog_products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location TEXT,
                section TEXT NOT NULL,
                product_name TEXT NOT NULL,
                weight TEXT
            );

            -- Orders as received from the order-taking side
            CREATE TABLE IF NOT EXISTS orders (
                id TEXT PRIMARY KEY,
                location TEXT NOT NULL,
                delivery_date DATE NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS order_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id TEXT NOT NULL,
                name TEXT NOT NULL,
                option_name TEXT,
                option_quantity INTEGER,
                quantity INTEGER,
                FOREIGN KEY (order_id) REFERENCES orders(id)
            );

            -- Daily stock counters. The *_key columns hold the normalized
            -- product identity; see idx_stock_identity below.
            CREATE TABLE IF NOT EXISTS stock_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location TEXT NOT NULL,
                section TEXT NOT NULL,
                product_name TEXT NOT NULL,
                weight TEXT NOT NULL DEFAULT '',
                stock_date DATE NOT NULL,
                stock_initial INTEGER NOT NULL DEFAULT 0,
                brought_in INTEGER NOT NULL DEFAULT 0,
                daily_demand INTEGER NOT NULL DEFAULT 0,
                stock_final INTEGER NOT NULL DEFAULT 0,
                section_key TEXT NOT NULL DEFAULT '',
                name_key TEXT NOT NULL DEFAULT '',
                weight_key TEXT NOT NULL DEFAULT '',
                updated_at DATETIME NOT NULL DEFAULT ''
            );

            -- Small client-side settings such as saved order priorities
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        Self::upgrade_stock_table(&conn)?;

        // One record per (location, product, date), however the product is spelled
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_stock_identity
             ON stock_records (location, section_key, name_key, weight_key, stock_date)",
            [],
        )?;

        Ok(())
    }

    /// Stock tables written before `updated_at` and the identity keys existed
    /// get the missing columns, and their rows get keys computed.
    fn upgrade_stock_table(conn: &Connection) -> Result<()> {
        let columns = conn
            .prepare("PRAGMA table_info(stock_records)")?
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let has = |name: &str| columns.iter().any(|c| c == name);

        if !has("updated_at") {
            conn.execute(
                "ALTER TABLE stock_records ADD COLUMN updated_at DATETIME NOT NULL DEFAULT ''",
                [],
            )?;
        }

        if !has("name_key") {
            conn.execute_batch(
                "ALTER TABLE stock_records ADD COLUMN section_key TEXT NOT NULL DEFAULT '';
                 ALTER TABLE stock_records ADD COLUMN name_key TEXT NOT NULL DEFAULT '';
                 ALTER TABLE stock_records ADD COLUMN weight_key TEXT NOT NULL DEFAULT '';",
            )?;

            let rows = conn
                .prepare("SELECT id, section, product_name, weight FROM stock_records")?
                .query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut update = conn.prepare(
                "UPDATE stock_records SET section_key = ?1, name_key = ?2, weight_key = ?3 WHERE id = ?4",
            )?;
            for (id, section, product_name, weight) in &rows {
                let identity = StockItemRef {
                    section,
                    product_name,
                    weight: weight.as_deref(),
                }
                .identity();
                update.execute(rusqlite::params![identity.section, identity.name, identity.weight, id])?;
            }
            info!(rows = rows.len(), "stock identity keys backfilled");
        }

        Ok(())
    }
}

/// Async access to a shared [`Database`]. Each call runs on tokio's blocking
/// pool, so a slow statement holds up neither the runtime nor other rows.
#[derive(Clone)]
pub struct SqliteBackend {
    db: Arc<Database>,
}

impl SqliteBackend {
    pub fn new(db: Arc<Database>) -> Self {
        SqliteBackend { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StockError::Backend(format!("database task failed: {e}")))?
    }
}

#[async_trait]
impl CatalogProvider for SqliteBackend {
    async fn list_products(&self, location: &str) -> Result<Vec<CatalogProduct>> {
        let location = location.to_string();
        self.run(move |db| catalog::list_products(db, &location)).await
    }
}

#[async_trait]
impl OrderProvider for SqliteBackend {
    async fn list_orders(&self, location: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Order>> {
        let location = location.to_string();
        self.run(move |db| orders::list_orders(db, &location, from, to)).await
    }
}

#[async_trait]
impl StockBackend for SqliteBackend {
    async fn create_stock(&self, record: NewStockRecord) -> Result<StockRecord> {
        self.run(move |db| stock::create_stock(db, &record)).await
    }

    async fn update_stock(&self, id: i64, figures: StockFigures) -> Result<StockRecord> {
        self.run(move |db| stock::update_stock(db, id, figures)).await
    }

    async fn list_stock(&self, location: &str, date: NaiveDate) -> Result<Vec<StockRecord>> {
        let location = location.to_string();
        self.run(move |db| stock::list_stock(db, &location, date)).await
    }
}

impl KvStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        kv::get_value(self, key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        kv::set_value(self, key, value)
    }
}
