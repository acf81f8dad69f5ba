//! Collaborator interfaces consumed by the stock core.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{CatalogProduct, NewStockRecord, Order, StockFigures, StockRecord};

#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn list_products(&self, location: &str) -> Result<Vec<CatalogProduct>>;
}

#[async_trait]
pub trait OrderProvider: Send + Sync {
    /// Orders delivered at `location` between `from` and `to` inclusive, newest first.
    async fn list_orders(&self, location: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Order>>;
}

/// Persistence API for stock records.
#[async_trait]
pub trait StockBackend: Send + Sync {
    async fn create_stock(&self, record: NewStockRecord) -> Result<StockRecord>;

    async fn update_stock(&self, id: i64, figures: StockFigures) -> Result<StockRecord>;

    async fn list_stock(&self, location: &str, date: NaiveDate) -> Result<Vec<StockRecord>>;
}
