//! What the dashboard views talk to: the stock board for one (location, date)
//! and the manually ordered order queue.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::coordinator::{CoordinatorConfig, RowContext, SyncEvent, WriteCoordinator};
use crate::demand::{DemandSource, OrderSnapshot};
use crate::error::{Result, StockError};
use crate::models::{CatalogProduct, Order, RecordKey, Scope, StockField, StockFigures, StockRowView};
use crate::priority::{can_reorder, Direction, KvStore, PriorityOverrideStore};
use crate::providers::{CatalogProvider, OrderProvider, StockBackend};

pub struct StockBoard {
    scope: Scope,
    catalog: Vec<CatalogProduct>,
    orders: Arc<OrderSnapshot>,
    coordinator: WriteCoordinator,
}

impl StockBoard {
    /// Loads catalog, orders and stock for `scope`. A collaborator that fails
    /// to answer leaves its part of the board empty.
    pub async fn load(
        scope: Scope,
        catalog: &dyn CatalogProvider,
        orders: &dyn OrderProvider,
        backend: Arc<dyn StockBackend>,
        config: CoordinatorConfig,
    ) -> Self {
        let products = catalog
            .list_products(&scope.location)
            .await
            .unwrap_or_else(|e| {
                warn!(%scope, error = %e, "catalog unavailable, showing empty board");
                Vec::new()
            });
        let order_list = orders
            .list_orders(&scope.location, scope.date, scope.date)
            .await
            .unwrap_or_else(|e| {
                warn!(%scope, error = %e, "orders unavailable, demand will read zero");
                Vec::new()
            });

        let board = StockBoard::new(scope, products, order_list, backend, config);
        if let Err(e) = board.coordinator.load_scope(&board.scope).await {
            warn!(scope = %board.scope, error = %e, "stock unavailable, rows start empty");
        }
        board
    }

    pub fn new(
        scope: Scope,
        catalog: Vec<CatalogProduct>,
        orders: Vec<Order>,
        backend: Arc<dyn StockBackend>,
        config: CoordinatorConfig,
    ) -> Self {
        let orders = Arc::new(OrderSnapshot::new(orders));
        let coordinator = WriteCoordinator::new(backend, orders.clone(), config);
        StockBoard {
            scope,
            catalog,
            orders,
            coordinator,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn catalog(&self) -> &[CatalogProduct] {
        &self.catalog
    }

    pub fn coordinator(&self) -> &WriteCoordinator {
        &self.coordinator
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SyncEvent> {
        self.coordinator.subscribe()
    }

    pub fn daily_demand(&self, product: &CatalogProduct) -> i32 {
        self.orders
            .daily_demand(product, &self.scope.location, self.scope.date)
    }

    pub fn replace_orders(&self, orders: Vec<Order>) {
        self.orders.replace(orders);
    }

    /// Live order ids for the board's scope, most recent first.
    pub fn order_ids(&self) -> Vec<String> {
        self.orders.ids(&self.scope.location, self.scope.date)
    }

    fn key_for(&self, product: &CatalogProduct) -> RecordKey {
        match self.coordinator.record_for(&self.scope, product) {
            Some(record) => RecordKey::Persisted(record.id),
            None => self
                .coordinator
                .resolve(RecordKey::draft(&self.scope, product)),
        }
    }

    /// One row per catalog product. The final count is always derived from
    /// the shown initial stock, brought-in amount and current demand.
    pub fn rows(&self) -> Vec<StockRowView> {
        self.catalog
            .iter()
            .map(|product| {
                let key = self.key_for(product);
                let demand = self.daily_demand(product);
                let figures = self
                    .coordinator
                    .figures(&key)
                    .unwrap_or_default()
                    .with_demand(demand);
                let is_persisted = matches!(key, RecordKey::Persisted(_));
                StockRowView {
                    key,
                    product: product.clone(),
                    stock_initial: figures.stock_initial,
                    brought_in: figures.brought_in,
                    daily_demand: figures.daily_demand,
                    stock_final: figures.stock_final,
                    is_persisted,
                }
            })
            .collect()
    }

    fn product_for(&self, key: &RecordKey) -> Option<&CatalogProduct> {
        let key = self.coordinator.resolve(key.clone());
        self.catalog.iter().find(|product| {
            self.key_for(product) == key
                || self.coordinator.resolve(RecordKey::draft(&self.scope, product)) == key
        })
    }

    /// Applies a user edit to a row and schedules its write.
    pub fn on_field_edit(&self, key: RecordKey, field: StockField, value: i32) -> Result<StockFigures> {
        let product = self
            .product_for(&key)
            .cloned()
            .ok_or_else(|| StockError::UnknownRow(key.to_string()))?;
        debug!(%key, ?field, value, "field edit");
        self.coordinator.schedule_write(
            key,
            field,
            value,
            RowContext {
                scope: self.scope.clone(),
                product,
            },
        )
    }

    pub async fn reload(&self) {
        self.coordinator.reload(&self.scope).await;
    }
}

/// Order list for one scope with its saved manual priority applied.
pub struct OrderQueue<S> {
    priorities: PriorityOverrideStore<S>,
}

impl<S: KvStore> OrderQueue<S> {
    pub fn new(store: S) -> Self {
        OrderQueue {
            priorities: PriorityOverrideStore::new(store),
        }
    }

    pub fn ordered(&self, scope: &Scope, live: &[String]) -> Vec<String> {
        self.priorities.ordered(scope, live)
    }

    /// Whether the view should offer drag handles and arrows.
    pub fn can_reorder(&self, sort_active: bool, scope: Option<&Scope>) -> bool {
        can_reorder(sort_active, scope)
    }

    pub fn on_reorder(&self, scope: &Scope, live: &[String], from: &str, to: &str) -> Vec<String> {
        self.priorities.reorder(scope, live, from, to)
    }

    pub fn on_step(&self, scope: &Scope, live: &[String], id: &str, direction: Direction) -> Vec<String> {
        self.priorities.step(scope, live, id, direction)
    }
}
