//! Per-product daily demand computed from free-form order lines.
//!
//! Matching is best effort: an order line that cannot be attributed to the
//! catalog product contributes zero and never raises an error.

use std::sync::RwLock;

use chrono::NaiveDate;
use tracing::debug;

use crate::matcher::{normalize_name, normalize_section, normalize_weight, SECTION_CAT, SECTION_DOG};
use crate::models::{CatalogProduct, Order, OrderItem};

/// Which rule attributed an order line to a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Contains,
    PrefixStripped,
}

/// Rejects lines that belong to the other species.
fn passes_category_guard(section: &str, item_text: &str) -> bool {
    match section {
        SECTION_CAT => item_text.contains("GATO"),
        SECTION_DOG => {
            !item_text.contains("GATO")
                && (item_text.contains("PERRO") || item_text.contains("BIG DOG"))
        }
        _ => true,
    }
}

fn passes_weight_rule(product_weight: &str, item: &OrderItem, item_text: &str) -> bool {
    if product_weight.is_empty() {
        return true;
    }
    match item.variant_name() {
        Some(variant) => normalize_weight(Some(variant)) == product_weight,
        None => normalize_weight(Some(item_text)).contains(product_weight),
    }
}

/// Decides whether an order line refers to `product`, and by which rule.
pub fn match_item(product: &CatalogProduct, item: &OrderItem) -> Option<MatchKind> {
    let product_name = normalize_name(&product.product_name);
    if product_name.is_empty() {
        return None;
    }
    let item_text = item.name.trim().to_uppercase();
    if !passes_category_guard(&normalize_section(&product.section), &item_text) {
        return None;
    }

    let kind = if item_text == product_name {
        MatchKind::Exact
    } else if item_text.contains(&product_name) {
        MatchKind::Contains
    } else if normalize_name(&item.name) == product_name {
        MatchKind::PrefixStripped
    } else {
        return None;
    };

    let product_weight = normalize_weight(product.weight.as_deref());
    passes_weight_rule(&product_weight, item, &item_text).then_some(kind)
}

/// Total units of `product` ordered for `location` on `date`.
pub fn daily_demand(
    product: &CatalogProduct,
    location: &str,
    date: NaiveDate,
    orders: &[Order],
) -> i32 {
    orders
        .iter()
        .filter(|order| order.location == location && order.delivery_date == date)
        .flat_map(|order| order.items.iter())
        .filter(|item| match_item(product, item).is_some())
        .fold(0i32, |total, item| total.saturating_add(item.effective_quantity()))
}

/// Source of demand figures for the write path.
pub trait DemandSource: Send + Sync {
    fn daily_demand(&self, product: &CatalogProduct, location: &str, date: NaiveDate) -> i32;
}

/// Latest order list loaded for a board, shared with the write coordinator.
#[derive(Debug, Default)]
pub struct OrderSnapshot {
    orders: RwLock<Vec<Order>>,
}

impl OrderSnapshot {
    pub fn new(orders: Vec<Order>) -> Self {
        OrderSnapshot {
            orders: RwLock::new(orders),
        }
    }

    pub fn replace(&self, orders: Vec<Order>) {
        let mut guard = self.orders.write().unwrap_or_else(|e| e.into_inner());
        debug!(count = orders.len(), "order snapshot replaced");
        *guard = orders;
    }

    /// Order ids in their live (most recent first) order.
    pub fn ids(&self, location: &str, date: NaiveDate) -> Vec<String> {
        let guard = self.orders.read().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .filter(|order| order.location == location && order.delivery_date == date)
            .map(|order| order.id.clone())
            .collect()
    }
}

impl DemandSource for OrderSnapshot {
    fn daily_demand(&self, product: &CatalogProduct, location: &str, date: NaiveDate) -> i32 {
        let guard = self.orders.read().unwrap_or_else(|e| e.into_inner());
        daily_demand(product, location, date, &guard)
    }
}
