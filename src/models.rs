use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A product as listed in the catalog, e.g. section `PERRO`, name `POLLO`, weight `5KG`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogProduct {
    pub section: String,
    pub product_name: String,
    pub weight: Option<String>,
}

impl CatalogProduct {
    pub fn new(section: &str, product_name: &str, weight: Option<&str>) -> Self {
        CatalogProduct {
            section: section.to_string(),
            product_name: product_name.to_string(),
            weight: weight.map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCatalogProduct {
    /// `None` lists the product at every location.
    pub location: Option<String>,
    pub section: String,
    pub product_name: String,
    pub weight: Option<String>,
}

/// First option picked on an order line (usually the bag weight).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ItemVariant {
    pub name: Option<String>,
    pub quantity: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub name: String,
    pub variant: Option<ItemVariant>,
    pub quantity: Option<i32>,
}

impl OrderItem {
    pub fn new(name: &str, quantity: i32) -> Self {
        OrderItem {
            name: name.to_string(),
            variant: None,
            quantity: Some(quantity),
        }
    }

    pub fn with_variant(name: &str, variant: &str, quantity: i32) -> Self {
        OrderItem {
            name: name.to_string(),
            variant: Some(ItemVariant {
                name: Some(variant.to_string()),
                quantity: None,
            }),
            quantity: Some(quantity),
        }
    }

    /// Variant name when one was picked and is not blank.
    pub fn variant_name(&self) -> Option<&str> {
        self.variant
            .as_ref()
            .and_then(|v| v.name.as_deref())
            .filter(|name| !name.trim().is_empty())
    }

    /// Units ordered: the line quantity, else the variant quantity, else 1.
    /// Non-positive values count as absent.
    pub fn effective_quantity(&self) -> i32 {
        self.quantity
            .filter(|q| *q > 0)
            .or_else(|| {
                self.variant
                    .as_ref()
                    .and_then(|v| v.quantity)
                    .filter(|q| *q > 0)
            })
            .unwrap_or(1)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub location: String,
    pub delivery_date: NaiveDate,
    pub created_at: String,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateOrder {
    pub id: String,
    pub location: String,
    pub delivery_date: NaiveDate,
    pub items: Vec<OrderItem>,
}

/// The four counters shown for a stock row.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockFigures {
    pub stock_initial: i32,
    pub brought_in: i32,
    pub daily_demand: i32,
    pub stock_final: i32,
}

impl StockFigures {
    pub fn new(stock_initial: i32, brought_in: i32, daily_demand: i32) -> Self {
        StockFigures {
            stock_initial,
            brought_in,
            daily_demand,
            stock_final: stock_initial + brought_in - daily_demand,
        }
    }

    /// Same counters with a new demand and the final count derived again.
    pub fn with_demand(self, daily_demand: i32) -> Self {
        StockFigures::new(self.stock_initial, self.brought_in, daily_demand)
    }

    pub fn with_field(self, field: StockField, value: i32) -> Self {
        match field {
            StockField::StockInitial => {
                StockFigures::new(value, self.brought_in, self.daily_demand)
            }
            StockField::BroughtIn => {
                StockFigures::new(self.stock_initial, value, self.daily_demand)
            }
        }
    }
}

/// User-editable stock columns.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StockField {
    StockInitial,
    BroughtIn,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StockRecord {
    pub id: i64,
    pub location: String,
    pub section: String,
    pub product_name: String,
    pub weight: Option<String>,
    pub stock_date: NaiveDate,
    pub stock_initial: i32,
    pub brought_in: i32,
    pub daily_demand: i32,
    pub stock_final: i32,
    pub updated_at: String,
}

impl StockRecord {
    pub fn figures(&self) -> StockFigures {
        StockFigures {
            stock_initial: self.stock_initial,
            brought_in: self.brought_in,
            daily_demand: self.daily_demand,
            stock_final: self.stock_final,
        }
    }

    pub fn scope(&self) -> Scope {
        Scope::new(&self.location, self.stock_date)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NewStockRecord {
    pub location: String,
    pub section: String,
    pub product_name: String,
    pub weight: Option<String>,
    pub stock_date: NaiveDate,
    pub figures: StockFigures,
}

/// (location, date) pair that scopes stock, orders and priority lists.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub struct Scope {
    pub location: String,
    pub date: NaiveDate,
}

impl Scope {
    pub fn new(location: &str, date: NaiveDate) -> Self {
        Scope {
            location: location.to_string(),
            date,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.location, self.date.format("%Y-%m-%d"))
    }
}

/// Identifies a stock row: either a persisted record or a row that has no
/// record yet ("virtual empty row").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Persisted(i64),
    Draft(String),
}

impl RecordKey {
    /// Placeholder key for the not-yet-created record of a product in a scope.
    pub fn draft(scope: &Scope, product: &CatalogProduct) -> Self {
        RecordKey::Draft(format!(
            "new:{}:{}:{}:{}",
            scope,
            product.section,
            product.product_name,
            product.weight.as_deref().unwrap_or("")
        ))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Persisted(id) => write!(f, "stock:{id}"),
            RecordKey::Draft(tag) => f.write_str(tag),
        }
    }
}

/// One line of the stock view for a catalog product on the board's date.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StockRowView {
    pub key: RecordKey,
    pub product: CatalogProduct,
    pub stock_initial: i32,
    pub brought_in: i32,
    pub daily_demand: i32,
    pub stock_final: i32,
    pub is_persisted: bool,
}
