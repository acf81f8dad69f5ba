//! Exact product matching between stock rows and catalog entries.
//!
//! Names and weights are compared after normalization only; the looser
//! order-text matching lives in [`crate::demand`].

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{CatalogProduct, NewStockRecord, StockRecord};

/// Category prefixes that order and stock texts put in front of the product name.
pub const CATEGORY_PREFIXES: [&str; 3] = ["BOX PERRO", "BOX GATO", "BIG DOG"];

pub const SECTION_DOG: &str = "PERRO";
pub const SECTION_CAT: &str = "GATO";

fn weight_suffix() -> &'static Regex {
    static WEIGHT_SUFFIX: OnceLock<Regex> = OnceLock::new();
    WEIGHT_SUFFIX.get_or_init(|| {
        Regex::new(r"(?is)\s+\d+KG.*$").expect("weight suffix pattern is valid")
    })
}

/// Strips leading category prefixes, repeatedly, from an uppercased text.
fn strip_category_prefixes(mut text: &str) -> &str {
    loop {
        let stripped = CATEGORY_PREFIXES.iter().find_map(|prefix| {
            let rest = text.strip_prefix(prefix)?;
            (rest.is_empty() || rest.starts_with(char::is_whitespace)).then(|| rest.trim_start())
        });
        match stripped {
            Some(rest) => text = rest,
            None => return text,
        }
    }
}

/// Canonical product name: uppercased, category prefixes and trailing weight removed.
///
/// `normalize_name(normalize_name(x)) == normalize_name(x)` for every `x`.
pub fn normalize_name(raw: &str) -> String {
    let upper = raw.to_uppercase();
    let without_prefix = strip_category_prefixes(upper.trim());
    weight_suffix()
        .replace(without_prefix, "")
        .trim()
        .to_string()
}

/// Canonical weight: uppercased with all whitespace removed. Missing weight is `""`.
pub fn normalize_weight(raw: Option<&str>) -> String {
    raw.unwrap_or("")
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Canonical section label, accepting the English names as aliases.
pub fn normalize_section(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    match upper.as_str() {
        "PERRO" | "PERROS" | "DOG" | "DOGS" => SECTION_DOG.to_string(),
        "GATO" | "GATOS" | "CAT" | "CATS" => SECTION_CAT.to_string(),
        _ => upper,
    }
}

/// Section implied by a category prefix on the raw name, if any.
pub fn implied_section(raw_name: &str) -> Option<&'static str> {
    let upper = raw_name.trim().to_uppercase();
    if upper.starts_with("BOX GATO") {
        Some(SECTION_CAT)
    } else if upper.starts_with("BOX PERRO") || upper.starts_with("BIG DOG") {
        Some(SECTION_DOG)
    } else {
        None
    }
}

/// A stock-side product reference, as typed on a stock row.
#[derive(Debug, Clone, Copy)]
pub struct StockItemRef<'a> {
    /// Empty when the row carries no section; the name prefix decides then.
    pub section: &'a str,
    pub product_name: &'a str,
    pub weight: Option<&'a str>,
}

impl<'a> From<&'a StockRecord> for StockItemRef<'a> {
    fn from(record: &'a StockRecord) -> Self {
        StockItemRef {
            section: &record.section,
            product_name: &record.product_name,
            weight: record.weight.as_deref(),
        }
    }
}

impl<'a> From<&'a NewStockRecord> for StockItemRef<'a> {
    fn from(record: &'a NewStockRecord) -> Self {
        StockItemRef {
            section: &record.section,
            product_name: &record.product_name,
            weight: record.weight.as_deref(),
        }
    }
}

impl<'a> From<&'a CatalogProduct> for StockItemRef<'a> {
    fn from(product: &'a CatalogProduct) -> Self {
        StockItemRef {
            section: &product.section,
            product_name: &product.product_name,
            weight: product.weight.as_deref(),
        }
    }
}

/// Normalized identity a stock record is unique by (per location and date).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductIdentity {
    /// Empty when neither the section nor a name prefix tells the species.
    pub section: String,
    pub name: String,
    pub weight: String,
}

impl StockItemRef<'_> {
    /// The explicit section, else the one implied by a category prefix.
    pub fn section_key(&self) -> Option<String> {
        if self.section.trim().is_empty() {
            implied_section(self.product_name).map(str::to_string)
        } else {
            Some(normalize_section(self.section))
        }
    }

    pub fn identity(&self) -> ProductIdentity {
        ProductIdentity {
            section: self.section_key().unwrap_or_default(),
            name: normalize_name(self.product_name),
            weight: normalize_weight(self.weight),
        }
    }
}

/// True iff section, normalized name and normalized weight are all equal.
/// A stock row with no known section is compared on name and weight only.
pub fn is_same_product(item: StockItemRef<'_>, product: &CatalogProduct) -> bool {
    if let Some(section) = item.section_key() {
        if section != normalize_section(&product.section) {
            return false;
        }
    }

    normalize_name(item.product_name) == normalize_name(&product.product_name)
        && normalize_weight(item.weight) == normalize_weight(product.weight.as_deref())
}
