use crate::db::Database;
use crate::error::Result;
use crate::models::{CatalogProduct, CreateCatalogProduct};

pub fn list_products(db: &Database, location: &str) -> Result<Vec<CatalogProduct>> {
    let conn = db.lock();

    let mut stmt = conn.prepare(
        "SELECT section, product_name, weight
         FROM catalog_products
         WHERE location IS NULL OR location = ?1
         ORDER BY section, product_name, weight",
    )?;

    let products = stmt
        .query_map([location], |row| {
            Ok(CatalogProduct {
                section: row.get(0)?,
                product_name: row.get(1)?,
                weight: row.get::<_, Option<String>>(2)?.filter(|w| !w.trim().is_empty()),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(products)
}

pub fn create_product(db: &Database, product: &CreateCatalogProduct) -> Result<CatalogProduct> {
    let conn = db.lock();

    conn.execute(
        "INSERT INTO catalog_products (location, section, product_name, weight) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![product.location, product.section, product.product_name, product.weight],
    )?;

    Ok(CatalogProduct {
        section: product.section.clone(),
        product_name: product.product_name.clone(),
        weight: product.weight.clone(),
    })
}
