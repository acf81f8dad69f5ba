use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::db::Database;
use crate::error::{Result, StockError};
use crate::matcher::StockItemRef;
use crate::models::{CatalogProduct, NewStockRecord, StockFigures, StockRecord};

const STOCK_COLUMNS: &str = "id, location, section, product_name, weight, stock_date, \
     stock_initial, brought_in, daily_demand, stock_final, updated_at";

fn stock_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StockRecord> {
    let weight: String = row.get(4)?;
    Ok(StockRecord {
        id: row.get(0)?,
        location: row.get(1)?,
        section: row.get(2)?,
        product_name: row.get(3)?,
        weight: (!weight.is_empty()).then_some(weight),
        stock_date: row.get(5)?,
        stock_initial: row.get(6)?,
        brought_in: row.get(7)?,
        daily_demand: row.get(8)?,
        stock_final: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn load_stock(conn: &Connection, id: i64) -> Result<StockRecord> {
    conn.query_row(
        &format!("SELECT {STOCK_COLUMNS} FROM stock_records WHERE id = ?1"),
        [id],
        stock_from_row,
    )
    .optional()?
    .ok_or(StockError::NotFound(id))
}

/// Inserts a record. The unique index on (location, normalized product, date)
/// turns a second insert for the same identity into [`StockError::Duplicate`].
pub fn create_stock(db: &Database, record: &NewStockRecord) -> Result<StockRecord> {
    let conn = db.lock();
    let figures = StockFigures::new(
        record.figures.stock_initial,
        record.figures.brought_in,
        record.figures.daily_demand,
    );

    let identity = StockItemRef::from(record).identity();

    let inserted = conn.execute(
        "INSERT INTO stock_records (location, section, product_name, weight, stock_date,
             stock_initial, brought_in, daily_demand, stock_final,
             section_key, name_key, weight_key, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, datetime('now'))",
        rusqlite::params![
            record.location,
            record.section,
            record.product_name,
            record.weight.as_deref().unwrap_or(""),
            record.stock_date,
            figures.stock_initial,
            figures.brought_in,
            figures.daily_demand,
            figures.stock_final,
            identity.section,
            identity.name,
            identity.weight,
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(e) if StockError::is_unique_violation(&e) => {
            return Err(StockError::Duplicate {
                location: record.location.clone(),
                product: format!(
                    "{} {} {}",
                    record.section,
                    record.product_name,
                    record.weight.as_deref().unwrap_or("")
                )
                .trim_end()
                .to_string(),
                date: record.stock_date.format("%Y-%m-%d").to_string(),
            });
        }
        Err(e) => return Err(e.into()),
    }

    let id = conn.last_insert_rowid();
    debug!(record_id = id, location = %record.location, "stock record created");

    load_stock(&conn, id)
}

/// Overwrites the counters of an existing record; the final count is derived here.
pub fn update_stock(db: &Database, id: i64, figures: StockFigures) -> Result<StockRecord> {
    let conn = db.lock();
    let figures = StockFigures::new(figures.stock_initial, figures.brought_in, figures.daily_demand);

    conn.execute(
        "UPDATE stock_records
         SET stock_initial = ?1, brought_in = ?2, daily_demand = ?3, stock_final = ?4,
             updated_at = datetime('now')
         WHERE id = ?5",
        rusqlite::params![
            figures.stock_initial,
            figures.brought_in,
            figures.daily_demand,
            figures.stock_final,
            id
        ],
    )?;

    if conn.changes() == 0 {
        return Err(StockError::NotFound(id));
    }

    load_stock(&conn, id)
}

pub fn get_stock(db: &Database, id: i64) -> Result<StockRecord> {
    let conn = db.lock();
    load_stock(&conn, id)
}

pub fn list_stock(db: &Database, location: &str, date: NaiveDate) -> Result<Vec<StockRecord>> {
    let conn = db.lock();

    let mut stmt = conn.prepare(&format!(
        "SELECT {STOCK_COLUMNS} FROM stock_records
         WHERE location = ?1 AND stock_date = ?2
         ORDER BY section, product_name, weight"
    ))?;

    let records = stmt
        .query_map(rusqlite::params![location, date], stock_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(records)
}

/// Lookup by normalized identity, so spelling variants of `product` find the same record.
pub fn find_stock(
    db: &Database,
    location: &str,
    product: &CatalogProduct,
    date: NaiveDate,
) -> Result<Option<StockRecord>> {
    let conn = db.lock();
    let identity = StockItemRef::from(product).identity();

    let record = conn
        .query_row(
            &format!(
                "SELECT {STOCK_COLUMNS} FROM stock_records
                 WHERE location = ?1 AND section_key = ?2 AND name_key = ?3
                   AND weight_key = ?4 AND stock_date = ?5"
            ),
            rusqlite::params![location, identity.section, identity.name, identity.weight, date],
            stock_from_row,
        )
        .optional()?;

    Ok(record)
}
