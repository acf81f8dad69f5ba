use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

use crate::db::Database;
use crate::error::Result;
use crate::models::{CreateOrder, ItemVariant, Order, OrderItem};

pub fn create_order(db: &Database, order: &CreateOrder) -> Result<Order> {
    let conn = db.lock();
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO orders (id, location, delivery_date) VALUES (?1, ?2, ?3)",
        rusqlite::params![order.id, order.location, order.delivery_date],
    )?;

    for item in &order.items {
        let (option_name, option_quantity) = match &item.variant {
            Some(variant) => (variant.name.clone(), variant.quantity),
            None => (None, None),
        };
        tx.execute(
            "INSERT INTO order_items (order_id, name, option_name, option_quantity, quantity) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![order.id, item.name, option_name, option_quantity, item.quantity],
        )?;
    }

    tx.commit()?;

    let created = load_order(&conn, &order.id)?;
    created.ok_or_else(|| crate::error::StockError::Backend(format!("order {} vanished after insert", order.id)))
}

pub fn get_order(db: &Database, id: &str) -> Result<Option<Order>> {
    let conn = db.lock();
    load_order(&conn, id)
}

/// Orders for a location delivered between `from` and `to` inclusive, newest first.
pub fn list_orders(db: &Database, location: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Order>> {
    let conn = db.lock();

    let mut stmt = conn.prepare(
        "SELECT id, location, delivery_date, created_at
         FROM orders
         WHERE location = ?1 AND delivery_date BETWEEN ?2 AND ?3
         ORDER BY created_at DESC, rowid DESC",
    )?;

    let headers = stmt
        .query_map(rusqlite::params![location, from, to], order_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut result = Vec::with_capacity(headers.len());
    for mut order in headers {
        order.items = load_items(&conn, &order.id)?;
        result.push(order);
    }

    Ok(result)
}

fn order_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        location: row.get(1)?,
        delivery_date: row.get(2)?,
        created_at: row.get(3)?,
        items: Vec::new(),
    })
}

fn load_order(conn: &Connection, id: &str) -> Result<Option<Order>> {
    let order = conn
        .query_row(
            "SELECT id, location, delivery_date, created_at FROM orders WHERE id = ?1",
            [id],
            order_from_row,
        )
        .optional()?;

    match order {
        Some(mut order) => {
            order.items = load_items(conn, id)?;
            Ok(Some(order))
        }
        None => Ok(None),
    }
}

fn load_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    let mut item_stmt = conn.prepare(
        "SELECT name, option_name, option_quantity, quantity
         FROM order_items
         WHERE order_id = ?1
         ORDER BY id",
    )?;

    let items = item_stmt
        .query_map([order_id], |row| {
            let option_name: Option<String> = row.get(1)?;
            let option_quantity: Option<i32> = row.get(2)?;
            let variant = if option_name.is_some() || option_quantity.is_some() {
                Some(ItemVariant {
                    name: option_name,
                    quantity: option_quantity,
                })
            } else {
                None
            };
            Ok(OrderItem {
                name: row.get(0)?,
                variant,
                quantity: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(items)
}
