use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::Result;

pub fn get_value(db: &Database, key: &str) -> Result<Option<String>> {
    let conn = db.lock();

    let value = conn
        .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| row.get(0))
        .optional()?;

    Ok(value)
}

pub fn set_value(db: &Database, key: &str, value: &str) -> Result<()> {
    let conn = db.lock();

    conn.execute(
        "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;

    Ok(())
}
