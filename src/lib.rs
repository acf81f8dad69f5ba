mod commands;
mod db;

pub mod board;
pub mod config;
pub mod coordinator;
pub mod demand;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod priority;
pub mod providers;


use std::sync::Arc;

use tracing::info;

pub use board::{OrderQueue, StockBoard};
pub use commands::{catalog, kv, orders, stock};
pub use config::Config;
pub use coordinator::{CoordinatorConfig, InFlightPolicy, RowContext, SyncEvent, WriteCoordinator};
pub use db::{Database, SqliteBackend};
pub use error::{Result, StockError};

/// Opens and migrates the configured database, installing logging first.
pub fn bootstrap(config: &Config) -> Result<Arc<Database>> {
    logging::init_tracing(&config.log_filter);

    let db = Database::open(&config.database_path)?;
    db.initialize()?;
    info!(
        path = %config.database_path.display(),
        debounce_ms = config.debounce_ms,
        policy = ?config.in_flight_policy,
        "stock engine ready"
    );

    Ok(Arc::new(db))
}
