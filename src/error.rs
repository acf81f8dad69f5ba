use thiserror::Error;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),

    /// A stock record already exists for the same location, product and date.
    #[error("stock record already exists for {location} / {product} / {date}")]
    Duplicate {
        location: String,
        product: String,
        date: String,
    },

    #[error("stock record {0} not found")]
    NotFound(i64),

    #[error("no row for key {0}")]
    UnknownRow(String),

    #[error("no tokio runtime to schedule the write on")]
    NoRuntime,

    #[error("backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StockError>;

impl StockError {
    /// True when the error came from the SQLite unique index on stock identity.
    pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}
