use thiserror::Error;

/// Core error type shared across the SQL agent crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The database could not be reached during startup.
    #[error("{0}")]
    Connection(String),
    /// Database error or backend failure.
    #[error("database error: {0}")]
    Db(String),
    /// The connection string names an engine that has no backend.
    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),
    /// The connection string could not be understood.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    /// A write was attempted against a read-only handle.
    #[error("database is read-only; {0}")]
    ReadOnly(String),
}

/// Convenience alias for results returned by the SQL agent crates.
pub type Result<T> = std::result::Result<T, Error>;
