use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Database engines with a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Sqlite,
    Postgres,
}

impl Engine {
    /// Returns the engine identifier (e.g. `postgres`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Sqlite => "sqlite",
            Engine::Postgres => "postgres",
        }
    }

    /// Human-facing dialect name used when prompting the model.
    pub fn dialect_name(&self) -> &'static str {
        match self {
            Engine::Sqlite => "SQLite",
            Engine::Postgres => "PostgreSQL",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    Memory,
    File(PathBuf),
}

/// A parsed connection string, ready to hand to a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Sqlite(SqliteLocation),
    /// Postgres URL with any `+driver` qualifier removed.
    Postgres(String),
}

impl ConnectionTarget {
    /// Parse a connection string.
    ///
    /// SQLite accepts the SQLAlchemy forms (`sqlite:///relative.db`,
    /// `sqlite:////absolute.db`, `sqlite://` for memory) as well as the
    /// shorter `sqlite:path.db` and `sqlite::memory:`.
    pub fn parse(conn: &str) -> Result<Self> {
        let conn = conn.trim();
        let Some(colon) = conn.find(':') else {
            return Err(Error::InvalidConnectionString(
                "missing scheme (expected e.g. sqlite:///file.db)".to_string(),
            ));
        };

        let scheme = &conn[..colon];
        let base_scheme = scheme.split('+').next().unwrap_or(scheme).to_ascii_lowercase();
        let rest = &conn[colon + 1..];

        match base_scheme.as_str() {
            "sqlite" => Ok(ConnectionTarget::Sqlite(parse_sqlite_location(rest)?)),
            "postgres" | "postgresql" => {
                if !rest.starts_with("//") {
                    return Err(Error::InvalidConnectionString(
                        "postgres connection strings must start with postgres://".to_string(),
                    ));
                }
                Ok(ConnectionTarget::Postgres(format!("postgres:{rest}")))
            }
            _ => Err(Error::UnsupportedEngine(base_scheme)),
        }
    }

    pub fn engine(&self) -> Engine {
        match self {
            ConnectionTarget::Sqlite(_) => Engine::Sqlite,
            ConnectionTarget::Postgres(_) => Engine::Postgres,
        }
    }
}

fn parse_sqlite_location(rest: &str) -> Result<SqliteLocation> {
    let rest = rest.split('?').next().unwrap_or("");

    let path = if let Some(after_authority) = rest.strip_prefix("//") {
        // sqlite://<host>/<path>; the host part must be empty.
        if after_authority.is_empty() {
            return Ok(SqliteLocation::Memory);
        }
        let Some(path) = after_authority.strip_prefix('/') else {
            return Err(Error::InvalidConnectionString(
                "sqlite URLs take the form sqlite:///path.db".to_string(),
            ));
        };
        path
    } else {
        rest
    };

    if path.is_empty() || path == ":memory:" {
        return Ok(SqliteLocation::Memory);
    }

    Ok(SqliteLocation::File(PathBuf::from(path)))
}
