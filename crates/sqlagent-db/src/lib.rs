//! Database access for the SQL agent.
//!
//! [`SqlDatabase`] wraps a connection pool and exposes the four operations the
//! agent offers to the model as tools. Every operation returns plain text so
//! failures can be shown to the model instead of aborting a run.

pub mod backend;
pub mod checker;
pub mod database;
pub mod options;
pub mod postgres;
pub mod sqlite;

pub use backend::{Backend, ColumnInfo, ResultSet};
pub use checker::{StatementKind, check_syntax, classify};
pub use database::SqlDatabase;
pub use options::{AccessMode, DatabaseOptions};
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

pub use sqlagent_core::{Engine, Error, Result};
