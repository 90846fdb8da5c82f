//! Core contracts and helpers for the SQL agent.
//!
//! This crate defines the shared error type, connection-string handling, and
//! the plain-text table rendering used by the database tools.

pub mod connection;
pub mod error;
pub mod redaction;
pub mod render;

pub use connection::{ConnectionTarget, Engine, SqliteLocation};
pub use error::{Error, Result};
pub use redaction::{RedactedConnection, redact_connection_string};
pub use render::{CellValue, render_table};
