use async_trait::async_trait;
use sqlx::{Column, Row};

use sqlagent_core::{CellValue, Engine, Error, Result};

/// Column metadata as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
}

impl ColumnInfo {
    /// One schema line, e.g. `  - Name: NVARCHAR(120) NOT NULL DEFAULT 'x'`.
    pub fn describe(&self) -> String {
        let nullable = if self.nullable { "NULL" } else { "NOT NULL" };
        let default = self
            .default
            .as_ref()
            .map(|value| format!(" DEFAULT {value}"))
            .unwrap_or_default();
        format!("  - {}: {} {}{}", self.name, self.data_type, nullable, default)
    }
}

/// Decoded rows from a query that returns data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Trait implemented by engines the agent can talk to.
#[async_trait]
pub trait Backend: Send + Sync {
    fn engine(&self) -> Engine;

    /// Round-trip a trivial statement to prove the connection works.
    async fn ping(&self) -> Result<()>;

    /// User tables, sorted by name.
    async fn table_names(&self) -> Result<Vec<String>>;

    /// Columns of `table` in declaration order.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Run a statement that returns rows.
    async fn fetch(&self, sql: &str) -> Result<ResultSet>;

    /// Run a statement that modifies data and return the affected row count.
    async fn execute(&self, sql: &str) -> Result<u64>;

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }
}

pub(crate) fn collect_rows<R: Row>(rows: &[R], decode: fn(&R, usize) -> CellValue) -> ResultSet {
    let columns = rows
        .first()
        .map(|row| {
            row.columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect()
        })
        .unwrap_or_default();

    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| decode(row, idx)).collect())
        .collect();

    ResultSet { columns, rows }
}

pub(crate) fn db_err(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) => Error::Db(db.message().to_string()),
        other => Error::Db(other.to_string()),
    }
}

pub(crate) fn undecodable(err: sqlx::Error) -> CellValue {
    CellValue::Text(format!("<undecodable: {err}>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_columns_with_defaults() {
        let column = ColumnInfo {
            name: "Total".to_string(),
            data_type: "NUMERIC(10,2)".to_string(),
            nullable: false,
            default: Some("0".to_string()),
        };
        assert_eq!(column.describe(), "  - Total: NUMERIC(10,2) NOT NULL DEFAULT 0");

        let column = ColumnInfo {
            name: "Composer".to_string(),
            data_type: "NVARCHAR(220)".to_string(),
            nullable: true,
            default: None,
        };
        assert_eq!(column.describe(), "  - Composer: NVARCHAR(220) NULL");
    }
}
