use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use tracing::debug;

use sqlagent_core::{CellValue, Engine, Result, SqliteLocation};

use crate::backend::{Backend, ColumnInfo, ResultSet, collect_rows, db_err, undecodable};
use crate::options::DatabaseOptions;

/// Backend for SQLite files and in-memory databases.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn connect(location: &SqliteLocation, opts: &DatabaseOptions) -> Result<Self> {
        let read_only = opts.access.is_read_only();
        let (connect, max_connections) = match location {
            // Every connection to `:memory:` is a fresh database, so the pool
            // must hold exactly one connection and never recycle it.
            SqliteLocation::Memory => (
                SqliteConnectOptions::from_str("sqlite::memory:").map_err(db_err)?,
                1,
            ),
            SqliteLocation::File(path) => (
                SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(!read_only)
                    .read_only(read_only),
                opts.max_connections,
            ),
        };

        debug!(event = "sqlite_pool_opening", max_connections, read_only);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(opts.acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect)
            .await
            .map_err(db_err)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Backend for SqliteBackend {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            select name
            from sqlite_master
            where type = 'table'
              and name not like 'sqlite_%'
            order by name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            r#"
            select name, type, "notnull", dflt_value
            from pragma_table_info(?1)
            order by cid
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let data_type: String = row.try_get_unchecked("type").map_err(db_err)?;
                let not_null: i64 = row.try_get_unchecked("notnull").map_err(db_err)?;
                Ok(ColumnInfo {
                    name: row.try_get_unchecked("name").map_err(db_err)?,
                    data_type: if data_type.is_empty() {
                        "NULL".to_string()
                    } else {
                        data_type
                    },
                    nullable: not_null == 0,
                    default: row.try_get_unchecked("dflt_value").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn fetch(&self, sql: &str) -> Result<ResultSet> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(collect_rows(&rows, sqlite_cell))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

fn sqlite_cell(row: &SqliteRow, idx: usize) -> CellValue {
    let storage = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return CellValue::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(err) => return undecodable(err),
    };

    let decoded = match storage.as_str() {
        "INTEGER" => row.try_get_unchecked::<i64, _>(idx).map(CellValue::Int),
        "REAL" => row.try_get_unchecked::<f64, _>(idx).map(CellValue::Float),
        "BOOLEAN" => row.try_get_unchecked::<bool, _>(idx).map(CellValue::Bool),
        "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(idx).map(CellValue::Bytes),
        _ => row.try_get_unchecked::<String, _>(idx).map(CellValue::Text),
    };

    decoded.unwrap_or_else(undecodable)
}
