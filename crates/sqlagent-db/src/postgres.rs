use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney};
use sqlx::postgres::{PgConnectOptions, PgHasArrayType, PgPool, PgPoolOptions, PgRow, PgTypeKind};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{Decode, Postgres, Row, Type, TypeInfo, ValueRef};
use tracing::debug;
use uuid::Uuid;

use sqlagent_core::{CellValue, Engine, Result};

use crate::backend::{Backend, ColumnInfo, ResultSet, collect_rows, db_err, undecodable};
use crate::options::DatabaseOptions;

/// Backend for PostgreSQL. Catalog queries are scoped to `current_schema()`.
///
/// A read-only backend opens every session with `default_transaction_read_only`
/// and also wraps each statement in its own `READ ONLY` transaction, since a
/// query can switch the session default off with `set_config`.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    read_only: bool,
}

impl PostgresBackend {
    pub async fn connect(url: &str, opts: &DatabaseOptions) -> Result<Self> {
        let mut connect: PgConnectOptions = url.parse().map_err(db_err)?;
        if opts.access.is_read_only() {
            connect = connect.options([("default_transaction_read_only", "on")]);
        }

        debug!(
            event = "postgres_pool_opening",
            max_connections = opts.max_connections,
            read_only = opts.access.is_read_only()
        );

        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .acquire_timeout(opts.acquire_timeout)
            .connect_with(connect)
            .await
            .map_err(db_err)?;

        Ok(Self {
            pool,
            read_only: opts.access.is_read_only(),
        })
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("select 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            select c.relname::text
            from pg_catalog.pg_class c
            join pg_catalog.pg_namespace n on n.oid = c.relnamespace
            where n.nspname = current_schema()
              and c.relkind in ('r', 'p')
            order by c.relname
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(
            r#"
            select
              a.attname::text as name,
              pg_catalog.format_type(a.atttypid, a.atttypmod) as data_type,
              not a.attnotnull as nullable,
              pg_catalog.pg_get_expr(d.adbin, d.adrelid) as column_default
            from pg_catalog.pg_attribute a
            join pg_catalog.pg_class c on c.oid = a.attrelid
            join pg_catalog.pg_namespace n on n.oid = c.relnamespace
            left join pg_catalog.pg_attrdef d
              on d.adrelid = a.attrelid and d.adnum = a.attnum
            where n.nspname = current_schema()
              and c.relname = $1
              and a.attnum > 0
              and not a.attisdropped
            order by a.attnum
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let data_type: String = row.try_get("data_type").map_err(db_err)?;
                Ok(ColumnInfo {
                    name: row.try_get("name").map_err(db_err)?,
                    data_type: data_type.to_uppercase(),
                    nullable: row.try_get("nullable").map_err(db_err)?,
                    default: row.try_get("column_default").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn fetch(&self, sql: &str) -> Result<ResultSet> {
        if !self.read_only {
            let rows = sqlx::query(sql)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
            return Ok(collect_rows(&rows, postgres_cell));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let rows = sqlx::query(sql).fetch_all(&mut *tx).await.map_err(db_err)?;
        tx.rollback().await.map_err(db_err)?;
        Ok(collect_rows(&rows, postgres_cell))
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        if !self.read_only {
            let result = sqlx::Executor::execute(&self.pool, sqlx::raw_sql(sql))
                .await
                .map_err(db_err)?;
            return Ok(result.rows_affected());
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        let result = sqlx::Executor::execute(&mut *tx, sqlx::raw_sql(sql))
            .await
            .map_err(db_err)?;
        tx.rollback().await.map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

fn postgres_cell(row: &PgRow, idx: usize) -> CellValue {
    let (type_name, is_enum) = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return CellValue::Null,
        Ok(raw) => {
            let info = raw.type_info();
            (
                info.name().to_string(),
                matches!(info.kind(), PgTypeKind::Enum(_)),
            )
        }
        Err(err) => return undecodable(err),
    };

    let decoded = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(idx).map(CellValue::Bool),
        "INT2" => row.try_get::<i16, _>(idx).map(|v| CellValue::Int(v.into())),
        "INT4" => row.try_get::<i32, _>(idx).map(|v| CellValue::Int(v.into())),
        "INT8" => row.try_get::<i64, _>(idx).map(CellValue::Int),
        "OID" => row.try_get::<Oid, _>(idx).map(|v| CellValue::Int(v.0.into())),
        "FLOAT4" => row
            .try_get::<f32, _>(idx)
            .map(|v| CellValue::Text(format!("{v:?}"))),
        "FLOAT8" => row.try_get::<f64, _>(idx).map(CellValue::Float),
        "NUMERIC" => row.try_get::<Decimal, _>(idx).map(text),
        "MONEY" => row.try_get::<PgMoney, _>(idx).map(|v| text(v.to_decimal(2))),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" | "citext" => {
            row.try_get::<String, _>(idx).map(CellValue::Text)
        }
        "DATE" => row.try_get::<NaiveDate, _>(idx).map(text),
        "TIME" => row.try_get::<NaiveTime, _>(idx).map(text),
        "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(idx).map(text),
        "TIMESTAMPTZ" => row.try_get::<DateTime<Utc>, _>(idx).map(text),
        "INTERVAL" => row
            .try_get::<PgInterval, _>(idx)
            .map(|v| CellValue::Text(format_interval(&v))),
        "UUID" => row.try_get::<Uuid, _>(idx).map(text),
        "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(idx).map(text),
        "INET" => row
            .try_get::<IpNetwork, _>(idx)
            .map(|v| CellValue::Text(format_inet(v))),
        "CIDR" => row.try_get::<IpNetwork, _>(idx).map(text),
        "BYTEA" => row.try_get::<Vec<u8>, _>(idx).map(CellValue::Bytes),
        "BOOL[]" => array::<bool>(row, idx),
        "INT2[]" => array::<i16>(row, idx),
        "INT4[]" => array::<i32>(row, idx),
        "INT8[]" => array::<i64>(row, idx),
        "FLOAT4[]" => array::<f32>(row, idx),
        "FLOAT8[]" => array::<f64>(row, idx),
        "NUMERIC[]" => array::<Decimal>(row, idx),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => array::<String>(row, idx),
        "UUID[]" => array::<Uuid>(row, idx),
        // Enum labels travel as plain text.
        _ if is_enum => row.try_get_unchecked::<String, _>(idx).map(CellValue::Text),
        _ => return CellValue::Text(format!("<unsupported type {type_name}>")),
    };

    decoded.unwrap_or_else(undecodable)
}

fn text<T: ToString>(value: T) -> CellValue {
    CellValue::Text(value.to_string())
}

/// Render a one-dimensional array the way `psql` does: `{1,NULL,3}`.
fn array<T>(row: &PgRow, idx: usize) -> std::result::Result<CellValue, sqlx::Error>
where
    T: ToString + PgHasArrayType + for<'r> Decode<'r, Postgres> + Type<Postgres>,
{
    let values = row.try_get::<Vec<Option<T>>, _>(idx)?;
    let items: Vec<String> = values
        .iter()
        .map(|value| match value {
            Some(value) => value.to_string(),
            None => "NULL".to_string(),
        })
        .collect();
    Ok(CellValue::Text(format!("{{{}}}", items.join(","))))
}

/// Host addresses drop the full-length prefix, as Postgres prints them.
fn format_inet(network: IpNetwork) -> String {
    let full = if network.is_ipv4() { 32 } else { 128 };
    if network.prefix() == full {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

/// Postgres' default interval style, e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    for (amount, unit) in [
        (interval.months / 12, "year"),
        (interval.months % 12, "mon"),
        (interval.days, "day"),
    ] {
        if amount != 0 {
            let plural = if amount.abs() == 1 { "" } else { "s" };
            parts.push(format!("{amount} {unit}{plural}"));
        }
    }

    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            clock.push_str(format!(".{fraction:06}").trim_end_matches('0'));
        }
        parts.push(clock);
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(months: i32, days: i32, microseconds: i64) -> String {
        format_interval(&PgInterval {
            months,
            days,
            microseconds,
        })
    }

    #[test]
    fn renders_intervals_like_psql() {
        assert_eq!(interval(0, 0, 0), "00:00:00");
        assert_eq!(interval(14, 3, 14_706_500_000), "1 year 2 mons 3 days 04:05:06.5");
        assert_eq!(interval(1, 1, 0), "1 mon 1 day");
        assert_eq!(interval(0, -2, -90_000_000), "-2 days -00:01:30");
    }

    #[test]
    fn renders_host_addresses_without_prefix() {
        let host: IpNetwork = "10.0.0.1/32".parse().unwrap();
        let subnet: IpNetwork = "10.0.0.0/8".parse().unwrap();
        assert_eq!(format_inet(host), "10.0.0.1");
        assert_eq!(format_inet(subnet), "10.0.0.0/8");
    }
}
