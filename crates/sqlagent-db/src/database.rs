use tracing::{debug, info, warn};

use sqlagent_core::{
    ConnectionTarget, Engine, Error, RedactedConnection, Result, redact_connection_string,
    render_table,
};

use crate::backend::Backend;
use crate::checker;
use crate::options::DatabaseOptions;
use crate::postgres::PostgresBackend;
use crate::sqlite::SqliteBackend;

/// Handle to the database the agent answers questions about.
pub struct SqlDatabase {
    backend: Box<dyn Backend>,
    connection: RedactedConnection,
    options: DatabaseOptions,
}

impl std::fmt::Debug for SqlDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlDatabase")
            .field("engine", &self.backend.engine())
            .field("connection", &self.connection.redacted)
            .field("options", &self.options)
            .finish()
    }
}

impl SqlDatabase {
    /// Connect with default options.
    pub async fn connect(conn: &str) -> Result<Self> {
        Self::connect_with(conn, DatabaseOptions::default()).await
    }

    /// Connect and verify the connection with a trivial query.
    pub async fn connect_with(conn: &str, options: DatabaseOptions) -> Result<Self> {
        let target = ConnectionTarget::parse(conn)?;
        let connection = redact_connection_string(conn);

        let backend: Box<dyn Backend> = match &target {
            ConnectionTarget::Sqlite(location) => Box::new(
                SqliteBackend::connect(location, &options)
                    .await
                    .map_err(connection_failed)?,
            ),
            ConnectionTarget::Postgres(url) => Box::new(
                PostgresBackend::connect(url, &options)
                    .await
                    .map_err(connection_failed)?,
            ),
        };

        Self::with_backend(backend, connection, options).await
    }

    /// Wrap an already-connected backend.
    pub async fn with_backend(
        backend: Box<dyn Backend>,
        connection: RedactedConnection,
        options: DatabaseOptions,
    ) -> Result<Self> {
        backend.ping().await.map_err(connection_failed)?;

        info!(
            event = "database_connected",
            engine = %backend.engine(),
            connection = %connection.redacted,
            read_only = options.access.is_read_only()
        );

        Ok(Self {
            backend,
            connection,
            options,
        })
    }

    pub fn engine(&self) -> Engine {
        self.backend.engine()
    }

    pub fn connection(&self) -> &RedactedConnection {
        &self.connection
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Comma-separated list of user tables.
    pub async fn list_tables(&self) -> String {
        match self.backend.table_names().await {
            Ok(tables) if tables.is_empty() => "No tables found in the database.".to_string(),
            Ok(tables) => tables.join(", "),
            Err(err) => format!("Error retrieving table list: {}", detail(&err)),
        }
    }

    /// Column listing plus sample rows for each table in a comma-separated list.
    pub async fn schema(&self, tables: &str) -> String {
        let requested: Vec<&str> = tables
            .split(',')
            .map(str::trim)
            .filter(|table| !table.is_empty())
            .collect();

        if requested.is_empty() {
            return "No tables specified.".to_string();
        }

        let known = match self.backend.table_names().await {
            Ok(known) => known,
            Err(err) => {
                return format!("Error retrieving schema information: {}", detail(&err));
            }
        };

        let mut parts = Vec::with_capacity(requested.len());
        for table in requested {
            if !known.iter().any(|name| name == table) {
                parts.push(format!("Table '{table}' does not exist."));
                continue;
            }

            match self.describe_table(table).await {
                Ok(block) => parts.push(block),
                Err(err) => {
                    return format!("Error retrieving schema information: {}", detail(&err));
                }
            }
        }

        parts.join("\n\n")
    }

    async fn describe_table(&self, table: &str) -> Result<String> {
        let columns = self.backend.columns(table).await?;

        let mut lines = vec![format!("\nTable: {table}"), "Columns:".to_string()];
        lines.extend(columns.iter().map(|column| column.describe()));

        let sample_sql = format!(
            "SELECT * FROM {} LIMIT {}",
            self.backend.quote_ident(table),
            self.options.sample_rows
        );

        match self.backend.fetch(&sample_sql).await {
            Ok(sample) if sample.is_empty() => {
                lines.push("\nNo sample rows available (table is empty).".to_string());
            }
            Ok(sample) => {
                let names: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
                lines.push("\nSample rows:".to_string());
                lines.push(render_table(&names, &sample.rows));
            }
            Err(err) => {
                warn!(event = "sample_rows_failed", table = %table, error = %err);
                lines.push(format!("\nError retrieving sample rows: {}", detail(&err)));
            }
        }

        Ok(lines.join("\n"))
    }

    /// Syntax check without touching the database.
    pub fn check_query(&self, query: &str) -> String {
        checker::check_syntax(self.engine(), query, self.options.access)
    }

    /// Execute SQL and render rows, a row count, or the error.
    pub async fn run_query(&self, query: &str) -> String {
        let kind = checker::classify(self.engine(), query);
        debug!(event = "query_classified", kind = ?kind);

        if kind.writes && self.options.access.is_read_only() {
            let err = Error::ReadOnly("only queries that read data are permitted.".to_string());
            return format!("Error executing query: {err}");
        }

        if kind.returns_rows {
            match self.backend.fetch(query).await {
                Ok(result) if result.is_empty() => "No rows returned.".to_string(),
                Ok(result) => render_table(&result.columns, &result.rows),
                Err(err) => format!("Error executing query: {}", detail(&err)),
            }
        } else {
            match self.backend.execute(query).await {
                Ok(affected) => format!("Query executed successfully. {affected} row(s) affected."),
                Err(err) => format!("Error executing query: {}", detail(&err)),
            }
        }
    }
}

fn connection_failed(err: Error) -> Error {
    Error::Connection(format!("Failed to connect to database: {}", detail(&err)))
}

/// Driver message without the error-kind prefix.
fn detail(err: &Error) -> String {
    match err {
        Error::Db(message) => message.clone(),
        other => other.to_string(),
    }
}
