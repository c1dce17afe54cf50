//! Staging database backends
//!
//! This module provides the database layer the loader appends batches to:
//! - DuckDB: embedded database file, the default staging target
//! - PostgreSQL: server deployments, behind the `postgres-backend` feature
//!
//! Backends are opened from a [`ConnectionDescriptor`] with [`connect`] and
//! spoken to through the [`StagingBackend`] trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Batch, ColumnDef};
use crate::validation::TableName;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod config;
pub mod schema;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBBackend;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

pub use config::{ConnectionDescriptor, DatabaseBackendType};
pub use schema::SqlDialect;

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The target rejected rows because they break a declared constraint
    #[error("Integrity constraint violated: {0}")]
    ConstraintViolation(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connection used after close
    #[error("Connection already closed")]
    Closed,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DatabaseError {
    /// Whether the error is an integrity violation the run can continue past
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DatabaseError::ConstraintViolation(_))
    }
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Query result row as a JSON value
pub type QueryRow = serde_json::Value;

/// Rows returned by an ad-hoc query, keyed by column name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<QueryRow>,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Record how long the statement took
    pub fn timed(mut self, started: std::time::Instant) -> Self {
        self.execution_time_ms = started.elapsed().as_millis() as u64;
        self
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Staging database backend
///
/// One value wraps one open connection. The loader opens a backend per
/// batch, appends, and closes it again.
#[async_trait(?Send)]
pub trait StagingBackend {
    /// Check whether the target table exists
    async fn table_exists(&self, table: &TableName) -> DatabaseResult<bool>;

    /// Create the target table from batch columns if it does not exist
    async fn create_table(&self, table: &TableName, columns: &[ColumnDef]) -> DatabaseResult<()>;

    /// Append every row of the batch in a single transaction
    ///
    /// Values are mapped to table columns by name. On any error nothing from
    /// the batch is kept; integrity violations surface as
    /// [`DatabaseError::ConstraintViolation`].
    ///
    /// # Returns
    /// Number of rows appended
    async fn append_batch(&self, table: &TableName, batch: &Batch) -> DatabaseResult<usize>;

    /// Execute a SQL statement and return its rows
    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult>;

    /// Check if database is healthy and accessible
    async fn health_check(&self) -> DatabaseResult<bool>;

    /// Backend type string ("duckdb" or "postgres")
    fn backend_type(&self) -> &'static str;

    /// Close the database connection
    async fn close(&self) -> DatabaseResult<()>;
}

/// Open a backend for a connection descriptor
pub async fn connect(descriptor: &ConnectionDescriptor) -> DatabaseResult<Box<dyn StagingBackend>> {
    match descriptor.backend() {
        DatabaseBackendType::DuckDB => {
            #[cfg(feature = "duckdb-backend")]
            {
                let backend = match descriptor.duckdb_path() {
                    Some(path) => DuckDBBackend::new(&path)?,
                    None => DuckDBBackend::in_memory()?,
                };
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "duckdb-backend"))]
            {
                Err(DatabaseError::ConfigError(
                    "DuckDB support not enabled. Enable 'duckdb-backend' feature.".to_string(),
                ))
            }
        }
        DatabaseBackendType::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                let backend = PostgresBackend::connect(descriptor).await?;
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                Err(DatabaseError::ConfigError(
                    "PostgreSQL support not enabled. Enable 'postgres-backend' feature."
                        .to_string(),
                ))
            }
        }
    }
}

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Format query results for display
pub fn format_query_result(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&result.rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_as_csv(result),
        OutputFormat::Table => format_as_table(result),
    }
}

fn cell_text(row: &QueryRow, column: &str, null: &str) -> String {
    match row.get(column).unwrap_or(&serde_json::Value::Null) {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => null.to_string(),
        other => other.to_string(),
    }
}

fn format_as_csv(result: &QueryResult) -> String {
    let mut writer = ::csv::Writer::from_writer(Vec::new());

    let mut write_all = || -> Result<(), ::csv::Error> {
        writer.write_record(&result.columns)?;
        for row in &result.rows {
            writer.write_record(result.columns.iter().map(|col| cell_text(row, col, "")))?;
        }
        writer.flush()?;
        Ok(())
    };

    if let Err(e) = write_all() {
        tracing::warn!("Failed to render CSV output: {}", e);
    }

    writer
        .into_inner()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn format_as_table(result: &QueryResult) -> String {
    if result.is_empty() {
        return "(0 rows)".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|col| cell_text(row, col, "null"))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render = |values: &[String]| -> String {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:width$}", v, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut output = render(&result.columns);
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&separator.join("-+-"));
    output.push('\n');

    for row in &cells {
        output.push_str(&render(row));
        output.push('\n');
    }

    output.push_str(&format!("({} rows)", result.row_count()));

    output
}
