//! DuckDB database backend implementation
//!
//! Provides an embedded staging target. Supports both file-based persistence
//! and in-memory mode; an in-memory database lives only as long as the
//! backend value that opened it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::schema::{SqlDialect, create_table_sql, insert_sql};
use super::{DatabaseError, DatabaseResult, QueryResult, StagingBackend};
use crate::models::{Batch, ColumnDef, Value};
use crate::validation::TableName;

/// Schema DuckDB places unqualified tables in
const DEFAULT_SCHEMA: &str = "main";

/// DuckDB database backend
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection, `None` once closed
    connection: Mutex<Option<duckdb::Connection>>,
}

impl DuckDBBackend {
    /// Create a new DuckDB backend with a file-based database
    ///
    /// # Arguments
    /// * `db_path` - Path to the DuckDB database file, created if missing
    pub fn new(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!(
                "Failed to open DuckDB at {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!("Opened DuckDB database {}", path.display());

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Create an in-memory DuckDB backend
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut duckdb::Connection) -> DatabaseResult<T>,
    ) -> DatabaseResult<T> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))?;
        let conn = guard.as_mut().ok_or(DatabaseError::Closed)?;
        f(conn)
    }

    /// Execute a SQL statement that doesn't return rows
    fn execute(&self, sql: &str) -> DatabaseResult<usize> {
        self.with_connection(|conn| {
            conn.execute(sql, [])
                .map_err(|e| DatabaseError::QueryFailed(format!("Execute failed: {}", e)))
        })
    }

    /// Convert a DuckDB row to a JSON value
    fn row_to_json(row: &duckdb::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for (i, col_name) in columns.iter().enumerate() {
            let value = match row.get_ref(i) {
                Ok(value_ref) => Self::value_ref_to_json(value_ref),
                Err(_) => serde_json::Value::Null,
            };
            map.insert(col_name.clone(), value);
        }

        serde_json::Value::Object(map)
    }

    /// Convert a DuckDB ValueRef to a JSON value
    fn value_ref_to_json(value: duckdb::types::ValueRef) -> serde_json::Value {
        use duckdb::types::ValueRef;

        match value {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Boolean(b) => serde_json::Value::Bool(b),
            ValueRef::TinyInt(i) => i.into(),
            ValueRef::SmallInt(i) => i.into(),
            ValueRef::Int(i) => i.into(),
            ValueRef::BigInt(i) => i.into(),
            ValueRef::UTinyInt(i) => i.into(),
            ValueRef::USmallInt(i) => i.into(),
            ValueRef::UInt(i) => i.into(),
            ValueRef::UBigInt(i) => i.into(),
            // i128 may not fit in a JSON number
            ValueRef::HugeInt(i) => serde_json::Value::String(i.to_string()),
            ValueRef::Float(f) => serde_json::Number::from_f64(f as f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Double(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueRef::Decimal(d) => serde_json::Value::String(d.to_string()),
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned().into(),
            ValueRef::Blob(bytes) => {
                use base64::Engine;
                serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            other => serde_json::Value::String(format!("{:?}", other)),
        }
    }

    fn to_duckdb_value(value: &Value) -> duckdb::types::Value {
        match value {
            Value::Null => duckdb::types::Value::Null,
            Value::Bool(b) => duckdb::types::Value::Boolean(*b),
            Value::Int(i) => duckdb::types::Value::BigInt(*i),
            Value::Float(f) => duckdb::types::Value::Double(*f),
            Value::Text(s) => duckdb::types::Value::Text(s.clone()),
        }
    }
}

/// Classify a write error, separating integrity violations from other failures
fn map_write_error(e: duckdb::Error) -> DatabaseError {
    let message = e.to_string();
    if message.contains("Constraint Error") {
        DatabaseError::ConstraintViolation(message)
    } else {
        DatabaseError::QueryFailed(format!("Insert failed: {}", message))
    }
}

#[async_trait(?Send)]
impl StagingBackend for DuckDBBackend {
    async fn table_exists(&self, table: &TableName) -> DatabaseResult<bool> {
        let schema = table.schema().unwrap_or(DEFAULT_SCHEMA);

        self.with_connection(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
                    duckdb::params![schema, table.name()],
                    |row| row.get(0),
                )
                .map_err(|e| DatabaseError::QueryFailed(format!("Table lookup failed: {}", e)))?;
            Ok(count > 0)
        })
    }

    async fn create_table(&self, table: &TableName, columns: &[ColumnDef]) -> DatabaseResult<()> {
        if let Some(schema) = table.schema() {
            self.execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                super::schema::quote_column(schema)
            ))?;
        }

        self.execute(&create_table_sql(table, columns, SqlDialect::DuckDB))?;
        tracing::info!("Created staging table {}", table);
        Ok(())
    }

    async fn append_batch(&self, table: &TableName, batch: &Batch) -> DatabaseResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let sql = insert_sql(table, batch.schema().columns(), 1, SqlDialect::DuckDB);

        self.with_connection(|conn| {
            let tx = conn.transaction().map_err(|e| {
                DatabaseError::TransactionFailed(format!("Failed to begin transaction: {}", e))
            })?;

            {
                let mut stmt = tx.prepare(&sql).map_err(map_write_error)?;
                for row in batch.rows() {
                    stmt.execute(duckdb::params_from_iter(
                        row.iter().map(Self::to_duckdb_value),
                    ))
                    .map_err(map_write_error)?;
                }
            }

            // Dropping an uncommitted transaction rolls it back
            tx.commit().map_err(map_write_error)?;
            Ok(batch.len())
        })
    }

    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();

        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;

            // Columns are only known once the statement has run
            let mut result_rows = stmt
                .query([])
                .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

            let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
            let columns: Vec<String> = (0..column_count)
                .map(|i| {
                    result_rows
                        .as_ref()
                        .and_then(|r| r.column_name(i).ok())
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| format!("col{}", i))
                })
                .collect();

            let mut rows = Vec::new();
            while let Some(row) = result_rows
                .next()
                .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
            {
                rows.push(Self::row_to_json(row, &columns));
            }

            Ok(QueryResult::new(columns, rows).timed(start))
        })
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let result = self.execute_query("SELECT 1 AS healthy").await?;
        Ok(!result.rows.is_empty())
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> DatabaseResult<()> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))?;

        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| {
                DatabaseError::ConnectionFailed(format!("Failed to close DuckDB: {}", e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Schema;
    use std::sync::Arc;

    fn batch(ids: &[&str]) -> Batch {
        let schema = Arc::new(Schema::new(vec!["id".to_string(), "name".to_string()]));
        let raw: Vec<Vec<String>> = ids
            .iter()
            .map(|id| vec![id.to_string(), format!("row-{}", id)])
            .collect();
        Batch::from_raw(schema, &raw, true)
    }

    async fn count(backend: &DuckDBBackend, table: &str) -> i64 {
        let result = backend
            .execute_query(&format!("SELECT COUNT(*) AS n FROM {}", table))
            .await
            .unwrap();
        result.rows[0]["n"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert!(backend.is_in_memory());
        assert!(backend.db_path().is_none());
        assert_eq!(backend.backend_type(), "duckdb");
        assert!(backend.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_create_and_append() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let table = TableName::parse("staging_people").unwrap();
        let input = batch(&["1", "2", "3"]);

        assert!(!backend.table_exists(&table).await.unwrap());
        backend
            .create_table(&table, &input.column_defs())
            .await
            .unwrap();
        assert!(backend.table_exists(&table).await.unwrap());

        assert_eq!(backend.append_batch(&table, &input).await.unwrap(), 3);
        assert_eq!(count(&backend, "staging_people").await, 3);

        let result = backend
            .execute_query("SELECT id, name FROM staging_people ORDER BY id")
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.rows[2]["name"], "row-3");
    }

    #[tokio::test]
    async fn test_schema_qualified_table() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let table = TableName::parse("raw.events").unwrap();
        let input = batch(&["1"]);

        backend
            .create_table(&table, &input.column_defs())
            .await
            .unwrap();
        assert!(backend.table_exists(&table).await.unwrap());
        assert!(
            !backend
                .table_exists(&TableName::parse("events").unwrap())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_constraint_violation_rolls_back_batch() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend
            .execute("CREATE TABLE keyed (id BIGINT PRIMARY KEY, name TEXT)")
            .unwrap();
        backend
            .execute("INSERT INTO keyed VALUES (42, 'existing')")
            .unwrap();

        let table = TableName::parse("keyed").unwrap();
        let err = backend
            .append_batch(&table, &batch(&["43", "42"]))
            .await
            .unwrap_err();

        assert!(err.is_constraint_violation(), "unexpected error: {}", err);
        assert_eq!(count(&backend, "keyed").await, 1);

        // The connection stays usable after the rollback
        assert_eq!(
            backend.append_batch(&table, &batch(&["44"])).await.unwrap(),
            1
        );
        assert_eq!(count(&backend, "keyed").await, 2);
    }

    #[tokio::test]
    async fn test_missing_column_is_not_a_constraint_violation() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend.execute("CREATE TABLE narrow (id BIGINT)").unwrap();

        let err = backend
            .append_batch(&TableName::parse("narrow").unwrap(), &batch(&["1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::QueryFailed(_)));
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.duckdb");
        let table = TableName::parse("people").unwrap();

        {
            let backend = DuckDBBackend::new(&path).unwrap();
            let input = batch(&["1", "2"]);
            backend
                .create_table(&table, &input.column_defs())
                .await
                .unwrap();
            backend.append_batch(&table, &input).await.unwrap();
            backend.close().await.unwrap();
        }

        let reopened = DuckDBBackend::new(&path).unwrap();
        assert_eq!(reopened.db_path(), Some(path.as_path()));
        assert_eq!(count(&reopened, "people").await, 2);
    }

    #[tokio::test]
    async fn test_closed_backend_errors() {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend.close().await.unwrap();
        backend.close().await.unwrap();

        assert!(matches!(
            backend.health_check().await,
            Err(DatabaseError::Closed)
        ));
    }
}
