//! PostgreSQL database backend implementation
//!
//! Provides a PostgreSQL staging target for server deployments. One backend
//! holds one client; its connection task is spawned on the current tokio
//! runtime and joined again on [`StagingBackend::close`].

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{ToSql, Type};

use super::config::ConnectionDescriptor;
use super::schema::{SqlDialect, create_table_sql, insert_sql, insert_sql_with_casts};
use super::{DatabaseError, DatabaseResult, QueryResult, StagingBackend};
use crate::models::{Batch, ColumnDef, Value};
use crate::validation::{TableName, quote_identifier};

/// Bind parameters allowed in one statement by the wire protocol
const MAX_PARAMETERS: usize = 65_535;

/// Upper bound on rows in one multi-row INSERT
const MAX_ROWS_PER_STATEMENT: usize = 1000;

type Param = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL database backend
pub struct PostgresBackend {
    descriptor: ConnectionDescriptor,
    /// PostgreSQL client, `None` once closed
    client: Mutex<Option<tokio_postgres::Client>>,
    connection_task: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresBackend {
    /// Connect to PostgreSQL
    ///
    /// Must be called from inside a tokio runtime.
    pub async fn connect(descriptor: &ConnectionDescriptor) -> DatabaseResult<Self> {
        let (client, connection) = tokio_postgres::connect(descriptor.url(), tokio_postgres::NoTls)
            .await
            .map_err(|e| {
                DatabaseError::ConnectionFailed(format!(
                    "Failed to connect to PostgreSQL at {}: {}",
                    descriptor,
                    server_message(&e)
                ))
            })?;

        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        tracing::debug!("Connected to {}", descriptor);

        Ok(Self {
            descriptor: descriptor.clone(),
            client: Mutex::new(Some(client)),
            connection_task: Mutex::new(Some(task)),
        })
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        self.descriptor.masked()
    }

    /// Convert a PostgreSQL row to a JSON value
    fn row_to_json(row: &tokio_postgres::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for (i, col_name) in columns.iter().enumerate() {
            map.insert(col_name.clone(), Self::get_column_value(row, i));
        }

        serde_json::Value::Object(map)
    }

    /// Get a column value as JSON
    fn get_column_value(row: &tokio_postgres::Row, idx: usize) -> serde_json::Value {
        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return v.map(serde_json::Value::String).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return v.map(Into::into).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return v.map(Into::into).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<i16>>(idx) {
            return v.map(Into::into).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return v.map(serde_json::Value::Bool).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return v
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<f32>>(idx) {
            return v
                .and_then(|f| serde_json::Number::from_f64(f as f64))
                .map(serde_json::Value::Number)
                .unwrap_or_default();
        }

        serde_json::Value::Null
    }
}

/// Server-side reason for an error, falling back to the client message
fn server_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}

/// SQLSTATE class 23 covers every integrity constraint violation
fn is_integrity_violation(state: &SqlState) -> bool {
    state.code().starts_with("23")
}

/// Classify a write error, separating integrity violations from other failures
fn map_write_error(e: tokio_postgres::Error) -> DatabaseError {
    match e.code() {
        Some(state) if is_integrity_violation(state) => DatabaseError::ConstraintViolation(format!(
            "{} (SQLSTATE {})",
            server_message(&e),
            state.code()
        )),
        _ => DatabaseError::QueryFailed(format!("Insert failed: {}", server_message(&e))),
    }
}

fn conversion_error(value: &Value, ty: &Type) -> DatabaseError {
    DatabaseError::InvalidInput(format!(
        "cannot store {} value '{}' in a {} column",
        value.type_name(),
        value,
        ty
    ))
}

fn binds_natively(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::UNKNOWN
    )
}

/// Cast applied to a text parameter for a column type with no native binding
///
/// The server then parses the cell, so dates, numerics, uuids and the like
/// load from their text form or fail with the server's own message.
fn text_cast(ty: &Type) -> Option<String> {
    if binds_natively(ty) {
        None
    } else {
        Some(format!(
            "{}.{}",
            quote_identifier(ty.schema()),
            quote_identifier(ty.name())
        ))
    }
}

/// Convert a cell into a bind parameter of the target column's type
fn to_param(value: &Value, ty: &Type) -> DatabaseResult<Param> {
    macro_rules! narrow {
        ($target:ty) => {
            match value {
                Value::Null => Ok(Box::new(None::<$target>)),
                Value::Int(i) => <$target>::try_from(*i)
                    .map(|n| Box::new(Some(n)) as Param)
                    .map_err(|_| conversion_error(value, ty)),
                _ => Err(conversion_error(value, ty)),
            }
        };
    }

    match *ty {
        Type::BOOL => match value {
            Value::Null => Ok(Box::new(None::<bool>)),
            Value::Bool(b) => Ok(Box::new(Some(*b))),
            _ => Err(conversion_error(value, ty)),
        },
        Type::INT2 => narrow!(i16),
        Type::INT4 => narrow!(i32),
        Type::INT8 => narrow!(i64),
        Type::FLOAT4 => match value {
            Value::Null => Ok(Box::new(None::<f32>)),
            Value::Int(i) => Ok(Box::new(Some(*i as f32))),
            Value::Float(f) => Ok(Box::new(Some(*f as f32))),
            _ => Err(conversion_error(value, ty)),
        },
        Type::FLOAT8 => match value {
            Value::Null => Ok(Box::new(None::<f64>)),
            Value::Int(i) => Ok(Box::new(Some(*i as f64))),
            Value::Float(f) => Ok(Box::new(Some(*f))),
            _ => Err(conversion_error(value, ty)),
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => match value {
            Value::Null => Ok(Box::new(None::<String>)),
            other => Ok(Box::new(Some(other.to_string()))),
        },
        _ => Err(DatabaseError::InvalidInput(format!(
            "unsupported staging column type {}",
            ty
        ))),
    }
}

#[async_trait(?Send)]
impl StagingBackend for PostgresBackend {
    async fn table_exists(&self, table: &TableName) -> DatabaseResult<bool> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(DatabaseError::Closed)?;

        let row = client
            .query_one(
                "SELECT to_regclass($1::text) IS NOT NULL",
                &[&table.quoted()],
            )
            .await
            .map_err(|e| {
                DatabaseError::QueryFailed(format!("Table lookup failed: {}", server_message(&e)))
            })?;

        Ok(row.get(0))
    }

    async fn create_table(&self, table: &TableName, columns: &[ColumnDef]) -> DatabaseResult<()> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(DatabaseError::Closed)?;

        if let Some(schema) = table.schema() {
            client
                .batch_execute(&format!(
                    "CREATE SCHEMA IF NOT EXISTS {}",
                    quote_identifier(schema)
                ))
                .await
                .map_err(|e| {
                    DatabaseError::QueryFailed(format!(
                        "Failed to create schema {}: {}",
                        schema,
                        server_message(&e)
                    ))
                })?;
        }

        client
            .batch_execute(&create_table_sql(table, columns, SqlDialect::Postgres))
            .await
            .map_err(|e| {
                DatabaseError::QueryFailed(format!(
                    "Failed to create table {}: {}",
                    table,
                    server_message(&e)
                ))
            })?;

        tracing::info!("Created staging table {}", table);
        Ok(())
    }

    async fn append_batch(&self, table: &TableName, batch: &Batch) -> DatabaseResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(DatabaseError::Closed)?;

        let columns = batch.schema().columns();
        let rows_per_statement = (MAX_PARAMETERS / columns.len()).clamp(1, MAX_ROWS_PER_STATEMENT);

        // Dropping an uncommitted transaction rolls it back
        let tx = client.transaction().await.map_err(|e| {
            DatabaseError::TransactionFailed(format!(
                "Failed to begin transaction: {}",
                server_message(&e)
            ))
        })?;

        // Column types of the target table, from a single-row statement
        let casts: Vec<Option<String>> = tx
            .prepare(&insert_sql(table, columns, 1, SqlDialect::Postgres))
            .await
            .map_err(map_write_error)?
            .params()
            .iter()
            .map(text_cast)
            .collect();

        for rows in batch.rows().chunks(rows_per_statement) {
            let sql = insert_sql_with_casts(
                table,
                columns,
                rows.len(),
                SqlDialect::Postgres,
                &casts,
            );
            let stmt = tx.prepare(&sql).await.map_err(map_write_error)?;

            let types = stmt.params();
            let params = rows
                .iter()
                .flatten()
                .zip(types.iter())
                .map(|(value, ty)| to_param(value, ty))
                .collect::<DatabaseResult<Vec<Param>>>()?;
            let refs: Vec<&(dyn ToSql + Sync)> = params
                .iter()
                .map(|p| p.as_ref() as &(dyn ToSql + Sync))
                .collect();

            tx.execute(&stmt, &refs).await.map_err(map_write_error)?;
        }

        tx.commit().await.map_err(map_write_error)?;
        Ok(batch.len())
    }

    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(DatabaseError::Closed)?;

        let stmt = client
            .prepare(sql)
            .await
            .map_err(|e| {
                DatabaseError::QueryFailed(format!("Prepare failed: {}", server_message(&e)))
            })?;
        let rows = client.query(&stmt, &[]).await.map_err(|e| {
            DatabaseError::QueryFailed(format!("Query failed: {}", server_message(&e)))
        })?;

        let columns: Vec<String> = stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let json_rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| Self::row_to_json(row, &columns))
            .collect();

        Ok(QueryResult::new(columns, json_rows).timed(start))
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let result = self.execute_query("SELECT 1 AS healthy").await?;
        Ok(!result.rows.is_empty())
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> DatabaseResult<()> {
        // The connection task ends once the client is gone
        drop(self.client.lock().await.take());

        if let Some(task) = self.connection_task.lock().await.take() {
            task.await.map_err(|e| {
                DatabaseError::ConnectionFailed(format!("Connection task failed: {}", e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_violation_classes() {
        assert!(is_integrity_violation(&SqlState::UNIQUE_VIOLATION));
        assert!(is_integrity_violation(&SqlState::NOT_NULL_VIOLATION));
        assert!(is_integrity_violation(&SqlState::FOREIGN_KEY_VIOLATION));
        assert!(is_integrity_violation(&SqlState::CHECK_VIOLATION));
        assert!(!is_integrity_violation(&SqlState::UNDEFINED_COLUMN));
        assert!(!is_integrity_violation(&SqlState::INVALID_TEXT_REPRESENTATION));
    }

    #[test]
    fn test_to_param_matches_target_type() {
        assert!(to_param(&Value::Int(7), &Type::INT8).is_ok());
        assert!(to_param(&Value::Int(7), &Type::INT4).is_ok());
        assert!(to_param(&Value::Int(7), &Type::FLOAT8).is_ok());
        assert!(to_param(&Value::Float(1.5), &Type::FLOAT4).is_ok());
        assert!(to_param(&Value::Bool(true), &Type::BOOL).is_ok());
        assert!(to_param(&Value::Int(7), &Type::TEXT).is_ok());
        assert!(to_param(&Value::Null, &Type::INT2).is_ok());
    }

    #[test]
    fn test_to_param_rejects_mismatches() {
        assert!(matches!(
            to_param(&Value::Int(i64::from(i32::MAX) + 1), &Type::INT4),
            Err(DatabaseError::InvalidInput(_))
        ));
        assert!(to_param(&Value::from("abc"), &Type::INT8).is_err());
        assert!(to_param(&Value::Float(1.5), &Type::INT8).is_err());
        assert!(to_param(&Value::Int(1), &Type::BOOL).is_err());
        assert!(to_param(&Value::Int(1), &Type::JSONB).is_err());
    }

    #[test]
    fn test_text_cast_for_unbound_types() {
        assert_eq!(text_cast(&Type::INT8), None);
        assert_eq!(text_cast(&Type::VARCHAR), None);
        assert_eq!(
            text_cast(&Type::DATE).as_deref(),
            Some("\"pg_catalog\".\"date\"")
        );
        assert_eq!(
            text_cast(&Type::NUMERIC).as_deref(),
            Some("\"pg_catalog\".\"numeric\"")
        );
        assert!(text_cast(&Type::UUID).is_some());

        // A cast column binds text, which every cell converts to
        assert!(to_param(&Value::Float(10.5), &Type::TEXT).is_ok());
    }
}
