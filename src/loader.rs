//! Staging loader
//!
//! Appends one batch to a staging table per call. The connection is opened
//! for the call and closed before returning; integrity violations reported
//! by the database come back as [`LoadOutcome::Rejected`] rather than as an
//! error, so the caller can count them and carry on.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::database::{self, ConnectionDescriptor, DatabaseError, StagingBackend};
use crate::models::Batch;
use crate::validation::{TableName, ValidationError};

/// Result of appending one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LoadOutcome {
    /// Every row was appended
    Loaded { rows: usize },
    /// The database refused the batch on an integrity constraint; nothing was appended
    Rejected { rows: usize, reason: String },
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }

    /// Rows in the batch the outcome refers to
    pub fn rows(&self) -> usize {
        match self {
            LoadOutcome::Loaded { rows } | LoadOutcome::Rejected { rows, .. } => *rows,
        }
    }
}

/// Fatal load error
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Invalid staging table name: {0}")]
    InvalidTable(#[from] ValidationError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Append a batch to `table`, creating the table from the batch if needed.
///
/// An empty batch returns `Loaded { rows: 0 }` without connecting.
pub async fn load(
    batch: &Batch,
    table: &str,
    connection: &ConnectionDescriptor,
) -> Result<LoadOutcome, LoadError> {
    let table = TableName::parse(table)?;
    load_into(batch, &table, connection).await
}

/// [`load`] with an already validated table name
pub async fn load_into(
    batch: &Batch,
    table: &TableName,
    connection: &ConnectionDescriptor,
) -> Result<LoadOutcome, LoadError> {
    if batch.is_empty() {
        return Ok(LoadOutcome::Loaded { rows: 0 });
    }

    let backend = database::connect(connection).await?;
    let result = append_to(backend.as_ref(), batch, table).await;

    if let Err(e) = backend.close().await {
        warn!("Failed to close {} connection: {}", backend.backend_type(), e);
    }

    result
}

/// Append a batch through an open backend
pub async fn append_to(
    backend: &dyn StagingBackend,
    batch: &Batch,
    table: &TableName,
) -> Result<LoadOutcome, LoadError> {
    if batch.is_empty() {
        return Ok(LoadOutcome::Loaded { rows: 0 });
    }

    if !backend.table_exists(table).await? {
        backend.create_table(table, &batch.column_defs()).await?;
    }

    match backend.append_batch(table, batch).await {
        Ok(rows) => {
            debug!("Appended {} rows to {}", rows, table);
            Ok(LoadOutcome::Loaded { rows })
        }
        Err(DatabaseError::ConstraintViolation(reason)) => {
            warn!(
                "Rejected batch of {} rows for {}: {}",
                batch.len(),
                table,
                reason
            );
            Ok(LoadOutcome::Rejected {
                rows: batch.len(),
                reason,
            })
        }
        Err(e) => Err(e.into()),
    }
}
