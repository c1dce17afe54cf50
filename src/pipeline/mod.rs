//! Chunked load pipeline
//!
//! Reads a file batch by batch, deduplicates each batch on the primary key
//! and appends it to the staging table. Batches are processed strictly in
//! file order, one at a time.

pub mod config;
pub mod summary;

pub use config::{ConfigError, LoaderConfig, PipelineConfig, sample_config};
pub use summary::RunSummary;

use tracing::{debug, error, info};

use crate::dedup::{DedupError, DedupResult, Deduplicator};
use crate::import::{ChunkReader, ReadError};
use crate::loader::{self, LoadError};
use crate::validation::TableName;

/// Fatal pipeline error
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Dedup(#[from] DedupError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Check everything that can be checked before the file is opened
fn validate(config: &PipelineConfig) -> Result<TableName, PipelineError> {
    if config.chunk_size == 0 {
        return Err(ConfigError::Invalid {
            field: "chunk size",
            reason: "must be at least 1".to_string(),
        }
        .into());
    }

    TableName::parse(&config.staging_table).map_err(|e| {
        ConfigError::Invalid {
            field: "staging table",
            reason: e.to_string(),
        }
        .into()
    })
}

/// Run the pipeline to completion
///
/// Rejected batches are counted in the returned summary and do not stop the
/// run. Read errors, unknown key columns and any other database error abort
/// it; batches loaded before the failure stay loaded. Use [`run_recording`]
/// to keep the counts of an aborted run.
pub async fn run(config: &PipelineConfig) -> Result<RunSummary, PipelineError> {
    let mut summary = RunSummary::new(&config.file_path, config.staging_table.clone());
    run_recording(config, &mut summary).await?;
    Ok(summary)
}

/// Run the pipeline, counting into a caller-owned summary
///
/// The summary is finished whether or not the run succeeds, so after an
/// error it still holds what was loaded and rejected up to that point.
pub async fn run_recording(
    config: &PipelineConfig,
    summary: &mut RunSummary,
) -> Result<(), PipelineError> {
    let result = drive(config, summary).await;
    summary.finish();

    match &result {
        Ok(()) => info!(
            "Run {} finished in {}: {} rows loaded, {} rows rejected, {} duplicates removed",
            summary.run_id,
            summary.duration_string(),
            summary.rows_loaded,
            summary.rows_rejected,
            summary.duplicates_removed
        ),
        Err(e) => error!(
            "Run {} aborted after {} batches ({} loaded, {} rejected; {} rows loaded, {} rows rejected): {}",
            summary.run_id,
            summary.batches_read,
            summary.batches_loaded,
            summary.batches_rejected,
            summary.rows_loaded,
            summary.rows_rejected,
            e
        ),
    }

    result
}

async fn drive(config: &PipelineConfig, summary: &mut RunSummary) -> Result<(), PipelineError> {
    let table = validate(config)?;
    summary.staging_table = table.to_string();

    let mut dedup =
        Deduplicator::new(config.primary_key_columns.clone(), config.dedup_scope)?;

    let reader = ChunkReader::open(&config.file_path, config.reader_options())?;
    dedup.bind(reader.schema())?;

    info!(
        "Run {} loading {} into {} via {} (chunk size {}, {} dedup on {})",
        summary.run_id,
        config.file_path.display(),
        table,
        config.connection,
        config.chunk_size,
        config.dedup_scope,
        config.primary_key_columns.join(", ")
    );

    for (index, batch) in reader.enumerate() {
        let batch = batch?;
        let number = index + 1;
        let read = batch.len();

        let DedupResult { batch, removed } = dedup.apply(batch)?;
        summary.record_batch(read, removed);
        debug!(
            "Batch {}: {} rows read, {} duplicates removed",
            number, read, removed
        );

        let outcome = loader::load_into(&batch, &table, &config.connection).await?;
        summary.record_outcome(number, &outcome);
    }

    Ok(())
}
