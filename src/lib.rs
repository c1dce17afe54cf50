//! Staging Loader - chunked CSV ingestion into staging tables
//!
//! Provides:
//! - Lazy, single-pass chunked reading of delimited files
//! - Primary-key deduplication per batch or across a run
//! - Bulk appends to DuckDB or PostgreSQL staging tables, with integrity
//!   violations reported as rejected batches
//! - A pipeline driver producing a run summary

pub mod database;
pub mod dedup;
pub mod import;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod validation;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use database::{
    ConnectionDescriptor, DatabaseBackendType, DatabaseError, QueryResult, StagingBackend,
};
#[cfg(feature = "duckdb-backend")]
pub use database::DuckDBBackend;
#[cfg(feature = "postgres-backend")]
pub use database::PostgresBackend;
pub use dedup::{DedupError, DedupScope, Deduplicator, dedupe};
pub use import::{ChunkReader, DEFAULT_CHUNK_SIZE, ReadError, ReaderOptions, read_chunks};
pub use loader::{LoadError, LoadOutcome, load};
pub use models::{Batch, ColumnDef, ColumnType, Schema, Value};
pub use pipeline::{ConfigError, LoaderConfig, PipelineConfig, PipelineError, RunSummary, run, run_recording};
pub use validation::{TableName, ValidationError};
