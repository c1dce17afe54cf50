//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::database::DatabaseError;
use crate::pipeline::{ConfigError, PipelineError};

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to write file {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Pipeline failed: {0}")]
    PipelineError(#[from] PipelineError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
