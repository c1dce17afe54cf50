//! Import functionality
//!
//! Provides the chunked reader that turns a delimited text file into a
//! single-pass sequence of [`Batch`](crate::models::Batch)es.

pub mod chunked;

use std::path::{Path, PathBuf};

pub use chunked::{ChunkReader, ReaderOptions, read_chunks};

/// Default maximum number of rows per batch
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Error while reading an input file
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Chunk size must be a positive integer")]
    InvalidChunkSize,

    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No header row found in {0}")]
    MissingHeader(PathBuf),

    #[error("Invalid header in {path}: {reason}")]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("Malformed CSV in {path}: {message}")]
    Csv {
        path: PathBuf,
        line: Option<u64>,
        message: String,
    },
}

impl ReadError {
    pub(crate) fn from_csv(path: &Path, error: ::csv::Error) -> Self {
        let line = error.position().map(|p| p.line());
        let message = error.to_string();

        if error.is_io_error()
            && let ::csv::ErrorKind::Io(source) = error.into_kind()
        {
            return ReadError::Io {
                path: path.to_path_buf(),
                source,
            };
        }

        ReadError::Csv {
            path: path.to_path_buf(),
            line,
            message,
        }
    }
}
