//! CLI command implementations

pub mod check;
pub mod load;
pub mod query;
pub mod sample_config;

use std::path::Path;

use crate::cli::error::CliError;
use crate::database::ConnectionDescriptor;
use crate::pipeline::LoaderConfig;

/// Build the single-threaded runtime the commands drive the library on
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}

/// Load config file and environment overrides relative to the working directory
pub(crate) fn load_config(config_path: Option<&Path>) -> Result<LoaderConfig, CliError> {
    let cwd = std::env::current_dir()
        .map_err(|e| CliError::IoError(format!("Failed to read working directory: {}", e)))?;
    Ok(LoaderConfig::discover(config_path, &cwd)?)
}

/// Connection from a flag, falling back to config file and environment
pub(crate) fn resolve_connection(
    flag: Option<&str>,
    config_path: Option<&Path>,
) -> Result<ConnectionDescriptor, CliError> {
    let connection = match flag {
        Some(connection) => connection.to_string(),
        None => load_config(config_path)?.target.connection.ok_or_else(|| {
            CliError::InvalidArgument(
                "No connection given. Use --connection, STAGING_LOADER_CONNECTION or [target] connection in the config file".to_string(),
            )
        })?,
    };

    Ok(ConnectionDescriptor::parse(&connection)?)
}
