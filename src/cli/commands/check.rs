//! Connection check command

use std::path::PathBuf;

use crate::cli::commands::{resolve_connection, runtime};
use crate::cli::error::CliError;
use crate::database;

/// Arguments for the `check` command
#[derive(Debug, Clone, Default)]
pub struct CheckArgs {
    pub connection: Option<String>,
    pub config: Option<PathBuf>,
}

/// Open the staging database and run a health check
pub fn handle_check(args: &CheckArgs) -> Result<(), CliError> {
    let descriptor = resolve_connection(args.connection.as_deref(), args.config.as_deref())?;
    let rt = runtime()?;

    rt.block_on(async {
        let backend = database::connect(&descriptor).await?;
        let healthy = backend.health_check().await;
        backend.close().await?;

        if healthy? {
            println!("OK: {} ({})", descriptor, backend.backend_type());
            Ok(())
        } else {
            Err(CliError::DatabaseError(
                database::DatabaseError::ConnectionFailed(format!(
                    "{} did not answer the health check",
                    descriptor
                )),
            ))
        }
    })
}
