//! SQL query CLI command
//!
//! Runs an ad-hoc SQL statement against the staging database, typically to
//! inspect what a load produced.

use std::path::PathBuf;

use crate::cli::commands::{resolve_connection, runtime};
use crate::cli::error::CliError;
use crate::database::{self, OutputFormat, format_query_result};

/// Query command arguments
#[derive(Debug, Clone)]
pub struct QueryArgs {
    /// SQL query to execute
    pub sql: String,
    pub connection: Option<String>,
    pub config: Option<PathBuf>,
    /// Output format (table, csv, json)
    pub format: String,
}

/// Execute a SQL query against the staging database
pub fn handle_query(args: &QueryArgs) -> Result<(), CliError> {
    let output_format: OutputFormat = args
        .format
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let descriptor = resolve_connection(args.connection.as_deref(), args.config.as_deref())?;
    let rt = runtime()?;

    rt.block_on(async {
        let backend = database::connect(&descriptor).await?;
        let result = backend.execute_query(&args.sql).await;
        backend.close().await?;
        let result = result?;

        println!("{}", format_query_result(&result, output_format));

        // Print execution time for non-JSON formats
        if output_format != OutputFormat::Json {
            eprintln!("\nExecution time: {}ms", result.execution_time_ms);
        }

        Ok::<(), CliError>(())
    })
}
