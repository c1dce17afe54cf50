//! Load command implementation

use std::path::PathBuf;

use crate::cli::commands::{load_config, runtime};
use crate::cli::error::CliError;
use crate::dedup::DedupScope;
use crate::pipeline::{self, LoaderConfig, PipelineConfig, RunSummary};

/// Summary output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SummaryFormat {
    /// Human-readable report
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Arguments for the `load` command
///
/// Every field left unset falls back to the config file and environment.
#[derive(Debug, Clone, Default)]
pub struct LoadArgs {
    /// Input file
    pub file: Option<PathBuf>,
    /// Staging table
    pub table: Option<String>,
    /// Primary key columns
    pub key: Vec<String>,
    /// Connection string
    pub connection: Option<String>,
    pub chunk_size: Option<usize>,
    pub dedup_scope: Option<DedupScope>,
    pub delimiter: Option<String>,
    pub no_infer_types: bool,
    /// Explicit config file
    pub config: Option<PathBuf>,
    pub format: SummaryFormat,
}

impl LoadArgs {
    /// Apply the flags on top of a loaded configuration
    pub fn apply_to(&self, config: &mut LoaderConfig) {
        if let Some(file) = &self.file {
            config.source.path = Some(file.clone());
        }
        if let Some(chunk_size) = self.chunk_size {
            config.source.chunk_size = chunk_size;
        }
        if let Some(delimiter) = &self.delimiter {
            config.source.delimiter = delimiter.clone();
        }
        if self.no_infer_types {
            config.source.infer_types = false;
        }

        let key: Vec<String> = self
            .key
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if !key.is_empty() {
            config.dedup.primary_key = key;
        }
        if let Some(scope) = self.dedup_scope {
            config.dedup.scope = scope;
        }

        if let Some(table) = &self.table {
            config.target.table = Some(table.clone());
        }
        if let Some(connection) = &self.connection {
            config.target.connection = Some(connection.clone());
        }
    }

    /// Resolve flags, environment and config file into a pipeline configuration
    pub fn resolve(&self) -> Result<PipelineConfig, CliError> {
        let mut config = load_config(self.config.as_deref())?;
        self.apply_to(&mut config);
        Ok(config.into_pipeline_config()?)
    }
}

/// Render a run summary
pub fn render_summary(summary: &RunSummary, format: SummaryFormat) -> Result<String, CliError> {
    match format {
        SummaryFormat::Text => Ok(summary.to_string()),
        SummaryFormat::Json => serde_json::to_string_pretty(summary).map_err(|e| {
            CliError::SerializationError(format!("Failed to serialize summary: {}", e))
        }),
    }
}

/// Handle the load command
pub fn handle_load(args: &LoadArgs) -> Result<(), CliError> {
    let config = args.resolve()?;
    let rt = runtime()?;

    let mut summary = RunSummary::new(&config.file_path, config.staging_table.clone());
    if let Err(e) = rt.block_on(pipeline::run_recording(&config, &mut summary)) {
        // Batches before the failure stay committed, so report them
        if summary.batches_read > 0 {
            eprintln!("Partial run before failure:\n{}", summary);
        }
        return Err(e.into());
    }

    println!("{}", render_summary(&summary, args.format)?);

    if summary.has_rejections() {
        eprintln!(
            "\n{} of {} batches were rejected by integrity constraints",
            summary.batches_rejected, summary.batches_read
        );
    }

    Ok(())
}
