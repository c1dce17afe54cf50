//! CLI binary entry point for staging-loader

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use staging_loader::cli::commands::{
    check::{CheckArgs, handle_check},
    load::{LoadArgs, SummaryFormat, handle_load},
    query::{QueryArgs, handle_query},
    sample_config::handle_sample_config,
};
#[cfg(feature = "cli")]
use staging_loader::dedup::DedupScope;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "staging-loader")]
#[command(about = "Load CSV files into staging tables in chunks, deduplicated by primary key")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Read a file in chunks, deduplicate each chunk and append it to a staging table
    Load {
        /// Input file (overrides [source] path)
        file: Option<PathBuf>,
        /// Staging table, optionally schema-qualified
        #[arg(short, long)]
        table: Option<String>,
        /// Primary key column(s), comma separated
        #[arg(short, long, value_delimiter = ',')]
        key: Vec<String>,
        /// Connection string (postgresql://... or duckdb://...)
        #[arg(short, long)]
        connection: Option<String>,
        /// Rows per chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Duplicate detection scope: batch or global
        #[arg(long)]
        dedup_scope: Option<DedupScope>,
        /// Field delimiter (single character or "tab")
        #[arg(long)]
        delimiter: Option<String>,
        /// Keep every cell as text instead of inferring column types
        #[arg(long)]
        no_infer_types: bool,
        /// Config file (default: ./staging-loader.toml if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Summary output format
        #[arg(long, value_enum, default_value = "text")]
        format: SummaryFormat,
    },
    /// Check that the staging database is reachable
    Check {
        /// Connection string
        #[arg(short, long)]
        connection: Option<String>,
        /// Config file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Execute a SQL query against the staging database
    Query {
        /// SQL query to execute
        sql: String,
        /// Connection string
        #[arg(short, long)]
        connection: Option<String>,
        /// Config file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Print a commented sample configuration file
    SampleConfig {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Log to stderr; `RUST_LOG` applies unless `-v` is given
#[cfg(feature = "cli")]
fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Load {
            file,
            table,
            key,
            connection,
            chunk_size,
            dedup_scope,
            delimiter,
            no_infer_types,
            config,
            format,
        } => {
            let args = LoadArgs {
                file,
                table,
                key,
                connection,
                chunk_size,
                dedup_scope,
                delimiter,
                no_infer_types,
                config,
                format,
            };
            handle_load(&args)
        }

        Commands::Check { connection, config } => {
            let args = CheckArgs { connection, config };
            handle_check(&args)
        }

        Commands::Query {
            sql,
            connection,
            config,
            format,
        } => {
            let args = QueryArgs {
                sql,
                connection,
                config,
                format,
            };
            handle_query(&args)
        }

        Commands::SampleConfig { output } => handle_sample_config(output.as_ref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
