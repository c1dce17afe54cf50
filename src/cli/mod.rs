//! Command-line interface
//!
//! Argument structs and `handle_*` functions behind the `staging-loader`
//! binary.

pub mod commands;
pub mod error;

pub use error::CliError;
