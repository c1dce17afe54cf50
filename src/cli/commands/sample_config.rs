//! Sample configuration command

use std::path::PathBuf;

use crate::cli::error::CliError;
use crate::pipeline::sample_config;

/// Print the sample configuration, or write it to `output`
pub fn handle_sample_config(output: Option<&PathBuf>) -> Result<(), CliError> {
    match output {
        Some(path) => {
            if path.exists() {
                return Err(CliError::InvalidArgument(format!(
                    "{} already exists",
                    path.display()
                )));
            }
            std::fs::write(path, sample_config())
                .map_err(|e| CliError::FileWriteError(path.clone(), e.to_string()))?;
            println!("Sample configuration written to: {}", path.display());
        }
        None => print!("{}", sample_config()),
    }
    Ok(())
}
