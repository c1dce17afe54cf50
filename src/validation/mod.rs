//! Validation functionality
//!
//! Provides input validation and identifier sanitization for table and
//! column names that end up in generated SQL.

pub mod input;

pub use input::{
    TableName, ValidationError, ValidationResult, quote_identifier, validate_column_name,
    validate_table_name,
};
