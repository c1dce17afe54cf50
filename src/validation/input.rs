//! Input validation and sanitization utilities.
//!
//! Table names come from configuration and column names come from file
//! headers; both end up inside generated SQL. Every identifier is quoted on
//! the way out, and table names are additionally restricted to a safe
//! character set.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for table names
pub const MAX_TABLE_NAME_LENGTH: usize = 255;

/// Maximum length for column names
pub const MAX_COLUMN_NAME_LENGTH: usize = 255;

/// Errors that can occur during input validation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    /// Input is empty when a value is required
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Input exceeds maximum allowed length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Input contains invalid characters
    #[error("{field} contains invalid characters: {reason}")]
    InvalidCharacters { field: &'static str, reason: String },

    /// Input has invalid format
    #[error("{0}: {1}")]
    InvalidFormat(&'static str, String),

    /// Input is a reserved word
    #[error("{field} cannot be a reserved word: {word}")]
    ReservedWord { field: &'static str, word: String },
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A validated, optionally schema-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    schema: Option<String>,
    name: String,
}

impl TableName {
    /// Parse `table` or `schema.table`.
    ///
    /// # Examples
    ///
    /// ```
    /// use staging_loader::validation::input::TableName;
    ///
    /// let table = TableName::parse("staging.events").unwrap();
    /// assert_eq!(table.schema(), Some("staging"));
    /// assert_eq!(table.quoted(), "\"staging\".\"events\"");
    /// assert!(TableName::parse("a.b.c").is_err());
    /// ```
    pub fn parse(qualified: &str) -> ValidationResult<Self> {
        let parts: Vec<&str> = qualified.split('.').collect();

        match parts.as_slice() {
            [name] => {
                validate_table_name(name)?;
                Ok(Self {
                    schema: None,
                    name: name.to_string(),
                })
            }
            [schema, name] => {
                validate_table_name(schema)?;
                validate_table_name(name)?;
                Ok(Self {
                    schema: Some(schema.to_string()),
                    name: name.to_string(),
                })
            }
            _ => Err(ValidationError::InvalidFormat(
                "table name",
                format!("expected 'table' or 'schema.table', got '{}'", qualified),
            )),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted form safe to splice into SQL
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&self.name)),
            None => quote_identifier(&self.name),
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Validate a table name.
///
/// # Rules
///
/// - Must not be empty
/// - Must not exceed 255 characters
/// - Must start with a letter or underscore
/// - May contain letters, digits, underscores, and hyphens
/// - Cannot be a SQL reserved word
///
/// # Examples
///
/// ```
/// use staging_loader::validation::input::validate_table_name;
///
/// assert!(validate_table_name("staging_orders").is_ok());
/// assert!(validate_table_name("").is_err());
/// assert!(validate_table_name("123_invalid").is_err());
/// ```
pub fn validate_table_name(name: &str) -> ValidationResult<()> {
    let Some(first_char) = name.chars().next() else {
        return Err(ValidationError::Empty("table name"));
    };

    if name.len() > MAX_TABLE_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "table name",
            max: MAX_TABLE_NAME_LENGTH,
            actual: name.len(),
        });
    }

    if !first_char.is_alphabetic() && first_char != '_' {
        return Err(ValidationError::InvalidFormat(
            "table name",
            "must start with a letter or underscore".to_string(),
        ));
    }

    for c in name.chars() {
        if !c.is_alphanumeric() && c != '_' && c != '-' {
            return Err(ValidationError::InvalidCharacters {
                field: "table name",
                reason: format!("invalid character: '{}'", c),
            });
        }
    }

    if is_sql_reserved_word(name) {
        return Err(ValidationError::ReservedWord {
            field: "table name",
            word: name.to_string(),
        });
    }

    Ok(())
}

/// Validate a column name taken from a file header.
///
/// Header names are quoted in SQL, so any printable text is accepted.
///
/// # Rules
///
/// - Must not be empty
/// - Must not exceed 255 characters
/// - Must not contain control characters
pub fn validate_column_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Empty("column name"));
    }

    if name.len() > MAX_COLUMN_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "column name",
            max: MAX_COLUMN_NAME_LENGTH,
            actual: name.len(),
        });
    }

    if let Some(c) = name.chars().find(|c| c.is_control()) {
        return Err(ValidationError::InvalidCharacters {
            field: "column name",
            reason: format!("control character {:?}", c),
        });
    }

    Ok(())
}

/// Quote an identifier for DuckDB or PostgreSQL, doubling embedded quotes.
///
/// ```
/// use staging_loader::validation::input::quote_identifier;
///
/// assert_eq!(quote_identifier("users"), "\"users\"");
/// assert_eq!(quote_identifier("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check if a word is a SQL reserved word.
///
fn is_sql_reserved_word(word: &str) -> bool {
    const RESERVED_WORDS: &[&str] = &[
        "select", "from", "where", "insert", "update", "delete", "create", "drop", "alter",
        "table", "index", "view", "database", "schema", "grant", "revoke", "commit", "rollback",
        "begin", "end", "transaction", "primary", "foreign", "key", "references", "constraint",
        "unique", "check", "default", "not", "null", "and", "or", "in", "between", "like", "is",
        "case", "when", "then", "else", "as", "on", "join", "inner", "outer", "left", "right",
        "full", "cross", "natural", "using", "group", "by", "having", "order", "asc", "desc",
        "limit", "offset", "union", "intersect", "except", "all", "distinct", "values", "set",
        "into", "true", "false",
    ];

    let lower = word.to_lowercase();
    RESERVED_WORDS.contains(&lower.as_str())
}
