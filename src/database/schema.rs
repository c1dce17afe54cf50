//! SQL generation for staging tables

use crate::models::{ColumnDef, ColumnType};
use crate::validation::{TableName, quote_identifier};

/// SQL dialect spoken by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    DuckDB,
    Postgres,
}

impl SqlDialect {
    /// Column type used when a staging table is created from a batch
    pub fn column_type(&self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (_, ColumnType::Boolean) => "BOOLEAN",
            (_, ColumnType::Integer) => "BIGINT",
            (SqlDialect::DuckDB, ColumnType::Float) => "DOUBLE",
            (SqlDialect::Postgres, ColumnType::Float) => "DOUBLE PRECISION",
            (_, ColumnType::Text) => "TEXT",
        }
    }

    /// Placeholder for the 1-based parameter `n`
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            SqlDialect::DuckDB => "?".to_string(),
            SqlDialect::Postgres => format!("${}", n),
        }
    }
}

/// Quote a column name
pub fn quote_column(name: &str) -> String {
    quote_identifier(name)
}

/// `CREATE TABLE IF NOT EXISTS` statement for a batch's columns
///
/// No primary key is declared; the staging table is a plain landing relation.
pub fn create_table_sql(table: &TableName, columns: &[ColumnDef], dialect: SqlDialect) -> String {
    let column_sql: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_column(&c.name), dialect.column_type(c.column_type)))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.quoted(),
        column_sql.join(", ")
    )
}

/// Multi-row `INSERT` statement mapping values to columns by name
pub fn insert_sql(
    table: &TableName,
    columns: &[String],
    row_count: usize,
    dialect: SqlDialect,
) -> String {
    insert_sql_with_casts(table, columns, row_count, dialect, &[])
}

/// [`insert_sql`] where column `i` binds text cast to `casts[i]` when set
///
/// Lets the server parse cells for column types the loader has no native
/// binding for (dates, numerics, uuids, ...).
pub fn insert_sql_with_casts(
    table: &TableName,
    columns: &[String],
    row_count: usize,
    dialect: SqlDialect,
    casts: &[Option<String>],
) -> String {
    let column_list: Vec<String> = columns.iter().map(|c| quote_column(c)).collect();

    let mut param = 0;
    let rows: Vec<String> = (0..row_count)
        .map(|_| {
            let placeholders: Vec<String> = (0..columns.len())
                .map(|idx| {
                    param += 1;
                    let placeholder = dialect.placeholder(param);
                    match casts.get(idx).and_then(Option::as_deref) {
                        Some(cast) => format!("{}::text::{}", placeholder, cast),
                        None => placeholder,
                    }
                })
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table.quoted(),
        column_list.join(", "),
        rows.join(", ")
    )
}
