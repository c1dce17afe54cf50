//! Tabular batches of rows sharing one header schema

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::value::{ColumnType, Value};

/// Column names taken from a file header, in file order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// Create a schema from column names.
    ///
    /// Names must be non-empty and unique; the reader enforces this before
    /// building a schema from a header.
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Position of a column by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// Column definition used when creating a staging table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

/// An ordered slice of rows from one input file
///
/// Every row holds one value per schema column, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    schema: Arc<Schema>,
    column_types: Vec<ColumnType>,
    rows: Vec<Vec<Value>>,
}

impl Batch {
    /// Create a batch
    ///
    /// `column_types` must have one entry per schema column and every row
    /// must have one value per schema column.
    pub fn new(schema: Arc<Schema>, column_types: Vec<ColumnType>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert_eq!(schema.len(), column_types.len());
        debug_assert!(rows.iter().all(|r| r.len() == schema.len()));

        Self {
            schema,
            column_types,
            rows,
        }
    }

    /// Build a batch from untyped cells, inferring one type per column.
    ///
    /// With `infer_types` disabled every non-null cell is kept as text.
    pub fn from_raw(schema: Arc<Schema>, raw_rows: &[Vec<String>], infer_types: bool) -> Self {
        let column_types: Vec<ColumnType> = (0..schema.len())
            .map(|idx| {
                if infer_types {
                    ColumnType::infer(raw_rows.iter().map(|row| row[idx].as_str()))
                } else {
                    ColumnType::Text
                }
            })
            .collect();

        let rows = raw_rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&column_types)
                    .map(|(cell, ty)| Value::parse(cell, *ty))
                    .collect()
            })
            .collect();

        Self::new(schema, column_types, rows)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Shared handle to the schema
    pub fn schema_ref(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.column_types
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column definitions for table creation
    pub fn column_defs(&self) -> Vec<ColumnDef> {
        self.schema
            .columns()
            .iter()
            .zip(&self.column_types)
            .map(|(name, ty)| ColumnDef {
                name: name.clone(),
                column_type: *ty,
            })
            .collect()
    }

    /// Keep only the rows for which `keep` returns true, preserving order.
    pub fn retain_rows(mut self, mut keep: impl FnMut(&[Value]) -> bool) -> Self {
        self.rows.retain(|row| keep(row));
        self
    }

    /// Value of a named column in a given row
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Rows as JSON objects keyed by column name
    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows
            .iter()
            .map(|row| {
                let map = self
                    .schema
                    .columns()
                    .iter()
                    .zip(row)
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(map)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec!["id".to_string(), "name".to_string()]))
    }

    fn raw(rows: &[[&str; 2]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_schema_index_of() {
        let schema = schema();
        assert_eq!(schema.index_of("name"), Some(1));
        assert!(schema.index_of("missing").is_none());
        assert!(schema.contains("id"));
    }

    #[test]
    fn test_from_raw_infers_per_column() {
        let batch = Batch::from_raw(schema(), &raw(&[["1", "alice"], ["2", ""]]), true);

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.column_types(),
            &[ColumnType::Integer, ColumnType::Text]
        );
        assert_eq!(batch.value(0, "id"), Some(&Value::Int(1)));
        assert_eq!(batch.value(1, "name"), Some(&Value::Null));
    }

    #[test]
    fn test_from_raw_without_inference() {
        let batch = Batch::from_raw(schema(), &raw(&[["1", "alice"]]), false);

        assert_eq!(batch.column_types(), &[ColumnType::Text, ColumnType::Text]);
        assert_eq!(batch.value(0, "id"), Some(&Value::Text("1".to_string())));
    }

    #[test]
    fn test_retain_rows_preserves_order() {
        let batch = Batch::from_raw(
            schema(),
            &raw(&[["1", "a"], ["2", "b"], ["3", "c"]]),
            true,
        );

        let kept = batch.retain_rows(|row| row[0] != Value::Int(2));
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.value(0, "name"), Some(&Value::from("a")));
        assert_eq!(kept.value(1, "name"), Some(&Value::from("c")));
    }

    #[test]
    fn test_column_defs() {
        let batch = Batch::from_raw(schema(), &raw(&[["1.5", "a"]]), true);
        let defs = batch.column_defs();
        assert_eq!(defs[0].name, "id");
        assert_eq!(defs[0].column_type, ColumnType::Float);
        assert_eq!(defs[1].column_type, ColumnType::Text);
    }

    #[test]
    fn test_to_json_rows() {
        let batch = Batch::from_raw(schema(), &raw(&[["1", "a"]]), true);
        let rows = batch.to_json_rows();
        assert_eq!(rows[0]["id"], serde_json::json!(1));
        assert_eq!(rows[0]["name"], serde_json::json!("a"));
    }
}
