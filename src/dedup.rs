//! Primary-key deduplication
//!
//! For rows sharing identical values across every key column only the first
//! occurrence survives. With [`DedupScope::Batch`] each batch is deduplicated
//! on its own, so a key appearing in two different batches survives in both.
//! [`DedupScope::Global`] remembers every key seen by one [`Deduplicator`]
//! for the whole run instead.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{Batch, Schema, Value};

/// Error during deduplication
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DedupError {
    #[error("Primary key must name at least one column")]
    EmptyKey,

    #[error("Primary key column '{column}' not found (available: {})", .available.join(", "))]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("Primary key column '{0}' is listed more than once")]
    DuplicateKeyColumn(String),
}

/// How far duplicate detection reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupScope {
    /// Duplicates are removed within each batch only (default)
    #[default]
    Batch,
    /// Duplicates are removed across every batch of the run
    Global,
}

impl std::str::FromStr for DedupScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "batch" | "chunk" => Ok(DedupScope::Batch),
            "global" | "run" => Ok(DedupScope::Global),
            _ => Err(format!(
                "Unknown dedup scope: {}. Use 'batch' or 'global'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for DedupScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DedupScope::Batch => write!(f, "batch"),
            DedupScope::Global => write!(f, "global"),
        }
    }
}

/// Result of deduplicating one batch
#[derive(Debug, Clone)]
pub struct DedupResult {
    /// Surviving rows
    pub batch: Batch,
    /// Number of rows dropped as duplicates
    pub removed: usize,
}

/// Remove later duplicates from a batch, keeping the first row per key.
pub fn dedupe<S: AsRef<str>>(batch: &Batch, key_columns: &[S]) -> Result<Batch, DedupError> {
    let key_indices = key_indices(batch.schema(), key_columns)?;
    let mut seen = HashSet::with_capacity(batch.len());

    Ok(retain_first(batch.clone(), &key_indices, &mut seen))
}

/// Check a primary key against a schema, returning the key column positions.
pub fn key_indices<S: AsRef<str>>(
    schema: &Schema,
    key_columns: &[S],
) -> Result<Vec<usize>, DedupError> {
    if key_columns.is_empty() {
        return Err(DedupError::EmptyKey);
    }

    let mut indices = Vec::with_capacity(key_columns.len());
    for column in key_columns {
        let column = column.as_ref();
        let idx = schema
            .index_of(column)
            .ok_or_else(|| DedupError::UnknownColumn {
                column: column.to_string(),
                available: schema.columns().to_vec(),
            })?;
        if indices.contains(&idx) {
            return Err(DedupError::DuplicateKeyColumn(column.to_string()));
        }
        indices.push(idx);
    }

    Ok(indices)
}

fn retain_first(batch: Batch, key_indices: &[usize], seen: &mut HashSet<Vec<Value>>) -> Batch {
    batch.retain_rows(|row| {
        let key: Vec<Value> = key_indices.iter().map(|&i| row[i].clone()).collect();
        seen.insert(key)
    })
}

/// Stateful deduplicator applied to every batch of one run
#[derive(Debug)]
pub struct Deduplicator {
    key_columns: Vec<String>,
    scope: DedupScope,
    key_indices: Option<Vec<usize>>,
    seen: HashSet<Vec<Value>>,
}

impl Deduplicator {
    /// Create a deduplicator
    ///
    /// Fails fast on an empty key; column names are checked against the
    /// schema by [`Deduplicator::bind`] or on the first batch.
    pub fn new(key_columns: Vec<String>, scope: DedupScope) -> Result<Self, DedupError> {
        if key_columns.is_empty() {
            return Err(DedupError::EmptyKey);
        }

        Ok(Self {
            key_columns,
            scope,
            key_indices: None,
            seen: HashSet::new(),
        })
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    pub fn scope(&self) -> DedupScope {
        self.scope
    }

    /// Resolve the key columns against the file schema.
    pub fn bind(&mut self, schema: &Schema) -> Result<(), DedupError> {
        self.key_indices = Some(key_indices(schema, &self.key_columns)?);
        Ok(())
    }

    /// Number of distinct keys remembered across batches
    pub fn keys_seen(&self) -> usize {
        self.seen.len()
    }

    /// Deduplicate one batch according to the configured scope
    pub fn apply(&mut self, batch: Batch) -> Result<DedupResult, DedupError> {
        let indices = match &self.key_indices {
            Some(indices) => indices.clone(),
            None => {
                let indices = key_indices(batch.schema(), &self.key_columns)?;
                self.key_indices = Some(indices.clone());
                indices
            }
        };

        let before = batch.len();
        let batch = match self.scope {
            DedupScope::Batch => {
                let mut seen = HashSet::with_capacity(before);
                retain_first(batch, &indices, &mut seen)
            }
            DedupScope::Global => retain_first(batch, &indices, &mut self.seen),
        };
        let removed = before - batch.len();

        if removed > 0 {
            tracing::debug!("Removed {} duplicate rows ({} scope)", removed, self.scope);
        }

        Ok(DedupResult { batch, removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn batch(rows: &[(&str, &str, &str)]) -> Batch {
        let schema = Arc::new(Schema::new(vec![
            "id".to_string(),
            "region".to_string(),
            "amount".to_string(),
        ]));
        let raw: Vec<Vec<String>> = rows
            .iter()
            .map(|(a, b, c)| vec![a.to_string(), b.to_string(), c.to_string()])
            .collect();
        Batch::from_raw(schema, &raw, true)
    }

    fn ids(batch: &Batch) -> Vec<Value> {
        (0..batch.len())
            .map(|i| batch.value(i, "id").cloned().unwrap())
            .collect()
    }

    #[test]
    fn test_keeps_first_occurrence() {
        let input = batch(&[("1", "eu", "10"), ("2", "us", "20"), ("1", "eu", "30")]);
        let output = dedupe(&input, &["id"]).unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(ids(&output), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(output.value(0, "amount"), Some(&Value::Int(10)));
        assert_eq!(output.schema(), input.schema());
    }

    #[test]
    fn test_composite_key() {
        let input = batch(&[("1", "eu", "10"), ("1", "us", "20"), ("1", "eu", "30")]);
        let output = dedupe(&input, &["id", "region"]).unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(output.value(1, "region"), Some(&Value::from("us")));
    }

    #[test]
    fn test_idempotent() {
        let input = batch(&[
            ("1", "eu", "10"),
            ("2", "us", "20"),
            ("1", "eu", "30"),
            ("3", "", "40"),
            ("3", "", "50"),
        ]);
        let once = dedupe(&input, &["id", "region"]).unwrap();
        let twice = dedupe(&once, &["id", "region"]).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_survivors_differ_on_key() {
        let input = batch(&[
            ("1", "eu", "10"),
            ("1", "eu", "11"),
            ("2", "eu", "12"),
            ("2", "us", "13"),
            ("", "us", "14"),
            ("", "us", "15"),
        ]);
        let keys = ["id", "region"];
        let output = dedupe(&input, &keys).unwrap();

        for i in 0..output.len() {
            for j in (i + 1)..output.len() {
                let differs = keys
                    .iter()
                    .any(|k| output.value(i, k) != output.value(j, k));
                assert!(differs, "rows {} and {} share a key", i, j);
            }
        }
        assert_eq!(output.len(), 4);
    }

    #[test]
    fn test_unknown_column_fails_fast() {
        let input = batch(&[("1", "eu", "10")]);
        let err = dedupe(&input, &["missing"]).unwrap_err();
        assert!(matches!(err, DedupError::UnknownColumn { ref column, .. } if column == "missing"));
        assert!(err.to_string().contains("id, region, amount"));
    }

    #[test]
    fn test_empty_key_rejected() {
        let input = batch(&[("1", "eu", "10")]);
        assert_eq!(
            dedupe::<&str>(&input, &[]).unwrap_err(),
            DedupError::EmptyKey
        );
        assert!(Deduplicator::new(vec![], DedupScope::Batch).is_err());
    }

    #[test]
    fn test_batch_scope_keeps_cross_batch_duplicates() {
        let mut dedup = Deduplicator::new(vec!["id".to_string()], DedupScope::Batch).unwrap();

        let first = dedup.apply(batch(&[("1", "eu", "10"), ("1", "eu", "10")])).unwrap();
        let second = dedup.apply(batch(&[("1", "eu", "10")])).unwrap();

        assert_eq!(first.removed, 1);
        assert_eq!(second.removed, 0);
        assert_eq!(second.batch.len(), 1);
        assert_eq!(dedup.keys_seen(), 0);
    }

    #[test]
    fn test_global_scope_removes_cross_batch_duplicates() {
        let mut dedup = Deduplicator::new(vec!["id".to_string()], DedupScope::Global).unwrap();

        let first = dedup.apply(batch(&[("1", "eu", "10"), ("2", "eu", "10")])).unwrap();
        let second = dedup.apply(batch(&[("2", "us", "20"), ("3", "us", "30")])).unwrap();

        assert_eq!(first.removed, 0);
        assert_eq!(second.removed, 1);
        assert_eq!(ids(&second.batch), vec![Value::Int(3)]);
        assert_eq!(dedup.keys_seen(), 3);
    }

    #[test]
    fn test_bind_checks_schema() {
        let mut dedup = Deduplicator::new(vec!["nope".to_string()], DedupScope::Batch).unwrap();
        let schema = Schema::new(vec!["id".to_string()]);
        assert!(dedup.bind(&schema).is_err());
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("batch".parse::<DedupScope>().unwrap(), DedupScope::Batch);
        assert_eq!("GLOBAL".parse::<DedupScope>().unwrap(), DedupScope::Global);
        assert!("sometimes".parse::<DedupScope>().is_err());
    }
}
