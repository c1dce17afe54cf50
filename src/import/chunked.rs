//! Chunked CSV reader
//!
//! Reads a delimited text file with a header row and yields [`Batch`]es of
//! at most `chunk_size` rows. Reading is lazy: opening the reader parses the
//! header only, and each call to `next` parses at most one chunk.
//!
//! Rows shorter than the header are padded with nulls; rows longer than the
//! header are an error. Empty header cells are named `Unnamed: <index>`.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use csv::{ReaderBuilder, StringRecord};

use super::{DEFAULT_CHUNK_SIZE, ReadError};
use crate::models::{Batch, Schema};
use crate::validation::validate_column_name;

/// Options for reading a delimited file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Maximum rows per batch
    pub chunk_size: usize,
    /// Field delimiter
    pub delimiter: u8,
    /// Infer column types per batch (otherwise every cell is text)
    pub infer_types: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            delimiter: b',',
            infer_types: true,
        }
    }
}

impl ReaderOptions {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Default::default()
        }
    }
}

/// Single-pass iterator over the batches of one file
///
/// The reader owns the open file handle until it is dropped. It is not
/// `Clone`: re-reading a file requires opening a new reader. After the file
/// is exhausted, or after the first error, `next` returns `None`.
pub struct ChunkReader {
    path: PathBuf,
    reader: csv::Reader<File>,
    schema: Arc<Schema>,
    options: ReaderOptions,
    record: StringRecord,
    finished: bool,
}

impl std::fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("options", &self.options)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Open `file_path` and read it in batches of at most `chunk_size` rows
pub fn read_chunks(file_path: impl AsRef<Path>, chunk_size: usize) -> Result<ChunkReader, ReadError> {
    ChunkReader::open(file_path, ReaderOptions::with_chunk_size(chunk_size))
}

impl ChunkReader {
    /// Open a file and parse its header
    pub fn open(file_path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self, ReadError> {
        if options.chunk_size == 0 {
            return Err(ReadError::InvalidChunkSize);
        }

        let path = file_path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| ReadError::Io {
            path: path.clone(),
            source,
        })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(options.delimiter)
            .from_reader(file);

        let headers = reader.headers().map_err(|e| ReadError::from_csv(&path, e))?;
        if headers.is_empty() {
            return Err(ReadError::MissingHeader(path));
        }

        let schema = Arc::new(parse_header(&path, headers)?);

        tracing::debug!(
            "Opened {} with {} columns (chunk size {})",
            path.display(),
            schema.len(),
            options.chunk_size
        );

        Ok(Self {
            path,
            reader,
            schema,
            options,
            record: StringRecord::new(),
            finished: false,
        })
    }

    /// Header schema shared by every batch
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    fn read_chunk(&mut self) -> Result<Option<Batch>, ReadError> {
        let mut raw_rows: Vec<Vec<String>> = Vec::with_capacity(self.options.chunk_size);

        while raw_rows.len() < self.options.chunk_size {
            let more = self
                .reader
                .read_record(&mut self.record)
                .map_err(|e| ReadError::from_csv(&self.path, e))?;
            if !more {
                self.finished = true;
                break;
            }
            let width = self.schema.len();
            if self.record.len() > width {
                return Err(ReadError::Csv {
                    path: self.path.clone(),
                    line: self.record.position().map(|p| p.line()),
                    message: format!(
                        "expected {} fields, saw {}",
                        width,
                        self.record.len()
                    ),
                });
            }

            let mut row: Vec<String> = self.record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            raw_rows.push(row);
        }

        if raw_rows.is_empty() {
            return Ok(None);
        }

        Ok(Some(Batch::from_raw(
            Arc::clone(&self.schema),
            &raw_rows,
            self.options.infer_types,
        )))
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Batch, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_chunk() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for ChunkReader {}

fn parse_header(path: &Path, headers: &StringRecord) -> Result<Schema, ReadError> {
    let mut columns: Vec<String> = Vec::with_capacity(headers.len());

    for (idx, name) in headers.iter().enumerate() {
        let name = match name.trim() {
            "" => format!("Unnamed: {}", idx),
            trimmed => trimmed.to_string(),
        };
        validate_column_name(&name).map_err(|e| ReadError::InvalidHeader {
            path: path.to_path_buf(),
            reason: format!("column {}: {}", idx + 1, e),
        })?;
        if columns.iter().any(|c| *c == name) {
            return Err(ReadError::InvalidHeader {
                path: path.to_path_buf(),
                reason: format!("duplicate column name '{}'", name),
            });
        }
        columns.push(name);
    }

    Ok(Schema::new(columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn numbered_rows(n: usize) -> String {
        let mut content = String::from("id,name\n");
        for i in 0..n {
            content.push_str(&format!("{},row{}\n", i, i));
        }
        content
    }

    #[test]
    fn test_batch_counts() {
        let dir = TempDir::new().unwrap();

        for (rows, chunk) in [(10, 3), (9, 3), (1, 1000), (1000, 1000), (7, 1)] {
            let path = write_csv(&dir, "data.csv", &numbered_rows(rows));
            let batches: Vec<Batch> = read_chunks(&path, chunk)
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();

            assert_eq!(batches.len(), rows.div_ceil(chunk), "rows={rows} chunk={chunk}");
            assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), rows);
            assert!(batches.iter().all(|b| b.len() <= chunk && !b.is_empty()));
        }
    }

    #[test]
    fn test_batches_preserve_file_order() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", &numbered_rows(5));

        let ids: Vec<Value> = read_chunks(&path, 2)
            .unwrap()
            .flat_map(|b| {
                let b = b.unwrap();
                (0..b.len())
                    .map(|i| b.value(i, "id").cloned().unwrap())
                    .collect::<Vec<_>>()
            })
            .collect();

        assert_eq!(ids, (0..5).map(Value::Int).collect::<Vec<_>>());
    }

    #[test]
    fn test_header_only_yields_no_batches() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "empty.csv", "id,name\n");

        let mut reader = read_chunks(&path, 10).unwrap();
        assert_eq!(reader.schema().columns(), &["id", "name"]);
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = read_chunks(dir.path().join("nope.csv"), 10).unwrap_err();
        assert!(matches!(err, ReadError::Io { .. }));
    }

    #[test]
    fn test_empty_file_has_no_header() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "blank.csv", "");
        let err = read_chunks(&path, 10).unwrap_err();
        assert!(matches!(err, ReadError::MissingHeader(_)));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", &numbered_rows(1));
        assert!(matches!(
            read_chunks(&path, 0).unwrap_err(),
            ReadError::InvalidChunkSize
        ));
    }

    #[test]
    fn test_duplicate_header_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "dup.csv", "id,id\n1,2\n");
        assert!(matches!(
            read_chunks(&path, 10).unwrap_err(),
            ReadError::InvalidHeader { .. }
        ));
    }

    #[test]
    fn test_long_row_fails_and_fuses() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "ragged.csv", "id,name\n1,a\n2,b,extra\n3,c\n");

        let mut reader = read_chunks(&path, 10).unwrap();
        let err = reader.next().unwrap().unwrap_err();
        match err {
            ReadError::Csv { line, message, .. } => {
                assert_eq!(line, Some(3));
                assert!(message.contains("expected 2 fields, saw 3"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_short_row_padded_with_nulls() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "short.csv", "id,name,score\n1,a,2.5\n2\n3,c\n");

        let batch = read_chunks(&path, 10).unwrap().next().unwrap().unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.value(1, "id"), Some(&Value::Int(2)));
        assert_eq!(batch.value(1, "name"), Some(&Value::Null));
        assert_eq!(batch.value(1, "score"), Some(&Value::Null));
        assert_eq!(batch.value(2, "name"), Some(&Value::from("c")));
        assert_eq!(batch.value(2, "score"), Some(&Value::Null));
    }

    #[test]
    fn test_empty_header_cells_are_named_by_position() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "indexed.csv", ",id,name,\n0,1,a,x\n");

        let mut reader = read_chunks(&path, 10).unwrap();
        assert_eq!(
            reader.schema().columns(),
            &["Unnamed: 0", "id", "name", "Unnamed: 3"]
        );
        let batch = reader.next().unwrap().unwrap();
        assert_eq!(batch.value(0, "Unnamed: 0"), Some(&Value::Int(0)));
        assert_eq!(batch.value(0, "id"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_custom_delimiter() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.tsv", "id\tname\n1\ta\n");

        let options = ReaderOptions {
            delimiter: b'\t',
            ..Default::default()
        };
        let batch = ChunkReader::open(&path, options)
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(batch.value(0, "name"), Some(&Value::from("a")));
    }

    #[test]
    fn test_types_inferred_per_chunk() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "data.csv", "code\n1\n2\nabc\n");

        let batches: Vec<Batch> = read_chunks(&path, 2)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(batches[0].value(0, "code"), Some(&Value::Int(1)));
        assert_eq!(batches[1].value(0, "code"), Some(&Value::from("abc")));
    }
}
