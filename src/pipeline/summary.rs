//! Run summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::loader::LoadOutcome;

/// Maximum rejection messages kept in a summary
pub const MAX_REJECTIONS: usize = 100;

/// Counts for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id of the run, also attached to log lines
    pub run_id: Uuid,
    pub file_path: PathBuf,
    pub staging_table: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Batches produced by the reader
    pub batches_read: usize,
    /// Data rows read from the file
    pub rows_read: usize,
    /// Rows dropped as duplicate keys
    pub duplicates_removed: usize,
    pub batches_loaded: usize,
    pub rows_loaded: usize,
    pub batches_rejected: usize,
    pub rows_rejected: usize,
    /// Rejection messages (limited to first 100)
    pub rejections: Vec<String>,
}

impl RunSummary {
    /// Start a summary for a new run
    pub fn new(file_path: impl Into<PathBuf>, staging_table: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            file_path: file_path.into(),
            staging_table: staging_table.into(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            batches_read: 0,
            rows_read: 0,
            duplicates_removed: 0,
            batches_loaded: 0,
            rows_loaded: 0,
            batches_rejected: 0,
            rows_rejected: 0,
            rejections: Vec::new(),
        }
    }

    /// Count a batch coming out of the reader and its dedup result
    pub fn record_batch(&mut self, rows: usize, duplicates_removed: usize) {
        self.batches_read += 1;
        self.rows_read += rows;
        self.duplicates_removed += duplicates_removed;
    }

    /// Count the outcome of loading batch number `batch` (1-based)
    pub fn record_outcome(&mut self, batch: usize, outcome: &LoadOutcome) {
        match outcome {
            LoadOutcome::Loaded { rows } => {
                self.batches_loaded += 1;
                self.rows_loaded += rows;
            }
            LoadOutcome::Rejected { rows, reason } => {
                self.batches_rejected += 1;
                self.rows_rejected += rows;
                self.add_rejection(format!("batch {} ({} rows): {}", batch, rows, reason));
            }
        }
    }

    /// Add a rejection message (limited to 100)
    pub fn add_rejection(&mut self, message: String) {
        if self.rejections.len() < MAX_REJECTIONS {
            self.rejections.push(message);
        }
    }

    /// Stamp the finish time
    pub fn finish(&mut self) {
        let now = Utc::now();
        self.duration_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(now);
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn has_rejections(&self) -> bool {
        self.batches_rejected > 0
    }

    /// Get rows read per second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.rows_read as f64 / secs
        }
    }

    /// Format duration as human-readable string
    pub fn duration_string(&self) -> String {
        let secs = self.duration().as_secs();
        if secs < 60 {
            format!("{:.2}s", self.duration().as_secs_f64())
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(f, "  File:               {}", self.file_path.display())?;
        writeln!(f, "  Table:              {}", self.staging_table)?;
        writeln!(f, "  Batches read:       {}", self.batches_read)?;
        writeln!(f, "  Rows read:          {}", self.rows_read)?;
        writeln!(f, "  Duplicates removed: {}", self.duplicates_removed)?;
        writeln!(
            f,
            "  Loaded:             {} batches, {} rows",
            self.batches_loaded, self.rows_loaded
        )?;
        writeln!(
            f,
            "  Rejected:           {} batches, {} rows",
            self.batches_rejected, self.rows_rejected
        )?;
        write!(
            f,
            "  Duration:           {} ({:.0} rows/s)",
            self.duration_string(),
            self.throughput()
        )?;

        for rejection in &self.rejections {
            write!(f, "\n  ! {}", rejection)?;
        }
        if self.batches_rejected > self.rejections.len() {
            write!(
                f,
                "\n  ... and {} more",
                self.batches_rejected - self.rejections.len()
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_outcomes() {
        let mut summary = RunSummary::new("in.csv", "staging");
        summary.record_batch(10, 2);
        summary.record_outcome(1, &LoadOutcome::Loaded { rows: 8 });
        summary.record_batch(5, 0);
        summary.record_outcome(
            2,
            &LoadOutcome::Rejected {
                rows: 5,
                reason: "duplicate key".to_string(),
            },
        );

        assert_eq!(summary.batches_read, 2);
        assert_eq!(summary.rows_read, 15);
        assert_eq!(summary.duplicates_removed, 2);
        assert_eq!(summary.rows_loaded, 8);
        assert_eq!(summary.rows_rejected, 5);
        assert!(summary.has_rejections());
        assert_eq!(summary.rejections, vec!["batch 2 (5 rows): duplicate key"]);
    }

    #[test]
    fn test_rejections_are_capped() {
        let mut summary = RunSummary::new("in.csv", "staging");
        for i in 0..150 {
            summary.record_outcome(
                i + 1,
                &LoadOutcome::Rejected {
                    rows: 1,
                    reason: "dup".to_string(),
                },
            );
        }

        assert_eq!(summary.batches_rejected, 150);
        assert_eq!(summary.rejections.len(), MAX_REJECTIONS);
        assert!(summary.to_string().contains("... and 50 more"));
    }

    #[test]
    fn test_duration_string() {
        let mut summary = RunSummary::new("in.csv", "staging");
        summary.duration_ms = 1_500;
        assert_eq!(summary.duration_string(), "1.50s");
        assert_eq!(summary.throughput(), 0.0);

        summary.duration_ms = 125_000;
        assert_eq!(summary.duration_string(), "2m 5s");

        summary.duration_ms = 3_725_000;
        assert_eq!(summary.duration_string(), "1h 2m 5s");
    }

    #[test]
    fn test_finish_and_json() {
        let mut summary = RunSummary::new("in.csv", "staging");
        summary.record_batch(3, 0);
        summary.finish();

        assert!(summary.finished_at.is_some());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["rows_read"], 3);
        assert_eq!(json["staging_table"], "staging");
    }
}
