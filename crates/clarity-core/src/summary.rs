//! Human-facing summary of a finished job.

use serde::Serialize;

use crate::jobs::JobTotals;

/// Size statistics derived from a job's `Completed` totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionSummary {
    pub processed_count: usize,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    /// Negative when the outputs ended up larger than the inputs
    pub reduction_bytes: i64,
    pub reduction_percent: f64,
}

impl CompressionSummary {
    pub fn from_totals(totals: &JobTotals) -> Self {
        let original = totals.original_size_total;
        let compressed = totals.compressed_size_total;
        let reduction_bytes = original as i64 - compressed as i64;
        let reduction_percent = if original > 0 {
            reduction_bytes as f64 / original as f64 * 100.0
        } else {
            0.0
        };

        Self {
            processed_count: totals.processed_count,
            original_bytes: original,
            compressed_bytes: compressed,
            reduction_bytes,
            reduction_percent,
        }
    }

    pub fn original_kb(&self) -> f64 {
        to_kb(self.original_bytes as f64)
    }

    pub fn compressed_kb(&self) -> f64 {
        to_kb(self.compressed_bytes as f64)
    }

    pub fn reduction_kb(&self) -> f64 {
        to_kb(self.reduction_bytes as f64)
    }

    /// One-line status shown once the job is over.
    pub fn status_line(&self) -> String {
        format!("Finished. Compressed {} images.", self.processed_count)
    }
}

fn to_kb(bytes: f64) -> f64 {
    bytes / 1024.0
}

impl std::fmt::Display for CompressionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Compression complete! {} images compressed.",
            self.processed_count
        )?;
        writeln!(f)?;
        writeln!(f, "Original size: {:.2} KB", self.original_kb())?;
        writeln!(f, "Compressed size: {:.2} KB", self.compressed_kb())?;
        write!(
            f,
            "Total reduction: {:.2} KB ({:.2}%)",
            self.reduction_kb(),
            self.reduction_percent
        )
    }
}
