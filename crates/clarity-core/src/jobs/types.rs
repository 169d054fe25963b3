//! Event and result types for batch jobs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::processor::ItemSizes;

/// Event emitted by a running job, in strict input order.
///
/// A run produces one `StatusChanged`/`ProgressChanged` pair per visited input
/// (plus an extra `StatusChanged` when that input fails), followed by exactly
/// one `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    StatusChanged {
        message: String,
    },
    ProgressChanged {
        percent: u8,
    },
    Completed {
        processed_count: usize,
        original_size_total: u64,
        compressed_size_total: u64,
    },
}

impl JobEvent {
    pub fn status(message: impl Into<String>) -> Self {
        Self::StatusChanged {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Outcome of a single input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ItemResult {
    Success {
        original_size_bytes: u64,
        compressed_size_bytes: u64,
    },
    Failure {
        input: PathBuf,
        error: String,
    },
}

impl From<ItemSizes> for ItemResult {
    fn from(sizes: ItemSizes) -> Self {
        Self::Success {
            original_size_bytes: sizes.original,
            compressed_size_bytes: sizes.compressed,
        }
    }
}

/// Aggregate counters reported by the terminal `Completed` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTotals {
    pub processed_count: usize,
    pub original_size_total: u64,
    pub compressed_size_total: u64,
}

impl JobTotals {
    /// Add one successful item to the totals.
    pub(crate) fn record(&mut self, original: u64, compressed: u64) {
        self.processed_count += 1;
        self.original_size_total += original;
        self.compressed_size_total += compressed;
    }
}

impl From<JobTotals> for JobEvent {
    fn from(totals: JobTotals) -> Self {
        Self::Completed {
            processed_count: totals.processed_count,
            original_size_total: totals.original_size_total,
            compressed_size_total: totals.compressed_size_total,
        }
    }
}

/// Lifecycle of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobPhase {
    /// Created, not started yet.
    Idle = 0,
    Running = 1,
    /// Cancellation requested; the driver stops at the next item boundary.
    Cancelling = 2,
    /// Loop exited early because of cancellation.
    Stopped = 3,
    /// Loop ran through every input.
    Completed = 4,
}

impl JobPhase {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Cancelling,
            3 => Self::Stopped,
            _ => Self::Completed,
        }
    }

    /// Whether a driver loop is still (or about to be) executing.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Cancelling)
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobPhase::Idle => write!(f, "idle"),
            JobPhase::Running => write!(f, "running"),
            JobPhase::Cancelling => write!(f, "cancelling"),
            JobPhase::Stopped => write!(f, "stopped"),
            JobPhase::Completed => write!(f, "completed"),
        }
    }
}
