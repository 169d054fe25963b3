//! Clarity Core - Business logic for batch image recompression
//!
//! This crate contains all the UI-free functionality for Clarity, including:
//! - Background batch job driver with cooperative cancellation
//! - The per-item processor capability and the image recompressor
//! - Input discovery (file/folder selection, extension filtering)
//! - Completion summary arithmetic
//! - Application configuration and persisted settings

pub mod config;
pub mod discovery;
pub mod jobs;
pub mod processor;
pub mod summary;

pub use config::{Config, Settings};
pub use discovery::InputSelection;
pub use jobs::{
    BatchJob, CancelHandle, ItemResult, JobError, JobEvent, JobEvents, JobPhase, JobRequest,
    JobSlot, JobTotals,
};
pub use processor::{ImageRecompressor, ItemProcessor, ItemSizes, PngCompression, ProcessError};
pub use summary::CompressionSummary;
