//! Per-item processing capability.
//!
//! The batch driver only knows the [`ItemProcessor`] trait. The image
//! recompressor is the production implementation; tests inject their own.

mod recompress;

pub use recompress::{ImageRecompressor, PngCompression, DEFAULT_JPEG_QUALITY};

use std::path::{Path, PathBuf};

/// Byte sizes of one input before and after processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemSizes {
    pub original: u64,
    pub compressed: u64,
}

/// A single unit of work: turn one input file into one output file.
///
/// Implementations must not modify the input file and must never leave a
/// truncated output behind (write to a temporary path, then rename).
pub trait ItemProcessor: Send + Sync {
    fn process(&self, input: &Path, output_dir: &Path) -> Result<ItemSizes, ProcessError>;
}

/// Why a single item could not be processed.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot encode {}: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("output {} would overwrite the input file", path.display())]
    WouldOverwriteInput { path: PathBuf },
    #[error("input path {} has no file name", path.display())]
    InvalidInput { path: PathBuf },
    #[error("{0}")]
    Other(String),
}
