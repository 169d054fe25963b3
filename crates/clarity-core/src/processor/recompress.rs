//! Lossless-leaning image recompression.
//!
//! Images are decoded and re-encoded from pixels only, so EXIF and other
//! metadata are not carried into the output.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

use super::{ItemProcessor, ItemSizes, ProcessError};

/// Default JPEG quality; high enough to be visually lossless.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// zlib effort used for PNG output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    Default,
    #[default]
    Best,
}

impl From<PngCompression> for CompressionType {
    fn from(level: PngCompression) -> Self {
        match level {
            PngCompression::Fast => CompressionType::Fast,
            PngCompression::Default => CompressionType::Default,
            PngCompression::Best => CompressionType::Best,
        }
    }
}

impl FromStr for PngCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "default" => Ok(Self::Default),
            "best" => Ok(Self::Best),
            other => Err(format!(
                "unknown PNG compression '{}' (expected fast, default or best)",
                other
            )),
        }
    }
}

impl std::fmt::Display for PngCompression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PngCompression::Fast => write!(f, "fast"),
            PngCompression::Default => write!(f, "default"),
            PngCompression::Best => write!(f, "best"),
        }
    }
}

/// Recompresses one image into the output directory under its original name.
#[derive(Debug, Clone)]
pub struct ImageRecompressor {
    jpeg_quality: u8,
    png_compression: PngCompression,
}

impl Default for ImageRecompressor {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            png_compression: PngCompression::Best,
        }
    }
}

impl ImageRecompressor {
    /// `jpeg_quality` is clamped to 1..=100.
    pub fn new(jpeg_quality: u8, png_compression: PngCompression) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
            png_compression,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.jpeg_quality, settings.png_compression)
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    fn encode<W: Write + std::io::Seek>(
        &self,
        image: DynamicImage,
        format: ImageFormat,
        writer: &mut W,
    ) -> image::ImageResult<()> {
        match format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel and only 8-bit samples
                let image = match image.color() {
                    ColorType::L8 | ColorType::Rgb8 => image,
                    _ => DynamicImage::ImageRgb8(image.to_rgb8()),
                };
                image.write_with_encoder(JpegEncoder::new_with_quality(writer, self.jpeg_quality))
            }
            ImageFormat::Png => image.write_with_encoder(PngEncoder::new_with_quality(
                writer,
                self.png_compression.into(),
                FilterType::Adaptive,
            )),
            other => image.write_to(writer, other),
        }
    }
}

impl ItemProcessor for ImageRecompressor {
    fn process(&self, input: &Path, output_dir: &Path) -> Result<ItemSizes, ProcessError> {
        let original = fs::metadata(input)
            .map_err(|source| ProcessError::Read {
                path: input.to_path_buf(),
                source,
            })?
            .len();

        let file_name = input.file_name().ok_or_else(|| ProcessError::InvalidInput {
            path: input.to_path_buf(),
        })?;
        let output_path = output_dir.join(file_name);
        ensure_distinct(input, output_dir, &output_path)?;

        let reader = ImageReader::open(input)
            .and_then(|r| r.with_guessed_format())
            .map_err(|source| ProcessError::Read {
                path: input.to_path_buf(),
                source,
            })?;
        let detected = reader.format();
        let image = reader.decode().map_err(|source| ProcessError::Decode {
            path: input.to_path_buf(),
            source,
        })?;

        let format = output_format(input)
            .or(detected)
            .ok_or_else(|| {
                ProcessError::Other(format!("unsupported image format: {}", input.display()))
            })?;

        write_atomically(&output_path, |writer| {
            self.encode(image, format, writer)
                .map_err(|source| ProcessError::Encode {
                    path: output_path.clone(),
                    source,
                })
        })?;

        let compressed = fs::metadata(&output_path)
            .map_err(|source| ProcessError::Write {
                path: output_path.clone(),
                source,
            })?
            .len();

        tracing::debug!(
            input = %input.display(),
            output = %output_path.display(),
            ?format,
            original,
            compressed,
            "Recompressed image"
        );

        Ok(ItemSizes {
            original,
            compressed,
        })
    }
}

/// Output format chosen from the input's extension.
fn output_format(input: &Path) -> Option<ImageFormat> {
    let ext = input.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        _ => ImageFormat::from_extension(ext),
    }
}

/// Refuse to write over the input file itself.
fn ensure_distinct(input: &Path, output_dir: &Path, output_path: &Path) -> Result<(), ProcessError> {
    let write_err = |source| ProcessError::Write {
        path: output_dir.to_path_buf(),
        source,
    };
    let input = fs::canonicalize(input).map_err(|source| ProcessError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let target = fs::canonicalize(output_dir).map_err(write_err)?;
    let target = match output_path.file_name() {
        Some(name) => target.join(name),
        None => target,
    };

    if input == target {
        return Err(ProcessError::WouldOverwriteInput {
            path: output_path.to_path_buf(),
        });
    }
    Ok(())
}

/// Write `path` through a temporary sibling file that is renamed into place
/// only after `write` succeeds. The temporary file is removed on failure.
fn write_atomically<F>(path: &Path, write: F) -> Result<(), ProcessError>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> Result<(), ProcessError>,
{
    let write_err = |source| ProcessError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));

    let mut tmp = tempfile::Builder::new()
        .prefix(".clarity-")
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(write_err)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(write_err)?;
    }
    tmp.as_file().sync_all().map_err(write_err)?;

    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
