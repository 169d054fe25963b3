use std::path::PathBuf;

use clap::Parser;
use clarity_core::PngCompression;

#[derive(Parser, Debug, Clone)]
#[command(name = "clarity")]
#[command(about = "Lossless image compressor: recompress a batch of images into a folder")]
pub struct Args {
    /// Image files and/or folders to compress
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Folder to save compressed images to (defaults to the last one used)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Only scan the top level of folders
    #[arg(long)]
    pub no_recursive: bool,

    /// JPEG quality (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: Option<u8>,

    /// PNG compression effort: fast, default or best
    #[arg(long)]
    pub png_compression: Option<PngCompression>,

    /// Print job events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let args = Args::try_parse_from(["clarity", "photos", "-o", "out"]).unwrap();
        assert_eq!(args.paths, vec![PathBuf::from("photos")]);
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert!(!args.no_recursive);
        assert!(!args.json);
        assert_eq!(args.jpeg_quality, None);
    }

    #[test]
    fn test_parse_overrides() {
        let args = Args::try_parse_from([
            "clarity",
            "a.jpg",
            "b.png",
            "--jpeg-quality",
            "80",
            "--png-compression",
            "fast",
            "--no-recursive",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.paths.len(), 2);
        assert_eq!(args.jpeg_quality, Some(80));
        assert_eq!(args.png_compression, Some(PngCompression::Fast));
        assert!(args.no_recursive);
        assert!(args.json);
        assert_eq!(args.output, None);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(Args::try_parse_from(["clarity"]).is_err());
        assert!(Args::try_parse_from(["clarity", "a.jpg", "--jpeg-quality", "0"]).is_err());
        assert!(Args::try_parse_from(["clarity", "a.jpg", "--jpeg-quality", "101"]).is_err());
        assert!(Args::try_parse_from(["clarity", "a.png", "--png-compression", "max"]).is_err());
    }
}
