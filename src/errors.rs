use thiserror::Error;
use std::io;
use std::path::PathBuf;

/// Error types for the region feature core
#[derive(Error, Debug)]
pub enum RegionFeatureError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Partition contains no labeled regions")]
    NoRegions,

    #[error("No region centroid found within radius {radius} of the partition center")]
    NoCentralRegion { radius: f64 },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, RegionFeatureError>;
