// src/config.rs - TOML configuration for filtering and measurement runs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::directional::{DirectionalFilter, StackProjection};
use crate::errors::{RegionFeatureError, Result};
use crate::morphology::MorphologicalOperation;
use crate::ndimage::Calibration;

/// Configuration for region feature extraction
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub measure: MeasureConfig,
}

/// Directional filter bank settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FilterConfig {
    #[serde(default = "default_operation")]
    pub operation: MorphologicalOperation,

    #[serde(default = "default_line_length")]
    pub line_length: u32,

    #[serde(default = "default_directions")]
    pub directions: u32,

    /// Optional reduction of the stack into a single image
    #[serde(default)]
    pub projection: Option<StackProjection>,
}

/// Which regions the measurement passes cover
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    All,
    Largest,
    Central,
}

/// Measurement settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MeasureConfig {
    /// Per-axis scale; unit scale when absent
    #[serde(default)]
    pub calibration: Option<Calibration>,

    #[serde(default = "default_central_radius")]
    pub central_radius: f64,

    #[serde(default)]
    pub background_offset: Option<f64>,

    #[serde(default = "default_selection")]
    pub selection: Selection,
}

fn default_parallel() -> bool {
    true
}

fn default_operation() -> MorphologicalOperation {
    MorphologicalOperation::Opening
}

fn default_line_length() -> u32 {
    20
}

fn default_directions() -> u32 {
    32
}

fn default_central_radius() -> f64 {
    10.0
}

fn default_selection() -> Selection {
    Selection::All
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            operation: default_operation(),
            line_length: default_line_length(),
            directions: default_directions(),
            projection: None,
        }
    }
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            calibration: None,
            central_radius: default_central_radius(),
            background_offset: None,
            selection: default_selection(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_parallel: default_parallel(),
            filter: FilterConfig::default(),
            measure: MeasureConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RegionFeatureError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| RegionFeatureError::ConfigLoad {
            source: e,
            path: path.to_path_buf(),
        })?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.filter.line_length == 0 {
            return Err(RegionFeatureError::Config(
                "filter.line_length must be > 0".to_string(),
            ));
        }

        if self.filter.directions == 0 {
            return Err(RegionFeatureError::Config(
                "filter.directions must be > 0".to_string(),
            ));
        }

        if !self.measure.central_radius.is_finite() || self.measure.central_radius <= 0.0 {
            return Err(RegionFeatureError::Config(
                "measure.central_radius must be > 0.0".to_string(),
            ));
        }

        if let Some(offset) = self.measure.background_offset {
            if !offset.is_finite() {
                return Err(RegionFeatureError::Config(
                    "measure.background_offset must be finite".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Filter bank described by the `[filter]` section
    pub fn directional_filter(&self) -> DirectionalFilter {
        DirectionalFilter::new(
            self.filter.operation,
            self.filter.line_length,
            self.filter.directions,
        )
        .parallel(self.use_parallel)
    }

    /// Calibration for an image with `ndim` axes
    pub fn calibration_for(&self, ndim: usize) -> Result<Calibration> {
        match &self.measure.calibration {
            Some(calibration) => {
                calibration.check_ndim(ndim)?;
                Ok(calibration.clone())
            }
            None => Ok(Calibration::identity(ndim)),
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            RegionFeatureError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}
