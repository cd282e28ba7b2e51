// src/lib.rs - Library interface for region feature extraction

pub mod config;
pub mod directional;
pub mod errors;
pub mod image_io;
pub mod labels;
pub mod measurements;
pub mod morphology;
pub mod ndimage;
pub mod regions;
pub mod structuring_element;

// Re-export commonly used types and functions
pub use errors::{RegionFeatureError, Result};
pub use config::{Config, Selection};
pub use ndimage::{Calibration, NdImage, Sample};
pub use labels::{LabeledPartition, BACKGROUND};

// Re-export directional filtering
pub use directional::{
    DirectionalFilter,
    DirectionalResponseStack,
    StackProjection,
};
pub use morphology::{GrayImageOf, MorphologicalOperation};
pub use structuring_element::LineStructuringElement;

// Re-export region enumeration and selection
pub use regions::{
    central,
    enumerate,
    largest,
    CentralLabelLocator,
    NearestCentroidLocator,
    Region,
    RegionSet,
};

// Re-export measurement aggregation
pub use measurements::{
    MeasurementAggregator,
    MeasurementValue,
    ObjectMeasurementTable,
};
