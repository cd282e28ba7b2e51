// src/directional.rs - Bank of oriented morphological filter responses

use image::Primitive;
use imageproc::definitions::Image;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{RegionFeatureError, Result};
use crate::morphology::{GrayImageOf, MorphologicalOperation};
use crate::structuring_element::LineStructuringElement;

/// Per-pixel reduction across the layers of a response stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackProjection {
    Max,
    Min,
    Mean,
    Median,
}

/// Settings for one run of the filter bank
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalFilter {
    pub operation: MorphologicalOperation,
    pub line_length: u32,
    pub directions: u32,
    pub use_parallel: bool,
}

impl DirectionalFilter {
    pub fn new(operation: MorphologicalOperation, line_length: u32, directions: u32) -> Self {
        Self {
            operation,
            line_length,
            directions,
            use_parallel: false,
        }
    }

    pub fn parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    /// Angle in degrees of layer `index`: `index * 180 / directions`.
    ///
    /// Only a half-turn is sampled since a line at θ and θ+180° is the same set.
    pub fn angle(&self, index: u32) -> f64 {
        index as f64 * 180.0 / self.directions as f64
    }

    /// All sampled angles in ascending order
    pub fn angles(&self) -> Vec<f64> {
        (0..self.directions).map(|i| self.angle(i)).collect()
    }

    fn validate<P: Primitive>(&self, image: &GrayImageOf<P>) -> Result<()> {
        if self.directions < 1 {
            return Err(RegionFeatureError::InvalidParameter(
                "number of directions must be >= 1".to_string(),
            ));
        }
        if self.line_length < 1 {
            return Err(RegionFeatureError::InvalidParameter(
                "line length must be >= 1".to_string(),
            ));
        }
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(RegionFeatureError::EmptyInput(format!(
                "input image is {}x{}",
                width, height
            )));
        }
        Ok(())
    }

    /// Filter `image` once per sampled direction.
    pub fn apply<P: Primitive + Send + Sync>(
        &self,
        image: &GrayImageOf<P>,
    ) -> Result<DirectionalResponseStack<P>> {
        self.apply_with_progress(image, |_, _| {})
    }

    /// Same as [`apply`](Self::apply), calling `progress(done, total)` after
    /// each layer. The callback is purely observational; in parallel mode
    /// `done` counts layers finished so far, not the layer index.
    pub fn apply_with_progress<P, F>(
        &self,
        image: &GrayImageOf<P>,
        progress: F,
    ) -> Result<DirectionalResponseStack<P>>
    where
        P: Primitive + Send + Sync,
        F: Fn(usize, usize) + Sync,
    {
        self.validate(image)?;

        // Build every structuring element up front so no layer is produced
        // unless all of them are valid
        let elements = self
            .angles()
            .into_iter()
            .map(|angle| LineStructuringElement::new(self.line_length, angle))
            .collect::<Result<Vec<_>>>()?;

        let total = elements.len();
        tracing::debug!(
            "Directional {} with {} directions, line length {}",
            self.operation,
            total,
            self.line_length
        );

        let layers: Vec<GrayImageOf<P>> = if self.use_parallel {
            let done = std::sync::atomic::AtomicUsize::new(0);
            elements
                .par_iter()
                .map(|se| {
                    let layer = self.operation.apply(image, se);
                    let n = done.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
                    progress(n, total);
                    layer
                })
                .collect()
        } else {
            elements
                .iter()
                .enumerate()
                .map(|(i, se)| {
                    let layer = self.operation.apply(image, se);
                    tracing::debug!("Layer {} at {:.3} degrees done", i, se.angle_degrees());
                    progress(i + 1, total);
                    layer
                })
                .collect()
        };

        Ok(DirectionalResponseStack {
            angles: elements.iter().map(|se| se.angle_degrees()).collect(),
            layers,
        })
    }
}

/// Ordered filter responses, one layer per sampled angle (ascending from 0°).
///
/// Angles follow [`LineStructuringElement`]: degrees counter-clockwise from
/// the positive x axis as seen on screen, so with `y` pointing down the 45°
/// layer responds to lines rising to the right.
#[derive(Debug, Clone)]
pub struct DirectionalResponseStack<P: Primitive> {
    angles: Vec<f64>,
    layers: Vec<GrayImageOf<P>>,
}

impl<P: Primitive> DirectionalResponseStack<P> {
    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    #[inline]
    pub fn layer(&self, index: usize) -> Option<&GrayImageOf<P>> {
        self.layers.get(index)
    }

    #[inline]
    pub fn angle(&self, index: usize) -> Option<f64> {
        self.angles.get(index).copied()
    }

    #[inline]
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.layers.first().map(|l| l.dimensions()).unwrap_or((0, 0))
    }

    /// Iterate over `(angle, layer)` pairs in layer order
    pub fn iter(&self) -> impl Iterator<Item = (f64, &GrayImageOf<P>)> {
        self.angles.iter().copied().zip(self.layers.iter())
    }

    pub fn into_layers(self) -> Vec<GrayImageOf<P>> {
        self.layers
    }

    /// Combine all layers into one image with a per-pixel reduction.
    ///
    /// Reductions run in `f64`; the result is a float image so mean and
    /// median keep their fractional part.
    pub fn project(&self, projection: StackProjection) -> Result<GrayImageOf<f32>> {
        if self.layers.is_empty() {
            return Err(RegionFeatureError::EmptyInput(
                "response stack has no layers".to_string(),
            ));
        }

        let (width, height) = self.dimensions();
        let pixel_count = (width as usize) * (height as usize);
        let mut column: Vec<f64> = Vec::with_capacity(self.layers.len());
        let mut data = Vec::with_capacity(pixel_count);

        for i in 0..pixel_count {
            column.clear();
            for layer in &self.layers {
                let sample = layer.as_raw()[i].to_f64().ok_or_else(|| {
                    RegionFeatureError::InvalidParameter(format!(
                        "layer sample at index {} is not representable as f64",
                        i
                    ))
                })?;
                column.push(sample);
            }

            let value = match projection {
                StackProjection::Max => column.iter().copied().fold(f64::MIN, f64::max),
                StackProjection::Min => column.iter().copied().fold(f64::MAX, f64::min),
                StackProjection::Mean => column.iter().sum::<f64>() / column.len() as f64,
                StackProjection::Median => {
                    column.sort_by(|a, b| a.total_cmp(b));
                    let mid = column.len() / 2;
                    if column.len() % 2 == 1 {
                        column[mid]
                    } else {
                        (column[mid - 1] + column[mid]) / 2.0
                    }
                }
            };
            data.push(value as f32);
        }

        Image::from_raw(width, height, data).ok_or_else(|| {
            RegionFeatureError::DimensionMismatch("projected buffer size".to_string())
        })
    }
}
