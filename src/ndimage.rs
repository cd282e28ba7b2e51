// src/ndimage.rs - n-dimensional sample arrays and spatial calibration

use image::{ImageBuffer, Luma, Primitive};
use serde::{Deserialize, Serialize};

use crate::errors::{RegionFeatureError, Result};

/// Numeric sample type that can be read from an intensity channel.
///
/// Samples are widened to `f64` before accumulation, which is exact for
/// integer sums up to 2^53.
pub trait Sample: Copy + Send + Sync {
    fn widen(self) -> f64;
}

macro_rules! impl_sample {
    ($($t:ty),*) => {
        $(
            impl Sample for $t {
                #[inline]
                fn widen(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_sample!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// An n-dimensional array of samples.
///
/// Storage is flat, with axis 0 (x) varying fastest, then axis 1 (y), and so on.
#[derive(Debug, Clone, PartialEq)]
pub struct NdImage<T> {
    dims: Vec<usize>,
    data: Vec<T>,
}

impl<T: Copy> NdImage<T> {
    /// Wrap a flat buffer. Fails if the buffer length disagrees with the extent
    /// or if any axis has zero extent.
    pub fn new(dims: Vec<usize>, data: Vec<T>) -> Result<Self> {
        if dims.is_empty() || dims.iter().any(|&d| d == 0) {
            return Err(RegionFeatureError::EmptyInput(format!(
                "image extent {:?} has an empty axis",
                dims
            )));
        }

        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(RegionFeatureError::DimensionMismatch(format!(
                "extent {:?} needs {} samples, got {}",
                dims,
                expected,
                data.len()
            )));
        }

        Ok(Self { dims, data })
    }

    /// Create an image filled with a single value
    pub fn filled(dims: Vec<usize>, value: T) -> Result<Self> {
        let len = dims.iter().product();
        Self::new(dims, vec![value; len])
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<T> {
        self.data.get(index).copied()
    }

    /// Sample at an n-dimensional coordinate
    pub fn get_at(&self, coord: &[usize]) -> Option<T> {
        self.flat_index(coord).map(|i| self.data[i])
    }

    /// Convert a coordinate into a flat index, or `None` if it is out of bounds
    pub fn flat_index(&self, coord: &[usize]) -> Option<usize> {
        if coord.len() != self.dims.len() {
            return None;
        }

        let mut index = 0;
        let mut stride = 1;
        for (&c, &d) in coord.iter().zip(&self.dims) {
            if c >= d {
                return None;
            }
            index += c * stride;
            stride *= d;
        }
        Some(index)
    }

    /// Decode a flat index into `coord` (which must have `ndim()` entries)
    pub fn coord_into(&self, mut index: usize, coord: &mut [usize]) {
        for (c, &d) in coord.iter_mut().zip(&self.dims) {
            *c = index % d;
            index /= d;
        }
    }

    /// Decode a flat index into a freshly allocated coordinate
    pub fn coord_of(&self, index: usize) -> Vec<usize> {
        let mut coord = vec![0; self.dims.len()];
        self.coord_into(index, &mut coord);
        coord
    }

    /// Whether `other` covers exactly the same extent
    pub fn same_extent<U>(&self, other: &NdImage<U>) -> bool {
        self.dims == other.dims
    }
}

impl<P: Primitive> NdImage<P> {
    /// Build a 2D array from a single-channel image buffer (x, y)
    pub fn from_luma(image: &ImageBuffer<Luma<P>, Vec<P>>) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(
            vec![width as usize, height as usize],
            image.as_raw().clone(),
        )
    }
}

/// Per-axis physical scale factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Calibration(Vec<f64>);

impl Calibration {
    /// Every factor must be finite and strictly positive
    pub fn new(factors: Vec<f64>) -> Result<Self> {
        if factors.is_empty() {
            return Err(RegionFeatureError::InvalidParameter(
                "calibration must have at least one axis".to_string(),
            ));
        }

        if let Some((axis, f)) = factors
            .iter()
            .enumerate()
            .find(|(_, f)| !f.is_finite() || **f <= 0.0)
        {
            return Err(RegionFeatureError::InvalidParameter(format!(
                "calibration factor for axis {} must be > 0, got {}",
                axis, f
            )));
        }

        Ok(Self(factors))
    }

    /// Unit scale for `ndim` axes
    pub fn identity(ndim: usize) -> Self {
        Self(vec![1.0; ndim])
    }

    #[inline]
    pub fn factors(&self) -> &[f64] {
        &self.0
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Physical volume (area in 2D) of one pixel
    pub fn pixel_volume(&self) -> f64 {
        self.0.iter().product()
    }

    /// Fails unless the calibration has exactly `ndim` axes
    pub fn check_ndim(&self, ndim: usize) -> Result<()> {
        if self.0.len() != ndim {
            return Err(RegionFeatureError::DimensionMismatch(format!(
                "calibration has {} axes but the image has {}",
                self.0.len(),
                ndim
            )));
        }
        Ok(())
    }

    /// Scale a pixel-unit coordinate component-wise
    pub fn apply(&self, coord: &[f64]) -> Vec<f64> {
        coord.iter().zip(&self.0).map(|(c, s)| c * s).collect()
    }
}

impl TryFrom<Vec<f64>> for Calibration {
    type Error = RegionFeatureError;

    fn try_from(factors: Vec<f64>) -> Result<Self> {
        Self::new(factors)
    }
}

impl From<Calibration> for Vec<f64> {
    fn from(calibration: Calibration) -> Self {
        calibration.0
    }
}
