// src/labels.rs - Labeled partition of an image into objects and background

use image::{GrayImage, ImageBuffer, Luma, Primitive};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::errors::{RegionFeatureError, Result};
use crate::ndimage::NdImage;

/// Label value reserved for pixels that belong to no object
pub const BACKGROUND: u32 = 0;

/// Integer-labeled segmentation of an image into disjoint objects plus background.
///
/// Any positive label identifies one object; label values carry no ordering
/// meaning beyond equality.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledPartition {
    labels: NdImage<u32>,
}

impl LabeledPartition {
    pub fn new(dims: Vec<usize>, labels: Vec<u32>) -> Result<Self> {
        Ok(Self {
            labels: NdImage::new(dims, labels)?,
        })
    }

    pub fn from_image(labels: NdImage<u32>) -> Self {
        Self { labels }
    }

    /// Build a 2D partition from a label image; negative or fractional
    /// sample values are not valid labels.
    pub fn from_luma<P: Primitive>(image: &ImageBuffer<Luma<P>, Vec<P>>) -> Result<Self> {
        let (width, height) = image.dimensions();
        let mut labels = Vec::with_capacity(image.as_raw().len());
        for &v in image.as_raw() {
            let label = num_label(v).ok_or_else(|| {
                RegionFeatureError::InvalidParameter(
                    "label image contains a value that is not a non-negative integer".to_string(),
                )
            })?;
            labels.push(label);
        }
        Self::new(vec![width as usize, height as usize], labels)
    }

    /// Label the connected foreground components of a binary mask.
    ///
    /// Non-zero pixels are foreground. Components are numbered from 1 in
    /// raster order.
    pub fn from_mask(mask: &GrayImage, connectivity: Connectivity) -> Result<Self> {
        let (width, height) = mask.dimensions();
        if width == 0 || height == 0 {
            return Err(RegionFeatureError::EmptyInput(
                "mask has zero extent".to_string(),
            ));
        }

        // connected_components groups equal values, so collapse the mask to 0/1 first
        let binary = ImageBuffer::from_fn(width, height, |x, y| {
            Luma([if mask.get_pixel(x, y)[0] > 0 { 1u8 } else { 0 }])
        });
        let labelled = connected_components(&binary, connectivity, Luma([0u8]));
        Self::new(
            vec![width as usize, height as usize],
            labelled.into_raw(),
        )
    }

    #[inline]
    pub fn dims(&self) -> &[usize] {
        self.labels.dims()
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.labels.ndim()
    }

    /// Number of pixels in the partition
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[inline]
    pub fn labels(&self) -> &[u32] {
        self.labels.data()
    }

    #[inline]
    pub fn label_at(&self, coord: &[usize]) -> Option<u32> {
        self.labels.get_at(coord)
    }

    #[inline]
    pub fn as_image(&self) -> &NdImage<u32> {
        &self.labels
    }

    /// Geometric center in pixel-index units: `(extent - 1) / 2` per axis
    pub fn center(&self) -> Vec<f64> {
        self.dims().iter().map(|&d| (d as f64 - 1.0) / 2.0).collect()
    }

    /// Fails unless `other` has exactly this partition's extent
    pub fn check_extent<T>(&self, other: &NdImage<T>) -> Result<()>
    where
        T: Copy,
    {
        if !self.labels.same_extent(other) {
            return Err(RegionFeatureError::DimensionMismatch(format!(
                "partition extent {:?} differs from image extent {:?}",
                self.dims(),
                other.dims()
            )));
        }
        Ok(())
    }
}

fn num_label<P: Primitive>(v: P) -> Option<u32> {
    let f = v.to_f64()?;
    if f < 0.0 || f.fract() != 0.0 || f > u32::MAX as f64 {
        return None;
    }
    Some(f as u32)
}
