// src/structuring_element.rs - Oriented line structuring elements

use crate::errors::{RegionFeatureError, Result};

/// A line segment of a given length and orientation, rasterized to the pixel grid.
///
/// Offsets are `(dx, dy)` relative to the origin, with `y` pointing down the
/// image and angles measured counter-clockwise from the positive x axis as
/// seen on screen. The offset set is point-symmetric and always contains the
/// origin.
#[derive(Debug, Clone, PartialEq)]
pub struct LineStructuringElement {
    length: u32,
    angle_degrees: f64,
    offsets: Vec<(i32, i32)>,
}

impl LineStructuringElement {
    pub fn new(length: u32, angle_degrees: f64) -> Result<Self> {
        if length == 0 {
            return Err(RegionFeatureError::InvalidParameter(
                "line length must be >= 1".to_string(),
            ));
        }
        if !angle_degrees.is_finite() {
            return Err(RegionFeatureError::InvalidParameter(format!(
                "line angle must be finite, got {}",
                angle_degrees
            )));
        }

        let theta = angle_degrees.to_radians();
        let dx = theta.cos();
        let dy = -theta.sin();

        // Step along the dominant axis so the line has no gaps; f64::round
        // rounds half away from zero, which keeps offsets i and -i mirrored
        let major = dx.abs().max(dy.abs());
        let projected = (length as f64 - 1.0) * major;
        let half = (projected / 2.0).round() as i32;

        let mut offsets = Vec::with_capacity((2 * half + 1) as usize);
        for i in -half..=half {
            let offset = if dx.abs() >= dy.abs() {
                (i, (i as f64 * dy / dx).round() as i32)
            } else {
                ((i as f64 * dx / dy).round() as i32, i)
            };
            offsets.push(offset);
        }

        Ok(Self {
            length,
            angle_degrees,
            offsets,
        })
    }

    /// Horizontal line (angle 0)
    pub fn horizontal(length: u32) -> Result<Self> {
        Self::new(length, 0.0)
    }

    #[inline]
    pub fn length(&self) -> u32 {
        self.length
    }

    #[inline]
    pub fn angle_degrees(&self) -> f64 {
        self.angle_degrees
    }

    #[inline]
    pub fn offsets(&self) -> &[(i32, i32)] {
        &self.offsets
    }

    /// Number of pixels in the rasterized line
    #[inline]
    pub fn size(&self) -> usize {
        self.offsets.len()
    }

    /// Offsets mirrored through the origin
    pub fn reflected_offsets(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.offsets.iter().map(|&(dx, dy)| (-dx, -dy))
    }
}
