// src/morphology.rs - Grey-level morphology with line structuring elements

use image::{ImageBuffer, Luma, Primitive};
use imageproc::definitions::Image;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::RegionFeatureError;
use crate::structuring_element::LineStructuringElement;

/// Single-channel image with samples of type `P`
pub type GrayImageOf<P> = Image<Luma<P>>;

/// The closed set of morphological operations the filter bank can apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphologicalOperation {
    Erosion,
    Dilation,
    Opening,
    Closing,
    /// Input minus its opening
    WhiteTopHat,
    /// Closing minus the input
    BlackTopHat,
    /// Dilation minus erosion
    Gradient,
}

impl MorphologicalOperation {
    pub const ALL: [MorphologicalOperation; 7] = [
        MorphologicalOperation::Erosion,
        MorphologicalOperation::Dilation,
        MorphologicalOperation::Opening,
        MorphologicalOperation::Closing,
        MorphologicalOperation::WhiteTopHat,
        MorphologicalOperation::BlackTopHat,
        MorphologicalOperation::Gradient,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MorphologicalOperation::Erosion => "erosion",
            MorphologicalOperation::Dilation => "dilation",
            MorphologicalOperation::Opening => "opening",
            MorphologicalOperation::Closing => "closing",
            MorphologicalOperation::WhiteTopHat => "white_top_hat",
            MorphologicalOperation::BlackTopHat => "black_top_hat",
            MorphologicalOperation::Gradient => "gradient",
        }
    }

    /// Apply this operation to `image`, producing a new image of the same extent
    pub fn apply<P: Primitive>(
        &self,
        image: &GrayImageOf<P>,
        se: &LineStructuringElement,
    ) -> GrayImageOf<P> {
        match self {
            MorphologicalOperation::Erosion => erode(image, se),
            MorphologicalOperation::Dilation => dilate(image, se),
            MorphologicalOperation::Opening => open(image, se),
            MorphologicalOperation::Closing => close(image, se),
            MorphologicalOperation::WhiteTopHat => white_top_hat(image, se),
            MorphologicalOperation::BlackTopHat => black_top_hat(image, se),
            MorphologicalOperation::Gradient => gradient(image, se),
        }
    }
}

impl fmt::Display for MorphologicalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MorphologicalOperation {
    type Err = RegionFeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        MorphologicalOperation::ALL
            .iter()
            .copied()
            .find(|op| op.name() == wanted)
            .ok_or_else(|| {
                RegionFeatureError::InvalidParameter(format!(
                    "unknown morphological operation '{}'",
                    s
                ))
            })
    }
}

/// Grey erosion: minimum over the structuring element.
///
/// Neighbours that fall outside the image are ignored. The origin is always
/// part of the element, so every output pixel sees at least itself.
pub fn erode<P: Primitive>(image: &GrayImageOf<P>, se: &LineStructuringElement) -> GrayImageOf<P> {
    rank_filter(image, se.offsets().iter().copied(), |acc, v| v < acc)
}

/// Grey dilation: maximum over the reflected structuring element
pub fn dilate<P: Primitive>(image: &GrayImageOf<P>, se: &LineStructuringElement) -> GrayImageOf<P> {
    rank_filter(image, se.reflected_offsets(), |acc, v| v > acc)
}

/// Apply morphological opening (erosion followed by dilation)
pub fn open<P: Primitive>(image: &GrayImageOf<P>, se: &LineStructuringElement) -> GrayImageOf<P> {
    let eroded = erode(image, se);
    dilate(&eroded, se)
}

/// Apply morphological closing (dilation followed by erosion)
pub fn close<P: Primitive>(image: &GrayImageOf<P>, se: &LineStructuringElement) -> GrayImageOf<P> {
    let dilated = dilate(image, se);
    erode(&dilated, se)
}

pub fn white_top_hat<P: Primitive>(
    image: &GrayImageOf<P>,
    se: &LineStructuringElement,
) -> GrayImageOf<P> {
    let opened = open(image, se);
    difference(image, &opened)
}

pub fn black_top_hat<P: Primitive>(
    image: &GrayImageOf<P>,
    se: &LineStructuringElement,
) -> GrayImageOf<P> {
    let closed = close(image, se);
    difference(&closed, image)
}

pub fn gradient<P: Primitive>(image: &GrayImageOf<P>, se: &LineStructuringElement) -> GrayImageOf<P> {
    let dilated = dilate(image, se);
    let eroded = erode(image, se);
    difference(&dilated, &eroded)
}

/// Shared min/max kernel. `replace(acc, v)` decides whether `v` wins over
/// the current accumulator.
fn rank_filter<P, I, F>(image: &GrayImageOf<P>, offsets: I, replace: F) -> GrayImageOf<P>
where
    P: Primitive,
    I: Iterator<Item = (i32, i32)>,
    F: Fn(P, P) -> bool,
{
    let (width, height) = image.dimensions();
    let offsets: Vec<(i32, i32)> = offsets.collect();
    let src = image.as_raw();

    let w = width as i32;
    let h = height as i32;

    ImageBuffer::from_fn(width, height, |x, y| {
        let (x, y) = (x as i32, y as i32);
        let mut acc = src[(y * w + x) as usize];
        for &(dx, dy) in &offsets {
            let nx = x + dx;
            let ny = y + dy;
            if nx < 0 || ny < 0 || nx >= w || ny >= h {
                continue;
            }
            let v = src[(ny * w + nx) as usize];
            if replace(acc, v) {
                acc = v;
            }
        }
        Luma([acc])
    })
}

/// Pixel-wise `a - b`, clamped at zero so integer samples never wrap
fn difference<P: Primitive>(a: &GrayImageOf<P>, b: &GrayImageOf<P>) -> GrayImageOf<P> {
    let (width, height) = a.dimensions();
    let zero = P::zero();
    ImageBuffer::from_fn(width, height, |x, y| {
        let va = a.get_pixel(x, y)[0];
        let vb = b.get_pixel(x, y)[0];
        Luma([if va > vb { va - vb } else { zero }])
    })
}
