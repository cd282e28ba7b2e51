use std::path::{Path, PathBuf};
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Luma};

use crate::errors::{RegionFeatureError, Result};
use crate::labels::LabeledPartition;
use crate::morphology::GrayImageOf;
use crate::ndimage::NdImage;

/// Single-channel image at the bit depth it was stored with
#[derive(Debug, Clone, PartialEq)]
pub enum GrayInput {
    Luma8(GrayImage),
    Luma16(GrayImageOf<u16>),
}

impl GrayInput {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            GrayInput::Luma8(img) => img.dimensions(),
            GrayInput::Luma16(img) => img.dimensions(),
        }
    }

    pub fn bit_depth(&self) -> u8 {
        match self {
            GrayInput::Luma8(_) => 8,
            GrayInput::Luma16(_) => 16,
        }
    }
}

/// A grayscale input image with its file name
pub struct InputImage {
    pub image: GrayInput,
    pub path: PathBuf,
    pub filename: String,
}

/// Load an 8- or 16-bit grayscale image, keeping the stored sample values.
///
/// Colour and float images are rejected rather than converted, since a
/// luminance conversion would change label ids and intensities.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    // Get filename without extension
    let filename = path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RegionFeatureError::InvalidParameter(format!(
            "cannot derive a file name from '{}'", path.display()
        )))?
        .to_string();

    let image = match image::open(path)? {
        DynamicImage::ImageLuma8(img) => GrayInput::Luma8(img),
        DynamicImage::ImageLuma16(img) => GrayInput::Luma16(img),
        other => {
            return Err(RegionFeatureError::InvalidParameter(format!(
                "{} is not a single-channel grayscale image ({:?})",
                path.display(),
                other.color()
            )))
        }
    };

    Ok(InputImage {
        image,
        path: path.to_path_buf(),
        filename,
    })
}

/// Load a label image (8- or 16-bit) as a 2D partition
pub fn load_partition<P: AsRef<Path>>(path: P) -> Result<LabeledPartition> {
    match load_image(path)?.image {
        GrayInput::Luma8(img) => LabeledPartition::from_luma(&img),
        GrayInput::Luma16(img) => LabeledPartition::from_luma(&img),
    }
}

/// Load an intensity channel as a 2D sample array; 8-bit samples are
/// widened without rescaling
pub fn load_channel<P: AsRef<Path>>(path: P) -> Result<NdImage<u16>> {
    match load_image(path)?.image {
        GrayInput::Luma8(img) => {
            let (width, height) = img.dimensions();
            NdImage::new(
                vec![width as usize, height as usize],
                img.as_raw().iter().map(|&v| u16::from(v)).collect(),
            )
        }
        GrayInput::Luma16(img) => NdImage::from_luma(&img),
    }
}

/// Save an 8- or 16-bit grayscale image as PNG at its own bit depth
pub fn save_image<I, P>(image: I, path: P) -> Result<()>
where
    I: Into<DynamicImage>,
    P: AsRef<Path>,
{
    image.into().save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a float image as 16-bit PNG, rounding and clamping to the u16 range
pub fn save_float_image<P: AsRef<Path>>(image: &GrayImageOf<f32>, path: P) -> Result<()> {
    let (width, height) = image.dimensions();
    let converted: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(width, height, |x, y| {
        let v = image.get_pixel(x, y)[0].round().clamp(0.0, u16::MAX as f32);
        Luma([v as u16])
    });
    save_image(converted, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::{summed_intensity_name, MeasurementAggregator, ObjectMeasurementTable};
    use image::RgbImage;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("region_features_{}_{}.png", std::process::id(), name))
    }

    #[test]
    fn eight_bit_labels_and_channels_keep_raw_values() {
        let labels_path = temp_path("labels8");
        let channel_path = temp_path("channel8");
        save_image(GrayImage::from_raw(2, 2, vec![1, 1, 2, 2]).unwrap(), &labels_path).unwrap();
        save_image(GrayImage::from_pixel(2, 2, Luma([10])), &channel_path).unwrap();

        let partition = load_partition(&labels_path).unwrap();
        assert_eq!(partition.labels(), &[1, 1, 2, 2]);
        let channel = load_channel(&channel_path).unwrap();
        assert_eq!(channel.data(), &[10, 10, 10, 10]);

        let mut table = ObjectMeasurementTable::new();
        MeasurementAggregator::new(&partition)
            .summed_intensity(&mut table, "c", &channel)
            .unwrap();
        let name = summed_intensity_name("c");
        assert_eq!(table.labels().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(table.get(1, &name).and_then(|v| v.as_scalar()), Some(20.0));
        assert_eq!(table.get(2, &name).and_then(|v| v.as_scalar()), Some(20.0));

        std::fs::remove_file(labels_path).ok();
        std::fs::remove_file(channel_path).ok();
    }

    #[test]
    fn sixteen_bit_images_round_trip_at_their_depth() {
        let path = temp_path("labels16");
        let img: GrayImageOf<u16> = ImageBuffer::from_raw(3, 1, vec![0, 300, 65535]).unwrap();
        save_image(img.clone(), &path).unwrap();

        let input = load_image(&path).unwrap();
        assert_eq!(input.image.bit_depth(), 16);
        assert_eq!(input.image, GrayInput::Luma16(img));
        assert_eq!(load_partition(&path).unwrap().labels(), &[0, 300, 65535]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn eight_bit_input_stays_eight_bit() {
        let path = temp_path("gray8");
        let img = GrayImage::from_fn(4, 3, |x, y| Luma([(x * 40 + y) as u8]));
        save_image(img.clone(), &path).unwrap();

        let input = load_image(&path).unwrap();
        assert_eq!(input.image.bit_depth(), 8);
        assert_eq!(input.image.dimensions(), (4, 3));
        assert_eq!(input.image, GrayInput::Luma8(img));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_colour_images() {
        let path = temp_path("rgb");
        save_image(RgbImage::new(2, 2), &path).unwrap();

        assert!(matches!(
            load_partition(&path),
            Err(RegionFeatureError::InvalidParameter(_))
        ));
        assert!(matches!(
            load_channel(&path),
            Err(RegionFeatureError::InvalidParameter(_))
        ));

        std::fs::remove_file(path).ok();
    }
}
