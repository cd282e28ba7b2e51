// src/measurements.rs - Per-object measurement table and measurement passes

use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::errors::{RegionFeatureError, Result};
use crate::labels::LabeledPartition;
use crate::ndimage::{Calibration, NdImage, Sample};
use crate::regions::{enumerate, RegionSet};

/// Calibrated centroid, one component per axis
pub const POSITION: &str = "Position";
/// Raw pixel count
pub const PIXEL_SIZE: &str = "Size";
/// Pixel count times the physical volume of one pixel
pub const CALIBRATED_SIZE: &str = "CalibratedSize";
/// Calibrated `[min_0, .., min_n, max_0, .., max_n]` pixel-center bounds
pub const BOUNDING_BOX: &str = "BoundingBox";
/// Scalar offset broadcast to every object
pub const BACKGROUND_OFFSET: &str = "BackgroundOffset";

/// Measurement name for the summed intensity of `channel`
pub fn summed_intensity_name(channel: &str) -> String {
    format!("SumIntensity_{}", channel)
}

/// Measurement name for the mean intensity of `channel`
pub fn mean_intensity_name(channel: &str) -> String {
    format!("MeanIntensity_{}", channel)
}

/// A single measured value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MeasurementValue {
    Count(u64),
    Scalar(f64),
    Vector(Vec<f64>),
}

impl MeasurementValue {
    /// Scalar view; counts widen to `f64`, vectors have none
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MeasurementValue::Count(n) => Some(*n as f64),
            MeasurementValue::Scalar(v) => Some(*v),
            MeasurementValue::Vector(_) => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            MeasurementValue::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            MeasurementValue::Vector(v) => Some(v),
            _ => None,
        }
    }
}

/// Measurements of one object, keyed by measurement name
pub type ObjectEntry = BTreeMap<String, MeasurementValue>;

/// Label -> (measurement name -> value).
///
/// Entries are created on first write. Writing a name that already exists
/// for a label replaces only that value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ObjectMeasurementTable {
    entries: BTreeMap<u32, ObjectEntry>,
}

impl ObjectMeasurementTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: u32, name: impl Into<String>, value: MeasurementValue) {
        self.entries
            .entry(label)
            .or_default()
            .insert(name.into(), value);
    }

    pub fn get(&self, label: u32, name: &str) -> Option<&MeasurementValue> {
        self.entries.get(&label).and_then(|e| e.get(name))
    }

    pub fn entry(&self, label: u32) -> Option<&ObjectEntry> {
        self.entries.get(&label)
    }

    pub fn contains_label(&self, label: u32) -> bool {
        self.entries.contains_key(&label)
    }

    /// Labels with at least one measurement, ascending
    pub fn labels(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ObjectEntry)> {
        self.entries.iter().map(|(&l, e)| (l, e))
    }

    /// Number of objects in the table
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Runs measurement passes over the regions of one partition snapshot.
///
/// Each pass writes only its own measurement names, so passes can run in any
/// order or subset. Preconditions are checked before the first write.
#[derive(Debug, Clone)]
pub struct MeasurementAggregator<'a> {
    regions: RegionSet<'a>,
    use_parallel: bool,
}

impl<'a> MeasurementAggregator<'a> {
    /// Enumerate `partition` once and measure every region
    pub fn new(partition: &'a LabeledPartition) -> Self {
        Self::from_regions(enumerate(partition))
    }

    /// Measure a pre-enumerated (possibly filtered) region set
    pub fn from_regions(regions: RegionSet<'a>) -> Self {
        if regions.is_empty() {
            tracing::warn!("Measuring a region set with no labeled objects");
        }
        Self {
            regions,
            use_parallel: false,
        }
    }

    pub fn parallel(mut self, use_parallel: bool) -> Self {
        self.use_parallel = use_parallel;
        self
    }

    pub fn regions(&self) -> &RegionSet<'a> {
        &self.regions
    }

    fn partition(&self) -> &'a LabeledPartition {
        self.regions.partition()
    }

    /// Calibrated centroid of every region
    pub fn position(&self, table: &mut ObjectMeasurementTable, calibration: &Calibration) -> Result<()> {
        calibration.check_ndim(self.partition().ndim())?;

        for region in &self.regions {
            let position = calibration.apply(region.centroid());
            table.insert(region.label(), POSITION, MeasurementValue::Vector(position));
        }

        tracing::debug!("Position measured for {} regions", self.regions.len());
        Ok(())
    }

    /// Raw pixel count of every region
    pub fn pixel_size(&self, table: &mut ObjectMeasurementTable) {
        for region in &self.regions {
            table.insert(
                region.label(),
                PIXEL_SIZE,
                MeasurementValue::Count(region.size() as u64),
            );
        }

        tracing::debug!("Pixel size measured for {} regions", self.regions.len());
    }

    /// Pixel count scaled by the physical size of one pixel
    pub fn calibrated_size(&self, table: &mut ObjectMeasurementTable, calibration: &Calibration) -> Result<()> {
        calibration.check_ndim(self.partition().ndim())?;
        let unit = calibration.pixel_volume();

        for region in &self.regions {
            table.insert(
                region.label(),
                CALIBRATED_SIZE,
                MeasurementValue::Scalar(region.size() as f64 * unit),
            );
        }
        Ok(())
    }

    /// Calibrated bounds of every region as `[mins.., maxs..]`
    pub fn bounding_box(&self, table: &mut ObjectMeasurementTable, calibration: &Calibration) -> Result<()> {
        calibration.check_ndim(self.partition().ndim())?;

        for region in &self.regions {
            let bounds = region.bounds();
            let mins: Vec<f64> = bounds.iter().map(|b| b.0 as f64).collect();
            let maxs: Vec<f64> = bounds.iter().map(|b| b.1 as f64).collect();
            let mut value = calibration.apply(&mins);
            value.extend(calibration.apply(&maxs));
            table.insert(region.label(), BOUNDING_BOX, MeasurementValue::Vector(value));
        }
        Ok(())
    }

    /// Sum of `channel` samples over every region, stored per channel name
    pub fn summed_intensity<T: Sample>(
        &self,
        table: &mut ObjectMeasurementTable,
        channel_name: &str,
        channel: &NdImage<T>,
    ) -> Result<()> {
        let sums = self.region_sums(channel_name, channel)?;
        let name = summed_intensity_name(channel_name);

        for (label, sum, _) in sums {
            table.insert(label, name.as_str(), MeasurementValue::Scalar(sum));
        }
        Ok(())
    }

    /// Mean of `channel` samples over every region, stored per channel name
    pub fn mean_intensity<T: Sample>(
        &self,
        table: &mut ObjectMeasurementTable,
        channel_name: &str,
        channel: &NdImage<T>,
    ) -> Result<()> {
        let sums = self.region_sums(channel_name, channel)?;
        let name = mean_intensity_name(channel_name);

        for (label, sum, count) in sums {
            table.insert(
                label,
                name.as_str(),
                MeasurementValue::Scalar(sum / count as f64),
            );
        }
        Ok(())
    }

    /// Write the same offset into every region's entry
    pub fn background_offset(&self, table: &mut ObjectMeasurementTable, offset: f64) {
        for region in &self.regions {
            table.insert(region.label(), BACKGROUND_OFFSET, MeasurementValue::Scalar(offset));
        }
    }

    /// `(label, sum, pixel count)` per region. Sums are computed before any
    /// table write, in parallel when enabled.
    fn region_sums<T: Sample>(&self, channel_name: &str, channel: &NdImage<T>) -> Result<Vec<(u32, f64, usize)>> {
        self.partition().check_extent(channel)?;
        if channel_name.is_empty() {
            return Err(RegionFeatureError::InvalidParameter(
                "channel name must not be empty".to_string(),
            ));
        }

        let samples = channel.data();
        let sum_region = |indices: &[usize]| -> f64 {
            indices.iter().map(|&i| samples[i].widen()).sum()
        };

        let sums: Vec<(u32, f64, usize)> = if self.use_parallel {
            self.regions
                .as_slice()
                .par_iter()
                .map(|r| (r.label(), sum_region(r.indices()), r.size()))
                .collect()
        } else {
            self.regions
                .iter()
                .map(|r| (r.label(), sum_region(r.indices()), r.size()))
                .collect()
        };

        tracing::debug!(
            "Intensity sums for channel '{}' over {} regions",
            channel_name,
            sums.len()
        );
        Ok(sums)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// 8x6 partition: label 1 is the 3x3 square at x 2..5, y 1..4; label 2 is a
    /// single pixel at (7, 5)
    fn square_partition() -> LabeledPartition {
        let mut labels = vec![0u32; 48];
        for y in 1..4 {
            for x in 2..5 {
                labels[y * 8 + x] = 1;
            }
        }
        labels[5 * 8 + 7] = 2;
        LabeledPartition::new(vec![8, 6], labels).unwrap()
    }

    #[test]
    fn table_creates_entries_lazily_and_overwrites_by_name() {
        let mut table = ObjectMeasurementTable::new();
        table.insert(5, "A", MeasurementValue::Scalar(1.0));
        table.insert(6, "A", MeasurementValue::Scalar(2.0));
        table.insert(5, "B", MeasurementValue::Count(3));
        table.insert(5, "A", MeasurementValue::Scalar(9.0));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(5, "A"), Some(&MeasurementValue::Scalar(9.0)));
        assert_eq!(table.get(5, "B"), Some(&MeasurementValue::Count(3)));
        assert_eq!(table.get(6, "A"), Some(&MeasurementValue::Scalar(2.0)));
        assert_eq!(table.get(6, "B"), None);
        assert_eq!(table.labels().collect::<Vec<_>>(), vec![5, 6]);
    }

    #[test]
    fn position_and_size_of_square() {
        let partition = square_partition();
        let aggregator = MeasurementAggregator::new(&partition);
        let mut table = ObjectMeasurementTable::new();

        let calibration = Calibration::new(vec![0.25, 2.0]).unwrap();
        aggregator.position(&mut table, &calibration).unwrap();
        aggregator.pixel_size(&mut table);

        assert_eq!(table.get(1, PIXEL_SIZE).and_then(|v| v.as_count()), Some(9));
        let position = table.get(1, POSITION).and_then(|v| v.as_vector()).unwrap();
        assert_approx_eq!(position[0], 3.0 * 0.25);
        assert_approx_eq!(position[1], 2.0 * 2.0);

        let single = table.get(2, POSITION).and_then(|v| v.as_vector()).unwrap();
        assert_approx_eq!(single[0], 7.0 * 0.25);
        assert_approx_eq!(single[1], 5.0 * 2.0);
    }

    #[test]
    fn position_rejects_mismatched_calibration_without_writing() {
        let partition = square_partition();
        let aggregator = MeasurementAggregator::new(&partition);
        let mut table = ObjectMeasurementTable::new();

        let calibration = Calibration::new(vec![1.0, 1.0, 1.0]).unwrap();
        assert!(matches!(
            aggregator.position(&mut table, &calibration),
            Err(RegionFeatureError::DimensionMismatch(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn summed_intensity_is_count_times_value() {
        let partition = square_partition();
        let aggregator = MeasurementAggregator::new(&partition);
        let mut table = ObjectMeasurementTable::new();

        let channel = NdImage::filled(vec![8, 6], 1000u16).unwrap();
        aggregator.summed_intensity(&mut table, "GFP", &channel).unwrap();

        let name = summed_intensity_name("GFP");
        assert_eq!(table.get(1, &name), Some(&MeasurementValue::Scalar(9000.0)));
        assert_eq!(table.get(2, &name), Some(&MeasurementValue::Scalar(1000.0)));
    }

    #[test]
    fn channels_do_not_overwrite_each_other() {
        let partition = square_partition();
        let aggregator = MeasurementAggregator::new(&partition);
        let mut table = ObjectMeasurementTable::new();

        let gfp = NdImage::filled(vec![8, 6], 2u8).unwrap();
        let dapi = NdImage::filled(vec![8, 6], 0.5f32).unwrap();
        aggregator.summed_intensity(&mut table, "GFP", &gfp).unwrap();
        aggregator.summed_intensity(&mut table, "DAPI", &dapi).unwrap();

        assert_eq!(
            table.get(1, &summed_intensity_name("GFP")),
            Some(&MeasurementValue::Scalar(18.0))
        );
        assert_eq!(
            table.get(1, &summed_intensity_name("DAPI")),
            Some(&MeasurementValue::Scalar(4.5))
        );
    }

    #[test]
    fn summed_intensity_rejects_mismatched_channel() {
        let partition = square_partition();
        let aggregator = MeasurementAggregator::new(&partition);
        let mut table = ObjectMeasurementTable::new();

        let channel = NdImage::filled(vec![6, 8], 1u8).unwrap();
        assert!(matches!(
            aggregator.summed_intensity(&mut table, "C1", &channel),
            Err(RegionFeatureError::DimensionMismatch(_))
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn wide_accumulation_does_not_overflow() {
        let labels = vec![1u32; 70_000];
        let partition = LabeledPartition::new(vec![350, 200], labels).unwrap();
        let channel = NdImage::filled(vec![350, 200], u16::MAX).unwrap();

        let mut table = ObjectMeasurementTable::new();
        MeasurementAggregator::new(&partition)
            .parallel(true)
            .summed_intensity(&mut table, "C1", &channel)
            .unwrap();

        let expected = 70_000.0 * u16::MAX as f64;
        assert_eq!(
            table.get(1, &summed_intensity_name("C1")).and_then(|v| v.as_scalar()),
            Some(expected)
        );
    }

    #[test]
    fn mean_intensity_and_background_offset() {
        let partition = square_partition();
        let aggregator = MeasurementAggregator::new(&partition);
        let mut table = ObjectMeasurementTable::new();

        // channel value equals the x coordinate
        let data: Vec<u8> = (0..48).map(|i| (i % 8) as u8).collect();
        let channel = NdImage::new(vec![8, 6], data).unwrap();
        aggregator.mean_intensity(&mut table, "C1", &channel).unwrap();
        aggregator.background_offset(&mut table, 12.5);

        assert_eq!(
            table.get(1, &mean_intensity_name("C1")).and_then(|v| v.as_scalar()),
            Some(3.0)
        );
        assert_eq!(
            table.get(2, BACKGROUND_OFFSET),
            Some(&MeasurementValue::Scalar(12.5))
        );
        assert_eq!(
            table.get(1, BACKGROUND_OFFSET),
            Some(&MeasurementValue::Scalar(12.5))
        );
    }

    #[test]
    fn calibrated_size_and_bounding_box() {
        let partition = square_partition();
        let aggregator = MeasurementAggregator::new(&partition);
        let mut table = ObjectMeasurementTable::new();
        let calibration = Calibration::new(vec![0.5, 2.0]).unwrap();

        aggregator.calibrated_size(&mut table, &calibration).unwrap();
        aggregator.bounding_box(&mut table, &calibration).unwrap();

        assert_eq!(
            table.get(1, CALIBRATED_SIZE),
            Some(&MeasurementValue::Scalar(9.0))
        );
        assert_eq!(
            table.get(1, BOUNDING_BOX),
            Some(&MeasurementValue::Vector(vec![1.0, 2.0, 2.0, 6.0]))
        );
    }

    #[test]
    fn restricted_region_set_only_touches_selected_labels() {
        let partition = square_partition();
        let selected = enumerate(&partition).select_labels(&[2]);
        let mut table = ObjectMeasurementTable::new();
        MeasurementAggregator::from_regions(selected).pixel_size(&mut table);

        assert!(!table.contains_label(1));
        assert_eq!(table.get(2, PIXEL_SIZE), Some(&MeasurementValue::Count(1)));
    }

    #[test]
    fn table_serializes_to_nested_json() {
        let mut table = ObjectMeasurementTable::new();
        table.insert(3, PIXEL_SIZE, MeasurementValue::Count(4));
        table.insert(3, POSITION, MeasurementValue::Vector(vec![1.0, 2.5]));

        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"3":{"Position":[1.0,2.5],"Size":4}}"#);
    }
}
