// src/regions.rs - Region enumeration and object selection over a labeled partition

use std::collections::BTreeMap;

use crate::errors::{RegionFeatureError, Result};
use crate::labels::{LabeledPartition, BACKGROUND};

/// The set of pixels sharing one positive label.
///
/// A region borrows the partition it was enumerated from, so it cannot
/// outlive or observe a mutated partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Region<'a> {
    partition: &'a LabeledPartition,
    label: u32,
    indices: Vec<usize>,
    centroid: Vec<f64>,
}

impl<'a> Region<'a> {
    #[inline]
    pub fn label(&self) -> u32 {
        self.label
    }

    /// Number of member pixels
    #[inline]
    pub fn size(&self) -> usize {
        self.indices.len()
    }

    /// Mean member coordinate in pixel-index units
    #[inline]
    pub fn centroid(&self) -> &[f64] {
        &self.centroid
    }

    /// Flat indices of member pixels, ascending
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    #[inline]
    pub fn partition(&self) -> &'a LabeledPartition {
        self.partition
    }

    /// Iterate over member coordinates in raster order
    pub fn coordinates(&self) -> impl Iterator<Item = Vec<usize>> + '_ {
        let image = self.partition.as_image();
        self.indices.iter().map(move |&i| image.coord_of(i))
    }

    /// Inclusive per-axis `(min, max)` coordinate bounds
    pub fn bounds(&self) -> Vec<(usize, usize)> {
        let image = self.partition.as_image();
        let ndim = image.ndim();
        let mut bounds = vec![(usize::MAX, 0); ndim];
        let mut coord = vec![0; ndim];
        for &i in &self.indices {
            image.coord_into(i, &mut coord);
            for (b, &c) in bounds.iter_mut().zip(&coord) {
                b.0 = b.0.min(c);
                b.1 = b.1.max(c);
            }
        }
        bounds
    }

    /// Squared Euclidean distance from the centroid to `point` (pixel units)
    pub fn centroid_distance_sq(&self, point: &[f64]) -> f64 {
        self.centroid
            .iter()
            .zip(point)
            .map(|(c, p)| (c - p) * (c - p))
            .sum()
    }
}

/// Regions of one partition snapshot, ordered by ascending label
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSet<'a> {
    partition: &'a LabeledPartition,
    regions: Vec<Region<'a>>,
}

impl<'a> RegionSet<'a> {
    #[inline]
    pub fn partition(&self) -> &'a LabeledPartition {
        self.partition
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region<'a>> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[Region<'a>] {
        &self.regions
    }

    /// Look up a region by label
    pub fn get(&self, label: u32) -> Option<&Region<'a>> {
        self.regions
            .binary_search_by_key(&label, |r| r.label)
            .ok()
            .map(|i| &self.regions[i])
    }

    pub fn labels(&self) -> Vec<u32> {
        self.regions.iter().map(|r| r.label).collect()
    }

    /// Keep only the regions whose labels are listed; unknown labels are ignored
    pub fn select_labels(&self, labels: &[u32]) -> RegionSet<'a> {
        RegionSet {
            partition: self.partition,
            regions: self
                .regions
                .iter()
                .filter(|r| labels.contains(&r.label))
                .cloned()
                .collect(),
        }
    }

    /// Region with the most pixels. Ties go to the lowest label.
    pub fn largest(&self) -> Result<&Region<'a>> {
        let mut best: Option<&Region<'a>> = None;
        for region in &self.regions {
            // Strictly greater, so the first (lowest) label wins a tie
            if best.map_or(true, |b| region.size() > b.size()) {
                best = Some(region);
            }
        }
        best.ok_or(RegionFeatureError::NoRegions)
    }
}

impl<'a> IntoIterator for RegionSet<'a> {
    type Item = Region<'a>;
    type IntoIter = std::vec::IntoIter<Region<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.into_iter()
    }
}

impl<'s, 'a> IntoIterator for &'s RegionSet<'a> {
    type Item = &'s Region<'a>;
    type IntoIter = std::slice::Iter<'s, Region<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}

/// Enumerate every positive label of `partition` as a region.
///
/// One linear scan; labels that never occur produce no region.
pub fn enumerate(partition: &LabeledPartition) -> RegionSet<'_> {
    let image = partition.as_image();
    let ndim = image.ndim();

    struct Accumulator {
        indices: Vec<usize>,
        coord_sum: Vec<f64>,
    }

    let mut by_label: BTreeMap<u32, Accumulator> = BTreeMap::new();
    let mut coord = vec![0; ndim];

    for (index, &label) in partition.labels().iter().enumerate() {
        if label == BACKGROUND {
            continue;
        }
        image.coord_into(index, &mut coord);
        let acc = by_label.entry(label).or_insert_with(|| Accumulator {
            indices: Vec::new(),
            coord_sum: vec![0.0; ndim],
        });
        acc.indices.push(index);
        for (s, &c) in acc.coord_sum.iter_mut().zip(&coord) {
            *s += c as f64;
        }
    }

    let regions: Vec<Region<'_>> = by_label
        .into_iter()
        .map(|(label, acc)| {
            let n = acc.indices.len() as f64;
            Region {
                partition,
                label,
                centroid: acc.coord_sum.iter().map(|s| s / n).collect(),
                indices: acc.indices,
            }
        })
        .collect();

    tracing::debug!("Enumerated {} regions", regions.len());

    RegionSet { partition, regions }
}

/// Region with the maximum pixel count; ties go to the lowest label.
pub fn largest(partition: &LabeledPartition) -> Result<Region<'_>> {
    let regions = enumerate(partition);
    let label = regions.largest()?.label();
    regions
        .into_iter()
        .find(|r| r.label() == label)
        .ok_or(RegionFeatureError::NoRegions)
}

/// Finds the label of the one region whose centroid lies within a radius of
/// the partition's reference point.
pub trait CentralLabelLocator {
    /// Returns `None` when no region qualifies
    fn locate(&self, partition: &LabeledPartition, radius: f64) -> Option<u32>;
}

impl<F> CentralLabelLocator for F
where
    F: Fn(&LabeledPartition, f64) -> Option<u32>,
{
    fn locate(&self, partition: &LabeledPartition, radius: f64) -> Option<u32> {
        self(partition, radius)
    }
}

/// Locator that measures centroid distance to the partition's geometric center.
///
/// Among regions within `radius`, the nearest centroid wins; equal distances
/// go to the lowest label.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestCentroidLocator;

impl CentralLabelLocator for NearestCentroidLocator {
    fn locate(&self, partition: &LabeledPartition, radius: f64) -> Option<u32> {
        let center = partition.center();
        let radius_sq = radius * radius;
        let mut best: Option<(f64, u32)> = None;

        for region in &enumerate(partition) {
            let d = region.centroid_distance_sq(&center);
            if d > radius_sq {
                continue;
            }
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, region.label()));
            }
        }

        best.map(|(_, label)| label)
    }
}

/// Region reported by `locator` for the given radius (pixel units).
///
/// Fails with `NoCentralRegion` if the locator finds nothing or names a label
/// the partition does not contain.
pub fn central<'p, L>(partition: &'p LabeledPartition, radius: f64, locator: &L) -> Result<Region<'p>>
where
    L: CentralLabelLocator + ?Sized,
{
    if !radius.is_finite() || radius < 0.0 {
        return Err(RegionFeatureError::InvalidParameter(format!(
            "central radius must be a non-negative number, got {}",
            radius
        )));
    }

    let label = locator
        .locate(partition, radius)
        .ok_or(RegionFeatureError::NoCentralRegion { radius })?;

    enumerate(partition)
        .into_iter()
        .find(|r| r.label() == label)
        .ok_or(RegionFeatureError::NoCentralRegion { radius })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// 10x10 partition with three rectangles of different sizes
    fn three_regions() -> LabeledPartition {
        let mut labels = vec![0u32; 100];
        // label 3: 5 pixels in row 0
        for x in 0..5 {
            labels[x] = 3;
        }
        // label 9: 40 pixels, rows 2..6, columns 0..10
        for y in 2..6 {
            for x in 0..10 {
                labels[y * 10 + x] = 9;
            }
        }
        // label 4: 12 pixels, rows 7..10, columns 0..4
        for y in 7..10 {
            for x in 0..4 {
                labels[y * 10 + x] = 4;
            }
        }
        LabeledPartition::new(vec![10, 10], labels).unwrap()
    }

    #[test]
    fn enumerate_counts_and_centroids() {
        let partition = three_regions();
        let regions = enumerate(&partition);
        assert_eq!(regions.labels(), vec![3, 4, 9]);

        let r3 = regions.get(3).unwrap();
        assert_eq!(r3.size(), 5);
        assert_approx_eq!(r3.centroid()[0], 2.0);
        assert_approx_eq!(r3.centroid()[1], 0.0);

        let r9 = regions.get(9).unwrap();
        assert_eq!(r9.size(), 40);
        assert_approx_eq!(r9.centroid()[0], 4.5);
        assert_approx_eq!(r9.centroid()[1], 3.5);
        assert_eq!(r9.bounds(), vec![(0, 9), (2, 5)]);

        assert!(regions.get(1).is_none());
    }

    #[test]
    fn region_coordinates_cover_members() {
        let partition = three_regions();
        let regions = enumerate(&partition);
        let r3 = regions.get(3).unwrap();
        let coords: Vec<_> = r3.coordinates().collect();
        assert_eq!(coords.len(), 5);
        for c in coords {
            assert_eq!(partition.label_at(&c), Some(3));
        }
    }

    #[test]
    fn largest_picks_biggest_region() {
        let partition = three_regions();
        assert_eq!(largest(&partition).unwrap().label(), 9);
    }

    #[test]
    fn largest_breaks_ties_by_lowest_label() {
        let labels = vec![7, 7, 0, 2, 2, 0, 5, 5];
        let partition = LabeledPartition::new(vec![8, 1], labels).unwrap();
        for _ in 0..5 {
            assert_eq!(largest(&partition).unwrap().label(), 2);
        }
    }

    #[test]
    fn largest_without_labels_fails() {
        let partition = LabeledPartition::new(vec![3, 3], vec![0; 9]).unwrap();
        assert!(matches!(
            largest(&partition),
            Err(RegionFeatureError::NoRegions)
        ));
    }

    #[test]
    fn central_uses_injected_locator() {
        let partition = three_regions();
        let region = central(&partition, 1.0, &|_: &LabeledPartition, _: f64| Some(4u32)).unwrap();
        assert_eq!(region.label(), 4);
        assert_eq!(region.size(), 12);

        let missing = central(&partition, 1.0, &|_: &LabeledPartition, _: f64| None::<u32>);
        assert!(matches!(
            missing,
            Err(RegionFeatureError::NoCentralRegion { .. })
        ));

        // A label the partition never contained is treated as not found
        let stale = central(&partition, 1.0, &|_: &LabeledPartition, _: f64| Some(42u32));
        assert!(matches!(stale, Err(RegionFeatureError::NoCentralRegion { .. })));
    }

    #[test]
    fn nearest_centroid_locator_respects_radius() {
        // Center of a 10x10 partition is (4.5, 4.5); label 9 centroid is (4.5, 3.5)
        let partition = three_regions();
        let region = central(&partition, 1.5, &NearestCentroidLocator).unwrap();
        assert_eq!(region.label(), 9);

        assert!(matches!(
            central(&partition, 0.5, &NearestCentroidLocator),
            Err(RegionFeatureError::NoCentralRegion { .. })
        ));
    }

    #[test]
    fn select_labels_filters_set() {
        let partition = three_regions();
        let regions = enumerate(&partition);
        let selected = regions.select_labels(&[9, 3, 100]);
        assert_eq!(selected.labels(), vec![3, 9]);
    }
}
