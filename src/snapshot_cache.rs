//! Sources of dated snapshots for the point extractor.
//!
//! [`DirectSource`] opens the snapshot file on every request, once per point and date.
//! [`SnapshotCache`] reads each date once, crops it around the region and serves every point from
//! memory.

use crate::data_container::Snapshot;
use crate::error::{CtwError, Result};
use crate::io::{SnapshotFile, SnapshotReader};
use crate::region::Region;
use cancellable_loops::{par_for_each_cancellable_reduce, CancellationToken};
use chrono::NaiveDate;
use ndarray::ArrayView1;
use std::borrow::Cow;
use std::ops::Range;

/// Serves the snapshot of each date, in ascending date order.
pub trait SnapshotSource: Send + Sync {
    /// Dates available from this source, ascending.
    fn dates(&self) -> &[NaiveDate];

    /// Snapshot for `dates()[index]`.
    fn snapshot(&self, index: usize) -> Result<Cow<'_, Snapshot>>;
}

/// Reads the file from disk on every request.
pub struct DirectSource {
    files: Vec<SnapshotFile>,
    dates: Vec<NaiveDate>,
    reader: Box<dyn SnapshotReader>,
}

impl DirectSource {
    pub fn new(files: Vec<SnapshotFile>, reader: Box<dyn SnapshotReader>) -> Self {
        let dates = files.iter().map(|f| f.date).collect();
        DirectSource {
            files,
            dates,
            reader,
        }
    }
}

impl SnapshotSource for DirectSource {
    fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    fn snapshot(&self, index: usize) -> Result<Cow<'_, Snapshot>> {
        let file = &self.files[index];
        self.reader.read(&file.path, file.date).map(Cow::Owned)
    }
}

/// All snapshots of a run held in memory, cropped to the region.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    dates: Vec<NaiveDate>,
    snapshots: Vec<Snapshot>,
}

impl SnapshotCache {
    /// Reads every file once in parallel on the current Rayon pool.
    ///
    /// Unreadable files are logged and left out, so their dates contribute no entry to any
    /// series. Each snapshot is cropped to the region's bounding box widened by
    /// `search_radius + 1` cells, which keeps the nearest cell and every ring the search can
    /// reach for points inside the region.
    pub fn load(
        files: &[SnapshotFile],
        reader: &dyn SnapshotReader,
        region: &Region,
        search_radius: usize,
        token: &CancellationToken,
    ) -> Result<Self> {
        let snapshots = par_for_each_cancellable_reduce(
            files,
            token,
            |file| match reader.read(&file.path, file.date) {
                Ok(snapshot) => Some(vec![crop_to_region(&snapshot, region, search_radius)]),
                Err(err) => {
                    log::warn!("skipping snapshot {}: {err}", file.path.display());
                    None
                }
            },
            |mut a, mut b| {
                a.append(&mut b);
                a
            },
            Vec::new(),
        );
        if token.is_cancelled() {
            return Err(CtwError::Cancelled);
        }
        let cells: usize = snapshots.iter().map(|s| s.values.len()).sum();
        let cache = Self::from_snapshots(snapshots);
        if cache.is_empty() {
            log::warn!("none of the {} snapshots could be read", files.len());
        } else {
            log::info!(
                "cached {} of {} snapshots ({cells} cells)",
                cache.len(),
                files.len()
            );
        }
        Ok(cache)
    }

    /// Cache over already loaded snapshots, sorted by date.
    pub fn from_snapshots(mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort_by_key(|s| s.date);
        let dates = snapshots.iter().map(|s| s.date).collect();
        SnapshotCache { dates, snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl SnapshotSource for SnapshotCache {
    fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    fn snapshot(&self, index: usize) -> Result<Cow<'_, Snapshot>> {
        Ok(Cow::Borrowed(&self.snapshots[index]))
    }
}

/// Index range of the axis values within `[min, max]`, widened by `margin` on both sides.
///
/// Returns the full range when no value falls inside.
fn inside_range(axis: ArrayView1<f64>, min: f64, max: f64, margin: usize) -> Range<usize> {
    let mut inside = axis
        .iter()
        .enumerate()
        .filter(|(_, v)| **v >= min && **v <= max)
        .map(|(i, _)| i);
    let Some(first) = inside.next() else {
        return 0..axis.len();
    };
    let last = inside.last().unwrap_or(first);
    first.saturating_sub(margin)..(last + margin + 1).min(axis.len())
}

fn crop_to_region(snapshot: &Snapshot, region: &Region, search_radius: usize) -> Snapshot {
    let bounds = region.bounds();
    let margin = search_radius + 1;
    let rows = inside_range(
        snapshot.latitudes.view(),
        bounds.min_lat,
        bounds.max_lat,
        margin,
    );
    let cols = inside_range(
        snapshot.longitudes.view(),
        bounds.min_lon,
        bounds.max_lon,
        margin,
    );
    snapshot.crop(rows, cols)
}
