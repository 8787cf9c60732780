//! This module defines the data structures passed between the pipeline stages: dated grid
//! snapshots, grid points, per-point time series, reconstructed daily grids and the summary
//! counters every stage reports at the end.

use crate::error::{CtwError, Result};
use crate::math_tools::{find_nearest_defined, is_defined, nearest_index, CoordKey};
use chrono::NaiveDate;
use ndarray::{s, Array1, Array2};
use std::fmt::{Display, Formatter};
use std::ops::Range;

/// A location in degrees, as read from a product's axes.
///
/// # Fields
/// - `latitude`: Latitude in degrees north.
/// - `longitude`: Longitude in degrees east.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GridPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GridPoint {
            latitude,
            longitude,
        }
    }

    pub fn key(&self) -> CoordKey {
        CoordKey::from_degrees(self.latitude, self.longitude)
    }
}

impl Display for GridPoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One date's grid of sea-level anomaly values.
///
/// # Fields
/// - `date`: Calendar day of the snapshot.
/// - `latitudes`: Latitude axis (rows of `values`).
/// - `longitudes`: Longitude axis (columns of `values`).
/// - `values`: SLA values shaped `[lat, lon]`; NaN or fill values mark undefined cells.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub latitudes: Array1<f64>,
    pub longitudes: Array1<f64>,
    pub values: Array2<f64>,
}

impl Snapshot {
    /// Builds a snapshot, checking that the value grid matches its axes.
    pub fn new(
        date: NaiveDate,
        latitudes: Array1<f64>,
        longitudes: Array1<f64>,
        values: Array2<f64>,
    ) -> Result<Self> {
        let expected = (latitudes.len(), longitudes.len());
        if values.dim() != expected {
            return Err(CtwError::ShapeMismatch(format!(
                "snapshot {date}: values are {:?} but axes give {:?}",
                values.dim(),
                expected
            )));
        }
        Ok(Snapshot {
            date,
            latitudes,
            longitudes,
            values,
        })
    }

    /// Nearest `(row, col)` to the point, with each axis searched independently.
    pub fn nearest_cell(&self, point: GridPoint) -> Option<(usize, usize)> {
        let row = nearest_index(self.latitudes.view(), point.latitude)?;
        let col = nearest_index(self.longitudes.view(), point.longitude)?;
        Some((row, col))
    }

    /// Value of the nearest cell, falling back to the expanding-ring search when it is undefined.
    ///
    /// Returns NaN when neither the cell nor any ring up to `search_radius` holds a defined value.
    pub fn sample(&self, point: GridPoint, search_radius: usize) -> f64 {
        let Some((row, col)) = self.nearest_cell(point) else {
            return f64::NAN;
        };
        let value = self.values[(row, col)];
        if is_defined(value) {
            return value;
        }
        find_nearest_defined(self.values.view(), row, col, search_radius).unwrap_or(f64::NAN)
    }

    /// Sub-grid covering the given row and column ranges.
    pub fn crop(&self, rows: Range<usize>, cols: Range<usize>) -> Snapshot {
        Snapshot {
            date: self.date,
            latitudes: self.latitudes.slice(s![rows.clone()]).to_owned(),
            longitudes: self.longitudes.slice(s![cols.clone()]).to_owned(),
            values: self.values.slice(s![rows, cols]).to_owned(),
        }
    }
}

/// The extracted series of one grid point.
///
/// # Fields
/// - `point`: Location the series was extracted for.
/// - `dates`: Ascending dates, one per readable snapshot.
/// - `unfiltered`: Values after spatial and temporal gap filling, before filtering. Series too
///   sparse to filter keep their undefined samples as NaN.
/// - `filtered`: Band-passed values, or all NaN when the series was too sparse to filter.
#[derive(Debug, Clone)]
pub struct PointSeries {
    pub point: GridPoint,
    pub dates: Vec<NaiveDate>,
    pub unfiltered: Array1<f64>,
    pub filtered: Array1<f64>,
}

impl PointSeries {
    pub fn key(&self) -> CoordKey {
        self.point.key()
    }

    /// Filtered value for `date`, if the series has an entry for it.
    pub fn value_on(&self, date: NaiveDate) -> Option<f64> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|idx| self.filtered[idx])
    }

    /// `true` if the filtered output holds at least one defined value.
    pub fn is_filtered(&self) -> bool {
        self.filtered.iter().any(|v| is_defined(*v))
    }
}

/// A reconstructed grid for one calendar day.
#[derive(Debug, Clone)]
pub struct FilteredGrid {
    pub date: NaiveDate,
    pub latitudes: Array1<f64>,
    pub longitudes: Array1<f64>,
    pub sla: Array2<f64>,
}

impl FilteredGrid {
    /// A grid with every cell undefined.
    pub fn undefined(date: NaiveDate, latitudes: Array1<f64>, longitudes: Array1<f64>) -> Self {
        let sla = Array2::from_elem((latitudes.len(), longitudes.len()), f64::NAN);
        FilteredGrid {
            date,
            latitudes,
            longitudes,
            sla,
        }
    }

    pub fn populated_cells(&self) -> usize {
        self.sla.iter().filter(|v| is_defined(**v)).count()
    }
}

/// Result of one point's extraction task.
#[derive(Debug)]
pub struct PointOutcome {
    pub point: GridPoint,
    pub result: Result<PointSeries>,
}

/// Counters reported at the end of the extraction stage.
///
/// # Fields
/// - `filtered`: Points persisted with a band-passed series.
/// - `too_sparse`: Points persisted with raw values only (undefined fraction above threshold).
/// - `undefined`: Points whose task failed, timed out or had no usable sample.
/// - `collisions`: Grid points dropped because their rounded key was already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub filtered: usize,
    pub too_sparse: usize,
    pub undefined: usize,
    pub collisions: usize,
}

impl ExtractionSummary {
    pub fn total(&self) -> usize {
        self.filtered + self.too_sparse + self.undefined
    }
}

impl Display for ExtractionSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} points: {} filtered, {} too sparse, {} undefined ({} key collisions skipped)",
            self.total(),
            self.filtered,
            self.too_sparse,
            self.undefined,
            self.collisions
        )
    }
}

/// Counters reported at the end of the reconstruction stage.
///
/// # Fields
/// - `days_written`: Grids persisted.
/// - `days_failed`: Days whose grid could not be written.
/// - `populated_cells`: Defined cells summed over all written grids.
/// - `unmatched_cells`: Cells with no series within tolerance, summed over all days.
/// - `unmatched_series`: Loaded series that matched no grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconstructionSummary {
    pub days_written: usize,
    pub days_failed: usize,
    pub populated_cells: usize,
    pub unmatched_cells: usize,
    pub unmatched_series: usize,
}

impl ReconstructionSummary {
    /// Adds per-day counters. `unmatched_series` is a run-level value, so the larger one is kept.
    pub fn merge(self, other: ReconstructionSummary) -> Self {
        ReconstructionSummary {
            days_written: self.days_written + other.days_written,
            days_failed: self.days_failed + other.days_failed,
            populated_cells: self.populated_cells + other.populated_cells,
            unmatched_cells: self.unmatched_cells + other.unmatched_cells,
            unmatched_series: self.unmatched_series.max(other.unmatched_series),
        }
    }
}

impl Display for ReconstructionSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} days written, {} failed; {} populated cells, {} unmatched cells, {} unmatched series",
            self.days_written,
            self.days_failed,
            self.populated_cells,
            self.unmatched_cells,
            self.unmatched_series
        )
    }
}
