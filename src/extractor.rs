//! Point time-series extraction.
//!
//! For one grid point, every dated snapshot is sampled at the nearest cell (ring search fallback
//! when undefined). The resulting series is then gap filled along time and band-pass filtered, or
//! left unfiltered when too sparse.

use crate::data_container::{GridPoint, PointSeries};
use crate::error::{CtwError, Result};
use crate::filters::filter::Filter;
use crate::io::NpzSeriesStore;
use crate::math_tools::{count_undefined, interpolate_linear, DEFAULT_SEARCH_RADIUS};
use crate::snapshot_cache::SnapshotSource;
use cancellable_loops::{for_each_cancellable, CancellationToken};
use ndarray::Array1;

/// Gap filling parameters of a series.
///
/// # Fields
/// - `search_radius`: Rings examined around an undefined nearest cell.
/// - `max_undefined_fraction`: Above this undefined share, the filtered output is all undefined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPolicy {
    pub search_radius: usize,
    pub max_undefined_fraction: f64,
}

impl Default for SeriesPolicy {
    fn default() -> Self {
        SeriesPolicy {
            search_radius: DEFAULT_SEARCH_RADIUS,
            max_undefined_fraction: 0.9,
        }
    }
}

impl SeriesPolicy {
    /// Gap fills and filters one series, returning `(unfiltered, filtered)`.
    ///
    /// A series without any defined sample is [`CtwError::InsufficientData`]. A series whose
    /// undefined share exceeds `max_undefined_fraction` is returned as is with an all-NaN filtered
    /// output of the same length. Otherwise undefined samples are interpolated by index, and the
    /// interpolated sequence is both the unfiltered output and the filter input.
    pub fn condition(
        &self,
        raw: Array1<f64>,
        filter: &dyn Filter,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let len = raw.len();
        let undefined = count_undefined(raw.view());
        if undefined == len {
            return Err(CtwError::InsufficientData(format!(
                "no defined sample in {len} dates"
            )));
        }
        if undefined as f64 > self.max_undefined_fraction * len as f64 {
            return Ok((raw, Array1::from_elem(len, f64::NAN)));
        }
        let filled = interpolate_linear(raw.view())?;
        let filtered = filter.filter(filled.view())?;
        Ok((filled, filtered))
    }
}

/// Extracts and filters the series of single grid points.
///
/// Holds read-only references only, so one extractor is shared by every worker.
pub struct PointExtractor<'a> {
    source: &'a dyn SnapshotSource,
    filter: &'a dyn Filter,
    policy: SeriesPolicy,
}

impl<'a> PointExtractor<'a> {
    pub fn new(source: &'a dyn SnapshotSource, filter: &'a dyn Filter, policy: SeriesPolicy) -> Self {
        PointExtractor {
            source,
            filter,
            policy,
        }
    }

    /// Builds the raw and filtered series of `point`.
    ///
    /// Each readable date contributes one value, NaN when neither the nearest cell nor any ring
    /// holds a defined value. Dates whose snapshot cannot be read contribute nothing. The token
    /// is checked between dates; a stopped token ends the task with [`CtwError::Cancelled`].
    pub fn extract(&self, point: GridPoint, token: &CancellationToken) -> Result<PointSeries> {
        let dates = self.source.dates();
        let mut kept = Vec::with_capacity(dates.len());
        let mut values = Vec::with_capacity(dates.len());

        let completed = for_each_cancellable(dates.iter().enumerate(), token, |(index, date)| {
            match self.source.snapshot(index) {
                Ok(snapshot) => {
                    values.push(snapshot.sample(point, self.policy.search_radius));
                    kept.push(*date);
                }
                Err(err) => log::warn!("{point}: skipping {date}: {err}"),
            }
        });
        if !completed {
            return Err(CtwError::Cancelled);
        }
        if values.is_empty() {
            return Err(CtwError::InsufficientData(format!(
                "no readable snapshot for {point}"
            )));
        }

        let (unfiltered, filtered) = self
            .policy
            .condition(Array1::from_vec(values), self.filter)?;
        Ok(PointSeries {
            point,
            dates: kept,
            unfiltered,
            filtered,
        })
    }

    /// Extracts the series of `point` and persists it.
    pub fn process(
        &self,
        point: GridPoint,
        store: &NpzSeriesStore,
        token: &CancellationToken,
    ) -> Result<PointSeries> {
        let series = self.extract(point, token)?;
        let path = store.save(&series)?;
        log::debug!("{point}: saved {}", path.display());
        Ok(series)
    }
}
