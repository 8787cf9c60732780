//! Daily grid reconstruction from per-point filtered series.
//!
//! Series are indexed by [`CoordKey`]. Each cell of the region's valid axes is matched once to
//! the closest series within [`COORD_TOLERANCE`]; building a day's grid is then a lookup of that
//! day's value for every matched cell. Days are independent and are built in parallel.

use crate::config::RunConfig;
use crate::data_container::{FilteredGrid, PointSeries, ReconstructionSummary};
use crate::dispatcher::{build_pool, read_reference};
use crate::error::{CtwError, Result};
use crate::io::{discover_snapshots, NpzGridStore, NpzSeriesStore};
use crate::math_tools::{CoordKey, COORD_TOLERANCE};
use cancellable_loops::{par_for_each_cancellable_reduce, CancellationToken};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Per-point series addressable by rounded coordinates.
#[derive(Debug, Default)]
pub struct SeriesIndex {
    series: Vec<PointSeries>,
    by_key: HashMap<CoordKey, usize>,
}

impl SeriesIndex {
    /// Indexes the series; a series whose key is already taken is reported and ignored.
    pub fn new(series: Vec<PointSeries>) -> Self {
        let mut by_key = HashMap::with_capacity(series.len());
        for (idx, s) in series.iter().enumerate() {
            if by_key.contains_key(&s.key()) {
                log::warn!("duplicate series for {}; keeping the first", s.key());
            } else {
                by_key.insert(s.key(), idx);
            }
        }
        SeriesIndex { series, by_key }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Index of the closest series within [`COORD_TOLERANCE`] of the location in both axes.
    pub fn lookup(&self, latitude: f64, longitude: f64) -> Option<usize> {
        CoordKey::candidates(latitude, longitude)
            .into_iter()
            .filter(|key| key.matches(latitude, longitude))
            .filter_map(|key| self.by_key.get(&key).map(|idx| (key, *idx)))
            .min_by(|(a, _), (b, _)| {
                a.distance(latitude, longitude)
                    .total_cmp(&b.distance(latitude, longitude))
            })
            .map(|(_, idx)| idx)
    }

    pub fn get(&self, idx: usize) -> &PointSeries {
        &self.series[idx]
    }
}

/// Rebuilds one grid per day over fixed latitude and longitude axes.
#[derive(Debug)]
pub struct GridReconstructor {
    latitudes: Array1<f64>,
    longitudes: Array1<f64>,
    index: SeriesIndex,
    cell_series: Array2<Option<usize>>,
    unmatched_series: usize,
}

impl GridReconstructor {
    pub fn new(latitudes: Array1<f64>, longitudes: Array1<f64>, series: Vec<PointSeries>) -> Self {
        let index = SeriesIndex::new(series);
        let cell_series = Array2::from_shape_fn((latitudes.len(), longitudes.len()), |(i, j)| {
            index.lookup(latitudes[i], longitudes[j])
        });

        let mut matched = vec![false; index.series.len()];
        for idx in cell_series.iter().flatten() {
            matched[*idx] = true;
        }
        let unmatched_series = index
            .by_key
            .values()
            .filter(|idx| !matched[**idx])
            .count();
        if unmatched_series > 0 {
            log::info!("{unmatched_series} series match no grid cell");
        }

        GridReconstructor {
            latitudes,
            longitudes,
            index,
            cell_series,
            unmatched_series,
        }
    }

    /// Series loaded for reconstruction that no grid cell matches.
    pub fn unmatched_series(&self) -> usize {
        self.unmatched_series
    }

    /// Cells without any series within tolerance.
    pub fn unmatched_cells(&self) -> usize {
        self.cell_series.iter().filter(|c| c.is_none()).count()
    }

    /// The grid of `date`. Cells without a matching series or without a value that day stay NaN.
    pub fn grid_for(&self, date: NaiveDate) -> FilteredGrid {
        let mut grid =
            FilteredGrid::undefined(date, self.latitudes.clone(), self.longitudes.clone());
        for ((i, j), matched) in self.cell_series.indexed_iter() {
            let Some(idx) = matched else { continue };
            if let Some(value) = self.index.get(*idx).value_on(date) {
                grid.sla[(i, j)] = value;
            }
        }
        grid
    }

    /// Builds and persists the grid of every date, in parallel on the current Rayon pool.
    pub fn reconstruct(
        &self,
        dates: &[NaiveDate],
        store: &NpzGridStore,
        token: &CancellationToken,
    ) -> ReconstructionSummary {
        let unmatched_cells = self.unmatched_cells();
        let summary = par_for_each_cancellable_reduce(
            dates,
            token,
            |date| {
                let grid = self.grid_for(*date);
                let day = match store.save(&grid) {
                    Ok(path) => {
                        log::debug!("saved {}", path.display());
                        ReconstructionSummary {
                            days_written: 1,
                            populated_cells: grid.populated_cells(),
                            unmatched_cells,
                            ..Default::default()
                        }
                    }
                    Err(err) => {
                        log::warn!("grid for {date} not written: {err}");
                        ReconstructionSummary {
                            days_failed: 1,
                            ..Default::default()
                        }
                    }
                };
                Some(day)
            },
            ReconstructionSummary::merge,
            ReconstructionSummary::default(),
        );
        ReconstructionSummary {
            unmatched_series: self.unmatched_series,
            ..summary
        }
    }
}

/// Every calendar day of `start..=end`.
pub fn calendar_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// Reconstruction stage: rebuild and persist one grid per calendar day of the run.
pub fn run_reconstruction(
    config: &RunConfig,
    token: &CancellationToken,
) -> Result<ReconstructionSummary> {
    let files = discover_snapshots(
        &config.input_dir,
        config.case,
        config.format,
        config.start_date,
        config.end_date,
    )?;
    let reference = read_reference(config, &files)?;
    let (latitudes, longitudes) = config
        .region
        .valid_axes(reference.latitudes.view(), reference.longitudes.view());
    log::info!(
        "reconstructing {} x {} grids",
        latitudes.len(),
        longitudes.len()
    );

    let series = NpzSeriesStore::new(&config.series_dir).load_all()?;
    log::info!("{} series loaded from {}", series.len(), config.series_dir.display());
    let reconstructor = GridReconstructor::new(latitudes, longitudes, series);

    let dates = calendar_days(config.start_date, config.end_date);
    let store = NpzGridStore::new(&config.grid_dir);
    let pool = build_pool(config)?;
    let summary = pool.install(|| reconstructor.reconstruct(&dates, &store, token));
    if token.is_cancelled() {
        return Err(CtwError::Cancelled);
    }
    log::info!("reconstruction finished: {summary}");
    Ok(summary)
}
