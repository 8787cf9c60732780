//! Parallel fan-out of point extraction over the region.
//!
//! Points are selected from a reference snapshot and processed on a Rayon pool. Outcomes flow
//! through a bounded channel to a collector on the calling thread, which tallies and logs them.
//! A failing or panicking point never stops its siblings.

use crate::config::RunConfig;
use crate::data_container::{ExtractionSummary, GridPoint, PointOutcome, Snapshot};
use crate::error::{CtwError, Result};
use crate::extractor::{PointExtractor, SeriesPolicy};
use crate::filters::filter::Filter;
use crate::io::{discover_snapshots, ensure_dir, reader_for, NpzSeriesStore, SnapshotFile};
use crate::math_tools::is_defined;
use crate::region::Region;
use crate::snapshot_cache::{DirectSource, SnapshotCache, SnapshotSource};
use cancellable_loops::{par_for_each_cancellable, CancellationToken};
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Grid points inside the region that hold a defined value in the reference snapshot.
///
/// Points are unique by [`CoordKey`](crate::math_tools::CoordKey); a later point rounding onto a taken key is reported and
/// dropped. Returns the points and the number of dropped collisions.
pub fn select_points(reference: &Snapshot, region: &Region) -> (Vec<GridPoint>, usize) {
    let mut seen = HashSet::new();
    let mut points = Vec::new();
    let mut collisions = 0;
    let candidates =
        region.candidate_indices(reference.latitudes.view(), reference.longitudes.view());
    for (row, col) in candidates {
        if !is_defined(reference.values[(row, col)]) {
            continue;
        }
        let point = GridPoint::new(reference.latitudes[row], reference.longitudes[col]);
        if seen.insert(point.key()) {
            points.push(point);
        } else {
            log::warn!(
                "grid point ({}, {}) rounds onto the taken key {}; skipped",
                point.latitude,
                point.longitude,
                point.key()
            );
            collisions += 1;
        }
    }
    (points, collisions)
}

/// Runs one point task, turning panics and expired budgets into errors.
fn run_task(
    extractor: &PointExtractor,
    store: &NpzSeriesStore,
    point: GridPoint,
    run_token: &CancellationToken,
    timeout: Option<Duration>,
) -> PointOutcome {
    let task_token = run_token.with_timeout(timeout);
    let result = catch_unwind(AssertUnwindSafe(|| {
        extractor.process(point, store, &task_token)
    }))
    .unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(CtwError::TaskPanicked(message))
    });

    let result = match (result, timeout) {
        (Err(CtwError::Cancelled), Some(budget))
            if !run_token.is_cancelled() && task_token.is_expired() =>
        {
            Err(CtwError::TimedOut(budget))
        }
        (result, _) => result,
    };
    PointOutcome { point, result }
}

/// Processes every point on `pool` and collects the outcomes.
///
/// At most `queue_capacity` finished outcomes wait for the collector; workers block beyond that.
/// Points skipped after cancellation count as undefined.
pub fn dispatch(
    pool: &ThreadPool,
    extractor: &PointExtractor,
    store: &NpzSeriesStore,
    points: &[GridPoint],
    queue_capacity: usize,
    timeout: Option<Duration>,
    token: &CancellationToken,
) -> ExtractionSummary {
    let (sender, receiver) = crossbeam_channel::bounded::<PointOutcome>(queue_capacity.max(1));
    let total = points.len();
    let step = (total / 10).max(1);
    let mut summary = ExtractionSummary::default();

    std::thread::scope(|scope| {
        scope.spawn(move || {
            pool.install(|| {
                par_for_each_cancellable(points.par_iter(), token, |point| {
                    let outcome = run_task(extractor, store, *point, token, timeout);
                    // The collector outlives every sender.
                    let _ = sender.send(outcome);
                });
            });
        });

        let mut received = 0;
        for outcome in receiver.iter() {
            received += 1;
            match outcome.result {
                Ok(series) if series.is_filtered() => summary.filtered += 1,
                Ok(_) => {
                    log::debug!("{}: too sparse, stored unfiltered", outcome.point);
                    summary.too_sparse += 1;
                }
                Err(CtwError::InsufficientData(reason)) => {
                    log::debug!("{}: {reason}", outcome.point);
                    summary.undefined += 1;
                }
                Err(err) => {
                    log::warn!("{}: {err}", outcome.point);
                    summary.undefined += 1;
                }
            }
            if received % step == 0 {
                log::info!("processed {received}/{total} points");
            }
        }
        if received < total {
            log::warn!("{} points were not processed", total - received);
            summary.undefined += total - received;
        }
    });
    summary
}

/// Reads the snapshot used to select grid points and to shape reconstructed grids.
pub(crate) fn read_reference(config: &RunConfig, files: &[SnapshotFile]) -> Result<Snapshot> {
    let file = match config.reference_date {
        Some(date) => files.iter().find(|f| f.date == date).ok_or_else(|| {
            CtwError::InvalidConfig(format!("no snapshot for reference date {date}"))
        })?,
        None => files
            .first()
            .ok_or_else(|| CtwError::NoInputFiles(config.input_dir.clone()))?,
    };
    log::info!("reference snapshot {}", file.path.display());
    reader_for(config.case, config.format)?.read(&file.path, file.date)
}

pub(crate) fn build_pool(config: &RunConfig) -> Result<ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count())
        .thread_name(|i| format!("ctw-worker-{i}"))
        .build()?)
}

/// Extraction stage: select the region's points and persist one series per point.
pub fn run_extraction(
    config: &RunConfig,
    filter: &dyn Filter,
    token: &CancellationToken,
) -> Result<ExtractionSummary> {
    let files = discover_snapshots(
        &config.input_dir,
        config.case,
        config.format,
        config.start_date,
        config.end_date,
    )?;
    log::info!(
        "{} snapshots between {} and {}",
        files.len(),
        config.start_date,
        config.end_date
    );
    let reference = read_reference(config, &files)?;
    let (points, collisions) = select_points(&reference, &config.region);
    log::info!("{} grid points selected in region", points.len());

    let pool = build_pool(config)?;
    let source: Box<dyn SnapshotSource> = if config.preload {
        let reader = reader_for(config.case, config.format)?;
        let cache = pool.install(|| {
            SnapshotCache::load(
                &files,
                reader.as_ref(),
                &config.region,
                config.search_radius,
                token,
            )
        })?;
        Box::new(cache)
    } else {
        Box::new(DirectSource::new(files, reader_for(config.case, config.format)?))
    };

    let store = NpzSeriesStore::new(&config.series_dir);
    ensure_dir(store.dir())?;
    log::info!("filter: {}", filter.config().description);

    let policy = SeriesPolicy {
        search_radius: config.search_radius,
        max_undefined_fraction: config.max_undefined_fraction,
    };
    let extractor = PointExtractor::new(source.as_ref(), filter, policy);
    let mut summary = dispatch(
        &pool,
        &extractor,
        &store,
        &points,
        config.queue_capacity,
        config.task_timeout(),
        token,
    );
    summary.collisions = collisions;
    log::info!("extraction finished: {summary}");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::filters::band_pass::ButterworthBandPass;
    use crate::filters::filter::FilterConfig;
    use chrono::NaiveDate;
    use ndarray::{array, Array1, Array2, ArrayView1};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 9, d).unwrap()
    }

    fn grid_with(values: Array2<f64>, date: NaiveDate) -> Snapshot {
        Snapshot::new(
            date,
            array![-39.0, -38.0, -30.0, -25.0],
            array![148.5, 149.0, 150.0, 158.0],
            values,
        )
        .unwrap()
    }

    #[test]
    fn selection_needs_region_and_defined_reference() {
        let mut values = Array2::from_elem((4, 4), 1.0);
        values[(2, 2)] = f64::NAN;
        let (points, collisions) = select_points(&grid_with(values, day(1)), &Region::default());
        // Rows -38, -30, -25 and columns 149, 150, 158 are inside; one of those cells is NaN.
        assert_eq!(points.len(), 8);
        assert_eq!(collisions, 0);
        assert!(!points.contains(&GridPoint::new(-30.0, 150.0)));
    }

    #[test]
    fn rounding_collisions_are_dropped() {
        let reference = Snapshot::new(
            day(1),
            array![-30.001, -30.004],
            array![150.0],
            Array2::from_elem((2, 1), 0.5),
        )
        .unwrap();
        let (points, collisions) = select_points(&reference, &Region::default());
        assert_eq!(points, vec![GridPoint::new(-30.001, 150.0)]);
        assert_eq!(collisions, 1);
    }

    /// Panics for one latitude, filters normally elsewhere.
    #[derive(Debug)]
    struct FragileFilter(ButterworthBandPass);

    impl Filter for FragileFilter {
        fn config(&self) -> FilterConfig {
            self.0.config()
        }

        fn filter(&self, sequence: ArrayView1<f64>) -> Result<Array1<f64>> {
            if sequence[0] == 13.0 {
                panic!("bad sample");
            }
            self.0.filter(sequence)
        }
    }

    #[test]
    fn one_failing_point_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = (1..=20)
            .map(|d| {
                let mut values = Array2::from_elem((4, 4), 0.01 * d as f64);
                values[(2, 1)] = 13.0;
                grid_with(values, day(d))
            })
            .collect();
        let source = SnapshotCache::from_snapshots(snapshots);
        let filter = FragileFilter(ButterworthBandPass::design(0.035, 0.15, 1.0, 5).unwrap());
        let policy = SeriesPolicy {
            search_radius: 1,
            max_undefined_fraction: 0.9,
        };
        let extractor = PointExtractor::new(&source, &filter, policy);
        let store = NpzSeriesStore::new(dir.path());
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let points = vec![
            GridPoint::new(-30.0, 149.0),
            GridPoint::new(-30.0, 150.0),
            GridPoint::new(-25.0, 158.0),
        ];

        let summary = dispatch(
            &pool,
            &extractor,
            &store,
            &points,
            1,
            None,
            &CancellationToken::new(),
        );
        assert_eq!(summary.filtered, 2);
        assert_eq!(summary.undefined, 1);
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn cancelled_run_counts_points_as_undefined() {
        let dir = tempfile::tempdir().unwrap();
        let source = SnapshotCache::from_snapshots(vec![grid_with(
            Array2::from_elem((4, 4), 0.1),
            day(1),
        )]);
        let filter = ButterworthBandPass::design(0.035, 0.15, 1.0, 5).unwrap();
        let extractor = PointExtractor::new(&source, &filter, SeriesPolicy::default());
        let store = NpzSeriesStore::new(dir.path());
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let points = vec![GridPoint::new(-30.0, 150.0), GridPoint::new(-25.0, 158.0)];
        let summary = dispatch(&pool, &extractor, &store, &points, 4, None, &token);
        assert_eq!(summary.undefined, 2);
        assert_eq!(summary.filtered + summary.too_sparse, 0);
    }

    #[test]
    fn expired_budget_reports_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let source = SnapshotCache::from_snapshots(vec![grid_with(
            Array2::from_elem((4, 4), 0.1),
            day(1),
        )]);
        let filter = ButterworthBandPass::design(0.035, 0.15, 1.0, 5).unwrap();
        let extractor = PointExtractor::new(&source, &filter, SeriesPolicy::default());
        let store = NpzSeriesStore::new(dir.path());

        let outcome = run_task(
            &extractor,
            &store,
            GridPoint::new(-30.0, 150.0),
            &CancellationToken::new(),
            Some(Duration::ZERO),
        );
        assert!(matches!(outcome.result, Err(CtwError::TimedOut(_))));
    }
}
