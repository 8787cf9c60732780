use approx::assert_abs_diff_eq;
use cancellable_loops::CancellationToken;
use chrono::{Days, NaiveDate};
use ctw_sla_filter::data_container::{GridPoint, PointSeries, Snapshot};
use ctw_sla_filter::io::npz::write_snapshot;
use ctw_sla_filter::io::{series_file_name, NpzGridStore, NpzSeriesStore};
use ctw_sla_filter::math_tools::CoordKey;
use ctw_sla_filter::{run_extraction, run_reconstruction, CtwError, ProductCase, RunConfig};
use ndarray::{Array1, Array2};
use std::f64::consts::PI;
use std::path::Path;
use tempfile::TempDir;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 8, 29).unwrap()
}

fn date(offset: u64) -> NaiveDate {
    start().checked_add_days(Days::new(offset)).unwrap()
}

fn axes() -> (Array1<f64>, Array1<f64>) {
    (
        Array1::from_shape_fn(5, |i| -30.5 + 0.25 * i as f64),
        Array1::from_shape_fn(5, |j| 149.5 + 0.25 * j as f64),
    )
}

fn write_day(
    dir: &Path,
    offset: u64,
    latitudes: Array1<f64>,
    longitudes: Array1<f64>,
    values: Array2<f64>,
) {
    let day = date(offset);
    let snapshot = Snapshot::new(day, latitudes, longitudes, values).unwrap();
    let name = format!("SWOT_L4_{}_20240101.npz", day.format("%Y%m%d"));
    write_snapshot(&dir.join(name), ProductCase::Swot, &snapshot).unwrap();
}

fn config(root: &TempDir, days: u64) -> RunConfig {
    RunConfig {
        input_dir: root.path().join("data"),
        series_dir: root.path().join("series"),
        grid_dir: root.path().join("grids"),
        start_date: start(),
        end_date: date(days - 1),
        workers: 2,
        ..RunConfig::default()
    }
}

#[test]
fn gaps_are_bridged_and_grids_rebuilt() {
    let root = tempfile::tempdir().unwrap();
    let config = config(&root, 90);
    std::fs::create_dir_all(&config.input_dir).unwrap();
    let (lats, lons) = axes();
    let blank_days = [10, 40, 70];
    for offset in 0..90 {
        let values = if blank_days.contains(&offset) {
            Array2::from_elem((5, 5), f64::NAN)
        } else {
            let wave = (2.0 * PI * offset as f64 / 10.0).sin();
            Array2::from_shape_fn((5, 5), |(i, j)| 0.1 * wave + 0.01 * (i + j) as f64)
        };
        write_day(&config.input_dir, offset, lats.clone(), lons.clone(), values);
    }

    let filter = config.validate().unwrap();
    let token = CancellationToken::new();
    let summary = run_extraction(&config, &filter, &token).unwrap();
    assert_eq!(summary.filtered, 25);
    assert_eq!(summary.undefined, 0);

    let key = CoordKey::from_degrees(-30.0, 150.0);
    let series = NpzSeriesStore::load(&config.series_dir.join(series_file_name(key))).unwrap();
    assert_eq!(series.dates.len(), 90);
    assert!(series.unfiltered.iter().all(|v| v.is_finite()));
    for day in blank_days {
        let day = day as usize;
        let midpoint = 0.5 * (series.unfiltered[day - 1] + series.unfiltered[day + 1]);
        assert_abs_diff_eq!(series.unfiltered[day], midpoint, epsilon = 1e-12);
    }
    assert!(series.filtered.iter().all(|v| v.is_finite()));

    let rebuilt = run_reconstruction(&config, &token).unwrap();
    assert_eq!(rebuilt.days_written, 90);
    assert_eq!(rebuilt.days_failed, 0);
    assert_eq!(rebuilt.populated_cells, 25 * 90);
    assert_eq!(rebuilt.unmatched_series, 0);

    let grids = NpzGridStore::new(&config.grid_dir);
    let grid = NpzGridStore::load(&grids.path_for(date(40))).unwrap();
    assert_eq!(grid.sla.dim(), (5, 5));
    assert_eq!(grid.sla[(2, 2)], series.filtered[40]);
}

#[test]
fn sparse_point_is_stored_unfiltered() {
    let root = tempfile::tempdir().unwrap();
    let config = config(&root, 100);
    std::fs::create_dir_all(&config.input_dir).unwrap();
    for offset in 0..100 {
        let value = if offset % 20 == 0 { 0.05 } else { f64::NAN };
        write_day(
            &config.input_dir,
            offset,
            Array1::from_elem(1, -30.0),
            Array1::from_elem(1, 150.0),
            Array2::from_elem((1, 1), value),
        );
    }

    let filter = config.validate().unwrap();
    let summary = run_extraction(&config, &filter, &CancellationToken::new()).unwrap();
    assert_eq!(summary.too_sparse, 1);
    assert_eq!(summary.filtered, 0);

    let key = CoordKey::from_degrees(-30.0, 150.0);
    let series = NpzSeriesStore::load(&config.series_dir.join(series_file_name(key))).unwrap();
    assert_eq!(series.filtered.len(), 100);
    assert!(series.filtered.iter().all(|v| v.is_nan()));
    assert_eq!(series.unfiltered.iter().filter(|v| v.is_finite()).count(), 5);
}

#[test]
fn reconstruction_matches_series_within_tolerance() {
    let root = tempfile::tempdir().unwrap();
    let config = config(&root, 3);
    std::fs::create_dir_all(&config.input_dir).unwrap();
    for offset in 0..3 {
        write_day(
            &config.input_dir,
            offset,
            Array1::from_elem(1, -30.0),
            Array1::from_elem(1, 150.0),
            Array2::from_elem((1, 1), 0.0),
        );
    }

    let store = NpzSeriesStore::new(&config.series_dir);
    let dates: Vec<NaiveDate> = (0..3).map(date).collect();
    for (lat, value) in [(-30.0, 0.25), (-30.02, 9.0)] {
        let values = Array1::from_elem(3, value);
        store
            .save(&PointSeries {
                point: GridPoint::new(lat, 150.0),
                dates: dates.clone(),
                unfiltered: values.clone(),
                filtered: values,
            })
            .unwrap();
    }

    let summary = run_reconstruction(&config, &CancellationToken::new()).unwrap();
    assert_eq!(summary.days_written, 3);
    assert_eq!(summary.unmatched_series, 1);
    assert_eq!(summary.populated_cells, 3);

    let grid = NpzGridStore::load(&NpzGridStore::new(&config.grid_dir).path_for(date(1))).unwrap();
    assert_eq!(grid.sla[(0, 0)], 0.25);
}

#[test]
fn invalid_cutoffs_fail_before_any_io() {
    let root = tempfile::tempdir().unwrap();
    let mut config = config(&root, 10);
    config.band_pass.lowcut = 0.6;
    config.band_pass.highcut = 0.7;
    let err = config.validate().unwrap_err();
    assert!(matches!(err, CtwError::InvalidCutoff { .. }));
    assert!(err.is_fatal());
}

#[test]
fn empty_input_directory_is_fatal() {
    let root = tempfile::tempdir().unwrap();
    let config = config(&root, 10);
    std::fs::create_dir_all(&config.input_dir).unwrap();
    let filter = config.validate().unwrap();
    let err = run_extraction(&config, &filter, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, CtwError::NoInputFiles(_)));
}
