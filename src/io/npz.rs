//! `.npz` snapshot reader and the series and grid artifact stores.
//!
//! Snapshot archives hold the case's named arrays: 1-D latitude, 1-D longitude and the 2-D value
//! grid shaped `[lat, lon]`, stored as `f64` or `f32`.

use super::{
    date_from_days, days_since_epoch, ensure_dir, grid_file_name, series_file_name,
    SnapshotReader,
};
use crate::config::ProductCase;
use crate::data_container::{FilteredGrid, GridPoint, PointSeries, Snapshot};
use crate::error::{CtwError, Result};
use chrono::NaiveDate;
use ndarray::{arr0, Array, Array0, Array1, Dimension};
use ndarray_npy::{NpzReader, NpzWriter};
use std::fs::File;
use std::path::{Path, PathBuf};

fn open_reader(path: &Path) -> Result<NpzReader<File>> {
    let file = File::open(path).map_err(|e| CtwError::io(path, e))?;
    NpzReader::new(file).map_err(|source| CtwError::NpzRead {
        path: path.to_path_buf(),
        source,
    })
}

fn open_writer(path: &Path) -> Result<NpzWriter<File>> {
    let file = File::create(path).map_err(|e| CtwError::io(path, e))?;
    Ok(NpzWriter::new(file))
}

/// Resolves `name` to its archive entry, with or without the `.npy` suffix.
fn entry(npz: &mut NpzReader<File>, path: &Path, name: &str) -> Result<String> {
    let names = npz.names().map_err(|source| CtwError::NpzRead {
        path: path.to_path_buf(),
        source,
    })?;
    let suffixed = format!("{name}.npy");
    names
        .into_iter()
        .find(|n| n == name || *n == suffixed)
        .ok_or_else(|| CtwError::missing_axis(path, name))
}

/// Reads a floating point array as `f64`, accepting `f32` storage.
fn read_float<D: Dimension>(
    npz: &mut NpzReader<File>,
    path: &Path,
    name: &str,
) -> Result<Array<f64, D>> {
    let entry = entry(npz, path, name)?;
    let wide: std::result::Result<Array<f64, D>, _> = npz.by_name(&entry);
    match wide {
        Ok(array) => Ok(array),
        Err(first) => {
            let narrow: std::result::Result<Array<f32, D>, _> = npz.by_name(&entry);
            narrow
                .map(|array| array.mapv(f64::from))
                .map_err(|_| CtwError::NpzRead {
                    path: path.to_path_buf(),
                    source: first,
                })
        }
    }
}

fn read_days(npz: &mut NpzReader<File>, path: &Path, name: &str) -> Result<Array1<i64>> {
    let entry = entry(npz, path, name)?;
    npz.by_name(&entry).map_err(|source| CtwError::NpzRead {
        path: path.to_path_buf(),
        source,
    })
}

fn to_dates(path: &Path, days: &Array1<i64>) -> Result<Vec<NaiveDate>> {
    days.iter()
        .map(|d| {
            date_from_days(*d).ok_or_else(|| {
                CtwError::ShapeMismatch(format!("{}: day {d} is out of range", path.display()))
            })
        })
        .collect()
}

macro_rules! add_arrays {
    ($writer:ident, $path:expr, $($name:expr => $array:expr),+ $(,)?) => {
        $(
            $writer
                .add_array($name, $array)
                .map_err(|source| CtwError::NpzWrite {
                    path: $path.to_path_buf(),
                    source,
                })?;
        )+
        $writer.finish().map_err(|source| CtwError::NpzWrite {
            path: $path.to_path_buf(),
            source,
        })?;
    };
}

/// Reads snapshots stored as `.npz` archives.
#[derive(Debug, Clone, Copy)]
pub struct NpzSnapshotReader {
    case: ProductCase,
}

impl NpzSnapshotReader {
    pub fn new(case: ProductCase) -> Self {
        NpzSnapshotReader { case }
    }
}

impl SnapshotReader for NpzSnapshotReader {
    fn read(&self, path: &Path, date: NaiveDate) -> Result<Snapshot> {
        let mut npz = open_reader(path)?;
        let latitudes = read_float(&mut npz, path, self.case.latitude_name())?;
        let longitudes = read_float(&mut npz, path, self.case.longitude_name())?;
        let values = read_float(&mut npz, path, self.case.variable_name())?;
        Snapshot::new(date, latitudes, longitudes, values)
    }
}

/// Writes a snapshot with the array names of `case`.
pub fn write_snapshot(path: &Path, case: ProductCase, snapshot: &Snapshot) -> Result<()> {
    let mut npz = open_writer(path)?;
    add_arrays!(npz, path,
        case.latitude_name() => &snapshot.latitudes,
        case.longitude_name() => &snapshot.longitudes,
        case.variable_name() => &snapshot.values,
    );
    Ok(())
}

/// Per-point series artifacts in one directory.
#[derive(Debug, Clone)]
pub struct NpzSeriesStore {
    dir: PathBuf,
}

impl NpzSeriesStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        NpzSeriesStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, series: &PointSeries) -> PathBuf {
        self.dir.join(series_file_name(series.key()))
    }

    /// Persists the raw and filtered series with their time axis and coordinates.
    pub fn save(&self, series: &PointSeries) -> Result<PathBuf> {
        ensure_dir(&self.dir)?;
        let path = self.path_for(series);
        let days: Array1<i64> = series.dates.iter().map(|d| days_since_epoch(*d)).collect();
        let mut npz = open_writer(&path)?;
        add_arrays!(npz, &path,
            "time" => &days,
            "unfiltered" => &series.unfiltered,
            "filtered" => &series.filtered,
            "latitude" => &arr0(series.point.latitude),
            "longitude" => &arr0(series.point.longitude),
        );
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<PointSeries> {
        let mut npz = open_reader(path)?;
        let days = read_days(&mut npz, path, "time")?;
        let unfiltered: Array1<f64> = read_float(&mut npz, path, "unfiltered")?;
        let filtered: Array1<f64> = read_float(&mut npz, path, "filtered")?;
        let latitude: Array0<f64> = read_float(&mut npz, path, "latitude")?;
        let longitude: Array0<f64> = read_float(&mut npz, path, "longitude")?;

        if unfiltered.len() != days.len() || filtered.len() != days.len() {
            return Err(CtwError::ShapeMismatch(format!(
                "{}: {} dates, {} unfiltered, {} filtered",
                path.display(),
                days.len(),
                unfiltered.len(),
                filtered.len()
            )));
        }
        Ok(PointSeries {
            point: GridPoint::new(latitude.into_scalar(), longitude.into_scalar()),
            dates: to_dates(path, &days)?,
            unfiltered,
            filtered,
        })
    }

    /// Loads every series artifact of the directory.
    ///
    /// Files that fail to load are logged and left out; they cannot match any cell.
    pub fn load_all(&self) -> Result<Vec<PointSeries>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CtwError::io(&self.dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CtwError::io(&self.dir, e))?.path();
            let is_series = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("filtered_sla_") && n.ends_with(".npz"));
            if is_series {
                paths.push(path);
            }
        }
        paths.sort();

        let mut series = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::load(&path) {
                Ok(s) => series.push(s),
                Err(err) => log::warn!("skipping series {}: {err}", path.display()),
            }
        }
        Ok(series)
    }
}

/// Reconstructed grid artifacts in one directory.
#[derive(Debug, Clone)]
pub struct NpzGridStore {
    dir: PathBuf,
}

impl NpzGridStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        NpzGridStore { dir: dir.into() }
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(grid_file_name(date))
    }

    pub fn save(&self, grid: &FilteredGrid) -> Result<PathBuf> {
        ensure_dir(&self.dir)?;
        let path = self.path_for(grid.date);
        let mut npz = open_writer(&path)?;
        add_arrays!(npz, &path,
            "sla" => &grid.sla,
            "latitude" => &grid.latitudes,
            "longitude" => &grid.longitudes,
            "time" => &arr0(days_since_epoch(grid.date)),
        );
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<FilteredGrid> {
        let mut npz = open_reader(path)?;
        let entry = entry(&mut npz, path, "time")?;
        let days: Array0<i64> = npz.by_name(&entry).map_err(|source| CtwError::NpzRead {
            path: path.to_path_buf(),
            source,
        })?;
        let days = days.into_scalar();
        let date = date_from_days(days).ok_or_else(|| {
            CtwError::ShapeMismatch(format!("{}: day {days} is out of range", path.display()))
        })?;
        let latitudes = read_float(&mut npz, path, "latitude")?;
        let longitudes = read_float(&mut npz, path, "longitude")?;
        let sla = read_float(&mut npz, path, "sla")?;
        let snapshot = Snapshot::new(date, latitudes, longitudes, sla)?;
        Ok(FilteredGrid {
            date,
            latitudes: snapshot.latitudes,
            longitudes: snapshot.longitudes,
            sla: snapshot.values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 9, d).unwrap()
    }

    #[test]
    fn bran_snapshot_reads_ocean_axes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ocean_eta_t_20230901.npz");
        let snapshot = Snapshot::new(
            day(1),
            array![-30.5, -30.0],
            array![150.0, 150.5, 151.0],
            Array2::from_elem((2, 3), 0.1),
        )
        .unwrap();
        write_snapshot(&path, ProductCase::Bran, &snapshot).unwrap();

        let read = NpzSnapshotReader::new(ProductCase::Bran)
            .read(&path, day(1))
            .unwrap();
        assert_eq!(read.values.dim(), (2, 3));
        assert_eq!(read.longitudes, snapshot.longitudes);

        let err = NpzSnapshotReader::new(ProductCase::Swot)
            .read(&path, day(1))
            .unwrap_err();
        assert!(matches!(err, CtwError::MissingAxis { .. }));
    }

    #[test]
    fn single_precision_snapshots_are_widened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SWOT_20230901_x.npz");
        let mut npz = NpzWriter::new(File::create(&path).unwrap());
        npz.add_array("latitude", &array![-30.0_f32, -29.5]).unwrap();
        npz.add_array("longitude", &array![150.0_f32]).unwrap();
        npz.add_array("sla", &array![[0.25_f32], [f32::NAN]]).unwrap();
        npz.finish().unwrap();

        let read = NpzSnapshotReader::new(ProductCase::Swot)
            .read(&path, day(1))
            .unwrap();
        assert_eq!(read.latitudes, array![-30.0, -29.5]);
        assert_eq!(read.values[(0, 0)], 0.25);
        assert!(read.values[(1, 0)].is_nan());
    }

    #[test]
    fn series_artifact_keeps_undefined_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = NpzSeriesStore::new(dir.path().join("series"));
        let series = PointSeries {
            point: GridPoint::new(-30.001, 150.0),
            dates: vec![day(1), day(2), day(3)],
            unfiltered: array![0.1, f64::NAN, 0.3],
            filtered: Array1::from_elem(3, f64::NAN),
        };
        let path = store.save(&series).unwrap();
        assert!(path.ends_with("filtered_sla_lat_-30.00_lon_150.00.npz"));

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].dates, series.dates);
        assert_eq!(loaded[0].point, series.point);
        assert!(loaded[0].unfiltered[1].is_nan());
        assert!(!loaded[0].is_filtered());
    }

    #[test]
    fn grid_artifact_carries_date_and_axes() {
        let dir = tempfile::tempdir().unwrap();
        let store = NpzGridStore::new(dir.path());
        let mut grid = FilteredGrid::undefined(day(4), array![-30.0, -29.0], array![150.0]);
        grid.sla[(1, 0)] = -0.02;
        let path = store.save(&grid).unwrap();
        assert!(path.ends_with("filtered_grid_20230904.npz"));

        let loaded = NpzGridStore::load(&path).unwrap();
        assert_eq!(loaded.date, day(4));
        assert_eq!(loaded.populated_cells(), 1);
        assert_eq!(loaded.sla[(1, 0)], -0.02);
    }
}
