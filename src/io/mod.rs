//! I/O for snapshots, per-point series and reconstructed grids.
//!
//! This module provides:
//! - **Snapshot discovery**: dated input files for a product case and date range
//! - **Snapshot readers**: `.npz` archives, and NetCDF files with the `netcdf` feature
//! - **Series and grid stores**: `.npz` artifacts written by extraction and reconstruction
//!
//! # File names
//!
//! ```text
//! filtered_sla_lat_-30.00_lon_150.00.npz   per-point series
//! filtered_grid_20230904.npz               per-date grid
//! ```

pub mod npz;

#[cfg(feature = "netcdf")]
pub mod netcdf_io;

use crate::config::{DataFormat, ProductCase};
use crate::data_container::Snapshot;
use crate::error::{CtwError, Result};
use crate::math_tools::CoordKey;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub use npz::{NpzGridStore, NpzSeriesStore, NpzSnapshotReader};

/// Reads one dated snapshot from disk.
pub trait SnapshotReader: Send + Sync {
    fn read(&self, path: &Path, date: NaiveDate) -> Result<Snapshot>;
}

/// A discovered input file and the date parsed from its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotFile {
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// Builds the reader matching the configured format.
pub fn reader_for(case: ProductCase, format: DataFormat) -> Result<Box<dyn SnapshotReader>> {
    match format {
        DataFormat::Npz => Ok(Box::new(NpzSnapshotReader::new(case))),
        #[cfg(feature = "netcdf")]
        DataFormat::NetCdf => Ok(Box::new(netcdf_io::NetCdfSnapshotReader::new(case))),
        #[cfg(not(feature = "netcdf"))]
        DataFormat::NetCdf => Err(CtwError::FeatureDisabled("netcdf")),
    }
}

/// Lists the snapshots of `dir` whose file name carries a date in `start..=end`, sorted by date.
///
/// Files with another extension or an unparseable date are skipped. Finding nothing is an
/// error, since no stage can run without input.
pub fn discover_snapshots(
    dir: &Path,
    case: ProductCase,
    format: DataFormat,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<SnapshotFile>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CtwError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CtwError::io(dir, e))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(format.extension()) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match case.parse_date(stem) {
            Some(date) if date >= start && date <= end => files.push(SnapshotFile { date, path }),
            Some(_) => {}
            None => log::debug!("skipping {}: no date in file name", path.display()),
        }
    }
    if files.is_empty() {
        return Err(CtwError::NoInputFiles(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

/// File name of a per-point series, from its rounded coordinates.
pub fn series_file_name(key: CoordKey) -> String {
    format!(
        "filtered_sla_lat_{:.2}_lon_{:.2}.npz",
        key.latitude(),
        key.longitude()
    )
}

/// File name of a reconstructed grid.
pub fn grid_file_name(date: NaiveDate) -> String {
    format!("filtered_grid_{}.npz", date.format("%Y%m%d"))
}

/// Creates `dir` and its parents if needed.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| CtwError::io(dir, e))
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Days since 1970-01-01, the time unit of every artifact.
pub fn days_since_epoch(date: NaiveDate) -> i64 {
    (date - epoch()).num_days()
}

pub fn date_from_days(days: i64) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::TimeDelta::try_days(days)?)
}
