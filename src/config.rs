//! Run configuration shared by extraction and reconstruction.
//!
//! One [`RunConfig`] is built per run (defaults, then an optional JSON file, then command line
//! overrides) and passed explicitly into every stage.

use crate::error::{CtwError, Result};
use crate::filters::band_pass::ButterworthBandPass;
use crate::math_tools::DEFAULT_SEARCH_RADIUS;
use crate::region::Region;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Product family of the input snapshots.
///
/// The case only selects axis and variable names and the date position in file names; the
/// processing is identical for all cases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProductCase {
    /// SWOT L4 daily gridded product.
    #[default]
    Swot,
    /// DUACS gridded altimetry.
    Duacs,
    /// BRAN ocean reanalysis (ocean-model grid axis names).
    Bran,
}

impl ProductCase {
    pub fn latitude_name(&self) -> &'static str {
        match self {
            ProductCase::Swot | ProductCase::Duacs => "latitude",
            ProductCase::Bran => "yt_ocean",
        }
    }

    pub fn longitude_name(&self) -> &'static str {
        match self {
            ProductCase::Swot | ProductCase::Duacs => "longitude",
            ProductCase::Bran => "xt_ocean",
        }
    }

    pub fn variable_name(&self) -> &'static str {
        match self {
            ProductCase::Swot | ProductCase::Duacs => "sla",
            ProductCase::Bran => "eta_t",
        }
    }

    /// Parses the date embedded in a snapshot file stem.
    ///
    /// SWOT and DUACS names carry `YYYYMMDD` in the second-to-last `_` field (the last one is a
    /// production date), BRAN names carry it in the last field.
    pub fn parse_date(&self, file_stem: &str) -> Option<NaiveDate> {
        let fields: Vec<&str> = file_stem.split('_').collect();
        let field = match self {
            ProductCase::Swot | ProductCase::Duacs => fields.len().checked_sub(2)?,
            ProductCase::Bran => fields.len().checked_sub(1)?,
        };
        NaiveDate::parse_from_str(fields[field], "%Y%m%d").ok()
    }
}

/// On-disk format of the input snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    /// NumPy `.npz` archives holding the case's named arrays.
    #[default]
    Npz,
    /// NetCDF files (requires the `netcdf` feature).
    #[value(name = "netcdf")]
    NetCdf,
}

impl DataFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DataFormat::Npz => "npz",
            DataFormat::NetCdf => "nc",
        }
    }
}

/// Band-pass parameters in cycles per day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPassConfig {
    pub lowcut: f64,
    pub highcut: f64,
    pub sampling_rate: f64,
    pub order: usize,
}

impl Default for BandPassConfig {
    fn default() -> Self {
        BandPassConfig {
            lowcut: 0.035,
            highcut: 0.15,
            sampling_rate: 1.0,
            order: 5,
        }
    }
}

impl BandPassConfig {
    pub fn design(&self) -> Result<ButterworthBandPass> {
        ButterworthBandPass::design(self.lowcut, self.highcut, self.sampling_rate, self.order)
    }
}

/// Every parameter of a run.
///
/// # Fields
/// - `case`: Product family, selecting axis and variable names.
/// - `format`: Input file format.
/// - `input_dir`: Directory holding the dated snapshots.
/// - `series_dir`: Directory for the per-point series artifacts.
/// - `grid_dir`: Directory for the reconstructed daily grids.
/// - `start_date`, `end_date`: Inclusive date range.
/// - `reference_date`: Snapshot used to pick grid points with a defined value (first date if unset).
/// - `region`: Quadrilateral and containment mode.
/// - `band_pass`: Filter parameters.
/// - `search_radius`: Rings examined when the nearest cell is undefined.
/// - `max_undefined_fraction`: Series with more undefined samples than this are not filtered.
/// - `workers`: Worker threads, 0 for the available parallelism.
/// - `queue_capacity`: Bound of the outcome queue between workers and the collector.
/// - `task_timeout_secs`: Optional time budget per point.
/// - `preload`: Read every snapshot once into memory instead of per point and date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub case: ProductCase,
    pub format: DataFormat,
    pub input_dir: PathBuf,
    pub series_dir: PathBuf,
    pub grid_dir: PathBuf,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reference_date: Option<NaiveDate>,
    pub region: Region,
    pub band_pass: BandPassConfig,
    pub search_radius: usize,
    pub max_undefined_fraction: f64,
    pub workers: usize,
    pub queue_capacity: usize,
    pub task_timeout_secs: Option<u64>,
    pub preload: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            case: ProductCase::Swot,
            format: DataFormat::Npz,
            input_dir: PathBuf::from("data"),
            series_dir: PathBuf::from("output/series"),
            grid_dir: PathBuf::from("output/grids"),
            start_date: NaiveDate::from_ymd_opt(2023, 8, 29).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2023, 11, 30).unwrap_or_default(),
            reference_date: None,
            region: Region::default(),
            band_pass: BandPassConfig::default(),
            search_radius: DEFAULT_SEARCH_RADIUS,
            max_undefined_fraction: 0.9,
            workers: 0,
            queue_capacity: 256,
            task_timeout_secs: None,
            preload: true,
        }
    }
}

impl RunConfig {
    /// Reads a JSON configuration; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CtwError::io(path, e))?;
        serde_json::from_str(&text)
            .map_err(|e| CtwError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Checks the configuration and designs the filter once.
    ///
    /// Runs before any I/O so that invalid cutoffs abort the run immediately.
    pub fn validate(&self) -> Result<ButterworthBandPass> {
        if self.start_date > self.end_date {
            return Err(CtwError::InvalidConfig(format!(
                "start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if !(0.0..=1.0).contains(&self.max_undefined_fraction) {
            return Err(CtwError::InvalidConfig(format!(
                "max_undefined_fraction {} is outside [0, 1]",
                self.max_undefined_fraction
            )));
        }
        if self.queue_capacity == 0 {
            return Err(CtwError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self
            .region
            .vertices
            .iter()
            .flatten()
            .any(|v| !v.is_finite())
        {
            return Err(CtwError::InvalidConfig(
                "region vertices must be finite".to_string(),
            ));
        }
        #[cfg(not(feature = "netcdf"))]
        if self.format == DataFormat::NetCdf {
            return Err(CtwError::FeatureDisabled("netcdf"));
        }
        self.band_pass.design()
    }

    /// Number of worker threads to start.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_run_is_valid() {
        let filter = RunConfig::default().validate().unwrap();
        assert_eq!(filter.order, 5);
        assert!((filter.low - 0.07).abs() < 1e-12);
        assert!((filter.high - 0.3).abs() < 1e-12);
    }

    #[test]
    fn swapped_cutoffs_fail_validation() {
        let mut config = RunConfig::default();
        config.band_pass.lowcut = 0.2;
        config.band_pass.highcut = 0.1;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CtwError::InvalidCutoff { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn reversed_dates_fail_validation() {
        let config = RunConfig {
            start_date: NaiveDate::from_ymd_opt(2023, 12, 1).unwrap(),
            ..RunConfig::default()
        };
        assert!(matches!(config.validate(), Err(CtwError::InvalidConfig(_))));
    }

    #[test]
    fn file_dates_per_case() {
        let day = NaiveDate::from_ymd_opt(2023, 9, 4).unwrap();
        assert_eq!(
            ProductCase::Swot.parse_date("SWOT_L4_SLA_20230904_20240110"),
            Some(day)
        );
        assert_eq!(
            ProductCase::Duacs.parse_date("dt_global_allsat_phy_l4_20230904_20231215"),
            Some(day)
        );
        assert_eq!(ProductCase::Bran.parse_date("ocean_eta_t_20230904"), Some(day));
        assert_eq!(ProductCase::Swot.parse_date("20230904"), None);
        assert_eq!(ProductCase::Bran.parse_date("20230904"), Some(day));
        assert_eq!(ProductCase::Bran.parse_date("ocean_eta_t_latest"), None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"case": "bran", "start_date": "2023-09-01", "band_pass": {{"lowcut": 0.05, "highcut": 0.2, "sampling_rate": 1.0, "order": 4}}}}"#
        )
        .unwrap();

        let config = RunConfig::from_file(file.path()).unwrap();
        assert_eq!(config.case, ProductCase::Bran);
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2023, 9, 1).unwrap());
        assert_eq!(config.end_date, RunConfig::default().end_date);
        assert_eq!(config.band_pass.order, 4);
        assert_eq!(config.region, Region::default());
    }
}
