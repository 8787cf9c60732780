//! NetCDF snapshot reader.
//!
//! Reads the case's latitude, longitude and value variables from one daily product file. The
//! value variable may carry a leading singleton time dimension. Packed values are unpacked with
//! `scale_factor` and `add_offset`, and `_FillValue` samples become NaN.

use super::SnapshotReader;
use crate::config::ProductCase;
use crate::data_container::Snapshot;
use crate::error::{CtwError, Result};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use std::path::Path;

/// Reads snapshots from NetCDF files.
#[derive(Debug, Clone, Copy)]
pub struct NetCdfSnapshotReader {
    case: ProductCase,
}

impl NetCdfSnapshotReader {
    pub fn new(case: ProductCase) -> Self {
        NetCdfSnapshotReader { case }
    }
}

fn attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Double(d) => Some(d),
            netcdf::AttributeValue::Float(f) => Some(f as f64),
            netcdf::AttributeValue::Short(s) => Some(s as f64),
            netcdf::AttributeValue::Int(i) => Some(i as f64),
            _ => None,
        })
}

fn read_axis(file: &netcdf::File, path: &Path, name: &str) -> Result<Array1<f64>> {
    let var = file
        .variable(name)
        .ok_or_else(|| CtwError::missing_axis(path, name))?;
    let values: Vec<f64> = var.get_values(..)?;
    Ok(Array1::from_vec(values))
}

impl SnapshotReader for NetCdfSnapshotReader {
    fn read(&self, path: &Path, date: NaiveDate) -> Result<Snapshot> {
        let file = netcdf::open(path)?;
        let latitudes = read_axis(&file, path, self.case.latitude_name())?;
        let longitudes = read_axis(&file, path, self.case.longitude_name())?;

        let name = self.case.variable_name();
        let var = file
            .variable(name)
            .ok_or_else(|| CtwError::missing_axis(path, name))?;
        let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        let (n_lat, n_lon) = (latitudes.len(), longitudes.len());
        let grid_dims_match = dims.len() >= 2
            && dims[dims.len() - 2..] == [n_lat, n_lon]
            && dims[..dims.len() - 2].iter().all(|d| *d == 1);
        if !grid_dims_match {
            return Err(CtwError::ShapeMismatch(format!(
                "{}: `{name}` has dimensions {dims:?}, expected [.., {n_lat}, {n_lon}]",
                path.display()
            )));
        }

        let scale = attr_f64(&var, "scale_factor").unwrap_or(1.0);
        let offset = attr_f64(&var, "add_offset").unwrap_or(0.0);
        let fill = attr_f64(&var, "_FillValue");
        let raw: Vec<f64> = var.get_values(..)?;
        let unpacked: Vec<f64> = raw
            .into_iter()
            .map(|v| {
                if fill.is_some_and(|f| v == f) {
                    f64::NAN
                } else {
                    v * scale + offset
                }
            })
            .collect();

        let values = Array2::from_shape_vec((n_lat, n_lon), unpacked)
            .map_err(|e| CtwError::ShapeMismatch(format!("{}: {e}", path.display())))?;
        Snapshot::new(date, latitudes, longitudes, values)
    }
}
