//! Coastal-trapped-wave band of sea-level anomaly products.
//!
//! Daily gridded SLA snapshots are reduced to one time series per grid point inside a coastal
//! region. Each series is gap filled in space and time, passed through a zero-phase Butterworth
//! band-pass filter and persisted. Reconstruction then turns the persisted series back into one
//! filtered grid per day.
//!
//! ```no_run
//! use cancellable_loops::CancellationToken;
//! use ctw_sla_filter::{run_extraction, run_reconstruction, RunConfig};
//!
//! # fn main() -> ctw_sla_filter::Result<()> {
//! let config = RunConfig::default();
//! let filter = config.validate()?;
//! let token = CancellationToken::new();
//! run_extraction(&config, &filter, &token)?;
//! run_reconstruction(&config, &token)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod data_container;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod filters;
pub mod io;
pub mod math_tools;
pub mod reconstruct;
pub mod region;
pub mod snapshot_cache;

pub use config::{BandPassConfig, DataFormat, ProductCase, RunConfig};
pub use dispatcher::run_extraction;
pub use error::{CtwError, Result};
pub use filters::band_pass::ButterworthBandPass;
pub use reconstruct::run_reconstruction;
pub use region::{Containment, Region};
