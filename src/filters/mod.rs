//! Signal processing filters for sea-level anomaly time series.
//!
//! Filters run along the time axis of one grid point's series, after gap filling. Each filter
//! implements the `Filter` trait defined in the `filter` module.

/// Zero-phase Butterworth band-pass used to isolate coastal-trapped-wave periods.
pub mod band_pass;

/// Core filter interfaces and shared components.
/// Defines the `Filter` trait and supporting structures used by all filter implementations.
pub mod filter;
