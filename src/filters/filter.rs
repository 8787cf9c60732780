//! This module provides the `Filter` trait implemented by every sequence filter of the pipeline,
//! together with the metadata structure used to describe a filter in logs.

use crate::error::Result;
use ndarray::{Array1, ArrayView1};
use std::fmt::Debug;

/// The `Filter` trait defines how a 1-D time-axis filter is applied.
///
/// Filters must implement:
/// - A `config` function to provide metadata for logging.
/// - A `filter` function that maps a fully defined sequence to a sequence of the same length.
///
/// Filters are shared read-only between worker threads, so `filter` takes `&self` and
/// implementations must be `Send + Sync`.
///
/// **Example**:
/// ```rust
/// use ctw_sla_filter::error::Result;
/// use ctw_sla_filter::filters::filter::{Filter, FilterConfig};
/// use ndarray::{Array1, ArrayView1};
///
/// #[derive(Debug)]
/// struct Demean;
///
/// impl Filter for Demean {
///     fn config(&self) -> FilterConfig {
///         FilterConfig {
///             name: "Demean".to_string(),
///             description: "Removes the sequence mean.".to_string(),
///         }
///     }
///
///     fn filter(&self, sequence: ArrayView1<f64>) -> Result<Array1<f64>> {
///         let mean = sequence.mean().unwrap_or(0.0);
///         Ok(sequence.mapv(|v| v - mean))
///     }
/// }
/// ```
pub trait Filter: Send + Sync + Debug {
    /// Returns the filter configuration, including name and description.
    fn config(&self) -> FilterConfig;

    /// Applies the filter along the time axis.
    ///
    /// # Arguments
    ///
    /// - `sequence`: Fully defined input samples, ordered by date.
    ///
    /// # Returns
    /// The filtered sequence, with the same length as the input.
    fn filter(&self, sequence: ArrayView1<f64>) -> Result<Array1<f64>>;
}

/// A structure representing the metadata of a filter.
///
/// # Fields
/// - `name`: A human-readable name for the filter.
/// - `description`: A short description of what the filter does.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    /// The name of the filter, used for identification in logs.
    pub name: String,
    /// A description of the filter, explaining its purpose and parameters.
    pub description: String,
}
