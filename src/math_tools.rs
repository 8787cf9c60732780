//! This module provides the numeric helpers shared by extraction and reconstruction: the
//! undefined-value test, axis-independent nearest-index lookup, the coordinate key used for
//! every coordinate comparison, and the two gap filling strategies (linear interpolation along
//! time and expanding-ring search in space).

use crate::error::{CtwError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Values at or above this magnitude are CF fill values and count as undefined.
pub const FILL_THRESHOLD: f64 = 1.0e30;

/// Two coordinates match when they differ by strictly less than this in each axis.
pub const COORD_TOLERANCE: f64 = 0.01;

/// Default number of rings examined by [`find_nearest_defined`].
pub const DEFAULT_SEARCH_RADIUS: usize = 5;

const COORD_SCALE: f64 = 100.0;

/// Returns `true` for finite values below the fill threshold.
#[inline]
pub fn is_defined(value: f64) -> bool {
    value.is_finite() && value.abs() < FILL_THRESHOLD
}

/// Counts the undefined samples of a sequence.
pub fn count_undefined(values: ArrayView1<f64>) -> usize {
    values.iter().filter(|v| !is_defined(**v)).count()
}

/// Index of the axis value closest to `target` (first one on ties, NaN entries ignored).
///
/// Each axis is searched on its own, so two calls give the cell minimizing the distance per axis
/// rather than the Euclidean distance.
pub fn nearest_index<T: Float>(axis: ArrayView1<T>, target: T) -> Option<usize> {
    let mut best: Option<(usize, T)> = None;
    for (i, &value) in axis.iter().enumerate() {
        let distance = (value - target).abs();
        if distance.is_nan() {
            continue;
        }
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((i, distance)),
        }
    }
    best.map(|(i, _)| i)
}

/// Rounds a coordinate to two decimals through [`CoordKey`].
pub fn round_coord(degrees: f64) -> f64 {
    to_hundredths(degrees) as f64 / COORD_SCALE
}

fn to_hundredths(degrees: f64) -> i32 {
    (degrees * COORD_SCALE).round() as i32
}

/// Identity of a grid location: latitude and longitude in integer hundredths of a degree.
///
/// This is the only coordinate-to-key function in the crate. File names, collision checks and
/// reconstruction lookups all go through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CoordKey {
    pub lat: i32,
    pub lon: i32,
}

impl CoordKey {
    pub fn from_degrees(latitude: f64, longitude: f64) -> Self {
        CoordKey {
            lat: to_hundredths(latitude),
            lon: to_hundredths(longitude),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.lat as f64 / COORD_SCALE
    }

    pub fn longitude(&self) -> f64 {
        self.lon as f64 / COORD_SCALE
    }

    /// Keys whose rounded location could lie within [`COORD_TOLERANCE`] of the given point.
    ///
    /// The range is one bin wider than strictly needed on each side so that floating point noise
    /// in the tolerance comparison never hides a candidate; callers still apply the tolerance.
    pub fn candidates(latitude: f64, longitude: f64) -> Vec<CoordKey> {
        let lat_bins = bin_range(latitude);
        let lon_bins = bin_range(longitude);
        let mut keys = Vec::with_capacity(16);
        for lat in lat_bins.clone() {
            for lon in lon_bins.clone() {
                keys.push(CoordKey { lat, lon });
            }
        }
        keys
    }

    /// `true` if the key's location is within [`COORD_TOLERANCE`] of the point in both axes.
    pub fn matches(&self, latitude: f64, longitude: f64) -> bool {
        (self.latitude() - latitude).abs() < COORD_TOLERANCE
            && (self.longitude() - longitude).abs() < COORD_TOLERANCE
    }

    /// Largest per-axis distance between the key's location and the point.
    pub fn distance(&self, latitude: f64, longitude: f64) -> f64 {
        (self.latitude() - latitude)
            .abs()
            .max((self.longitude() - longitude).abs())
    }
}

fn bin_range(degrees: f64) -> std::ops::RangeInclusive<i32> {
    let scaled = degrees * COORD_SCALE;
    (scaled.floor() as i32 - 1)..=(scaled.ceil() as i32 + 1)
}

impl Display for CoordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2})", self.latitude(), self.longitude())
    }
}

/// Replaces undefined samples by linear interpolation between the nearest defined neighbors.
///
/// Neighbors are found by position in the sequence, not by the size of any date gap. Undefined
/// samples before the first or after the last defined one take that edge value (clamping), so the
/// output never extrapolates. A sequence without any defined sample is an
/// [`CtwError::InsufficientData`] error.
///
/// # Examples
/// ```
/// use ctw_sla_filter::math_tools::interpolate_linear;
/// use ndarray::array;
///
/// let filled = interpolate_linear(array![1.0, f64::NAN, 3.0].view()).unwrap();
/// assert_eq!(filled, array![1.0, 2.0, 3.0]);
/// ```
pub fn interpolate_linear(sequence: ArrayView1<f64>) -> Result<Array1<f64>> {
    let known: Vec<usize> = sequence
        .iter()
        .enumerate()
        .filter(|(_, v)| is_defined(**v))
        .map(|(i, _)| i)
        .collect();
    if known.is_empty() {
        return Err(CtwError::InsufficientData(format!(
            "all {} samples are undefined",
            sequence.len()
        )));
    }

    let mut filled = sequence.to_owned();
    for i in 0..filled.len() {
        if is_defined(filled[i]) {
            continue;
        }
        let right = known.partition_point(|&k| k < i);
        let before = right.checked_sub(1).map(|p| known[p]);
        let after = known.get(right).copied();
        filled[i] = match (before, after) {
            (Some(l), Some(r)) => {
                let (yl, yr) = (sequence[l], sequence[r]);
                yl + (yr - yl) * (i - l) as f64 / (r - l) as f64
            }
            (Some(edge), None) | (None, Some(edge)) => sequence[edge],
            (None, None) => sequence[i],
        };
    }
    Ok(filled)
}

/// Expanding-ring search for the nearest defined value around `(row, col)`.
///
/// For each radius from 1 to `max_radius`, only the cells on the new outer ring
/// (`max(|d_row|, |d_col|) == radius`) are examined, scanning `d_row` ascending and then `d_col`
/// ascending. The first in-bounds defined value is returned. The center cell itself is never
/// examined, and `max_radius == 0` always yields `None`.
pub fn find_nearest_defined(
    grid: ArrayView2<f64>,
    row: usize,
    col: usize,
    max_radius: usize,
) -> Option<f64> {
    let (n_rows, n_cols) = grid.dim();
    let (row, col) = (row as isize, col as isize);
    for radius in 1..=max_radius as isize {
        for d_row in -radius..=radius {
            for d_col in -radius..=radius {
                if d_row.abs() != radius && d_col.abs() != radius {
                    continue;
                }
                let (r, c) = (row + d_row, col + d_col);
                if r < 0 || c < 0 || r >= n_rows as isize || c >= n_cols as isize {
                    continue;
                }
                let value = grid[(r as usize, c as usize)];
                if is_defined(value) {
                    return Some(value);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn interpolation_fills_interior_gap() {
        let filled = interpolate_linear(array![1.0, f64::NAN, 3.0].view()).unwrap();
        assert_eq!(filled, array![1.0, 2.0, 3.0]);
    }

    #[test]
    fn interpolation_uses_index_distance() {
        let filled =
            interpolate_linear(array![0.0, f64::NAN, f64::NAN, f64::NAN, 8.0].view()).unwrap();
        assert_eq!(filled, array![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn interpolation_is_identity_on_defined_data() {
        let data = array![0.25, -1.5, 3.75, 1e-12, -7.0];
        let filled = interpolate_linear(data.view()).unwrap();
        assert_eq!(filled, data);
    }

    #[test]
    fn interpolation_clamps_edges() {
        let filled =
            interpolate_linear(array![f64::NAN, f64::NAN, 2.0, 4.0, f64::NAN].view()).unwrap();
        assert_eq!(filled, array![2.0, 2.0, 2.0, 4.0, 4.0]);
    }

    #[test]
    fn interpolation_treats_fill_values_as_undefined() {
        let filled = interpolate_linear(array![1.0, 9.96921e36, 5.0].view()).unwrap();
        assert_eq!(filled, array![1.0, 3.0, 5.0]);
    }

    #[test]
    fn interpolation_rejects_all_undefined() {
        let result = interpolate_linear(array![f64::NAN, f64::NAN].view());
        assert!(matches!(result, Err(CtwError::InsufficientData(_))));
    }

    #[test]
    fn ring_search_finds_ring_one_cell() {
        let mut grid = Array2::from_elem((5, 5), f64::NAN);
        grid[(2, 2)] = 10.0;
        grid[(1, 2)] = 7.5;

        assert_eq!(find_nearest_defined(grid.view(), 2, 2, 1), Some(7.5));
        assert_eq!(find_nearest_defined(grid.view(), 2, 2, 0), None);
    }

    #[test]
    fn ring_search_scan_order_is_row_then_column() {
        let mut grid = Array2::from_elem((5, 5), f64::NAN);
        grid[(3, 1)] = 1.0;
        grid[(1, 3)] = 2.0;
        grid[(2, 1)] = 3.0;

        // (1, 3) has d_row = -1 and is visited before (2, 1) and (3, 1).
        assert_eq!(find_nearest_defined(grid.view(), 2, 2, 1), Some(2.0));
    }

    #[test]
    fn ring_search_skips_out_of_bounds_and_stops_at_radius() {
        let mut grid = Array2::from_elem((6, 6), f64::NAN);
        grid[(3, 3)] = 4.0;

        assert_eq!(find_nearest_defined(grid.view(), 0, 0, 2), None);
        assert_eq!(find_nearest_defined(grid.view(), 0, 0, 3), Some(4.0));
    }

    #[test]
    fn nearest_index_is_first_minimum() {
        let axis = array![10.0, 10.5, 11.0, 11.5];
        assert_eq!(nearest_index(axis.view(), 10.74), Some(1));
        assert_eq!(nearest_index(axis.view(), 10.75), Some(1));
        assert_eq!(nearest_index(axis.view(), 99.0), Some(3));
        assert_eq!(nearest_index(Array1::<f64>::zeros(0).view(), 1.0), None);
    }

    #[test]
    fn coord_key_rounds_to_hundredths() {
        let key = CoordKey::from_degrees(-30.004, 150.0049);
        assert_eq!(key, CoordKey { lat: -3000, lon: 15000 });
        assert_eq!(round_coord(-29.996), -30.0);
        assert_eq!(key.to_string(), "(-30.00, 150.00)");
    }

    #[test]
    fn coord_key_tolerance_is_strict() {
        let key = CoordKey::from_degrees(-30.0, 150.0);
        assert!(key.matches(-30.005, 150.009));
        assert!(!key.matches(-30.02, 150.0));
        assert!(CoordKey::candidates(-30.005, 150.009).contains(&key));
    }
}
