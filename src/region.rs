//! Region selection: which grid points lie inside the target quadrilateral.
//!
//! By default the quadrilateral is reduced to its axis-aligned bounding box with closed bounds.
//! True polygon containment is an explicit [`Containment::Polygon`] opt-in.

use geo::{Coord, Intersects, LineString, Point, Polygon};
use ndarray::{Array1, Array2, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// How membership in a [`Region`] is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Containment {
    /// Closed min/max test on the vertices' longitudes and latitudes.
    #[default]
    BoundingBox,
    /// Point-in-polygon test on the quadrilateral itself, boundary inclusive.
    Polygon,
}

/// Closed latitude/longitude bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl Bounds {
    #[inline]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        longitude >= self.min_lon
            && longitude <= self.max_lon
            && latitude >= self.min_lat
            && latitude <= self.max_lat
    }
}

/// A quadrilateral given by four `[longitude, latitude]` vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub vertices: [[f64; 2]; 4],
    #[serde(default)]
    pub containment: Containment,
}

impl Default for Region {
    /// The East Australian coastal region.
    fn default() -> Self {
        Region::new([[149.0, -38.0], [158.0, -38.0], [158.0, -25.0], [149.0, -25.0]])
    }
}

impl Region {
    pub fn new(vertices: [[f64; 2]; 4]) -> Self {
        Region {
            vertices,
            containment: Containment::BoundingBox,
        }
    }

    pub fn with_containment(mut self, containment: Containment) -> Self {
        self.containment = containment;
        self
    }

    /// Bounding box of the vertices.
    pub fn bounds(&self) -> Bounds {
        let fold = |idx: usize, init: f64, f: fn(f64, f64) -> f64| {
            self.vertices.iter().map(|v| v[idx]).fold(init, f)
        };
        Bounds {
            min_lon: fold(0, f64::INFINITY, f64::min),
            max_lon: fold(0, f64::NEG_INFINITY, f64::max),
            min_lat: fold(1, f64::INFINITY, f64::min),
            max_lat: fold(1, f64::NEG_INFINITY, f64::max),
        }
    }

    fn polygon(&self) -> Polygon<f64> {
        let ring: Vec<Coord<f64>> = self
            .vertices
            .iter()
            .map(|v| Coord { x: v[0], y: v[1] })
            .collect();
        Polygon::new(LineString::from(ring), vec![])
    }

    /// Scalar membership test for one point.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        match self.containment {
            Containment::BoundingBox => self.bounds().contains(latitude, longitude),
            Containment::Polygon => self
                .polygon()
                .intersects(&Point::new(longitude, latitude)),
        }
    }

    /// Vectorized membership over the meshgrid of two axes, shaped `[lat, lon]`.
    ///
    /// Agrees with [`contains`](Self::contains) for every grid point.
    pub fn mask(&self, latitudes: ArrayView1<f64>, longitudes: ArrayView1<f64>) -> Array2<bool> {
        let shape = (latitudes.len(), longitudes.len());
        let lat_grid = Array2::from_shape_fn(shape, |(i, _)| latitudes[i]);
        let lon_grid = Array2::from_shape_fn(shape, |(_, j)| longitudes[j]);

        match self.containment {
            Containment::BoundingBox => {
                let bounds = self.bounds();
                let lon_in = lon_grid.mapv(|lon| lon >= bounds.min_lon && lon <= bounds.max_lon);
                let lat_in = lat_grid.mapv(|lat| lat >= bounds.min_lat && lat <= bounds.max_lat);
                Zip::from(&lat_in)
                    .and(&lon_in)
                    .map_collect(|&lat_ok, &lon_ok| lat_ok && lon_ok)
            }
            Containment::Polygon => {
                let polygon = self.polygon();
                Zip::from(&lat_grid)
                    .and(&lon_grid)
                    .map_collect(|&lat, &lon| polygon.intersects(&Point::new(lon, lat)))
            }
        }
    }

    /// `(lat_index, lon_index)` pairs inside the region, row-major.
    pub fn candidate_indices(
        &self,
        latitudes: ArrayView1<f64>,
        longitudes: ArrayView1<f64>,
    ) -> Vec<(usize, usize)> {
        self.mask(latitudes, longitudes)
            .indexed_iter()
            .filter(|(_, inside)| **inside)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Axes reduced to the rows and columns holding at least one in-region point.
    pub fn valid_axes(
        &self,
        latitudes: ArrayView1<f64>,
        longitudes: ArrayView1<f64>,
    ) -> (Array1<f64>, Array1<f64>) {
        let mask = self.mask(latitudes, longitudes);
        let lat_axis: Vec<f64> = mask
            .outer_iter()
            .zip(latitudes.iter())
            .filter(|(row, _)| row.iter().any(|inside| *inside))
            .map(|(_, lat)| *lat)
            .collect();
        let lon_axis: Vec<f64> = mask
            .columns()
            .into_iter()
            .zip(longitudes.iter())
            .filter(|(col, _)| col.iter().any(|inside| *inside))
            .map(|(_, lon)| *lon)
            .collect();
        (Array1::from_vec(lat_axis), Array1::from_vec(lon_axis))
    }
}
