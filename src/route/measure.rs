//! Length measurement in meters.

use geo::{Distance, Euclidean, Geodesic, Haversine, LineString, Point};
use serde::{Deserialize, Serialize};

/// Measures distances in meters. Every length the engine reasons about comes
/// from one of these, never from raw coordinate differences.
pub trait Measure {
    fn measure_line(&self, a: Point<f64>, b: Point<f64>) -> f64;

    fn measure_length(&self, line: &LineString<f64>) -> f64 {
        line.lines()
            .map(|l| self.measure_line(l.start_point(), l.end_point()))
            .sum()
    }
}

/// Distance model used by [`Measure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceModel {
    /// Euclidean; coordinates are a projected CRS in meters
    Planar,
    /// Great-circle distance on a sphere; coordinates are lon/lat degrees
    Haversine,
    /// Ellipsoidal (WGS84) distance; coordinates are lon/lat degrees
    #[default]
    Geodesic,
}

impl Measure for DistanceModel {
    fn measure_line(&self, a: Point<f64>, b: Point<f64>) -> f64 {
        match self {
            DistanceModel::Planar => Euclidean.distance(a, b),
            DistanceModel::Haversine => Haversine.distance(a, b),
            DistanceModel::Geodesic => Geodesic.distance(a, b),
        }
    }
}

impl<M: Measure + ?Sized> Measure for &M {
    fn measure_line(&self, a: Point<f64>, b: Point<f64>) -> f64 {
        (**self).measure_line(a, b)
    }
}

impl std::fmt::Display for DistanceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceModel::Planar => write!(f, "planar"),
            DistanceModel::Haversine => write!(f, "haversine"),
            DistanceModel::Geodesic => write!(f, "geodesic"),
        }
    }
}
