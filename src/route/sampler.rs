//! Route sampler: KP lookups against one route.

use geo::Point;

use super::{DistanceTable, GeometryService, Measure, PlanarGeometry, Route};
use crate::error::{KpError, Result};
use crate::models::KpLocation;

/// A route together with its distance table and the services used to build it
#[derive(Debug, Clone)]
pub struct RouteSampler<M, G = PlanarGeometry> {
    route: Route,
    table: DistanceTable,
    measure: M,
    geometry: G,
}

impl<M: Measure> RouteSampler<M, PlanarGeometry> {
    pub fn new(route: Route, measure: M) -> Result<Self> {
        Self::with_geometry(route, measure, PlanarGeometry)
    }
}

impl<M: Measure, G: GeometryService> RouteSampler<M, G> {
    pub fn with_geometry(route: Route, measure: M, geometry: G) -> Result<Self> {
        let table = DistanceTable::build(&route, &measure)?;
        Ok(Self {
            route,
            table,
            measure,
            geometry,
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn table(&self) -> &DistanceTable {
        &self.table
    }

    pub fn measure(&self) -> &M {
        &self.measure
    }

    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    pub fn total_km(&self) -> f64 {
        self.table.total_km()
    }

    pub fn position_at_kp(&self, kp: f64) -> Result<Point<f64>> {
        self.table.position_at_kp(kp)
    }

    /// Closest point on the route to `point`, without resolving its KP
    pub fn nearest_point(&self, point: Point<f64>) -> Result<Point<f64>> {
        self.geometry
            .nearest_point(&self.route, point)
            .ok_or(KpError::EmptyRoute)
    }

    /// KP of `point` once projected onto the route, and its offset in meters
    pub fn kp_at_position(&self, point: Point<f64>) -> Result<KpLocation> {
        let nearest = self.nearest_point(point)?;
        Ok(KpLocation {
            kp: self.table.locate(nearest, &self.measure),
            offset_m: self.measure.measure_line(point, nearest),
            nearest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::DistanceModel;
    use approx::assert_relative_eq;
    use geo::point;

    fn sampler() -> RouteSampler<DistanceModel> {
        let route = Route::from_coords("s", vec![(0.0, 0.0), (2000.0, 0.0), (2000.0, 1000.0)]);
        RouteSampler::new(route, DistanceModel::Planar).unwrap()
    }

    #[test]
    fn test_kp_at_position_off_route() {
        let loc = sampler().kp_at_position(point!(x: 700.0, y: -30.0)).unwrap();
        assert_relative_eq!(loc.kp, 0.7);
        assert_relative_eq!(loc.offset_m, 30.0);
        assert_eq!(loc.nearest, point!(x: 700.0, y: 0.0));
    }

    #[test]
    fn test_kp_at_position_second_leg() {
        let loc = sampler().kp_at_position(point!(x: 2100.0, y: 400.0)).unwrap();
        assert_relative_eq!(loc.kp, 2.4);
        assert_relative_eq!(loc.offset_m, 100.0);
    }

    #[test]
    fn test_round_trip_law() {
        let s = sampler();
        for kp in [0.0, 0.001, 0.5, 1.999, 2.0, 2.5, 3.0] {
            let p = s.position_at_kp(kp).unwrap();
            let loc = s.kp_at_position(p).unwrap();
            assert_relative_eq!(loc.kp, kp, epsilon = 1e-9);
            assert_relative_eq!(loc.offset_m, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_round_trip_geodesic() {
        let route = Route::from_coords("g", vec![(1.0, 52.0), (1.2, 52.0), (1.2, 52.3)]);
        let s = RouteSampler::new(route, DistanceModel::Geodesic).unwrap();
        let total = s.total_km();
        for kp in [0.0, total * 0.3, total * 0.75, total] {
            let p = s.position_at_kp(kp).unwrap();
            let loc = s.kp_at_position(p).unwrap();
            // Linear interpolation in degrees vs ellipsoidal partial length
            assert_relative_eq!(loc.kp, kp, epsilon = 1e-3);
        }
    }
}
