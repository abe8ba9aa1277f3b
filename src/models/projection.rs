//! Per-query results of projecting points onto routes.

use geo::Point;

use super::Value;

/// Where a point falls along a route
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpLocation {
    /// KP of the projection, in kilometers
    pub kp: f64,
    /// Distance from the query point to the route, in meters
    pub offset_m: f64,
    /// Closest point on the route
    pub nearest: Point<f64>,
}

/// Result of projecting a point onto the nearest of several routes
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionResult {
    pub projected: Point<f64>,
    pub distance_m: f64,
    pub kp: f64,
    pub route_id: Value,
    /// Position of the winning route in the candidate list
    pub route_index: usize,
}

/// Range and compass bearing from a projected point back to its query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointOnLine {
    pub range_m: f64,
    /// Degrees clockwise from north in `[0, 360)`
    pub bearing_deg: f64,
}
