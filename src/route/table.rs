//! Cumulative-length table over a route's segments.

use geo::{Coord, Distance, Euclidean, Line, Point};
use tracing::{debug, warn};

use super::{Measure, Route};
use crate::error::{KpError, Result};
use crate::models::round3;

/// Planar distance (map units) under which a point counts as lying on a segment
pub const ON_SEGMENT_EPSILON: f64 = 1e-6;

/// Slack allowed when comparing a KP against the route length (meters)
pub const LENGTH_EPSILON_M: f64 = 1e-6;

/// One consecutive vertex pair within a route part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Index of the owning part in the route
    pub part: usize,
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    pub length_m: f64,
    /// Along-route distance at `start`
    pub cumulative_m: f64,
}

impl Segment {
    pub fn end_m(&self) -> f64 {
        self.cumulative_m + self.length_m
    }

    /// Planar interpolation at an along-route distance inside this segment
    pub fn interpolate(&self, target_m: f64) -> Coord<f64> {
        let ratio = if self.length_m > 0.0 {
            (target_m - self.cumulative_m) / self.length_m
        } else {
            0.0
        };
        Coord {
            x: self.start.x + ratio * (self.end.x - self.start.x),
            y: self.start.y + ratio * (self.end.y - self.start.y),
        }
    }

    pub fn as_line(&self) -> Line<f64> {
        Line::new(self.start, self.end)
    }
}

/// Read-only length index of a route. Parts are concatenated in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceTable {
    segments: Vec<Segment>,
    total_m: f64,
}

impl DistanceTable {
    pub fn build<M: Measure>(route: &Route, measure: &M) -> Result<Self> {
        let mut segments = Vec::new();
        let mut cumulative = 0.0;

        for (part_idx, part) in route.parts().iter().enumerate() {
            if part.0.len() < 2 {
                continue;
            }
            for line in part.lines() {
                let length_m = measure.measure_line(line.start_point(), line.end_point());
                segments.push(Segment {
                    part: part_idx,
                    start: line.start,
                    end: line.end,
                    length_m,
                    cumulative_m: cumulative,
                });
                cumulative += length_m;
            }
        }

        if segments.is_empty() {
            return Err(KpError::EmptyRoute);
        }
        if !cumulative.is_finite() || round3(cumulative) <= 0.0 {
            return Err(KpError::ZeroLengthRoute);
        }

        debug!(
            "Built distance table: {} segments, {:.3} m",
            segments.len(),
            cumulative
        );

        Ok(Self {
            segments,
            total_m: cumulative,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn total_m(&self) -> f64 {
        self.total_m
    }

    pub fn total_km(&self) -> f64 {
        self.total_m / 1000.0
    }

    /// Convert a KP to meters, rejecting values outside `[0, total]`
    pub fn kp_to_meters(&self, kp: f64) -> Result<f64> {
        let target_m = kp * 1000.0;
        if !kp.is_finite() || kp < 0.0 || target_m > self.total_m + LENGTH_EPSILON_M {
            return Err(KpError::KpOutOfRange {
                kp,
                length_km: self.total_km(),
            });
        }
        Ok(target_m.min(self.total_m))
    }

    /// Segment containing an along-route distance; the first match wins on shared vertices
    pub fn segment_at(&self, target_m: f64) -> &Segment {
        self.segments
            .iter()
            .find(|s| target_m <= s.end_m())
            .unwrap_or_else(|| &self.segments[self.segments.len() - 1])
    }

    /// Position on the route at a KP (km). No extrapolation.
    pub fn position_at_kp(&self, kp: f64) -> Result<Point<f64>> {
        let target_m = self.kp_to_meters(kp)?;
        Ok(self.position_at_m(target_m))
    }

    pub(crate) fn position_at_m(&self, target_m: f64) -> Point<f64> {
        Point::from(self.segment_at(target_m).interpolate(target_m))
    }

    /// KP (km) of a point already known to lie on the route.
    ///
    /// The first segment within [`ON_SEGMENT_EPSILON`] owns the point and the
    /// partial length is measured with `measure`. When nothing matches, the
    /// full route length is returned.
    pub fn locate<M: Measure>(&self, on_route: Point<f64>, measure: &M) -> f64 {
        for segment in &self.segments {
            let d = Euclidean.distance(&on_route, &segment.as_line());
            if d < ON_SEGMENT_EPSILON {
                let partial = measure.measure_line(Point::from(segment.start), on_route);
                return (segment.cumulative_m + partial) / 1000.0;
            }
        }

        warn!(
            "Point ({}, {}) matched no route segment; using route end KP {:.3}",
            on_route.x(),
            on_route.y(),
            self.total_km()
        );
        self.total_km()
    }
}
