//! Nearest-route projection of query points.
//!
//! Every query scans every candidate route, so cost is
//! O(points x routes x segments). That is fine for tens of points against a
//! handful of routes; larger inputs would want a spatial index over segments.

use geo::{Distance, Euclidean, Point};
use tracing::{debug, info, warn};

use crate::error::{RecordWarning, Result};
use crate::feedback::{scaled_percent, Feedback};
use crate::models::{PointOnLine, ProjectionResult};
use crate::route::{GeometryService, Measure, PlanarGeometry, Route, RouteSampler};

/// Results of projecting a batch of query points
#[derive(Debug, Default)]
pub struct ProjectionBatch {
    /// `(query index, result)` for every point that was projected
    pub results: Vec<(usize, ProjectionResult)>,
    pub warnings: Vec<RecordWarning>,
    pub cancelled: bool,
}

pub struct NearestProjector<M, G = PlanarGeometry> {
    samplers: Vec<RouteSampler<M, G>>,
}

impl<M: Measure + Clone> NearestProjector<M, PlanarGeometry> {
    /// Build samplers for every route; routes without usable length are skipped
    pub fn from_routes(routes: Vec<Route>, measure: M) -> Self {
        let samplers = routes
            .into_iter()
            .filter_map(|route| {
                let id = route.id.clone();
                match RouteSampler::new(route, measure.clone()) {
                    Ok(s) => Some(s),
                    Err(e) => {
                        warn!("Skipping route {}: {}", id, e);
                        None
                    }
                }
            })
            .collect();
        Self::new(samplers)
    }
}

impl<M: Measure, G: GeometryService> NearestProjector<M, G> {
    pub fn new(samplers: Vec<RouteSampler<M, G>>) -> Self {
        Self { samplers }
    }

    pub fn samplers(&self) -> &[RouteSampler<M, G>] {
        &self.samplers
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    /// Project `point` onto the closest candidate route.
    ///
    /// Routes are ranked by planar distance; the first route in input order
    /// wins ties.
    pub fn nearest_across_routes(&self, point: Point<f64>) -> Result<Option<ProjectionResult>> {
        let mut best: Option<(f64, usize, Point<f64>)> = None;

        for (idx, sampler) in self.samplers.iter().enumerate() {
            let nearest = sampler.nearest_point(point)?;
            let d = Euclidean.distance(point, nearest);
            if best.map_or(true, |(best_d, _, _)| d < best_d) {
                best = Some((d, idx, nearest));
            }
        }

        let Some((_, idx, nearest)) = best else {
            return Ok(None);
        };

        let sampler = &self.samplers[idx];
        Ok(Some(ProjectionResult {
            projected: nearest,
            distance_m: sampler.measure().measure_line(point, nearest),
            kp: sampler.table().locate(nearest, sampler.measure()),
            route_id: sampler.route().id.clone(),
            route_index: idx,
        }))
    }

    /// Project a batch of query points; `None` entries (empty geometry) are skipped
    pub fn project_all<F: Feedback + ?Sized>(
        &self,
        points: &[Option<Point<f64>>],
        feedback: &F,
    ) -> ProjectionBatch {
        let mut batch = ProjectionBatch::default();
        let total = points.len();

        for (index, point) in points.iter().enumerate() {
            if feedback.is_cancelled() {
                info!("Projection cancelled after {} of {} points", index, total);
                batch.cancelled = true;
                break;
            }

            match point {
                None => {
                    let warning = RecordWarning::new(index, "empty geometry");
                    feedback.record_warning(&warning);
                    batch.warnings.push(warning);
                }
                Some(p) => match self.nearest_across_routes(*p) {
                    Ok(Some(result)) => batch.results.push((index, result)),
                    Ok(None) => {
                        debug!("No candidate route for point {}", index);
                    }
                    Err(e) => {
                        let warning = RecordWarning::new(index, e.to_string());
                        feedback.record_warning(&warning);
                        batch.warnings.push(warning);
                    }
                },
            }

            feedback.set_progress(scaled_percent(index + 1, total, 0, 100));
        }

        batch
    }
}

/// Compass bearing from `from` to `to`: 0 = north, clockwise, in `[0, 360)`
pub fn compass_bearing(from: Point<f64>, to: Point<f64>) -> f64 {
    let dx = to.x() - from.x();
    let dy = to.y() - from.y();
    let deg = dx.atan2(dy).to_degrees();
    let normalized = (deg + 360.0) % 360.0;
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Range and bearing from a projected point back to the original query point
pub fn point_on_line<M: Measure>(projected: Point<f64>, query: Point<f64>, measure: &M) -> PointOnLine {
    PointOnLine {
        range_m: measure.measure_line(projected, query),
        bearing_deg: compass_bearing(projected, query),
    }
}
