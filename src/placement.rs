//! Placing points at KPs along a route.

use geo::Point;
use tracing::info;

use crate::error::{KpError, Result};
use crate::feedback::{scaled_percent, Feedback};
use crate::models::round3;
use crate::route::DistanceTable;

/// A point placed on a route at a KP
#[derive(Debug, Clone, PartialEq)]
pub struct KpPoint {
    pub point: Point<f64>,
    pub kp: f64,
    /// Remaining distance to the route end (km, 3 dp)
    pub reverse_kp: f64,
    pub label: String,
    /// Spacing that produced this point, if placed by interval
    pub interval_km: Option<f64>,
}

#[derive(Debug, Default)]
pub struct PlacementBatch {
    pub points: Vec<KpPoint>,
    pub cancelled: bool,
}

/// "KP 5" for whole kilometers, "KP 2.5" otherwise
pub fn kp_label(kp: f64) -> String {
    let kp = round3(kp);
    if kp.fract() == 0.0 {
        format!("KP {:.0}", kp)
    } else {
        format!("KP {}", kp)
    }
}

fn kp_point(table: &DistanceTable, target_m: f64, interval_km: Option<f64>) -> KpPoint {
    let kp = target_m / 1000.0;
    KpPoint {
        point: table.position_at_m(target_m),
        kp: round3(kp),
        reverse_kp: round3((table.total_m() - target_m) / 1000.0),
        label: kp_label(kp),
        interval_km,
    }
}

/// Place one point at `kp`; fails when the KP lies beyond the route
pub fn place_single(table: &DistanceTable, kp: f64) -> Result<KpPoint> {
    let target_m = table.kp_to_meters(kp)?;
    Ok(kp_point(table, target_m, None))
}

/// Most points a single interval may produce on one route
pub const MAX_POINTS_PER_INTERVAL: f64 = 1_000_000.0;

/// Place a `KP 0` point at the route start, then points every `interval` km
/// for each interval, starting one interval from the route start and stopping
/// short of the route end. Cancellation is checked before every point.
pub fn place_at_intervals<F: Feedback + ?Sized>(
    table: &DistanceTable,
    intervals_km: &[f64],
    feedback: &F,
) -> Result<PlacementBatch> {
    check_intervals(intervals_km, table.total_km())?;

    let mut batch = PlacementBatch::default();
    if feedback.is_cancelled() {
        batch.cancelled = true;
        return Ok(batch);
    }
    batch.points.push(kp_point(table, 0.0, Some(0.0)));

    for (idx, &interval_km) in intervals_km.iter().enumerate() {
        let interval_m = interval_km * 1000.0;
        let mut placed = 0usize;
        let mut k = 1u64;
        loop {
            let target_m = k as f64 * interval_m;
            if target_m >= table.total_m() {
                break;
            }
            if feedback.is_cancelled() {
                info!(
                    "Placement cancelled after {} points at {} km interval",
                    placed, interval_km
                );
                batch.cancelled = true;
                return Ok(batch);
            }
            batch.points.push(kp_point(table, target_m, Some(interval_km)));
            placed += 1;
            k += 1;
        }

        info!("Placed {} points at {} km interval", placed, interval_km);
        feedback.set_progress(scaled_percent(idx + 1, intervals_km.len(), 0, 100));
    }

    Ok(batch)
}

/// Validate an interval list against a route of `length_km`: every interval
/// must be positive and yield at most [`MAX_POINTS_PER_INTERVAL`] points
pub fn check_intervals(intervals_km: &[f64], length_km: f64) -> Result<()> {
    for &interval_km in intervals_km {
        if !interval_km.is_finite() || interval_km <= 0.0 {
            return Err(KpError::InvalidInterval {
                interval_km,
                reason: "must be a positive number of km".to_string(),
            });
        }
        let count = length_km / interval_km;
        if count > MAX_POINTS_PER_INTERVAL {
            return Err(KpError::InvalidInterval {
                interval_km,
                reason: format!(
                    "would place {:.0} points on a {:.3} km route (limit {:.0})",
                    count, length_km, MAX_POINTS_PER_INTERVAL
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{CancelAfter, Silent};
    use crate::route::{DistanceModel, Route};
    use geo::point;

    fn table() -> DistanceTable {
        let route = Route::from_coords("r", vec![(0.0, 0.0), (2500.0, 0.0)]);
        DistanceTable::build(&route, &DistanceModel::Planar).unwrap()
    }

    #[test]
    fn test_kp_label() {
        assert_eq!(kp_label(5.0), "KP 5");
        assert_eq!(kp_label(2.5), "KP 2.5");
        assert_eq!(kp_label(0.30000000000000004), "KP 0.3");
    }

    #[test]
    fn test_place_single() {
        let p = place_single(&table(), 1.2).unwrap();
        assert_eq!(p.point, point!(x: 1200.0, y: 0.0));
        assert_eq!(p.reverse_kp, 1.3);
        assert_eq!(p.label, "KP 1.2");
    }

    #[test]
    fn test_place_single_at_end() {
        let p = place_single(&table(), 2.5).unwrap();
        assert_eq!(p.point, point!(x: 2500.0, y: 0.0));
        assert_eq!(p.reverse_kp, 0.0);
    }

    #[test]
    fn test_place_single_beyond_end() {
        assert!(matches!(
            place_single(&table(), 2.6),
            Err(KpError::KpOutOfRange { .. })
        ));
    }

    #[test]
    fn test_place_at_intervals() {
        let batch = place_at_intervals(&table(), &[1.0, 0.5], &Silent).unwrap();
        let kps: Vec<f64> = batch.points.iter().map(|p| p.kp).collect();
        assert_eq!(kps, vec![0.0, 1.0, 2.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(batch.points[1].interval_km, Some(1.0));
        assert_eq!(batch.points[2].reverse_kp, 0.5);
    }

    #[test]
    fn test_place_at_intervals_starts_with_kp_zero() {
        let batch = place_at_intervals(&table(), &[1.0], &Silent).unwrap();
        let start = &batch.points[0];
        assert_eq!(start.point, point!(x: 0.0, y: 0.0));
        assert_eq!(start.label, "KP 0");
        assert_eq!(start.kp, 0.0);
        assert_eq!(start.reverse_kp, 2.5);
        assert_eq!(start.interval_km, Some(0.0));
        assert_eq!(batch.points.iter().filter(|p| p.kp == 0.0).count(), 1);
    }

    #[test]
    fn test_place_at_intervals_excludes_route_end() {
        let batch = place_at_intervals(&table(), &[2.5], &Silent).unwrap();
        let kps: Vec<f64> = batch.points.iter().map(|p| p.kp).collect();
        assert_eq!(kps, vec![0.0]);
    }

    #[test]
    fn test_place_at_intervals_cancelled_mid_interval() {
        // First poll is before KP 0, then one per interval point
        let feedback = CancelAfter::new(3);
        let batch = place_at_intervals(&table(), &[0.5], &feedback).unwrap();
        assert!(batch.cancelled);
        let kps: Vec<f64> = batch.points.iter().map(|p| p.kp).collect();
        assert_eq!(kps, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_place_at_intervals_rejects_tiny_interval() {
        assert!(matches!(
            place_at_intervals(&table(), &[0.000_000_001], &Silent),
            Err(KpError::InvalidInterval { .. })
        ));
    }

    #[test]
    fn test_check_intervals() {
        assert!(check_intervals(&[1.0, 50.0], 100.0).is_ok());
        assert!(check_intervals(&[0.0], 100.0).is_err());
        assert!(check_intervals(&[f64::NAN], 100.0).is_err());
        assert!(check_intervals(&[0.001], 100.0).is_ok());
        assert!(check_intervals(&[0.00001], 100.0).is_err());
    }
}
