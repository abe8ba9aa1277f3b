//! KP-range extraction: the sub-polyline between two KPs.

use geo::{Coord, LineString};
use tracing::info;

use crate::error::{KpError, RecordWarning, Result};
use crate::feedback::{scaled_percent, Feedback};
use crate::route::{DistanceTable, LENGTH_EPSILON_M};

/// One extracted KP range
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSegment {
    /// Index of the request in the input slice
    pub index: usize,
    pub start_kp: f64,
    pub end_kp: f64,
    pub line: LineString<f64>,
}

#[derive(Debug, Default)]
pub struct ExtractionBatch {
    pub segments: Vec<ExtractedSegment>,
    pub warnings: Vec<RecordWarning>,
    pub cancelled: bool,
}

fn check_range(table: &DistanceTable, start_kp: f64, end_kp: f64) -> Result<(f64, f64)> {
    if !start_kp.is_finite() || !end_kp.is_finite() || start_kp < 0.0 || end_kp < 0.0 {
        return Err(KpError::InvalidRange {
            start: start_kp,
            end: end_kp,
        });
    }

    let start_m = start_kp * 1000.0;
    let end_m = end_kp * 1000.0;
    let limit = table.total_m() + LENGTH_EPSILON_M;
    if start_m > limit || end_m > limit {
        return Err(KpError::RangeExceedsLength {
            start: start_kp,
            end: end_kp,
            length_km: table.total_km(),
        });
    }

    if start_kp > end_kp {
        return Err(KpError::InvalidRange {
            start: start_kp,
            end: end_kp,
        });
    }

    Ok((start_m.min(table.total_m()), end_m.min(table.total_m())))
}

/// Extract the route between `start_kp` and `end_kp` (km).
///
/// The result starts at the interpolated start position, keeps every route
/// vertex strictly inside the range and ends at the interpolated end
/// position. Equal KPs give a zero-length two-point line.
pub fn extract_segment(table: &DistanceTable, start_kp: f64, end_kp: f64) -> Result<LineString<f64>> {
    let (start_m, end_m) = check_range(table, start_kp, end_kp)?;

    let mut coords: Vec<Coord<f64>> = Vec::new();
    let mut started = false;
    let mut current_part = None;

    for segment in table.segments() {
        let next_m = segment.end_m();

        let mut starts_here = false;
        if !started {
            if next_m < start_m {
                continue;
            }
            coords.push(segment.interpolate(start_m));
            started = true;
            starts_here = true;
        } else if current_part != Some(segment.part) {
            // First vertex of a following part
            coords.push(segment.start);
        }
        current_part = Some(segment.part);

        if next_m >= end_m {
            coords.push(segment.interpolate(end_m));
            return Ok(LineString::new(coords));
        }
        // A start KP on this segment's end vertex is already in place
        if !(starts_here && coords.last() == Some(&segment.end)) {
            coords.push(segment.end);
        }
    }

    // Only reachable through float slack at the very end of the route
    let last = table.segments()[table.segments().len() - 1].end;
    if coords.is_empty() {
        coords.push(last);
    }
    coords.push(last);
    Ok(LineString::new(coords))
}

/// Extract every `(start_kp, end_kp)` pair; bad ranges are skipped with a warning
pub fn extract_all<F: Feedback + ?Sized>(
    table: &DistanceTable,
    ranges: &[(f64, f64)],
    feedback: &F,
) -> ExtractionBatch {
    let mut batch = ExtractionBatch::default();
    let total = ranges.len();

    for (index, &(start_kp, end_kp)) in ranges.iter().enumerate() {
        if feedback.is_cancelled() {
            info!("Extraction cancelled after {} of {} ranges", index, total);
            batch.cancelled = true;
            break;
        }

        match extract_segment(table, start_kp, end_kp) {
            Ok(line) => batch.segments.push(ExtractedSegment {
                index,
                start_kp,
                end_kp,
                line,
            }),
            Err(e) => {
                let warning = RecordWarning::new(index, e.to_string());
                feedback.record_warning(&warning);
                batch.warnings.push(warning);
            }
        }

        feedback.set_progress(scaled_percent(index + 1, total, 0, 100));
    }

    info!(
        "Extracted {} of {} KP ranges",
        batch.segments.len(),
        total
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{CancelAfter, Silent};
    use crate::route::{DistanceModel, Measure, Route};
    use approx::assert_relative_eq;
    use geo::{line_string, Coord};

    fn route() -> Route {
        Route::from_coords(
            "r",
            vec![(0.0, 0.0), (1000.0, 0.0), (1000.0, 1000.0), (2000.0, 1000.0)],
        )
    }

    fn table(route: &Route) -> DistanceTable {
        DistanceTable::build(route, &DistanceModel::Planar).unwrap()
    }

    #[test]
    fn test_extract_inside_one_segment() {
        let t = table(&route());
        let line = extract_segment(&t, 0.2, 0.7).unwrap();
        assert_eq!(line, line_string![(x: 200.0, y: 0.0), (x: 700.0, y: 0.0)]);
    }

    #[test]
    fn test_extract_keeps_inner_vertices() {
        let t = table(&route());
        let line = extract_segment(&t, 0.5, 2.5).unwrap();
        assert_eq!(
            line,
            line_string![
                (x: 500.0, y: 0.0),
                (x: 1000.0, y: 0.0),
                (x: 1000.0, y: 1000.0),
                (x: 1500.0, y: 1000.0)
            ]
        );
    }

    #[test]
    fn test_extract_full_route() {
        let r = route();
        let t = table(&r);
        let line = extract_segment(&t, 0.0, t.total_km()).unwrap();
        assert_eq!(&line, &r.parts()[0]);
        assert_relative_eq!(DistanceModel::Planar.measure_length(&line), t.total_m());
    }

    #[test]
    fn test_extract_ends_on_vertex() {
        let t = table(&route());
        let line = extract_segment(&t, 0.5, 1.0).unwrap();
        assert_eq!(line, line_string![(x: 500.0, y: 0.0), (x: 1000.0, y: 0.0)]);
    }

    #[test]
    fn test_extract_equal_kps_is_degenerate() {
        let t = table(&route());
        let line = extract_segment(&t, 1.5, 1.5).unwrap();
        assert_eq!(line.0.len(), 2);
        assert_eq!(line.0[0], line.0[1]);
        assert_eq!(line.0[0], Coord { x: 1000.0, y: 500.0 });
        assert_relative_eq!(DistanceModel::Planar.measure_length(&line), 0.0);
    }

    #[test]
    fn test_extract_beyond_length() {
        let t = table(&route());
        assert!(matches!(
            extract_segment(&t, 3.5, 4.0),
            Err(KpError::RangeExceedsLength { .. })
        ));
        assert!(matches!(
            extract_segment(&t, 1.0, 3.01),
            Err(KpError::RangeExceedsLength { .. })
        ));
    }

    #[test]
    fn test_extract_reversed_range() {
        let t = table(&route());
        assert!(matches!(
            extract_segment(&t, 2.0, 1.0),
            Err(KpError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_extract_multipart_spans_parts() {
        let r = Route::new(
            "m",
            vec![
                line_string![(x: 0.0, y: 0.0), (x: 100.0, y: 0.0)],
                line_string![(x: 100.0, y: 50.0), (x: 200.0, y: 50.0)],
            ],
        );
        let t = table(&r);
        let line = extract_segment(&t, 0.05, 0.15).unwrap();
        assert_eq!(
            line,
            line_string![
                (x: 50.0, y: 0.0),
                (x: 100.0, y: 0.0),
                (x: 100.0, y: 50.0),
                (x: 150.0, y: 50.0)
            ]
        );
    }

    #[test]
    fn test_extract_starting_on_vertex() {
        let t = table(&route());
        let line = extract_segment(&t, 1.0, 2.0).unwrap();
        assert_eq!(
            line,
            line_string![(x: 1000.0, y: 0.0), (x: 1000.0, y: 1000.0)]
        );
        let line = extract_segment(&t, 1.0, 2.5).unwrap();
        assert_eq!(
            line,
            line_string![(x: 1000.0, y: 0.0), (x: 1000.0, y: 1000.0), (x: 1500.0, y: 1000.0)]
        );
    }

    #[test]
    fn test_extract_all_cancelled_keeps_partial() {
        let t = table(&route());
        let feedback = CancelAfter::new(2);
        let batch = extract_all(&t, &[(0.0, 1.0), (1.0, 2.0), (2.0, 3.0)], &feedback);
        assert!(batch.cancelled);
        let done: Vec<usize> = batch.segments.iter().map(|s| s.index).collect();
        assert_eq!(done, vec![0, 1]);
    }

    #[test]
    fn test_extract_all_skips_bad_rows() {
        let t = table(&route());
        let batch = extract_all(&t, &[(0.0, 1.0), (2.0, 9.0), (1.0, 2.0)], &Silent);
        assert_eq!(batch.segments.len(), 2);
        assert_eq!(batch.segments[1].index, 2);
        assert_eq!(batch.warnings.len(), 1);
        assert_eq!(batch.warnings[0].index, 1);
    }
}
