//! Batch operations that read a table, run the engine and write features.
//!
//! Each function writes its schema once, then one feature per result, and
//! reports per-record problems in the returned [`RunSummary`].

use geo::{Geometry, LineString, Point};
use tracing::info;

use crate::error::{KpError, RecordWarning, Result};
use crate::extract::extract_all;
use crate::feedback::{scaled_percent, Feedback};
use crate::io::{RangeFields, Table};
use crate::merge::AdjacentRangeMerger;
use crate::models::{round3, Value};
use crate::placement::{place_at_intervals, place_single, KpPoint};
use crate::projector::{point_on_line, NearestProjector};
use crate::route::{DistanceTable, GeometryService, Measure, RouteSampler};
use crate::sink::{FeatureSink, FieldKind, Schema};

#[derive(Debug, Default)]
pub struct RunSummary {
    pub written: usize,
    pub warnings: Vec<RecordWarning>,
    pub cancelled: bool,
}

impl RunSummary {
    fn log(&self, what: &str) {
        info!(
            "{}: wrote {} feature(s), skipped {}{}",
            what,
            self.written,
            self.warnings.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        );
    }
}

/// Sinks written by [`nearest_kp`]
pub struct NearestSinks<'a> {
    pub points: &'a mut dyn FeatureSink,
    pub lines: &'a mut dyn FeatureSink,
    pub point_on_line: Option<&'a mut dyn FeatureSink>,
}

/// Nearest KP for every point of `table` against the projector's routes.
///
/// Writes the original points with `route_id`, `distance_m`, `kp`, `kp_ref`;
/// connector lines from each point to its projection; and optionally the
/// projected points with range and bearing back to the original.
pub fn nearest_kp<M: Measure, G: GeometryService, F: Feedback + ?Sized>(
    projector: &NearestProjector<M, G>,
    table: &Table,
    points: &[Option<Point<f64>>],
    kp_ref: &str,
    sinks: NearestSinks<'_>,
    feedback: &F,
) -> Result<RunSummary> {
    let NearestSinks {
        points: points_sink,
        lines: lines_sink,
        point_on_line: mut pol_sink,
    } = sinks;

    let mut points_schema = table.schema.clone();
    points_schema.push("route_id", FieldKind::Any);
    points_schema.push("distance_m", FieldKind::Double);
    points_schema.push("kp", FieldKind::Double);
    points_schema.push("kp_ref", FieldKind::Text);
    points_sink.begin(&points_schema)?;

    let lines_schema = Schema::new()
        .with("point_id", FieldKind::Integer)
        .with("route_id", FieldKind::Any)
        .with("distance_m", FieldKind::Double)
        .with("kp", FieldKind::Double)
        .with("kp_ref", FieldKind::Text);
    lines_sink.begin(&lines_schema)?;

    if let Some(sink) = pol_sink.as_deref_mut() {
        let mut schema = table.schema.clone();
        schema.push("kp_ref", FieldKind::Text);
        schema.push("range_to_target_m", FieldKind::Double);
        schema.push("bearing_to_target_deg", FieldKind::Double);
        schema.push("kp_km", FieldKind::Double);
        sink.begin(&schema)?;
    }

    let batch = projector.project_all(points, feedback);
    let mut summary = RunSummary {
        warnings: batch.warnings,
        cancelled: batch.cancelled,
        ..Default::default()
    };

    for (index, result) in &batch.results {
        let Some(query) = points[*index] else {
            continue;
        };
        let row = &table.rows[*index];
        let distance = Value::Float(round3(result.distance_m));
        let kp = Value::Float(round3(result.kp));
        let kp_ref = Value::from(kp_ref);

        let mut values = row.values.clone();
        values.resize(table.schema.len(), Value::Null);
        values.extend([
            result.route_id.clone(),
            distance.clone(),
            kp.clone(),
            kp_ref.clone(),
        ]);
        points_sink.accept(Some(&Geometry::Point(query)), &values)?;

        let connector = Geometry::LineString(LineString::from(vec![query, result.projected]));
        lines_sink.accept(
            Some(&connector),
            &[
                Value::Int(*index as i64),
                result.route_id.clone(),
                distance,
                kp.clone(),
                kp_ref.clone(),
            ],
        )?;

        if let Some(sink) = pol_sink.as_deref_mut() {
            let measure = projector.samplers()[result.route_index].measure();
            let pol = point_on_line(result.projected, query, measure);
            let mut values = row.values.clone();
            values.resize(table.schema.len(), Value::Null);
            values.extend([
                kp_ref,
                Value::Float(round3(pol.range_m)),
                Value::Float(round3(pol.bearing_deg)),
                kp,
            ]);
            sink.accept(Some(&Geometry::Point(result.projected)), &values)?;
        }

        summary.written += 1;
    }

    points_sink.finish()?;
    lines_sink.finish()?;
    if let Some(sink) = pol_sink {
        sink.finish()?;
    }

    summary.log("Nearest KP");
    Ok(summary)
}

/// Extract a line for every `[start, end]` row of `table` along the route.
///
/// Output fields: `start_kp`, `end_kp`, the other input fields, `source_table`
/// and `source_line`.
pub fn extract_ranges<F: Feedback + ?Sized>(
    route: &DistanceTable,
    table: &Table,
    start_field: &str,
    end_field: &str,
    names: (&str, &str),
    sink: &mut dyn FeatureSink,
    feedback: &F,
) -> Result<RunSummary> {
    let fields = RangeFields {
        start: start_field,
        end: end_field,
        group: None,
    };
    let (records, parse_warnings) = table.range_records(&fields)?;
    info!(
        "Total length of route: {:.3} m; {} ranges to extract",
        route.total_m(),
        records.len()
    );

    let mut schema = Schema::new()
        .with("start_kp", FieldKind::Double)
        .with("end_kp", FieldKind::Double);
    let other: Vec<&str> = table
        .schema
        .names()
        .filter(|n| *n != start_field && *n != end_field)
        .collect();
    for name in &other {
        schema.push(name, FieldKind::Any);
    }
    schema.push("source_table", FieldKind::Text);
    schema.push("source_line", FieldKind::Text);
    sink.begin(&schema)?;

    let ranges: Vec<(f64, f64)> = records.iter().map(|(_, r)| (r.start, r.end)).collect();
    let batch = extract_all(route, &ranges, feedback);

    let mut summary = RunSummary {
        cancelled: batch.cancelled,
        ..Default::default()
    };
    for warning in parse_warnings {
        feedback.record_warning(&warning);
        summary.warnings.push(warning);
    }
    // Batch indices point into `records`; report against source rows
    summary.warnings.extend(
        batch
            .warnings
            .into_iter()
            .map(|w| RecordWarning::new(records[w.index].0, w.message)),
    );

    for segment in batch.segments {
        let (_, record) = &records[segment.index];
        let mut values = vec![Value::Float(segment.start_kp), Value::Float(segment.end_kp)];
        for name in &other {
            values.push(record.attributes.get(*name).cloned().unwrap_or_default());
        }
        values.push(Value::from(names.0));
        values.push(Value::from(names.1));

        sink.accept(Some(&Geometry::LineString(segment.line)), &values)?;
        summary.written += 1;
    }
    sink.finish()?;

    summary.warnings.sort_by_key(|w| w.index);
    summary.log("KP range extraction");
    Ok(summary)
}

/// Group adjacent KP ranges of `table` and write one feature per group,
/// keeping the input schema
pub fn group_adjacent<G: GeometryService, F: Feedback + ?Sized>(
    merger: &AdjacentRangeMerger<G>,
    table: &Table,
    fields: &RangeFields<'_>,
    sink: &mut dyn FeatureSink,
    feedback: &F,
) -> Result<RunSummary> {
    let (records, warnings) = table.range_records(fields)?;
    for warning in &warnings {
        feedback.record_warning(warning);
    }
    sink.begin(&table.schema)?;

    let outcome = merger.merge(records.into_iter().map(|(_, r)| r).collect(), feedback);

    let mut summary = RunSummary {
        warnings,
        cancelled: outcome.cancelled,
        ..Default::default()
    };

    for group in &outcome.groups {
        let values: Vec<Value> = table
            .schema
            .names()
            .map(|name| {
                if name == fields.start {
                    Value::Float(group.start)
                } else if name == fields.end {
                    Value::Float(group.end)
                } else if Some(name) == fields.group {
                    group.group.clone()
                } else {
                    group.attributes.get(name).cloned().unwrap_or_default()
                }
            })
            .collect();
        sink.accept(group.geometry.as_ref(), &values)?;
        summary.written += 1;
    }
    sink.finish()?;

    summary.log("Group adjacent KP ranges");
    Ok(summary)
}

fn placement_schema() -> Schema {
    Schema::new()
        .with("source_line", FieldKind::Text)
        .with("label", FieldKind::Text)
        .with("kp", FieldKind::Double)
        .with("reverse_kp", FieldKind::Double)
        .with("interval_km", FieldKind::Double)
}

fn write_kp_point(sink: &mut dyn FeatureSink, source_line: &str, p: &KpPoint) -> Result<()> {
    sink.accept(
        Some(&Geometry::Point(p.point)),
        &[
            Value::from(source_line),
            Value::from(p.label.as_str()),
            Value::Float(p.kp),
            Value::Float(p.reverse_kp),
            Value::from(p.interval_km),
        ],
    )
}

/// Place a `KP 0` point at the route start and a point at every multiple of
/// each interval along the route
pub fn place_kp_points<F: Feedback + ?Sized>(
    route: &DistanceTable,
    intervals_km: &[f64],
    source_line: &str,
    sink: &mut dyn FeatureSink,
    feedback: &F,
) -> Result<RunSummary> {
    let batch = place_at_intervals(route, intervals_km, feedback)?;
    sink.begin(&placement_schema())?;
    for p in &batch.points {
        write_kp_point(sink, source_line, p)?;
    }
    sink.finish()?;

    let summary = RunSummary {
        written: batch.points.len(),
        cancelled: batch.cancelled,
        ..Default::default()
    };
    summary.log("KP point placement");
    Ok(summary)
}

/// Place a single point at `kp`. A KP beyond the route is reported and
/// nothing is written.
pub fn place_single_kp(
    route: &DistanceTable,
    kp: f64,
    source_line: &str,
    sink: &mut dyn FeatureSink,
) -> Result<RunSummary> {
    sink.begin(&placement_schema())?;
    let mut summary = RunSummary::default();
    match place_single(route, kp) {
        Ok(p) => {
            write_kp_point(sink, source_line, &p)?;
            summary.written = 1;
        }
        Err(e) if e.is_per_record() => {
            summary.warnings.push(RecordWarning::new(0, e.to_string()));
        }
        Err(e) => return Err(e),
    }
    sink.finish()?;
    summary.log("Single KP placement");
    Ok(summary)
}

/// KP and cross-course distance of every point of `table` on a design route.
///
/// Writes the input fields plus `design_route_kp`, `design_route_dcc` (both
/// 3 dp) and `design_route_ref`; points keep their original geometry.
pub fn translate_kp<M: Measure, G: GeometryService, F: Feedback + ?Sized>(
    design: &RouteSampler<M, G>,
    table: &Table,
    points: &[Option<Point<f64>>],
    design_ref: &str,
    sink: &mut dyn FeatureSink,
    feedback: &F,
) -> Result<RunSummary> {
    let mut schema = table.schema.clone();
    schema.push("design_route_kp", FieldKind::Double);
    schema.push("design_route_dcc", FieldKind::Double);
    schema.push("design_route_ref", FieldKind::Text);
    sink.begin(&schema)?;

    let mut summary = RunSummary::default();
    let total = points.len();

    for (index, point) in points.iter().enumerate() {
        if feedback.is_cancelled() {
            info!("Translation cancelled after {} of {} points", index, total);
            summary.cancelled = true;
            break;
        }

        let located = match point {
            None => Err(RecordWarning::new(index, "empty geometry")),
            Some(p) => design
                .kp_at_position(*p)
                .map(|loc| (*p, loc))
                .map_err(|e| RecordWarning::new(index, e.to_string())),
        };

        match located {
            Ok((query, loc)) => {
                let mut values = table.rows[index].values.clone();
                values.resize(table.schema.len(), Value::Null);
                values.extend([
                    Value::Float(round3(loc.kp)),
                    Value::Float(round3(loc.offset_m)),
                    Value::from(design_ref),
                ]);
                sink.accept(Some(&Geometry::Point(query)), &values)?;
                summary.written += 1;
            }
            Err(warning) => {
                feedback.record_warning(&warning);
                summary.warnings.push(warning);
            }
        }

        feedback.set_progress(scaled_percent(index + 1, total, 0, 100));
    }
    sink.finish()?;

    summary.log("KP translation");
    Ok(summary)
}

/// Place a point for every row of `table` at the KP in `kp_field`.
///
/// Writes the input fields plus `source_line` and `kp_value`. Rows with a
/// non-numeric KP or one beyond the route are skipped with a warning.
pub fn place_kp_from_table<F: Feedback + ?Sized>(
    route: &DistanceTable,
    table: &Table,
    kp_field: &str,
    source_line: &str,
    sink: &mut dyn FeatureSink,
    feedback: &F,
) -> Result<RunSummary> {
    let kp_col = table.require(kp_field)?;

    let mut schema = table.schema.clone();
    schema.push("source_line", FieldKind::Text);
    schema.push("kp_value", FieldKind::Double);
    sink.begin(&schema)?;

    let mut summary = RunSummary::default();
    let total = table.len();

    for (index, row) in table.rows.iter().enumerate() {
        if feedback.is_cancelled() {
            info!("Placement cancelled after {} of {} rows", index, total);
            summary.cancelled = true;
            break;
        }

        let raw = row.values.get(kp_col).cloned().unwrap_or_default();
        let placed = raw
            .as_f64()
            .ok_or_else(|| KpError::NonNumericKp {
                field: kp_field.to_string(),
                value: raw.to_string(),
            })
            .and_then(|kp| place_single(route, kp).map(|p| (kp, p)));

        match placed {
            Ok((kp, p)) => {
                let mut values = row.values.clone();
                values.resize(table.schema.len(), Value::Null);
                values.extend([Value::from(source_line), Value::Float(kp)]);
                sink.accept(Some(&Geometry::Point(p.point)), &values)?;
                summary.written += 1;
            }
            Err(e) => {
                let warning = RecordWarning::new(index, e.to_string());
                feedback.record_warning(&warning);
                summary.warnings.push(warning);
            }
        }

        feedback.set_progress(scaled_percent(index + 1, total, 0, 100));
    }
    sink.finish()?;

    summary.log("KP placement from table");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::{CancelAfter, Silent};
    use crate::merge::MergeOptions;
    use crate::route::{DistanceModel, Route};
    use crate::sink::{Feature, MemorySink};
    use geo::point;

    fn text_table(header: &[&str], rows: Vec<Vec<Value>>) -> Table {
        let mut schema = Schema::new();
        for h in header {
            schema.push(h, FieldKind::Any);
        }
        Table {
            schema,
            rows: rows
                .into_iter()
                .map(|values| Feature {
                    geometry: None,
                    values,
                })
                .collect(),
        }
    }

    fn straight_table() -> DistanceTable {
        let route = Route::from_coords("r", vec![(0.0, 0.0), (5000.0, 0.0)]);
        DistanceTable::build(&route, &DistanceModel::Planar).unwrap()
    }

    #[test]
    fn test_nearest_kp_writes_all_outputs() {
        let projector = NearestProjector::from_routes(
            vec![Route::from_coords(7, vec![(0.0, 0.0), (1000.0, 0.0)])],
            DistanceModel::Planar,
        );
        let table = text_table(&["name"], vec![vec![Value::from("A")], vec![Value::from("B")]]);
        let points = vec![Some(point!(x: 250.0, y: 10.0)), None];

        let mut pts = MemorySink::new();
        let mut lines = MemorySink::new();
        let mut pol = MemorySink::new();
        let summary = nearest_kp(
            &projector,
            &table,
            &points,
            "route_a",
            NearestSinks {
                points: &mut pts,
                lines: &mut lines,
                point_on_line: Some(&mut pol),
            },
            &Silent,
        )
        .unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(pts.value(0, "kp"), Some(&Value::Float(0.25)));
        assert_eq!(pts.value(0, "distance_m"), Some(&Value::Float(10.0)));
        assert_eq!(pts.value(0, "route_id"), Some(&Value::Int(7)));
        assert_eq!(pts.value(0, "kp_ref"), Some(&Value::from("route_a")));
        assert_eq!(lines.value(0, "point_id"), Some(&Value::Int(0)));
        assert_eq!(pol.value(0, "bearing_to_target_deg"), Some(&Value::Float(0.0)));
        assert_eq!(pol.value(0, "range_to_target_m"), Some(&Value::Float(10.0)));
        assert_eq!(
            pol.features[0].geometry,
            Some(Geometry::Point(point!(x: 250.0, y: 0.0)))
        );
        assert!(pts.finished && lines.finished && pol.finished);
    }

    #[test]
    fn test_extract_ranges() {
        let table = text_table(
            &["start_kp", "end_kp", "note"],
            vec![
                vec![Value::Int(1), Value::Int(2), Value::from("first")],
                vec![Value::from("abc"), Value::Int(2), Value::from("bad")],
                vec![Value::Int(4), Value::Int(6), Value::from("too long")],
                vec![Value::Float(2.5), Value::Int(3), Value::from("last")],
            ],
        );
        let mut sink = MemorySink::new();
        let summary = extract_ranges(
            &straight_table(),
            &table,
            "start_kp",
            "end_kp",
            ("ranges", "route"),
            &mut sink,
            &Silent,
        )
        .unwrap();

        assert_eq!(summary.written, 2);
        let skipped: Vec<usize> = summary.warnings.iter().map(|w| w.index).collect();
        assert_eq!(skipped, vec![1, 2]);
        assert_eq!(
            sink.schema.names().collect::<Vec<_>>(),
            ["start_kp", "end_kp", "note", "source_table", "source_line"]
        );
        assert_eq!(sink.value(1, "note"), Some(&Value::from("last")));
        assert_eq!(
            sink.features[0].geometry,
            Some(Geometry::LineString(LineString::from(vec![
                (1000.0, 0.0),
                (2000.0, 0.0)
            ])))
        );
    }

    #[test]
    fn test_group_adjacent_keeps_schema() {
        let table = text_table(
            &["start_kp", "end_kp", "method", "crew"],
            vec![
                vec![Value::Int(1), Value::Int(2), Value::from("plough"), Value::from("a")],
                vec![Value::Int(2), Value::Int(3), Value::from("plough"), Value::from("b")],
                vec![Value::Int(3), Value::Int(4), Value::from("skip"), Value::from("a")],
            ],
        );
        let merger = AdjacentRangeMerger::new(MergeOptions::default());
        let fields = RangeFields {
            start: "start_kp",
            end: "end_kp",
            group: Some("method"),
        };
        let mut sink = MemorySink::new();
        let summary = group_adjacent(&merger, &table, &fields, &mut sink, &Silent).unwrap();

        assert_eq!(summary.written, 2);
        assert_eq!(sink.schema, table.schema);
        assert_eq!(
            sink.features[0].values,
            vec![
                Value::Float(1.0),
                Value::Float(3.0),
                Value::from("plough"),
                Value::from("a")
            ]
        );
    }

    #[test]
    fn test_place_kp_points() {
        let mut sink = MemorySink::new();
        let summary = place_kp_points(&straight_table(), &[1.0], "r", &mut sink, &Silent).unwrap();
        assert_eq!(summary.written, 5);
        assert_eq!(sink.value(0, "label"), Some(&Value::from("KP 0")));
        assert_eq!(sink.value(0, "reverse_kp"), Some(&Value::Float(5.0)));
        assert_eq!(sink.value(0, "interval_km"), Some(&Value::Float(0.0)));
        assert_eq!(sink.value(4, "label"), Some(&Value::from("KP 4")));
        assert_eq!(sink.value(4, "reverse_kp"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn test_place_kp_points_rejects_bad_interval() {
        let mut sink = MemorySink::new();
        let result = place_kp_points(&straight_table(), &[-1.0], "r", &mut sink, &Silent);
        assert!(matches!(result, Err(KpError::InvalidInterval { .. })));
        assert!(sink.features.is_empty());
    }

    #[test]
    fn test_translate_kp() {
        let design = RouteSampler::new(
            Route::from_coords("design", vec![(0.0, 0.0), (2000.0, 0.0)]),
            DistanceModel::Planar,
        )
        .unwrap();
        let table = text_table(
            &["name"],
            vec![vec![Value::from("A")], vec![Value::from("B")], vec![Value::from("C")]],
        );
        let points = vec![
            Some(point!(x: 1234.5678, y: -40.0)),
            None,
            Some(point!(x: 2500.0, y: 0.0)),
        ];

        let mut sink = MemorySink::new();
        let summary = translate_kp(&design, &table, &points, "design", &mut sink, &Silent).unwrap();

        assert_eq!(summary.written, 2);
        assert_eq!(summary.warnings, vec![RecordWarning::new(1, "empty geometry")]);
        assert_eq!(
            sink.schema.names().collect::<Vec<_>>(),
            ["name", "design_route_kp", "design_route_dcc", "design_route_ref"]
        );
        assert_eq!(sink.value(0, "name"), Some(&Value::from("A")));
        assert_eq!(sink.value(0, "design_route_kp"), Some(&Value::Float(1.235)));
        assert_eq!(sink.value(0, "design_route_dcc"), Some(&Value::Float(40.0)));
        assert_eq!(sink.value(0, "design_route_ref"), Some(&Value::from("design")));
        assert_eq!(
            sink.features[0].geometry,
            Some(Geometry::Point(point!(x: 1234.5678, y: -40.0)))
        );
        // Beyond the route end: projects onto the last vertex
        assert_eq!(sink.value(1, "design_route_kp"), Some(&Value::Float(2.0)));
        assert_eq!(sink.value(1, "design_route_dcc"), Some(&Value::Float(500.0)));
    }

    #[test]
    fn test_translate_kp_cancelled_keeps_partial() {
        let design = RouteSampler::new(
            Route::from_coords("design", vec![(0.0, 0.0), (2000.0, 0.0)]),
            DistanceModel::Planar,
        )
        .unwrap();
        let table = text_table(&["name"], vec![vec![Value::from("A")], vec![Value::from("B")]]);
        let points = vec![Some(point!(x: 10.0, y: 0.0)), Some(point!(x: 20.0, y: 0.0))];

        let mut sink = MemorySink::new();
        let summary =
            translate_kp(&design, &table, &points, "design", &mut sink, &CancelAfter::new(1))
                .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.written, 1);
        assert!(sink.finished);
    }

    #[test]
    fn test_place_kp_from_table() {
        let table = text_table(
            &["kp", "note"],
            vec![
                vec![Value::Float(1.5), Value::from("joint")],
                vec![Value::from("n/a"), Value::from("bad")],
                vec![Value::Int(7), Value::from("beyond")],
                vec![Value::from("4"), Value::from("text kp")],
            ],
        );
        let mut sink = MemorySink::new();
        let summary =
            place_kp_from_table(&straight_table(), &table, "kp", "route", &mut sink, &Silent)
                .unwrap();

        assert_eq!(summary.written, 2);
        let skipped: Vec<usize> = summary.warnings.iter().map(|w| w.index).collect();
        assert_eq!(skipped, vec![1, 2]);
        assert_eq!(
            sink.schema.names().collect::<Vec<_>>(),
            ["kp", "note", "source_line", "kp_value"]
        );
        assert_eq!(
            sink.features[0].geometry,
            Some(Geometry::Point(point!(x: 1500.0, y: 0.0)))
        );
        assert_eq!(sink.value(1, "kp_value"), Some(&Value::Float(4.0)));
        assert_eq!(sink.value(1, "source_line"), Some(&Value::from("route")));
    }

    #[test]
    fn test_place_kp_from_table_missing_field() {
        let table = text_table(&["note"], vec![vec![Value::from("x")]]);
        let mut sink = MemorySink::new();
        let result = place_kp_from_table(&straight_table(), &table, "kp", "r", &mut sink, &Silent);
        assert!(matches!(result, Err(KpError::MissingField(_))));
    }

    #[test]
    fn test_place_single_kp_beyond_end() {
        let mut sink = MemorySink::new();
        let summary = place_single_kp(&straight_table(), 6.0, "r", &mut sink).unwrap();
        assert_eq!(summary.written, 0);
        assert_eq!(summary.warnings.len(), 1);
        assert!(sink.features.is_empty());
    }
}
