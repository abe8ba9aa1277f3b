//! Geometry operations the engine delegates: nearest point and union.

use geo::{
    BooleanOps, Closest, ClosestPoint, Coord, Distance, Euclidean, Geometry, LineString,
    MultiLineString, MultiPoint, MultiPolygon, Point,
};

use super::{geometry_kind, Route};
use crate::error::{KpError, Result};

pub trait GeometryService {
    /// Closest point on any part of the route, or `None` for an empty route
    fn nearest_point(&self, route: &Route, point: Point<f64>) -> Option<Point<f64>>;

    /// Union of two or more geometries of the same dimension
    fn union(&self, geometries: &[Geometry<f64>]) -> Result<Geometry<f64>>;
}

/// Planar implementation on top of `geo`
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarGeometry;

impl GeometryService for PlanarGeometry {
    fn nearest_point(&self, route: &Route, point: Point<f64>) -> Option<Point<f64>> {
        let mut best: Option<(f64, Point<f64>)> = None;

        for part in route.usable_parts() {
            let candidate = match part.closest_point(&point) {
                Closest::Intersection(p) | Closest::SinglePoint(p) => p,
                Closest::Indeterminate => continue,
            };
            let d = Euclidean.distance(point, candidate);
            // Strict comparison keeps the earliest part on ties
            if best.map_or(true, |(best_d, _)| d < best_d) {
                best = Some((d, candidate));
            }
        }

        best.map(|(_, p)| p)
    }

    fn union(&self, geometries: &[Geometry<f64>]) -> Result<Geometry<f64>> {
        match geometries {
            [] => Err(KpError::Union("no geometries to merge".to_string())),
            [single] => Ok(single.clone()),
            _ => {
                if let Some(polygons) = as_polygons(geometries) {
                    Ok(union_polygons(polygons))
                } else if let Some(lines) = as_lines(geometries) {
                    Ok(join_lines(lines))
                } else if let Some(points) = as_points(geometries) {
                    Ok(Geometry::MultiPoint(MultiPoint::new(points)))
                } else {
                    let kinds: Vec<&str> = geometries.iter().map(geometry_kind).collect();
                    Err(KpError::Union(format!(
                        "cannot merge mixed geometry types: {}",
                        kinds.join(", ")
                    )))
                }
            }
        }
    }
}

fn as_polygons(geometries: &[Geometry<f64>]) -> Option<Vec<MultiPolygon<f64>>> {
    geometries
        .iter()
        .map(|g| match g {
            Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
            Geometry::MultiPolygon(mp) => Some(mp.clone()),
            Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
            _ => None,
        })
        .collect()
}

fn as_lines(geometries: &[Geometry<f64>]) -> Option<Vec<LineString<f64>>> {
    let mut lines = Vec::new();
    for g in geometries {
        match g {
            Geometry::LineString(ls) => lines.push(ls.clone()),
            Geometry::MultiLineString(mls) => lines.extend(mls.0.iter().cloned()),
            Geometry::Line(l) => lines.push(LineString::new(vec![l.start, l.end])),
            _ => return None,
        }
    }
    Some(lines)
}

fn as_points(geometries: &[Geometry<f64>]) -> Option<Vec<Point<f64>>> {
    let mut points = Vec::new();
    for g in geometries {
        match g {
            Geometry::Point(p) => points.push(*p),
            Geometry::MultiPoint(mp) => points.extend(mp.0.iter().copied()),
            _ => return None,
        }
    }
    Some(points)
}

fn union_polygons(polygons: Vec<MultiPolygon<f64>>) -> Geometry<f64> {
    let mut iter = polygons.into_iter();
    let first = iter.next().unwrap_or_else(|| MultiPolygon::new(vec![]));
    let mut merged = iter.fold(first, |acc, next| acc.union(&next));

    if merged.0.len() == 1 {
        Geometry::Polygon(merged.0.remove(0))
    } else {
        Geometry::MultiPolygon(merged)
    }
}

/// Join lines whose end touches the next line's start; keep the rest as parts
fn join_lines(lines: Vec<LineString<f64>>) -> Geometry<f64> {
    let mut joined: Vec<Vec<Coord<f64>>> = Vec::new();

    for line in lines {
        if line.0.is_empty() {
            continue;
        }
        match joined.last_mut() {
            Some(current) if current.last() == line.0.first() => {
                current.extend(line.0.into_iter().skip(1));
            }
            _ => joined.push(line.0),
        }
    }

    if joined.len() == 1 {
        Geometry::LineString(LineString::new(joined.remove(0)))
    } else {
        Geometry::MultiLineString(MultiLineString::new(
            joined.into_iter().map(LineString::new).collect(),
        ))
    }
}
