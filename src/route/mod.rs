//! Routes as 1-D coordinate systems.
//!
//! A route is one or more polyline parts concatenated in caller order. The
//! [`DistanceTable`] built from it maps along-route distance (KP) to position
//! and back, using a pluggable [`Measure`] for every length.

mod geometry;
mod measure;
mod sampler;
mod table;

pub use geometry::{GeometryService, PlanarGeometry};
pub use measure::{DistanceModel, Measure};
pub use sampler::RouteSampler;
pub use table::{DistanceTable, Segment, LENGTH_EPSILON_M, ON_SEGMENT_EPSILON};

use geo::{Coord, Geometry, LineString, MultiLineString};

use crate::error::{KpError, Result};
use crate::models::Value;

/// An ordered sequence of polyline parts treated as one logical line
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: Value,
    parts: Vec<LineString<f64>>,
}

impl Route {
    pub fn new(id: impl Into<Value>, parts: Vec<LineString<f64>>) -> Self {
        Self {
            id: id.into(),
            parts,
        }
    }

    pub fn from_coords(id: impl Into<Value>, coords: Vec<(f64, f64)>) -> Self {
        let line: LineString<f64> = coords.into_iter().map(|(x, y)| Coord { x, y }).collect();
        Self::new(id, vec![line])
    }

    /// Build a route from a line geometry; parts keep their stored order
    pub fn from_geometry(id: impl Into<Value>, geometry: &Geometry<f64>) -> Result<Self> {
        let mut parts = Vec::new();
        collect_parts(geometry, &mut parts)?;
        Ok(Self::new(id, parts))
    }

    /// Concatenate several routes (e.g. every feature of a line layer) into one
    pub fn concat(id: impl Into<Value>, routes: impl IntoIterator<Item = Route>) -> Self {
        let parts = routes.into_iter().flat_map(|r| r.parts).collect();
        Self::new(id, parts)
    }

    pub fn parts(&self) -> &[LineString<f64>] {
        &self.parts
    }

    /// Parts that can contribute at least one segment
    pub fn usable_parts(&self) -> impl Iterator<Item = &LineString<f64>> {
        self.parts.iter().filter(|p| p.0.len() >= 2)
    }

    pub fn is_empty(&self) -> bool {
        self.usable_parts().next().is_none()
    }

    pub fn to_multi_line_string(&self) -> MultiLineString<f64> {
        MultiLineString::new(self.usable_parts().cloned().collect())
    }
}

fn collect_parts(geometry: &Geometry<f64>, parts: &mut Vec<LineString<f64>>) -> Result<()> {
    match geometry {
        Geometry::LineString(ls) => parts.push(ls.clone()),
        Geometry::MultiLineString(mls) => parts.extend(mls.0.iter().cloned()),
        Geometry::Line(line) => parts.push(LineString::new(vec![line.start, line.end])),
        Geometry::GeometryCollection(gc) => {
            for g in gc.iter() {
                collect_parts(g, parts)?;
            }
        }
        other => {
            return Err(KpError::UnsupportedGeometry(format!(
                "expected a line geometry, found {}",
                geometry_kind(other)
            )))
        }
    }
    Ok(())
}

pub(crate) fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
