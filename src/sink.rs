//! Feature sinks: an ordered schema followed by a stream of features.

use std::io::Write;

use geo::Geometry;
use geozero::ToWkt;
use serde_json::Map;

use crate::error::{KpError, Result};
use crate::models::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Double,
    Text,
    /// Copied from an input whose column type is unknown
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

impl Field {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// Ordered attribute schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, kind: FieldKind) -> Self {
        self.push(name, kind);
        self
    }

    /// Append a field; a name already present is left where it is
    pub fn push(&mut self, name: &str, kind: FieldKind) {
        if !self.contains(name) {
            self.fields.push(Field::new(name, kind));
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A feature as written to a sink
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub values: Vec<Value>,
}

pub trait FeatureSink {
    /// Called once before any feature
    fn begin(&mut self, schema: &Schema) -> Result<()>;

    /// `values` are in schema order
    fn accept(&mut self, geometry: Option<&Geometry<f64>>, values: &[Value]) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

/// Keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub schema: Schema,
    pub features: Vec<Feature>,
    pub finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `field` on feature `idx`
    pub fn value(&self, idx: usize, field: &str) -> Option<&Value> {
        let col = self.schema.index_of(field)?;
        self.features.get(idx)?.values.get(col)
    }
}

impl FeatureSink for MemorySink {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        self.schema = schema.clone();
        Ok(())
    }

    fn accept(&mut self, geometry: Option<&Geometry<f64>>, values: &[Value]) -> Result<()> {
        self.features.push(Feature {
            geometry: geometry.cloned(),
            values: values.to_vec(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// How `CsvSink` writes feature geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvGeometry {
    /// Trailing `x`,`y` columns; anything but a point leaves them empty
    Xy,
    /// Trailing `wkt` column
    Wkt,
}

/// CSV output with geometry as `x`,`y` or WKT columns
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    geometry: CsvGeometry,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W, geometry: CsvGeometry) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            geometry,
        }
    }

    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner().ok()
    }
}

impl<W: Write> FeatureSink for CsvSink<W> {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        let mut header: Vec<&str> = schema.names().collect();
        match self.geometry {
            CsvGeometry::Xy => header.extend(["x", "y"]),
            CsvGeometry::Wkt => header.push("wkt"),
        }
        self.writer.write_record(&header)?;
        Ok(())
    }

    fn accept(&mut self, geometry: Option<&Geometry<f64>>, values: &[Value]) -> Result<()> {
        let mut row: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        match (self.geometry, geometry) {
            (CsvGeometry::Xy, Some(Geometry::Point(p))) => {
                row.push(p.x().to_string());
                row.push(p.y().to_string());
            }
            (CsvGeometry::Xy, _) => row.extend([String::new(), String::new()]),
            (CsvGeometry::Wkt, Some(g)) => row.push(
                g.to_wkt()
                    .map_err(|e| KpError::UnsupportedGeometry(e.to_string()))?,
            ),
            (CsvGeometry::Wkt, None) => row.push(String::new()),
        }
        self.writer.write_record(&row)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// GeoJSON FeatureCollection, written out on `finish`
pub struct GeoJsonSink<W: Write> {
    writer: W,
    names: Vec<String>,
    features: Vec<geojson::Feature>,
}

impl<W: Write> GeoJsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            names: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FeatureSink for GeoJsonSink<W> {
    fn begin(&mut self, schema: &Schema) -> Result<()> {
        self.names = schema.names().map(str::to_string).collect();
        Ok(())
    }

    fn accept(&mut self, geometry: Option<&Geometry<f64>>, values: &[Value]) -> Result<()> {
        let mut properties = Map::new();
        for (name, value) in self.names.iter().zip(values) {
            properties.insert(name.clone(), value.to_json());
        }

        self.features.push(geojson::Feature {
            bbox: None,
            geometry: geometry.map(|g| geojson::Geometry::new(geojson::Value::from(g))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let collection = geojson::FeatureCollection {
            bbox: None,
            features: std::mem::take(&mut self.features),
            foreign_members: None,
        };
        serde_json::to_writer(&mut self.writer, &collection)?;
        self.writer.flush()?;
        Ok(())
    }
}
