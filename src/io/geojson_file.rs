use std::fs;
use std::path::Path;

use geojson::GeoJson;

use super::Table;
use crate::error::{KpError, Result};
use crate::models::Value;
use crate::sink::{Feature, FieldKind, Schema};

/// Read a GeoJSON FeatureCollection (or single Feature) into a table
pub fn read_geojson_table(path: &Path) -> Result<Table> {
    let content = fs::read_to_string(path)?;
    parse_geojson_table(&content)
}

fn parse_geojson_table(content: &str) -> Result<Table> {
    let features = match content.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![geojson::Feature {
            bbox: None,
            geometry: Some(g),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    let mut schema = Schema::new();
    for feature in &features {
        if let Some(props) = &feature.properties {
            for key in props.keys() {
                schema.push(key, FieldKind::Any);
            }
        }
    }

    let mut rows = Vec::with_capacity(features.len());
    for feature in features {
        let values = schema
            .names()
            .map(|name| {
                feature
                    .property(name)
                    .map(Value::from_json)
                    .unwrap_or(Value::Null)
            })
            .collect();

        let geometry = match feature.geometry {
            Some(g) => Some(
                geo_types::Geometry::<f64>::try_from(g)
                    .map_err(|e| KpError::UnsupportedGeometry(e.to_string()))?,
            ),
            None => None,
        };

        rows.push(Feature { geometry, values });
    }

    Ok(Table { schema, rows })
}
