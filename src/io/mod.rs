//! File input: CSV tables and GeoJSON layers.

mod delimited;
mod geojson_file;

pub use delimited::{read_csv_table, read_csv_vertices};

use delimited::coordinate_columns;
pub use geojson_file::read_geojson_table;

use std::path::Path;

use geo::{Geometry, Point};
use tracing::{debug, info};

use crate::error::{KpError, RecordWarning, Result};
use crate::models::{Attributes, KpRangeRecord, Value};
use crate::route::Route;
use crate::sink::{Feature, Schema};

/// Rows of attribute values in schema order, with optional geometry
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub schema: Schema,
    pub rows: Vec<Feature>,
}

/// Field names used to read KP-range records from a table
#[derive(Debug, Clone)]
pub struct RangeFields<'a> {
    pub start: &'a str,
    pub end: &'a str,
    /// Grouping field; ranges without one get a null group
    pub group: Option<&'a str>,
}

impl Table {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn require(&self, field: &str) -> Result<usize> {
        self.schema
            .index_of(field)
            .ok_or_else(|| KpError::MissingField(field.to_string()))
    }

    /// Convert rows into KP-range records. Missing fields fail the whole
    /// request; non-numeric KPs skip the row with a warning.
    pub fn range_records(
        &self,
        fields: &RangeFields<'_>,
    ) -> Result<(Vec<(usize, KpRangeRecord)>, Vec<RecordWarning>)> {
        let start_idx = self.require(fields.start)?;
        let end_idx = self.require(fields.end)?;
        let group_idx = fields.group.map(|g| self.require(g)).transpose()?;

        let mut records = Vec::with_capacity(self.rows.len());
        let mut warnings = Vec::new();

        for (row_idx, row) in self.rows.iter().enumerate() {
            let start = numeric(&row.values[start_idx], fields.start);
            let end = numeric(&row.values[end_idx], fields.end);
            let (start, end) = match (start, end) {
                (Ok(s), Ok(e)) => (s, e),
                (Err(e), _) | (_, Err(e)) => {
                    warnings.push(RecordWarning::new(row_idx, e.to_string()));
                    continue;
                }
            };

            let mut attributes = Attributes::new();
            for (col, field) in self.schema.fields().iter().enumerate() {
                if col == start_idx || col == end_idx || Some(col) == group_idx {
                    continue;
                }
                attributes.insert(field.name.clone(), row.values[col].clone());
            }

            records.push((
                row_idx,
                KpRangeRecord {
                    start,
                    end,
                    group: group_idx
                        .map(|g| row.values[g].clone())
                        .unwrap_or(Value::Null),
                    attributes,
                    geometry: row.geometry.clone(),
                },
            ));
        }

        Ok((records, warnings))
    }

    /// Point geometries per row: from the named `x`/`y` fields, from the
    /// geometry column, or, when no row has a geometry, from the usual
    /// coordinate columns (`x`/`lon`/`easting`, `y`/`lat`/`northing`)
    pub fn points(&self, xy_fields: Option<(&str, &str)>) -> Result<Vec<Option<Point<f64>>>> {
        let xy = match xy_fields {
            Some((x, y)) => Some((self.require(x)?, self.require(y)?)),
            None if self.rows.iter().all(|r| r.geometry.is_none()) => {
                let found = coordinate_columns(&self.schema);
                if let Some((x, y)) = found {
                    debug!(
                        "Reading points from columns '{}' and '{}'",
                        self.schema.fields()[x].name,
                        self.schema.fields()[y].name
                    );
                }
                found
            }
            None => None,
        };

        Ok(self
            .rows
            .iter()
            .map(|row| match (xy, &row.geometry) {
                (Some((xi, yi)), _) => {
                    let x = row.values[xi].as_f64()?;
                    let y = row.values[yi].as_f64()?;
                    Some(Point::new(x, y))
                }
                (None, Some(Geometry::Point(p))) => Some(*p),
                (None, Some(Geometry::MultiPoint(mp))) => mp.0.first().copied(),
                _ => None,
            })
            .collect())
    }
}

fn numeric(value: &Value, field: &str) -> Result<f64> {
    value.as_f64().ok_or_else(|| KpError::NonNumericKp {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn is_geojson(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Load a table from a `.csv` or `.geojson` file
pub fn load_table(path: &Path) -> Result<Table> {
    let table = if is_geojson(path) {
        read_geojson_table(path)?
    } else {
        read_csv_table(path)?
    };
    info!(
        "Loaded {} rows ({} fields) from {}",
        table.len(),
        table.schema.len(),
        path.display()
    );
    Ok(table)
}

/// Load route lines. GeoJSON: one route per line feature, in file order.
/// CSV: vertex rows with `x`,`y` and optional `route`/`part` columns.
pub fn load_routes(path: &Path) -> Result<Vec<Route>> {
    let routes = if is_geojson(path) {
        let table = read_geojson_table(path)?;
        let id_col = table.schema.index_of("id").or_else(|| table.schema.index_of("name"));
        let mut routes = Vec::new();
        for (idx, row) in table.rows.iter().enumerate() {
            let Some(geometry) = &row.geometry else {
                continue;
            };
            let id = id_col
                .map(|c| row.values[c].clone())
                .unwrap_or(Value::Int(idx as i64));
            routes.push(Route::from_geometry(id, geometry)?);
        }
        routes
    } else {
        read_csv_vertices(path)?
    };
    info!("Loaded {} route(s) from {}", routes.len(), path.display());
    Ok(routes)
}

/// Display name for a file, used as `kp_ref` / `source_line`
pub fn source_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}
