use std::fs::File;
use std::path::Path;

use csv::ReaderBuilder;
use geo::{Coord, LineString};
use hashbrown::HashMap;

use super::Table;
use crate::error::{KpError, Result};
use crate::models::Value;
use crate::route::Route;
use crate::sink::{Feature, FieldKind, Schema};

/// Read a CSV file with a header row; cells are parsed with [`Value::parse`]
pub fn read_csv_table(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    read_csv_from(file)
}

fn read_csv_from<R: std::io::Read>(reader: R) -> Result<Table> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut schema = Schema::new();
    for header in csv_reader.headers()?.iter() {
        schema.push(header.trim(), FieldKind::Any);
    }

    let mut rows = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        let mut values: Vec<Value> = record.iter().map(Value::parse).collect();
        values.resize(schema.len(), Value::Null);
        rows.push(Feature {
            geometry: None,
            values,
        });
    }

    Ok(Table { schema, rows })
}

const X_COLUMNS: &[&str] = &["x", "lon", "longitude", "easting"];
const Y_COLUMNS: &[&str] = &["y", "lat", "latitude", "northing"];

fn find_column(schema: &Schema, candidates: &[&str]) -> Option<usize> {
    schema.fields().iter().position(|f| {
        candidates
            .iter()
            .any(|c| f.name.eq_ignore_ascii_case(c))
    })
}

/// Indices of the conventional x and y coordinate columns, if both exist
pub(crate) fn coordinate_columns(schema: &Schema) -> Option<(usize, usize)> {
    Some((find_column(schema, X_COLUMNS)?, find_column(schema, Y_COLUMNS)?))
}

/// Read route vertices from CSV. Rows are grouped by the optional `route`
/// column, then by the optional `part` column, both in first-seen order.
pub fn read_csv_vertices(path: &Path) -> Result<Vec<Route>> {
    let file = File::open(path)?;
    vertices_from_table(&read_csv_from(file)?)
}

fn vertices_from_table(table: &Table) -> Result<Vec<Route>> {
    let x_col = find_column(&table.schema, X_COLUMNS)
        .ok_or_else(|| KpError::MissingField("x".to_string()))?;
    let y_col = find_column(&table.schema, Y_COLUMNS)
        .ok_or_else(|| KpError::MissingField("y".to_string()))?;
    let route_col = find_column(&table.schema, &["route", "route_id"]);
    let part_col = find_column(&table.schema, &["part"]);

    // route key -> (route id, part key -> part index, parts)
    let mut order: Vec<String> = Vec::new();
    let mut routes: HashMap<String, (Value, HashMap<String, usize>, Vec<Vec<Coord<f64>>>)> =
        HashMap::new();

    for (idx, row) in table.rows.iter().enumerate() {
        let (Some(x), Some(y)) = (row.values[x_col].as_f64(), row.values[y_col].as_f64()) else {
            return Err(KpError::UnsupportedGeometry(format!(
                "non-numeric vertex '{},{}' at row {}",
                row.values[x_col],
                row.values[y_col],
                idx + 1
            )));
        };

        let route_value = route_col
            .map(|c| row.values[c].clone())
            .unwrap_or(Value::Int(0));
        let route_key = route_value.to_string();
        let part_key = part_col
            .map(|c| row.values[c].to_string())
            .unwrap_or_default();

        let entry = routes.entry(route_key.clone()).or_insert_with(|| {
            order.push(route_key);
            (route_value, HashMap::new(), Vec::new())
        });
        let (_, part_index, parts) = entry;
        let next = parts.len();
        let part_idx = *part_index.entry(part_key).or_insert(next);
        if part_idx == parts.len() {
            parts.push(Vec::new());
        }
        parts[part_idx].push(Coord { x, y });
    }

    Ok(order
        .into_iter()
        .filter_map(|key| routes.remove(&key))
        .map(|(id, _, parts)| Route::new(id, parts.into_iter().map(LineString::new).collect()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_csv_table() {
        let data = "start_kp,end_kp,method\n1,2,plough\n2.5,,skip\n";
        let table = read_csv_from(data.as_bytes()).unwrap();
        assert_eq!(table.schema.names().collect::<Vec<_>>(), ["start_kp", "end_kp", "method"]);
        assert_eq!(table.rows[0].values[0], Value::Int(1));
        assert_eq!(table.rows[1].values[1], Value::Null);
        assert_eq!(table.rows[1].values[2], Value::from("skip"));
    }

    #[test]
    fn test_short_rows_padded() {
        let data = "a,b,c\n1\n";
        let table = read_csv_from(data.as_bytes()).unwrap();
        assert_eq!(table.rows[0].values.len(), 3);
    }

    #[test]
    fn test_vertices_grouped_by_route_and_part() {
        let data = "route,part,x,y\nB,0,0,0\nB,0,1,0\nA,0,5,5\nA,0,6,5\nB,1,2,0\nB,1,3,0\n";
        let table = read_csv_from(data.as_bytes()).unwrap();
        let routes = vertices_from_table(&table).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].id, Value::from("B"));
        assert_eq!(routes[0].parts().len(), 2);
        assert_eq!(routes[1].parts()[0].0.len(), 2);
    }

    #[test]
    fn test_vertices_single_route_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "lon,lat\n1.0,52.0\n1.1,52.0\n").unwrap();
        let routes = read_csv_vertices(file.path()).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].parts()[0].0[1], Coord { x: 1.1, y: 52.0 });
    }

    #[test]
    fn test_vertices_missing_columns() {
        let table = read_csv_from("a,b\n1,2\n".as_bytes()).unwrap();
        assert!(matches!(
            vertices_from_table(&table),
            Err(KpError::MissingField(_))
        ));
    }
}
