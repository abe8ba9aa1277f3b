//! Output file selection for the `kp` binary.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use kproute::sink::{CsvGeometry, CsvSink, FeatureSink, GeoJsonSink};

fn is_geojson(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("geojson") || e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Open a sink for `path`; `.geojson`/`.json` write GeoJSON, anything else CSV.
/// CSV point layers get trailing `x`,`y` columns, other layers a `wkt` column.
pub fn open_sink(path: &Path, points: bool) -> Result<Box<dyn FeatureSink>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    let writer = BufWriter::new(file);
    Ok(if is_geojson(path) {
        Box::new(GeoJsonSink::new(writer))
    } else {
        let geometry = if points {
            CsvGeometry::Xy
        } else {
            CsvGeometry::Wkt
        };
        Box::new(CsvSink::new(writer, geometry))
    })
}

/// `routes.csv` + `lines` -> `routes_lines.csv`, next to the original
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
        None => format!("{}_{}", stem, suffix),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling_path(Path::new("out/nearest.geojson"), "lines"),
            PathBuf::from("out/nearest_lines.geojson")
        );
        assert_eq!(
            sibling_path(Path::new("nearest"), "on_line"),
            PathBuf::from("nearest_on_line")
        );
    }

    #[test]
    fn test_open_sink_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        let sink = open_sink(&path, true).unwrap();
        drop(sink);
        assert!(path.exists());
    }

    #[test]
    fn test_line_csv_gets_wkt_column() {
        use geo::{line_string, Geometry};
        use kproute::sink::{FieldKind, Schema};
        use kproute::Value;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segments.csv");
        let mut schema = Schema::new();
        schema.push("name", FieldKind::Text);

        let mut sink = open_sink(&path, false).unwrap();
        sink.begin(&schema).unwrap();
        let line = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)]);
        sink.accept(Some(&line), &[Value::from("seg")]).unwrap();
        sink.finish().unwrap();
        drop(sink);

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next(), Some("name,wkt"));
        assert!(lines.next().unwrap().starts_with("seg,"));
    }
}
