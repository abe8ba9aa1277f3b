//! Remembered parameters from the previous invocation.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::merge::MergeOptions;
use crate::route::DistanceModel;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub measure: MeasureSettings,
    pub nearest: NearestSettings,
    pub extract: ExtractSettings,
    pub group_adjacent: GroupAdjacentSettings,
    pub placement: PlacementSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureSettings {
    pub model: DistanceModel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NearestSettings {
    pub point_on_line: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSettings {
    pub start_field: String,
    pub end_field: String,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            start_field: "start_kp".to_string(),
            end_field: "end_kp".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupAdjacentSettings {
    pub start_field: String,
    pub end_field: String,
    pub group_field: String,
    #[serde(flatten)]
    pub options: MergeOptions,
}

impl Default for GroupAdjacentSettings {
    fn default() -> Self {
        Self {
            start_field: "start_kp".to_string(),
            end_field: "end_kp".to_string(),
            group_field: String::new(),
            options: MergeOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSettings {
    pub intervals_km: Vec<f64>,
    /// Field holding the KP when placing points from a table
    pub kp_field: String,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            intervals_km: vec![1.0],
            kp_field: "kp_value".to_string(),
        }
    }
}

impl Settings {
    /// Load settings; a missing file gives defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::AttributePolicy;

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from_file(dir.path().join("none.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.group_adjacent.options.sort_input);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kp.toml");

        let mut settings = Settings::default();
        settings.measure.model = DistanceModel::Planar;
        settings.group_adjacent.group_field = "burial_method".to_string();
        settings.group_adjacent.options.tolerance = 0.01;
        settings.group_adjacent.options.policy = AttributePolicy::NullOnConflict;
        settings.placement.intervals_km = vec![1.0, 50.0];
        settings.save_to_file(&path).unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kp.toml");
        fs::write(&path, "[group_adjacent]\ngroup_field = \"method\"\npolicy = \"null_on_conflict\"\n")
            .unwrap();

        let loaded = Settings::load_from_file(&path).unwrap();
        assert_eq!(loaded.group_adjacent.group_field, "method");
        assert_eq!(loaded.group_adjacent.options.policy, AttributePolicy::NullOnConflict);
        assert_eq!(loaded.extract.start_field, "start_kp");
        assert_eq!(loaded.placement.kp_field, "kp_value");
    }
}
