//! Error types for the KP engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KpError>;

#[derive(Debug, Error)]
pub enum KpError {
    /// Route has no part with at least two vertices
    #[error("route is empty: no part has at least two vertices")]
    EmptyRoute,

    #[error("route has zero length")]
    ZeroLengthRoute,

    #[error("KP {kp} is outside the route (length {length_km:.3} km)")]
    KpOutOfRange { kp: f64, length_km: f64 },

    #[error("KP range {start}-{end} exceeds total line length of {length_km:.3} km")]
    RangeExceedsLength { start: f64, end: f64, length_km: f64 },

    /// Start is negative or greater than end
    #[error("invalid KP range {start}-{end}")]
    InvalidRange { start: f64, end: f64 },

    #[error("invalid interval {interval_km} km: {reason}")]
    InvalidInterval { interval_km: f64, reason: String },

    #[error("field '{0}' not found in input")]
    MissingField(String),

    #[error("non-numeric KP value '{value}' in field '{field}'")]
    NonNumericKp { field: String, value: String },

    #[error("geometry union failed: {0}")]
    Union(String),

    #[error("unsupported geometry: {0}")]
    UnsupportedGeometry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    GeoJson(#[from] geojson::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl KpError {
    /// True for problems tied to one input record rather than the request
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            KpError::KpOutOfRange { .. }
                | KpError::RangeExceedsLength { .. }
                | KpError::InvalidRange { .. }
                | KpError::NonNumericKp { .. }
        )
    }
}

/// Warning raised against a single input record that was skipped
#[derive(Debug, Clone, PartialEq)]
pub struct RecordWarning {
    pub index: usize,
    pub message: String,
}

impl RecordWarning {
    pub fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RecordWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "record {}: {}", self.index, self.message)
    }
}
