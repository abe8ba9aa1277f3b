//! KP-range records and the groups produced by merging them.

use geo::Geometry;
use hashbrown::HashMap;

use super::Value;

/// Attribute name to value mapping for one record
pub type Attributes = HashMap<String, Value>;

/// One `[start, end]` KP interval with its grouping value
#[derive(Debug, Clone, PartialEq)]
pub struct KpRangeRecord {
    pub start: f64,
    pub end: f64,
    pub group: Value,
    /// Non-key attributes (start/end/group are not repeated here)
    pub attributes: Attributes,
    pub geometry: Option<Geometry<f64>>,
}

impl KpRangeRecord {
    pub fn new(start: f64, end: f64, group: impl Into<Value>) -> Self {
        Self {
            start,
            end,
            group: group.into(),
            attributes: Attributes::new(),
            geometry: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry<f64>) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Swap start and end when they are reversed
    pub fn normalize(&mut self) {
        if self.start > self.end {
            std::mem::swap(&mut self.start, &mut self.end);
        }
    }
}

/// A maximal run of adjacent records sharing one group value
#[derive(Debug, Clone, PartialEq)]
pub struct MergedGroup {
    pub start: f64,
    pub end: f64,
    pub group: Value,
    pub attributes: Attributes,
    pub geometry: Option<Geometry<f64>>,
    /// Number of input records folded into this group
    pub members: usize,
}
