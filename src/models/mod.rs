//! Core data models for the KP engine.

pub mod projection;
pub mod record;
pub mod value;

pub use projection::{KpLocation, PointOnLine, ProjectionResult};
pub use record::{Attributes, KpRangeRecord, MergedGroup};
pub use value::{round3, Value};
