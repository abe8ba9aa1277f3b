//! kproute - Kilometre Point (KP) linear referencing along cable routes
//!
//! This library provides the distance tables, projection, extraction,
//! placement and merge operations used by the `kp` binary.

pub mod algorithms;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod io;
pub mod merge;
pub mod models;
pub mod placement;
pub mod projector;
pub mod route;
pub mod settings;
pub mod sink;

pub use error::{KpError, RecordWarning, Result};
pub use models::{KpLocation, KpRangeRecord, MergedGroup, PointOnLine, ProjectionResult, Value};
pub use route::{DistanceModel, DistanceTable, Measure, Route, RouteSampler};
