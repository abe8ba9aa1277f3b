//! Merges adjacent KP ranges that share a group value.
//!
//! Example with tolerance 0:
//!
//! ```text
//! 1,2,plough   \
//! 2,3,plough   /  -> 1,3,plough
//! 3,4,skip     \
//! 4,5,skip     /  -> 3,5,skip
//! 5,6,plough      -> 5,6,plough
//! ```

use geo::{Geometry, HasDimensions};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::feedback::{scaled_percent, Feedback};
use crate::models::{Attributes, KpRangeRecord, MergedGroup, Value};
use crate::route::{GeometryService, PlanarGeometry};

/// How non-key attributes combine when records merge
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum AttributePolicy {
    /// Keep the first record's values
    #[default]
    FirstWins,
    /// Null any attribute whose values differ within the group
    NullOnConflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Maximum gap (km) between one range's end and the next range's start
    pub tolerance: f64,
    /// Sort records by `(start, end)` before merging
    pub sort_input: bool,
    /// Swap start/end on records where start > end
    pub auto_swap: bool,
    pub policy: AttributePolicy,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            tolerance: 0.0,
            sort_input: true,
            auto_swap: true,
            policy: AttributePolicy::FirstWins,
        }
    }
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub groups: Vec<MergedGroup>,
    /// Number of records that went into the merge pass
    pub input_records: usize,
    pub cancelled: bool,
}

/// A run being accumulated
#[derive(Debug)]
struct Run {
    start: f64,
    end: f64,
    group: Value,
    attributes: Attributes,
    geometries: Vec<Geometry<f64>>,
    members: usize,
}

impl Run {
    fn seed(record: KpRangeRecord) -> Self {
        let mut geometries = Vec::new();
        push_geometry(&mut geometries, record.geometry);
        Self {
            start: record.start,
            end: record.end,
            group: record.group,
            attributes: record.attributes,
            geometries,
            members: 1,
        }
    }
}

#[derive(Debug)]
enum RunState {
    Idle,
    Accumulating(Run),
}

fn push_geometry(geometries: &mut Vec<Geometry<f64>>, geometry: Option<Geometry<f64>>) {
    if let Some(g) = geometry {
        if !g.is_empty() {
            geometries.push(g);
        }
    }
}

pub struct AdjacentRangeMerger<G = PlanarGeometry> {
    options: MergeOptions,
    geometry: G,
}

impl AdjacentRangeMerger<PlanarGeometry> {
    pub fn new(options: MergeOptions) -> Self {
        Self::with_geometry(options, PlanarGeometry)
    }
}

impl<G: GeometryService> AdjacentRangeMerger<G> {
    pub fn with_geometry(options: MergeOptions, geometry: G) -> Self {
        Self { options, geometry }
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge records into maximal runs; a run in progress is always emitted,
    /// including when cancelled
    pub fn merge<F: Feedback + ?Sized>(
        &self,
        mut records: Vec<KpRangeRecord>,
        feedback: &F,
    ) -> MergeOutcome {
        if self.options.auto_swap {
            records.iter_mut().for_each(KpRangeRecord::normalize);
        }
        if self.options.sort_input {
            records.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));
        }

        let total = records.len();
        let mut outcome = MergeOutcome {
            input_records: total,
            ..Default::default()
        };
        let mut state = RunState::Idle;

        for (idx, record) in records.into_iter().enumerate() {
            if feedback.is_cancelled() {
                info!("Merge cancelled after {} of {} records", idx, total);
                outcome.cancelled = true;
                break;
            }

            state = match state {
                RunState::Idle => RunState::Accumulating(Run::seed(record)),
                RunState::Accumulating(mut run) => {
                    if self.can_merge(&run, &record) {
                        self.extend(&mut run, record);
                        RunState::Accumulating(run)
                    } else {
                        outcome.groups.push(self.finish(run));
                        RunState::Accumulating(Run::seed(record))
                    }
                }
            };

            feedback.set_progress(scaled_percent(idx + 1, total, 0, 100));
        }

        if let RunState::Accumulating(run) = state {
            outcome.groups.push(self.finish(run));
        }

        info!(
            "Created {} grouped KP ranges (from {} input rows)",
            outcome.groups.len(),
            total
        );
        outcome
    }

    fn can_merge(&self, run: &Run, record: &KpRangeRecord) -> bool {
        record.group == run.group && (run.end - record.start).abs() <= self.options.tolerance
    }

    fn extend(&self, run: &mut Run, record: KpRangeRecord) {
        run.end = run.end.max(record.end);
        run.members += 1;

        if self.options.policy == AttributePolicy::NullOnConflict {
            merge_null_on_conflict(&mut run.attributes, &record.attributes);
        }

        push_geometry(&mut run.geometries, record.geometry);
    }

    fn finish(&self, mut run: Run) -> MergedGroup {
        let geometry = match run.geometries.len() {
            0 => None,
            1 => run.geometries.pop(),
            _ => match self.geometry.union(&run.geometries) {
                Ok(g) => Some(g),
                Err(e) => {
                    warn!(
                        "Could not merge geometries for group {} ({}-{}): {}; keeping the first",
                        run.group, run.start, run.end, e
                    );
                    Some(run.geometries.swap_remove(0))
                }
            },
        };

        MergedGroup {
            start: run.start,
            end: run.end,
            group: run.group,
            attributes: run.attributes,
            geometry,
            members: run.members,
        }
    }
}

/// Null out every attribute where the incoming value disagrees. Missing
/// attributes count as null, and null agrees with null.
fn merge_null_on_conflict(base: &mut Attributes, incoming: &Attributes) {
    for (name, value) in base.iter_mut() {
        let other = incoming.get(name).unwrap_or(&Value::Null);
        if value != other {
            *value = Value::Null;
        }
    }
    for (name, value) in incoming {
        if !value.is_null() && !base.contains_key(name) {
            base.insert(name.clone(), Value::Null);
        }
    }
}
