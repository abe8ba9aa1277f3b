//! `kp` command-line tool.
//!
//! Nearest-KP projection, KP translation onto a design route, KP point
//! placement, KP range extraction and grouping of adjacent KP ranges over
//! CSV and GeoJSON files.

mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geo::Point;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use kproute::algorithms::{
    extract_ranges, group_adjacent, nearest_kp, place_kp_from_table, place_kp_points,
    place_single_kp, translate_kp, NearestSinks, RunSummary,
};
use kproute::feedback::{CancelFlag, ProgressBarFeedback};
use kproute::io::{load_routes, load_table, source_name, RangeFields, Table};
use kproute::merge::{AdjacentRangeMerger, AttributePolicy};
use kproute::projector::NearestProjector;
use kproute::route::{DistanceModel, DistanceTable, Route, RouteSampler};
use kproute::settings::Settings;

use crate::output::{open_sink, sibling_path};

#[derive(Parser, Debug)]
#[command(name = "kp")]
#[command(about = "Kilometre Point (KP) tools for cable route lines")]
struct Args {
    /// Remembered parameters, read before and written after each run
    #[arg(long, global = true, default_value = "kp.toml")]
    settings: PathBuf,

    /// Distance model for route lengths (defaults to the remembered one)
    #[arg(long, global = true, value_enum)]
    measure: Option<DistanceModel>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Nearest route and KP for every point
    Nearest {
        /// Point layer (CSV or GeoJSON)
        #[arg(short, long)]
        points: PathBuf,

        /// Route lines (CSV vertices or GeoJSON)
        #[arg(short, long)]
        routes: PathBuf,

        /// Points with route_id, distance_m, kp and kp_ref
        #[arg(short, long)]
        output: PathBuf,

        /// Connector lines (default: <output>_lines)
        #[arg(long)]
        lines_output: Option<PathBuf>,

        /// Also write projected points with range and bearing to the original
        #[arg(long)]
        point_on_line: Option<bool>,

        /// Point-on-line output (default: <output>_on_line)
        #[arg(long)]
        point_on_line_output: Option<PathBuf>,

        /// Read point coordinates from these two fields instead of the geometry
        #[arg(long, num_args = 2, value_names = ["X", "Y"])]
        xy_fields: Option<Vec<String>>,
    },

    /// KP and cross-course distance of every point on a design route
    Translate {
        /// Point layer (CSV or GeoJSON)
        #[arg(short, long)]
        points: PathBuf,

        /// Design route line (CSV vertices or GeoJSON)
        #[arg(short, long)]
        route: PathBuf,

        /// Points with design_route_kp, design_route_dcc and design_route_ref
        #[arg(short, long)]
        output: PathBuf,

        /// Read point coordinates from these two fields instead of the geometry
        #[arg(long, num_args = 2, value_names = ["X", "Y"])]
        xy_fields: Option<Vec<String>>,
    },

    /// Place a point for every row of a table at the KP it holds
    PlaceTable {
        #[arg(short, long)]
        route: PathBuf,

        /// Table with a KP field (CSV or GeoJSON)
        #[arg(short, long)]
        table: PathBuf,

        /// KP field name
        #[arg(long)]
        kp_field: Option<String>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Place a single point at a KP
    Place {
        #[arg(short, long)]
        route: PathBuf,

        /// KP in km
        #[arg(long)]
        kp: f64,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Place points at regular KP intervals
    Interval {
        #[arg(short, long)]
        route: PathBuf,

        /// Interval(s) in km, comma separated
        #[arg(short, long, value_delimiter = ',')]
        intervals: Option<Vec<f64>>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Extract route segments for start/end KP rows
    Extract {
        #[arg(short, long)]
        route: PathBuf,

        /// Table with start and end KP fields
        #[arg(long)]
        ranges: PathBuf,

        #[arg(long)]
        start_field: Option<String>,

        #[arg(long)]
        end_field: Option<String>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge adjacent KP ranges with the same group value
    Group {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        start_field: Option<String>,

        #[arg(long)]
        end_field: Option<String>,

        #[arg(long)]
        group_field: Option<String>,

        /// Largest gap (km) still counted as adjacent
        #[arg(long)]
        tolerance: Option<f64>,

        /// Sort records by start KP before merging
        #[arg(long)]
        sort_input: Option<bool>,

        /// Swap start and end when start > end
        #[arg(long)]
        auto_swap: Option<bool>,

        #[arg(long, value_enum)]
        policy: Option<AttributePolicy>,

        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut settings = Settings::load_from_file(&args.settings)
        .with_context(|| format!("Failed to read settings {}", args.settings.display()))?;
    if let Some(measure) = args.measure {
        settings.measure.model = measure;
    }
    let measure = settings.measure.model;
    info!("Distance model: {}", measure);

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .context("Failed to install interrupt handler")?;
    }

    let summary = match args.command {
        Command::Nearest {
            points,
            routes,
            output,
            lines_output,
            point_on_line,
            point_on_line_output,
            xy_fields,
        } => {
            if let Some(flag) = point_on_line {
                settings.nearest.point_on_line = flag;
            }

            let (table, query_points) = point_table(&points, xy_fields.as_deref())?;

            let routes_loaded = load_routes(&routes)
                .with_context(|| format!("Failed to load routes {}", routes.display()))?;
            let projector = NearestProjector::from_routes(routes_loaded, measure);
            if projector.is_empty() {
                anyhow::bail!("No usable route lines in {}", routes.display());
            }

            let lines_path = lines_output.unwrap_or_else(|| sibling_path(&output, "lines"));
            let mut points_sink = open_sink(&output, true)?;
            let mut lines_sink = open_sink(&lines_path, false)?;
            let mut pol_sink = if settings.nearest.point_on_line {
                let path = point_on_line_output.unwrap_or_else(|| sibling_path(&output, "on_line"));
                Some(open_sink(&path, true)?)
            } else {
                None
            };

            let feedback = ProgressBarFeedback::new("Nearest KP", cancel.clone());
            let summary = nearest_kp(
                &projector,
                &table,
                &query_points,
                &source_name(&routes),
                NearestSinks {
                    points: points_sink.as_mut(),
                    lines: lines_sink.as_mut(),
                    point_on_line: match pol_sink.as_mut() {
                        Some(sink) => Some(sink.as_mut()),
                        None => None,
                    },
                },
                &feedback,
            )?;
            feedback.finish();
            summary
        }

        Command::Translate {
            points,
            route,
            output,
            xy_fields,
        } => {
            let (table, query_points) = point_table(&points, xy_fields.as_deref())?;
            let design = route_sampler(&route, measure)?;
            let mut sink = open_sink(&output, true)?;
            let feedback = ProgressBarFeedback::new("Translate KP", cancel.clone());
            let summary = translate_kp(
                &design,
                &table,
                &query_points,
                &source_name(&route),
                sink.as_mut(),
                &feedback,
            )?;
            feedback.finish();
            summary
        }

        Command::PlaceTable {
            route,
            table,
            kp_field,
            output,
        } => {
            if let Some(f) = kp_field {
                settings.placement.kp_field = f;
            }

            let distances = route_table(&route, measure)?;
            let input = load_table(&table)
                .with_context(|| format!("Failed to load {}", table.display()))?;
            let mut sink = open_sink(&output, true)?;
            let feedback = ProgressBarFeedback::new("Place KP points", cancel.clone());
            let summary = place_kp_from_table(
                &distances,
                &input,
                &settings.placement.kp_field,
                &source_name(&route),
                sink.as_mut(),
                &feedback,
            )?;
            feedback.finish();
            summary
        }

        Command::Place { route, kp, output } => {
            let table = route_table(&route, measure)?;
            let mut sink = open_sink(&output, true)?;
            place_single_kp(&table, kp, &source_name(&route), sink.as_mut())?
        }

        Command::Interval {
            route,
            intervals,
            output,
        } => {
            if let Some(intervals) = intervals {
                settings.placement.intervals_km = intervals;
            }

            let table = route_table(&route, measure)?;
            let mut sink = open_sink(&output, true)?;
            let feedback = ProgressBarFeedback::new("KP intervals", cancel.clone());
            let summary = place_kp_points(
                &table,
                &settings.placement.intervals_km,
                &source_name(&route),
                sink.as_mut(),
                &feedback,
            )?;
            feedback.finish();
            summary
        }

        Command::Extract {
            route,
            ranges,
            start_field,
            end_field,
            output,
        } => {
            let stored = &mut settings.extract;
            if let Some(f) = start_field {
                stored.start_field = f;
            }
            if let Some(f) = end_field {
                stored.end_field = f;
            }

            let table = route_table(&route, measure)?;
            let input = load_table(&ranges)
                .with_context(|| format!("Failed to load ranges {}", ranges.display()))?;
            let mut sink = open_sink(&output, false)?;
            let feedback = ProgressBarFeedback::new("Extract KP ranges", cancel.clone());
            let summary = extract_ranges(
                &table,
                &input,
                &settings.extract.start_field,
                &settings.extract.end_field,
                (&source_name(&ranges), &source_name(&route)),
                sink.as_mut(),
                &feedback,
            )?;
            feedback.finish();
            summary
        }

        Command::Group {
            input,
            start_field,
            end_field,
            group_field,
            tolerance,
            sort_input,
            auto_swap,
            policy,
            output,
        } => {
            let stored = &mut settings.group_adjacent;
            if let Some(f) = start_field {
                stored.start_field = f;
            }
            if let Some(f) = end_field {
                stored.end_field = f;
            }
            if let Some(f) = group_field {
                stored.group_field = f;
            }
            if let Some(t) = tolerance {
                stored.options.tolerance = t;
            }
            if let Some(s) = sort_input {
                stored.options.sort_input = s;
            }
            if let Some(s) = auto_swap {
                stored.options.auto_swap = s;
            }
            if let Some(p) = policy {
                stored.options.policy = p;
            }
            if stored.group_field.is_empty() {
                anyhow::bail!("No group field given; pass --group-field");
            }

            let table = load_table(&input)
                .with_context(|| format!("Failed to load {}", input.display()))?;
            let stored = &settings.group_adjacent;
            let fields = RangeFields {
                start: &stored.start_field,
                end: &stored.end_field,
                group: Some(&stored.group_field),
            };
            let merger = AdjacentRangeMerger::new(stored.options.clone());
            let mut sink = open_sink(&output, false)?;
            let feedback = ProgressBarFeedback::new("Group adjacent KP ranges", cancel.clone());
            let summary = group_adjacent(&merger, &table, &fields, sink.as_mut(), &feedback)?;
            feedback.finish();
            summary
        }
    };

    report(&summary);

    settings
        .save_to_file(&args.settings)
        .with_context(|| format!("Failed to write settings {}", args.settings.display()))?;

    Ok(())
}

/// Point table and its query points, from geometry or the given x/y fields
fn point_table(
    path: &Path,
    xy_fields: Option<&[String]>,
) -> Result<(Table, Vec<Option<Point<f64>>>)> {
    let table =
        load_table(path).with_context(|| format!("Failed to load points {}", path.display()))?;
    let xy = xy_fields.and_then(|f| match f {
        [x, y] => Some((x.as_str(), y.as_str())),
        _ => None,
    });
    let points = table.points(xy)?;
    Ok((table, points))
}

/// All lines of a route file, joined in file order
fn load_route(path: &Path) -> Result<Route> {
    let routes = load_routes(path)
        .with_context(|| format!("Failed to load route {}", path.display()))?;
    if routes.len() > 1 {
        info!("Joining {} lines into one route", routes.len());
    }
    Ok(Route::concat(source_name(path), routes))
}

fn route_table(path: &Path, measure: DistanceModel) -> Result<DistanceTable> {
    let route = load_route(path)?;
    let table = DistanceTable::build(&route, &measure)
        .with_context(|| format!("Route {} is not usable", path.display()))?;
    info!("Route length: {:.3} km", table.total_km());
    Ok(table)
}

fn route_sampler(path: &Path, measure: DistanceModel) -> Result<RouteSampler<DistanceModel>> {
    let sampler = RouteSampler::new(load_route(path)?, measure)
        .with_context(|| format!("Route {} is not usable", path.display()))?;
    info!("Design route length: {:.3} km", sampler.table().total_km());
    Ok(sampler)
}

fn report(summary: &RunSummary) {
    if !summary.warnings.is_empty() {
        warn!("{} record(s) skipped", summary.warnings.len());
    }
    if summary.cancelled {
        warn!("Cancelled; output holds partial results");
    }
    info!("Done: {} feature(s) written", summary.written);
}
