//! Result egress - writes enriched points and stop tables
//!
//! - points: CSV, null aggregates as empty cells
//! - stops: CSV with the duration column labeled in seconds
//! - stops (optional): JSONL, one object per stop

use anyhow::Context;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::domain::types::{EnrichedGpsPoint, StopCluster};
use crate::infra::Config;
use crate::services::pipeline::PipelineOutput;

/// Stop table header as shown to users
pub const STOP_COLUMNS: [&str; 7] = [
    "route_id",
    "cluster_id",
    "lat_centroid",
    "lon_centroid",
    "service_start_time",
    "service_end_time",
    "service_duration (seconds)",
];

/// Write enriched points as CSV
pub fn write_points<W: Write>(writer: W, points: &[EnrichedGpsPoint]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(EnrichedGpsPoint::COLUMNS)?;
    for point in points {
        wtr.write_record(point.cells().iter().map(|c| c.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the stop table as CSV
pub fn write_stops<W: Write>(writer: W, stops: &[StopCluster]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(STOP_COLUMNS)?;
    for s in stops {
        wtr.write_record([
            s.route_id.clone(),
            s.cluster_id.to_string(),
            s.lat_centroid.to_string(),
            s.lon_centroid.to_string(),
            s.service_start_time.clone(),
            s.service_end_time.clone(),
            s.service_duration.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write stops as JSONL
pub fn write_stops_jsonl<W: Write>(mut writer: W, stops: &[StopCluster]) -> std::io::Result<()> {
    for stop in stops {
        writeln!(writer, "{}", stop.to_json())?;
    }
    writer.flush()
}

/// Create `path` (and missing parent directories) for writing
fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Write every configured output of a pipeline run
pub fn write_output(config: &Config, output: &PipelineOutput) -> anyhow::Result<()> {
    let points_path = config.points_path();
    write_points(create(&points_path)?, &output.points)
        .with_context(|| format!("Failed to write {}", points_path.display()))?;
    info!(path = %points_path.display(), rows = %output.points.len(), "points_written");

    let stops_path = config.stops_path();
    write_stops(create(&stops_path)?, &output.stops)
        .with_context(|| format!("Failed to write {}", stops_path.display()))?;
    info!(path = %stops_path.display(), rows = %output.stops.len(), "stops_written");

    if let Some(jsonl_path) = config.stops_jsonl_path() {
        write_stops_jsonl(create(&jsonl_path)?, &output.stops)
            .with_context(|| format!("Failed to write {}", jsonl_path.display()))?;
        debug!(path = %jsonl_path.display(), "stops_jsonl_written");
    }

    Ok(())
}
