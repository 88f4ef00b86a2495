//! Trace ingestion - CSV text into typed rows
//!
//! Every cell is read as text and then coerced, so a bad value is reported
//! with its row and column instead of failing the whole decode.

use csv::{ReaderBuilder, StringRecord, Trim};
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::domain::error::{ConsistencyError, Result, SchemaError, Stage};
use crate::domain::table::{parse_float, parse_integer};
use crate::domain::types::{parse_datetime, ClusterId, EnrichedGpsPoint, GpsPoint, StopCluster};
use crate::services::validator::validate_table;

/// Columns every uploaded trace must carry
pub const TRACE_COLUMNS: [&str; 5] = ["route_id", "lat", "lon", "datetime", "unixtime"];

/// Optional column with labels assigned upstream
pub const CLUSTER_COLUMN: &str = "cluster_id";

/// A decoded single-vehicle trace
#[derive(Debug, Clone)]
pub struct Trace {
    pub points: Vec<GpsPoint>,
    /// Present when the input carried a `cluster_id` column
    pub labels: Option<Vec<ClusterId>>,
}

impl Trace {
    pub fn route_id(&self) -> Option<&str> {
        self.points.first().map(|p| p.route_id.as_str())
    }
}

#[inline]
fn field(record: &StringRecord, pos: usize) -> &str {
    record.get(pos).unwrap_or("")
}

fn text(stage: Stage, row: usize, column: &str, value: &str) -> std::result::Result<String, SchemaError> {
    if value.is_empty() {
        return Err(SchemaError::invalid(stage, row, column, value, "empty value"));
    }
    Ok(value.to_string())
}

fn float(stage: Stage, row: usize, column: &str, value: &str) -> std::result::Result<f64, SchemaError> {
    parse_float(value).ok_or_else(|| SchemaError::invalid(stage, row, column, value, "not a finite number"))
}

fn integer(stage: Stage, row: usize, column: &str, value: &str) -> std::result::Result<i64, SchemaError> {
    parse_integer(value).ok_or_else(|| SchemaError::invalid(stage, row, column, value, "not an integer"))
}

fn timestamp(stage: Stage, row: usize, column: &str, value: &str) -> std::result::Result<String, SchemaError> {
    match parse_datetime(value) {
        Some(_) => Ok(value.to_string()),
        None => Err(SchemaError::invalid(stage, row, column, value, "not a parseable timestamp")),
    }
}

/// Parse the five trace columns found at `pos` (in `TRACE_COLUMNS` order)
fn parse_point(
    stage: Stage,
    row: usize,
    record: &StringRecord,
    pos: &[usize],
) -> std::result::Result<GpsPoint, SchemaError> {
    let route_id = text(stage, row, "route_id", field(record, pos[0]))?;
    let lat = float(stage, row, "lat", field(record, pos[1]))?;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(SchemaError::invalid(stage, row, "lat", lat, "latitude out of range"));
    }
    let lon = float(stage, row, "lon", field(record, pos[2]))?;
    if !(-180.0..=180.0).contains(&lon) {
        return Err(SchemaError::invalid(stage, row, "lon", lon, "longitude out of range"));
    }
    let datetime = timestamp(stage, row, "datetime", field(record, pos[3]))?;
    let unixtime = integer(stage, row, "unixtime", field(record, pos[4]))?;
    Ok(GpsPoint { route_id, lat, lon, datetime, unixtime })
}

/// Decode an uploaded trace.
///
/// Extra columns are ignored; a `cluster_id` column is kept as labels.
/// The trace must describe exactly one route.
pub fn read_trace<R: Read>(reader: R, delimiter: u8) -> Result<Trace> {
    let mut rdr = ReaderBuilder::new().delimiter(delimiter).trim(Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut positions = Vec::with_capacity(TRACE_COLUMNS.len());
    let mut missing = Vec::new();
    for column in TRACE_COLUMNS {
        match headers.iter().position(|h| h == column) {
            Some(pos) => positions.push(pos),
            None => missing.push(column),
        }
    }
    if !missing.is_empty() {
        return Err(SchemaError::missing(Stage::Ingestion, &missing).into());
    }
    let cluster_pos = headers.iter().position(|h| h == CLUSTER_COLUMN);

    let mut points = Vec::new();
    let mut labels = cluster_pos.map(|_| Vec::new());
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        points.push(parse_point(Stage::Ingestion, row, &record, &positions)?);
        if let (Some(pos), Some(labels)) = (cluster_pos, labels.as_mut()) {
            labels.push(ClusterId(integer(Stage::Ingestion, row, CLUSTER_COLUMN, field(&record, pos))?));
        }
    }

    let mut seen = FxHashSet::default();
    let routes: Vec<String> =
        points.iter().filter(|p| seen.insert(p.route_id.as_str())).map(|p| p.route_id.clone()).collect();
    if routes.len() > 1 {
        return Err(ConsistencyError::MultipleRoutes { routes }.into());
    }

    info!(
        route_id = %routes.first().map(String::as_str).unwrap_or("-"),
        points = %points.len(),
        labeled = %labels.is_some(),
        "trace_loaded"
    );
    Ok(Trace { points, labels })
}

/// Decode a trace file from disk
pub fn read_trace_file(path: &Path, delimiter: u8) -> Result<Trace> {
    let file = File::open(path)?;
    read_trace(file, delimiter)
}

/// Read an exported enriched points table back into typed rows.
///
/// The table is checked against the visualization schema first.
pub fn read_enriched<R: Read>(reader: R, delimiter: u8) -> Result<Vec<EnrichedGpsPoint>> {
    const STAGE: Stage = Stage::Visualization;

    let mut rdr = ReaderBuilder::new().delimiter(delimiter).trim(Trim::All).from_reader(reader);
    let headers = rdr.headers()?.clone();
    let rows = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;
    // Schema column order: route_id, lat, lon, datetime, unixtime, cluster_id, aggregates...
    let pos = validate_table(&headers, &rows)?;

    let mut enriched = Vec::with_capacity(rows.len());
    for (row, record) in rows.iter().enumerate() {
        let point = parse_point(STAGE, row, record, &pos[..5])?;
        let cluster_id = ClusterId(integer(STAGE, row, "cluster_id", field(record, pos[5]))?);

        let stop = if field(record, pos[6]).is_empty() {
            None
        } else {
            Some(StopCluster {
                route_id: point.route_id.clone(),
                cluster_id,
                lat_centroid: float(STAGE, row, "lat_centroid", field(record, pos[6]))?,
                lon_centroid: float(STAGE, row, "lon_centroid", field(record, pos[7]))?,
                service_start_time: timestamp(STAGE, row, "service_start_time", field(record, pos[8]))?,
                service_end_time: timestamp(STAGE, row, "service_end_time", field(record, pos[9]))?,
                service_duration: integer(STAGE, row, "service_duration", field(record, pos[10]))?,
            })
        };

        enriched.push(EnrichedGpsPoint { point: point.labeled(cluster_id), stop });
    }
    Ok(enriched)
}
