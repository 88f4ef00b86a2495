//! Trace and stop types shared by every pipeline stage

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;

use crate::domain::table::Cell;

/// Mean earth radius used for haversine distances (meters)
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Accepted `datetime` layouts, tried in order after RFC 3339
const DATETIME_FORMATS: [&str; 4] =
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y/%m/%d %H:%M:%S"];

/// Parse a human-readable trace timestamp.
///
/// Returns `None` for anything that is not one of the accepted layouts.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS.iter().find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Newtype wrapper for cluster identifiers assigned by a clustering model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
pub struct ClusterId(pub i64);

impl ClusterId {
    /// Sentinel for points that are not part of any stop
    pub const NOISE: ClusterId = ClusterId(-1);

    #[inline]
    pub fn is_noise(self) -> bool {
        self == Self::NOISE
    }
}

impl std::fmt::Display for ClusterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One GPS observation of the vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsPoint {
    pub route_id: String,
    pub lat: f64,
    pub lon: f64,
    pub datetime: String,
    pub unixtime: i64,
}

impl GpsPoint {
    pub fn new(route_id: &str, lat: f64, lon: f64, datetime: &str, unixtime: i64) -> Self {
        Self { route_id: route_id.to_string(), lat, lon, datetime: datetime.to_string(), unixtime }
    }

    /// Great-circle distance to another point in meters
    pub fn distance_to(&self, other: &GpsPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos() * other.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }

    pub fn labeled(self, cluster_id: ClusterId) -> LabeledGpsPoint {
        LabeledGpsPoint { point: self, cluster_id }
    }
}

/// Aggregation/join key of a stop
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StopKey {
    pub route_id: String,
    pub cluster_id: ClusterId,
}

/// A GPS point annotated by a clustering model
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledGpsPoint {
    pub point: GpsPoint,
    pub cluster_id: ClusterId,
}

impl LabeledGpsPoint {
    pub fn key(&self) -> StopKey {
        StopKey { route_id: self.point.route_id.clone(), cluster_id: self.cluster_id }
    }

    #[inline]
    pub fn is_noise(&self) -> bool {
        self.cluster_id.is_noise()
    }
}

/// One aggregated dwell event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopCluster {
    pub route_id: String,
    pub cluster_id: ClusterId,
    pub lat_centroid: f64,
    pub lon_centroid: f64,
    pub service_start_time: String,
    pub service_end_time: String,
    /// Seconds between the first and last member observation
    pub service_duration: i64,
}

impl StopCluster {
    pub fn key(&self) -> StopKey {
        StopKey { route_id: self.route_id.clone(), cluster_id: self.cluster_id }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A labeled point with the aggregates of its stop, if it belongs to one
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedGpsPoint {
    pub point: LabeledGpsPoint,
    pub stop: Option<StopCluster>,
}

impl EnrichedGpsPoint {
    /// Column order of the presentation table
    pub const COLUMNS: [&'static str; 11] = [
        "route_id",
        "lat",
        "lon",
        "datetime",
        "unixtime",
        "cluster_id",
        "lat_centroid",
        "lon_centroid",
        "service_start_time",
        "service_end_time",
        "service_duration",
    ];

    /// Row cells in `COLUMNS` order, absent aggregates as `Cell::Null`
    pub fn cells(&self) -> [Cell<'_>; 11] {
        let p = &self.point.point;
        let (lat_c, lon_c, start, end, duration) = match &self.stop {
            Some(s) => (
                Cell::Float(s.lat_centroid),
                Cell::Float(s.lon_centroid),
                Cell::Text(&s.service_start_time),
                Cell::Text(&s.service_end_time),
                Cell::Int(s.service_duration),
            ),
            None => (Cell::Null, Cell::Null, Cell::Null, Cell::Null, Cell::Null),
        };
        [
            Cell::Text(&p.route_id),
            Cell::Float(p.lat),
            Cell::Float(p.lon),
            Cell::Text(&p.datetime),
            Cell::Int(p.unixtime),
            Cell::Int(self.point.cluster_id.0),
            lat_c,
            lon_c,
            start,
            end,
            duration,
        ]
    }

    /// Drop the aggregates, keeping the clustering output only
    pub fn into_labeled(self) -> LabeledGpsPoint {
        self.point
    }
}
