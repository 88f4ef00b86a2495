//! Cluster aggregation engine
//!
//! Collapses labeled points into one `StopCluster` per non-noise
//! `(route_id, cluster_id)` pair:
//! - centroid: arithmetic mean of member coordinates
//! - service window: datetimes of the earliest/latest member `unixtime`
//! - service duration: `max(unixtime) - min(unixtime)` in seconds

use chrono::NaiveDateTime;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::domain::error::{SchemaError, Stage};
use crate::domain::types::{parse_datetime, LabeledGpsPoint, StopCluster, StopKey};

/// Identity of a sample's timestamp, independent of how it was spelled
#[derive(PartialEq, Eq, Hash)]
enum Instant<'a> {
    Parsed(NaiveDateTime),
    Raw(&'a str),
}

impl<'a> Instant<'a> {
    fn of(datetime: &'a str) -> Self {
        match parse_datetime(datetime) {
            Some(dt) => Instant::Parsed(dt),
            None => Instant::Raw(datetime.trim()),
        }
    }
}

/// Running statistics for one partition
struct Accumulator<'a> {
    count: usize,
    lat_sum: f64,
    lon_sum: f64,
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    first: (i64, &'a str),
    last: (i64, &'a str),
    last_row: usize,
}

impl<'a> Accumulator<'a> {
    fn new(row: usize, p: &'a LabeledGpsPoint) -> Self {
        let pt = &p.point;
        Self {
            count: 1,
            lat_sum: pt.lat,
            lon_sum: pt.lon,
            lat_min: pt.lat,
            lat_max: pt.lat,
            lon_min: pt.lon,
            lon_max: pt.lon,
            first: (pt.unixtime, &pt.datetime),
            last: (pt.unixtime, &pt.datetime),
            last_row: row,
        }
    }

    fn push(&mut self, row: usize, p: &'a LabeledGpsPoint) {
        let pt = &p.point;
        self.count += 1;
        self.lat_sum += pt.lat;
        self.lon_sum += pt.lon;
        self.lat_min = self.lat_min.min(pt.lat);
        self.lat_max = self.lat_max.max(pt.lat);
        self.lon_min = self.lon_min.min(pt.lon);
        self.lon_max = self.lon_max.max(pt.lon);
        if pt.unixtime < self.first.0 {
            self.first = (pt.unixtime, &pt.datetime);
        }
        if pt.unixtime > self.last.0 {
            self.last = (pt.unixtime, &pt.datetime);
            self.last_row = row;
        }
    }

    fn finish(self, key: StopKey) -> Result<StopCluster, SchemaError> {
        let service_duration = self.last.0.checked_sub(self.first.0).ok_or_else(|| {
            SchemaError::invalid(
                Stage::Aggregation,
                self.last_row,
                "unixtime",
                self.last.0,
                "time window exceeds the representable range",
            )
        })?;
        let n = self.count as f64;
        // Rounding in the sum must not push the mean outside the members' bounds
        let lat_centroid = (self.lat_sum / n).clamp(self.lat_min, self.lat_max);
        let lon_centroid = (self.lon_sum / n).clamp(self.lon_min, self.lon_max);

        Ok(StopCluster {
            route_id: key.route_id,
            cluster_id: key.cluster_id,
            lat_centroid,
            lon_centroid,
            service_start_time: self.first.1.to_string(),
            service_end_time: self.last.1.to_string(),
            service_duration,
        })
    }
}

/// Check the columns aggregation reads before any statistics are computed
fn check_point(row: usize, p: &LabeledGpsPoint) -> Result<(), SchemaError> {
    let pt = &p.point;
    if pt.route_id.trim().is_empty() {
        return Err(SchemaError::invalid(Stage::Aggregation, row, "route_id", "", "empty route id"));
    }
    if !pt.lat.is_finite() {
        return Err(SchemaError::invalid(Stage::Aggregation, row, "lat", pt.lat, "not a finite number"));
    }
    if !pt.lon.is_finite() {
        return Err(SchemaError::invalid(Stage::Aggregation, row, "lon", pt.lon, "not a finite number"));
    }
    if pt.datetime.trim().is_empty() {
        return Err(SchemaError::invalid(Stage::Aggregation, row, "datetime", "", "empty timestamp"));
    }
    Ok(())
}

/// Aggregate labeled points into stop clusters.
///
/// Output is sorted by `(route_id, cluster_id)`; each key appears exactly once.
/// Noise points are ignored. Zero non-noise points yields an empty set.
pub fn aggregate_clusters(points: &[LabeledGpsPoint]) -> Result<Vec<StopCluster>, SchemaError> {
    let mut seen_datetime: FxHashSet<(&str, Instant<'_>)> = FxHashSet::default();
    let mut seen_unixtime: FxHashSet<(&str, i64)> = FxHashSet::default();
    let mut partitions: FxHashMap<StopKey, Accumulator<'_>> = FxHashMap::default();
    let mut noise = 0usize;

    for (row, p) in points.iter().enumerate() {
        check_point(row, p)?;

        let route = p.point.route_id.as_str();
        let fresh_datetime = seen_datetime.insert((route, Instant::of(&p.point.datetime)));
        let fresh_unixtime = seen_unixtime.insert((route, p.point.unixtime));
        if !(fresh_datetime && fresh_unixtime) {
            return Err(SchemaError::DuplicateTimestamp {
                stage: Stage::Aggregation,
                route_id: p.point.route_id.clone(),
                datetime: p.point.datetime.clone(),
            });
        }

        if p.is_noise() {
            noise += 1;
            continue;
        }

        partitions
            .entry(p.key())
            .and_modify(|acc| acc.push(row, p))
            .or_insert_with(|| Accumulator::new(row, p));
    }

    let mut stops = partitions
        .into_iter()
        .map(|(key, acc)| acc.finish(key))
        .collect::<Result<Vec<_>, _>>()?;
    stops.sort_by(|a, b| {
        a.route_id.cmp(&b.route_id).then_with(|| a.cluster_id.cmp(&b.cluster_id))
    });

    debug!(points = %points.len(), noise = %noise, stops = %stops.len(), "clusters_aggregated");
    Ok(stops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ClusterId, GpsPoint};

    fn labeled(lat: f64, lon: f64, datetime: &str, unixtime: i64, cluster: i64) -> LabeledGpsPoint {
        GpsPoint::new("A", lat, lon, datetime, unixtime).labeled(ClusterId(cluster))
    }

    #[test]
    fn test_two_point_cluster_with_noise() {
        let points = vec![
            labeled(10.0, 20.0, "2023-01-05 10:00:00", 1000, 0),
            labeled(10.2, 20.2, "2023-01-05 10:05:00", 1300, 0),
            labeled(50.0, 60.0, "2023-01-05 11:00:00", 4000, -1),
        ];

        let stops = aggregate_clusters(&points).unwrap();

        assert_eq!(stops.len(), 1);
        let stop = &stops[0];
        assert_eq!(stop.route_id, "A");
        assert_eq!(stop.cluster_id, ClusterId(0));
        assert!((stop.lat_centroid - 10.1).abs() < 1e-9);
        assert!((stop.lon_centroid - 20.1).abs() < 1e-9);
        assert_eq!(stop.service_start_time, "2023-01-05 10:00:00");
        assert_eq!(stop.service_end_time, "2023-01-05 10:05:00");
        assert_eq!(stop.service_duration, 300);
    }

    #[test]
    fn test_single_point_cluster() {
        let points = vec![labeled(48.85, 2.35, "2023-01-05 09:00:00", 500, 5)];

        let stops = aggregate_clusters(&points).unwrap();

        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].service_duration, 0);
        assert_eq!(stops[0].lat_centroid, 48.85);
        assert_eq!(stops[0].lon_centroid, 2.35);
        assert_eq!(stops[0].service_start_time, stops[0].service_end_time);
    }

    #[test]
    fn test_all_noise_yields_no_stops() {
        let points = vec![
            labeled(1.0, 1.0, "2023-01-05 09:00:00", 100, -1),
            labeled(2.0, 2.0, "2023-01-05 09:01:00", 160, -1),
        ];
        assert!(aggregate_clusters(&points).unwrap().is_empty());
        assert!(aggregate_clusters(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_window_follows_unixtime_not_input_order() {
        let points = vec![
            labeled(1.0, 1.0, "2023-01-05 09:10:00", 700, 3),
            labeled(1.0, 1.0, "2023-01-05 09:00:00", 100, 3),
            labeled(1.0, 1.0, "2023-01-05 09:05:00", 400, 3),
        ];

        let stops = aggregate_clusters(&points).unwrap();

        assert_eq!(stops[0].service_start_time, "2023-01-05 09:00:00");
        assert_eq!(stops[0].service_end_time, "2023-01-05 09:10:00");
        assert_eq!(stops[0].service_duration, 600);
    }

    #[test]
    fn test_centroid_stays_within_bounds() {
        let points: Vec<_> = (0..7)
            .map(|i| labeled(0.1, 0.7, &format!("2023-01-05 09:0{i}:00"), 60 * i, 1))
            .collect();

        let stops = aggregate_clusters(&points).unwrap();

        assert_eq!(stops[0].lat_centroid, 0.1);
        assert_eq!(stops[0].lon_centroid, 0.7);
    }

    #[test]
    fn test_sorted_by_cluster_id() {
        let points = vec![
            labeled(1.0, 1.0, "2023-01-05 09:00:00", 100, 2),
            labeled(1.0, 1.0, "2023-01-05 09:01:00", 160, 0),
            labeled(1.0, 1.0, "2023-01-05 09:02:00", 220, 1),
        ];

        let ids: Vec<_> = aggregate_clusters(&points).unwrap().iter().map(|s| s.cluster_id.0).collect();

        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_nan_coordinate_is_schema_error() {
        let points = vec![labeled(f64::NAN, 1.0, "2023-01-05 09:00:00", 100, 0)];

        let err = aggregate_clusters(&points).unwrap_err();

        assert!(matches!(
            err,
            SchemaError::InvalidValue { stage: Stage::Aggregation, ref column, .. } if column == "lat"
        ));
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let points = vec![
            labeled(1.0, 1.0, "2023-01-05 09:00:00", 100, 0),
            labeled(1.1, 1.1, "2023-01-05 09:00:00", 100, 0),
        ];

        let err = aggregate_clusters(&points).unwrap_err();

        assert!(matches!(err, SchemaError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn test_same_instant_spelled_differently_rejected() {
        let points = vec![
            labeled(10.0, 20.0, "2023-01-05 10:00:00", 1000, 0),
            labeled(10.1, 20.1, "2023-01-05T10:00:00", 1060, 0),
        ];

        let err = aggregate_clusters(&points).unwrap_err();

        assert!(matches!(err, SchemaError::DuplicateTimestamp { ref datetime, .. } if datetime == "2023-01-05T10:00:00"));
    }

    #[test]
    fn test_shared_unixtime_rejected() {
        let points = vec![
            labeled(10.0, 20.0, "2023-01-05 10:00:00", 1000, 0),
            labeled(10.1, 20.1, "2023-01-05 10:05:00", 1000, 0),
        ];

        let err = aggregate_clusters(&points).unwrap_err();

        assert!(matches!(err, SchemaError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn test_other_route_may_share_timestamp() {
        let points = vec![
            labeled(10.0, 20.0, "2023-01-05 10:00:00", 1000, 0),
            GpsPoint::new("B", 10.0, 20.0, "2023-01-05T10:00:00", 1000).labeled(ClusterId(0)),
        ];

        assert_eq!(aggregate_clusters(&points).unwrap().len(), 2);
    }

    #[test]
    fn test_unrepresentable_time_window_is_schema_error() {
        let points = vec![
            labeled(10.0, 20.0, "2023-01-05 10:00:00", -9_000_000_000_000_000_000, 0),
            labeled(10.0, 20.0, "2023-01-05 10:05:00", 9_000_000_000_000_000_000, 0),
        ];

        let err = aggregate_clusters(&points).unwrap_err();

        assert!(matches!(
            err,
            SchemaError::InvalidValue { stage: Stage::Aggregation, row: 1, ref column, .. } if column == "unixtime"
        ));
    }
}
