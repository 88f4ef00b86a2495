//! Cluster assignment adapters
//!
//! A `ClusterModel` labels every point of one vehicle trace with a cluster
//! id, or `ClusterId::NOISE`. The pipeline only relies on the shape of the
//! result, which `assign_clusters` checks:
//! - one labeled row per input point
//! - input points unchanged and in the same order

use std::collections::VecDeque;

use tracing::debug;

use crate::domain::error::{SchemaError, Stage};
use crate::domain::types::{ClusterId, GpsPoint, LabeledGpsPoint};
use crate::infra::config::{ClusteringConfig, ModelKind};

/// Anything that can assign cluster ids to a trace.
///
/// Implementations must be deterministic for a fixed input sequence.
pub trait ClusterModel {
    fn name(&self) -> &str;

    fn predict(&self, points: &[GpsPoint]) -> Vec<LabeledGpsPoint>;
}

/// Run `model` and check its output against the labeling contract
pub fn assign_clusters(
    model: &dyn ClusterModel,
    points: &[GpsPoint],
) -> Result<Vec<LabeledGpsPoint>, SchemaError> {
    let labeled = model.predict(points);

    if labeled.len() != points.len() {
        return Err(SchemaError::LabelCount {
            model: model.name().to_string(),
            expected: points.len(),
            actual: labeled.len(),
        });
    }
    if let Some(row) = points.iter().zip(&labeled).position(|(p, l)| *p != l.point) {
        return Err(SchemaError::AlteredRow { model: model.name().to_string(), row });
    }
    if let Some(row) = labeled.iter().position(|l| l.cluster_id.0 < ClusterId::NOISE.0) {
        return Err(SchemaError::invalid(
            Stage::Clustering,
            row,
            "cluster_id",
            labeled[row].cluster_id,
            "below noise sentinel",
        ));
    }

    debug!(model = %model.name(), points = %labeled.len(), "clusters_assigned");
    Ok(labeled)
}

/// Build the configured model.
///
/// `labels` are the pre-assigned ids read from the trace, required by
/// `ModelKind::Prelabeled`.
pub fn build_model(
    config: &ClusteringConfig,
    labels: Option<Vec<ClusterId>>,
) -> Result<Box<dyn ClusterModel>, SchemaError> {
    match config.model {
        ModelKind::StDbscan => Ok(Box::new(StDbscan::from_config(config))),
        ModelKind::Prelabeled => match labels {
            Some(labels) => Ok(Box::new(Prelabeled::new(labels))),
            None => Err(SchemaError::missing(Stage::Clustering, &["cluster_id"])),
        },
    }
}

/// Label used while a point has not been visited yet
const UNCLASSIFIED: i64 = -2;

/// Spatio-temporal DBSCAN.
///
/// Two points are neighbours when they are within `eps_meters` (haversine)
/// and `eps_seconds` of each other. A point with at least `min_samples`
/// neighbours, itself included, is a core point. Cluster ids are dense and
/// assigned in time order of discovery.
#[derive(Debug, Clone)]
pub struct StDbscan {
    pub eps_meters: f64,
    pub eps_seconds: i64,
    pub min_samples: usize,
}

impl StDbscan {
    pub fn new(eps_meters: f64, eps_seconds: i64, min_samples: usize) -> Self {
        Self { eps_meters, eps_seconds, min_samples: min_samples.max(1) }
    }

    pub fn from_config(config: &ClusteringConfig) -> Self {
        Self::new(config.eps_meters, config.eps_seconds, config.min_samples)
    }

    /// Neighbours of `order[rank]`, scanning only the time window around it
    fn region(&self, points: &[GpsPoint], order: &[usize], rank: usize) -> Vec<usize> {
        let center = &points[order[rank]];
        let eps_seconds = self.eps_seconds.max(0).unsigned_abs();
        let in_window = |i: usize| points[i].unixtime.abs_diff(center.unixtime) <= eps_seconds;
        let close = |i: usize| center.distance_to(&points[i]) <= self.eps_meters;

        let mut found = Vec::new();
        for &i in order[..rank].iter().rev().take_while(|&&i| in_window(i)) {
            if close(i) {
                found.push(i);
            }
        }
        for &i in order[rank..].iter().take_while(|&&i| in_window(i)) {
            if close(i) {
                found.push(i);
            }
        }
        found
    }
}

impl ClusterModel for StDbscan {
    fn name(&self) -> &str {
        "st-dbscan"
    }

    fn predict(&self, points: &[GpsPoint]) -> Vec<LabeledGpsPoint> {
        let n = points.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| (points[i].unixtime, i));
        let mut rank_of = vec![0usize; n];
        for (rank, &i) in order.iter().enumerate() {
            rank_of[i] = rank;
        }

        let mut labels = vec![UNCLASSIFIED; n];
        let mut next_id = 0i64;

        for rank in 0..n {
            let i = order[rank];
            if labels[i] != UNCLASSIFIED {
                continue;
            }
            let seeds = self.region(points, &order, rank);
            if seeds.len() < self.min_samples {
                labels[i] = ClusterId::NOISE.0;
                continue;
            }

            let id = next_id;
            next_id += 1;
            labels[i] = id;

            let mut queue: VecDeque<usize> = seeds.into_iter().filter(|&j| j != i).collect();
            while let Some(j) = queue.pop_front() {
                if labels[j] == ClusterId::NOISE.0 {
                    // Border point
                    labels[j] = id;
                    continue;
                }
                if labels[j] != UNCLASSIFIED {
                    continue;
                }
                labels[j] = id;

                let neighbours = self.region(points, &order, rank_of[j]);
                if neighbours.len() >= self.min_samples {
                    queue.extend(neighbours.into_iter().filter(|&k| {
                        labels[k] == UNCLASSIFIED || labels[k] == ClusterId::NOISE.0
                    }));
                }
            }
        }

        debug!(points = %n, clusters = %next_id, "st_dbscan_complete");

        points.iter().zip(labels).map(|(p, label)| p.clone().labeled(ClusterId(label))).collect()
    }
}

/// Replays cluster ids that came with the trace, by row position
#[derive(Debug, Clone)]
pub struct Prelabeled {
    labels: Vec<ClusterId>,
}

impl Prelabeled {
    pub fn new(labels: Vec<ClusterId>) -> Self {
        Self { labels }
    }
}

impl ClusterModel for Prelabeled {
    fn name(&self) -> &str {
        "prelabeled"
    }

    fn predict(&self, points: &[GpsPoint]) -> Vec<LabeledGpsPoint> {
        // A length mismatch surfaces as a LabelCount error in assign_clusters
        points.iter().zip(&self.labels).map(|(p, id)| p.clone().labeled(*id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a trace: `(lat, lon, unixtime)` with one-minute formatted datetimes
    fn trace(samples: &[(f64, f64, i64)]) -> Vec<GpsPoint> {
        samples
            .iter()
            .map(|&(lat, lon, t)| {
                let datetime = chrono::DateTime::from_timestamp(t, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default();
                GpsPoint::new("VAN-1", lat, lon, &datetime, t)
            })
            .collect()
    }

    fn ids(labeled: &[LabeledGpsPoint]) -> Vec<i64> {
        labeled.iter().map(|l| l.cluster_id.0).collect()
    }

    struct DropLast;

    impl ClusterModel for DropLast {
        fn name(&self) -> &str {
            "drop-last"
        }

        fn predict(&self, points: &[GpsPoint]) -> Vec<LabeledGpsPoint> {
            let keep = points.len().saturating_sub(1);
            points[..keep].iter().map(|p| p.clone().labeled(ClusterId(0))).collect()
        }
    }

    struct Shifter;

    impl ClusterModel for Shifter {
        fn name(&self) -> &str {
            "shifter"
        }

        fn predict(&self, points: &[GpsPoint]) -> Vec<LabeledGpsPoint> {
            points
                .iter()
                .map(|p| {
                    let mut moved = p.clone();
                    moved.lat += 1.0;
                    moved.labeled(ClusterId(0))
                })
                .collect()
        }
    }

    #[test]
    fn test_st_dbscan_finds_two_stops() {
        // stop, 3 driving samples ~1km apart, stop
        let points = trace(&[
            (52.0000, 13.0000, 0),
            (52.0001, 13.0001, 60),
            (52.0000, 13.0001, 120),
            (52.0100, 13.0000, 180),
            (52.0200, 13.0000, 240),
            (52.0300, 13.0000, 300),
            (52.0400, 13.0000, 360),
            (52.0401, 13.0001, 420),
            (52.0400, 13.0001, 480),
        ]);

        let labeled = StDbscan::new(50.0, 300, 3).predict(&points);

        assert_eq!(ids(&labeled), vec![0, 0, 0, -1, -1, -1, 1, 1, 1]);
    }

    #[test]
    fn test_st_dbscan_splits_revisits_by_time() {
        // Same place, visited twice an hour apart
        let points = trace(&[
            (52.0, 13.0, 0),
            (52.0, 13.0, 60),
            (52.0, 13.0, 120),
            (52.0, 13.0, 3600),
            (52.0, 13.0, 3660),
            (52.0, 13.0, 3720),
        ]);

        let labeled = StDbscan::new(50.0, 300, 3).predict(&points);

        assert_eq!(ids(&labeled), vec![0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn test_st_dbscan_is_deterministic_and_order_independent() {
        let mut points = trace(&[
            (52.0, 13.0, 0),
            (52.0, 13.0001, 60),
            (52.0, 13.0, 120),
            (52.5, 13.5, 180),
        ]);
        let model = StDbscan::new(50.0, 300, 3);
        let first = model.predict(&points);
        assert_eq!(first, model.predict(&points));

        points.reverse();
        let reversed = model.predict(&points);
        assert_eq!(ids(&reversed), vec![-1, 0, 0, 0]);
    }

    #[test]
    fn test_st_dbscan_sparse_trace_is_all_noise() {
        let points = trace(&[(52.0, 13.0, 0), (52.1, 13.0, 60), (52.2, 13.0, 120)]);
        let labeled = StDbscan::new(50.0, 300, 3).predict(&points);
        assert!(labeled.iter().all(LabeledGpsPoint::is_noise));
    }

    #[test]
    fn test_assign_clusters_checks_row_count() {
        let points = trace(&[(52.0, 13.0, 0), (52.0, 13.0, 60)]);

        let err = assign_clusters(&DropLast, &points).unwrap_err();

        assert_eq!(err, SchemaError::LabelCount { model: "drop-last".to_string(), expected: 2, actual: 1 });
    }

    #[test]
    fn test_assign_clusters_checks_points_unchanged() {
        let points = trace(&[(52.0, 13.0, 0)]);

        let err = assign_clusters(&Shifter, &points).unwrap_err();

        assert_eq!(err, SchemaError::AlteredRow { model: "shifter".to_string(), row: 0 });
    }

    #[test]
    fn test_prelabeled_replays_labels() {
        let points = trace(&[(52.0, 13.0, 0), (52.0, 13.0, 60)]);
        let model = Prelabeled::new(vec![ClusterId(4), ClusterId::NOISE]);

        let labeled = assign_clusters(&model, &points).unwrap();

        assert_eq!(ids(&labeled), vec![4, -1]);
    }

    #[test]
    fn test_prelabeled_rejects_invalid_ids() {
        let points = trace(&[(52.0, 13.0, 0)]);
        let model = Prelabeled::new(vec![ClusterId(-7)]);

        let err = assign_clusters(&model, &points).unwrap_err();

        assert!(matches!(err, SchemaError::InvalidValue { stage: Stage::Clustering, .. }));
    }

    #[test]
    fn test_build_model_prelabeled_requires_labels() {
        let config = ClusteringConfig { model: ModelKind::Prelabeled, ..ClusteringConfig::default() };

        let Err(err) = build_model(&config, None) else {
            panic!("Expected missing cluster_id");
        };
        assert_eq!(err, SchemaError::missing(Stage::Clustering, &["cluster_id"]));

        let model = build_model(&config, Some(vec![ClusterId(0)])).unwrap();
        assert_eq!(model.name(), "prelabeled");
    }

    #[test]
    fn test_far_apart_unixtimes_stay_outside_window() {
        let points = trace(&[(52.0, 13.0, i64::MIN), (52.0, 13.0, i64::MAX)]);
        let model = StDbscan::new(50.0, 300, 2);

        let labeled = assign_clusters(&model, &points).unwrap();

        assert_eq!(ids(&labeled), vec![-1, -1]);
    }
}
