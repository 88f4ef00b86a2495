//! Enrichment join - attaches stop aggregates back onto every point
//!
//! Left join on `(route_id, cluster_id)`: one output row per input row,
//! noise and unmatched points keep null aggregates.

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::domain::error::ConsistencyError;
use crate::domain::types::{EnrichedGpsPoint, LabeledGpsPoint, StopCluster, StopKey};

/// Index stops by key, rejecting duplicates and noise stops
fn index_stops(stops: &[StopCluster]) -> Result<FxHashMap<StopKey, &StopCluster>, ConsistencyError> {
    let mut index = FxHashMap::with_capacity_and_hasher(stops.len(), Default::default());
    for stop in stops {
        if stop.cluster_id.is_noise() {
            return Err(ConsistencyError::NoiseStop { route_id: stop.route_id.clone() });
        }
        if index.insert(stop.key(), stop).is_some() {
            return Err(ConsistencyError::DuplicateStopKey {
                route_id: stop.route_id.clone(),
                cluster_id: stop.cluster_id,
            });
        }
    }
    Ok(index)
}

/// Join stop aggregates onto labeled points.
///
/// Never drops or duplicates rows; input order is preserved.
pub fn join_clusters_to_points(
    points: Vec<LabeledGpsPoint>,
    stops: &[StopCluster],
) -> Result<Vec<EnrichedGpsPoint>, ConsistencyError> {
    let index = index_stops(stops)?;
    let expected = points.len();
    let mut unmatched = 0usize;

    let enriched: Vec<EnrichedGpsPoint> = points
        .into_iter()
        .map(|point| {
            let stop = if point.is_noise() {
                None
            } else {
                let found = index.get(&point.key()).map(|s| (*s).clone());
                if found.is_none() {
                    unmatched += 1;
                }
                found
            };
            EnrichedGpsPoint { point, stop }
        })
        .collect();

    if enriched.len() != expected {
        return Err(ConsistencyError::RowCount { expected, actual: enriched.len() });
    }

    if unmatched > 0 {
        warn!(unmatched = %unmatched, "points_without_stop");
    }
    debug!(rows = %enriched.len(), stops = %stops.len(), "clusters_joined");
    Ok(enriched)
}
