//! Pipeline orchestration
//!
//! clustering -> aggregation -> enrichment join -> visualization validation,
//! run end-to-end over one trace. Any stage failure aborts the run; no
//! partial output is returned.

use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::error::Result;
use crate::domain::types::{EnrichedGpsPoint, GpsPoint, StopCluster};
use crate::services::aggregation::aggregate_clusters;
use crate::services::cluster_model::{assign_clusters, ClusterModel};
use crate::services::enrichment::join_clusters_to_points;
use crate::services::validator::validate_visualization_schema;

/// Outcome counters for one pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// UUIDv7 for log correlation
    pub run_id: String,
    pub model: String,
    pub points: usize,
    pub stops: usize,
    pub noise_points: usize,
    /// Non-noise points that found no stop in the join
    pub unmatched_points: usize,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            model = %self.model,
            points = %self.points,
            stops = %self.stops,
            noise_points = %self.noise_points,
            unmatched_points = %self.unmatched_points,
            elapsed_ms = %self.elapsed_ms,
            "pipeline_complete"
        );
    }
}

/// Validated pipeline results handed to presentation
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// One row per input point, input order
    pub points: Vec<EnrichedGpsPoint>,
    /// One row per stop, sorted by `(route_id, cluster_id)`
    pub stops: Vec<StopCluster>,
    pub summary: RunSummary,
}

/// Run the whole core over one vehicle trace
pub fn run_pipeline(points: Vec<GpsPoint>, model: &dyn ClusterModel) -> Result<PipelineOutput> {
    let started = Instant::now();
    let run_id = Uuid::now_v7().to_string();
    let input_rows = points.len();
    debug!(run_id = %run_id, model = %model.name(), points = %input_rows, "pipeline_started");

    let labeled = assign_clusters(model, &points)?;
    drop(points);

    let stops = aggregate_clusters(&labeled)?;
    let enriched = join_clusters_to_points(labeled, &stops)?;
    let enriched = validate_visualization_schema(enriched)?;

    let noise_points = enriched.iter().filter(|p| p.point.is_noise()).count();
    let unmatched_points = enriched.iter().filter(|p| !p.point.is_noise() && p.stop.is_none()).count();

    let summary = RunSummary {
        run_id,
        model: model.name().to_string(),
        points: enriched.len(),
        stops: stops.len(),
        noise_points,
        unmatched_points,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };

    Ok(PipelineOutput { points: enriched, stops, summary })
}
