//! Services - the stop clustering core
//!
//! - `cluster_model` - Cluster assignment contract and adapters
//! - `aggregation` - Collapses labeled points into stop clusters
//! - `enrichment` - Left-joins stop aggregates back onto points
//! - `validator` - Visualization schema gate
//! - `pipeline` - End-to-end orchestration of one run

pub mod aggregation;
pub mod cluster_model;
pub mod enrichment;
pub mod pipeline;
pub mod validator;

pub use aggregation::aggregate_clusters;
pub use cluster_model::{assign_clusters, build_model, ClusterModel, Prelabeled, StDbscan};
pub use enrichment::join_clusters_to_points;
pub use pipeline::{run_pipeline, PipelineOutput, RunSummary};
pub use validator::{validate_table, validate_visualization_schema, VISUALIZATION_SCHEMA};
