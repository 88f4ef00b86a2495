//! Domain models - trace points, stops and the error taxonomy
//!
//! - `GpsPoint` - one raw observation of the vehicle
//! - `LabeledGpsPoint` - a point with the cluster id assigned by a model
//! - `StopCluster` - one aggregated dwell event
//! - `EnrichedGpsPoint` - a labeled point joined with its stop aggregates
//! - `Cell`/`ColumnSpec` - column-level view used by schema checks

pub mod error;
pub mod table;
pub mod types;

pub use error::{ConsistencyError, DecodeError, PipelineError, SchemaError, Stage};
pub use table::{Cell, ColumnKind, ColumnSpec};
pub use types::{ClusterId, EnrichedGpsPoint, GpsPoint, LabeledGpsPoint, StopCluster, StopKey};
