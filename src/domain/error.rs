//! Pipeline error taxonomy
//!
//! Every stage failure aborts the run with exactly one of these.

use crate::domain::types::ClusterId;

/// Pipeline stage a schema failure was detected in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingestion,
    Clustering,
    Aggregation,
    Visualization,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingestion => "ingestion",
            Stage::Clustering => "clustering",
            Stage::Aggregation => "aggregation",
            Stage::Visualization => "visualization",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw input could not be decoded into rows
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to read trace: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
}

/// Missing or mismatched columns, or values not coercible to their column type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("{stage}: missing column(s): {}", .columns.join(", "))]
    MissingColumns { stage: Stage, columns: Vec<String> },

    #[error("{stage}: unexpected column(s): {}", .columns.join(", "))]
    UnexpectedColumns { stage: Stage, columns: Vec<String> },

    #[error("{stage}: row {row}, column `{column}`: {reason} ({value:?})")]
    InvalidValue { stage: Stage, row: usize, column: String, value: String, reason: String },

    #[error("{stage}: duplicate timestamp {datetime:?} for route {route_id:?}")]
    DuplicateTimestamp { stage: Stage, route_id: String, datetime: String },

    #[error("clustering: model `{model}` returned {actual} rows for {expected} points")]
    LabelCount { model: String, expected: usize, actual: usize },

    #[error("clustering: model `{model}` altered input row {row}")]
    AlteredRow { model: String, row: usize },
}

impl SchemaError {
    pub fn invalid(stage: Stage, row: usize, column: &str, value: impl ToString, reason: &str) -> Self {
        SchemaError::InvalidValue {
            stage,
            row,
            column: column.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn missing(stage: Stage, columns: &[&str]) -> Self {
        SchemaError::MissingColumns { stage, columns: columns.iter().map(|c| c.to_string()).collect() }
    }
}

/// Internal invariant violation between stages
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("duplicate stop key (route {route_id:?}, cluster {cluster_id})")]
    DuplicateStopKey { route_id: String, cluster_id: ClusterId },

    #[error("noise cluster present in stop set for route {route_id:?}")]
    NoiseStop { route_id: String },

    #[error("trace contains {} routes, expected exactly one: {}", .routes.len(), .routes.join(", "))]
    MultipleRoutes { routes: Vec<String> },

    #[error("join produced {actual} rows for {expected} input points")]
    RowCount { expected: usize, actual: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("consistency error: {0}")]
    Consistency(#[from] ConsistencyError),
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        PipelineError::Decode(DecodeError::Csv(e))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Decode(DecodeError::Io(e))
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_display() {
        let err = SchemaError::missing(Stage::Aggregation, &["unixtime", "lat"]);
        assert_eq!(err.to_string(), "aggregation: missing column(s): unixtime, lat");
    }

    #[test]
    fn test_invalid_value_display() {
        let err = SchemaError::invalid(Stage::Ingestion, 3, "lat", "north", "not a finite number");
        let msg = err.to_string();
        assert!(msg.contains("ingestion"));
        assert!(msg.contains("row 3"));
        assert!(msg.contains("`lat`"));
        assert!(msg.contains("\"north\""));
    }

    #[test]
    fn test_pipeline_error_wraps_stage_errors() {
        let err: PipelineError =
            ConsistencyError::DuplicateStopKey { route_id: "A".to_string(), cluster_id: ClusterId(2) }.into();
        assert!(matches!(err, PipelineError::Consistency(_)));
        assert!(err.to_string().starts_with("consistency error: duplicate stop key"));
    }
}
