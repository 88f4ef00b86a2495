//! IO modules - trace decoding and result egress
//!
//! - `ingest` - CSV trace decoding and enriched table read-back
//! - `egress` - Points/stop tables to CSV and JSONL
//! - `sample` - Bundled sample trace

pub mod egress;
pub mod ingest;
pub mod sample;

pub use egress::{write_output, write_points, write_stops, write_stops_jsonl};
pub use ingest::{read_enriched, read_trace, read_trace_file, Trace};
pub use sample::{write_sample, SAMPLE_TRACE};
