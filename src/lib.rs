//! Stop clusters library
//!
//! Derives stop events from a single vehicle's GPS trace: clustering,
//! per-stop aggregation, enrichment of every point, schema validation.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
