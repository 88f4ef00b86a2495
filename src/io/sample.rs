//! Bundled sample trace for trying the pipeline without own data

use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::info;

/// One truck, two stops, raw columns only
pub const SAMPLE_TRACE: &str = include_str!("../../data/gps_samples.csv");

/// Write the sample trace to `path`
pub fn write_sample(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }
    fs::write(path, SAMPLE_TRACE).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = %SAMPLE_TRACE.len(), "sample_written");
    Ok(())
}
