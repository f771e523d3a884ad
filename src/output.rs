//! Artifact persistence and reporting for pipeline results.

use anyhow::{Context, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::hotspots::types::HotspotSummary;

/// Serializes a value to pretty JSON and writes it atomically.
///
/// The document is fully serialized first, written to a sibling `.tmp`
/// path, and renamed into place, so the target never holds a truncated
/// document.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)?;

    let mut tmp_name = OsString::from(path.as_os_str());
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    fs::write(&tmp, &body)
        .with_context(|| format!("cannot write temporary file {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("cannot move artifact into place at {}", path.display()))?;

    Ok(())
}

/// Loads a previously written hotspot summary.
pub fn load_summary(path: &Path) -> Result<HotspotSummary> {
    let body = fs::read(path)
        .with_context(|| format!("cannot read hotspot summary {}", path.display()))?;
    Ok(serde_json::from_slice(&body)?)
}

/// Logs the highest-ranked hotspot locations with their factors.
pub fn log_top_locations(summary: &HotspotSummary, top_n: usize) {
    for (rank, spot) in summary.heatmap_data.iter().take(top_n).enumerate() {
        info!(
            rank = rank + 1,
            lat = spot.lat,
            lng = spot.lng,
            accidents = spot.count,
            injuries = spot.injuries,
            deaths = spot.deaths,
            "hotspot"
        );
        for factor in &spot.top_factors {
            info!(factor = %factor.factor, incidents = factor.count, "contributing factor");
        }
    }
}
