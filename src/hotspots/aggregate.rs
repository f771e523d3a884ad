//! Chunked aggregation pass over a collision CSV.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::hotspots::grid::Grid;
use crate::hotspots::types::{CollisionRow, GridConfig, HotspotSummary};

/// Streams the collision CSV through a [`Grid`] and finalizes the result.
///
/// The reader is streaming, so memory stays bounded regardless of input
/// size; `config.chunk_size` sets how often progress is logged. A missing
/// or unreadable input path is the one fatal error here, reported before
/// anything is written.
#[tracing::instrument(skip(config), fields(input = %input.display()))]
pub fn aggregate_file(input: &Path, config: GridConfig) -> Result<HotspotSummary> {
    let file = File::open(input)
        .with_context(|| format!("cannot open collision input {}", input.display()))?;
    let mut reader = csv::Reader::from_reader(file);

    let chunk_size = config.chunk_size.max(1);
    let mut grid = Grid::new(config);
    let mut rows_in_chunk = 0usize;

    for result in reader.deserialize() {
        match result {
            Ok(row) => {
                let row: CollisionRow = row;
                grid.record(&row);
            }
            Err(e) => {
                debug!(error = %e, "skipping unreadable row");
                grid.record_unreadable();
            }
        }

        rows_in_chunk += 1;
        if rows_in_chunk == chunk_size {
            info!(
                rows_processed = grid.total_records(),
                hotspots = grid.cell_count(),
                "processed chunk"
            );
            rows_in_chunk = 0;
        }
    }

    let summary = grid.finalize();
    info!(
        total_records = summary.total_records,
        valid_coordinates = summary.valid_coordinates,
        hotspots = summary.metadata.total_hotspots,
        "aggregation complete"
    );

    Ok(summary)
}
