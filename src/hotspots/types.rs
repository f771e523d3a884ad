//! Data types used by the hotspot aggregation pipeline.

use serde::{Deserialize, Serialize};

/// Maximum number of contributing factors kept per finalized cell.
pub const TOP_FACTORS: usize = 3;

/// A single row deserialized from the collision CSV.
///
/// All fields are read as raw text: the distinction between a missing value
/// and an unparseable one matters for the counters, so parsing happens in
/// [`Grid::record`](crate::hotspots::Grid::record) rather than in serde.
#[derive(Debug, Default, Deserialize)]
pub struct CollisionRow {
    #[serde(rename = "LATITUDE")]
    pub latitude: Option<String>,
    #[serde(rename = "LONGITUDE")]
    pub longitude: Option<String>,
    #[serde(rename = "NUMBER OF PERSONS INJURED")]
    pub injured: Option<String>,
    #[serde(rename = "NUMBER OF PERSONS KILLED")]
    pub killed: Option<String>,
    #[serde(rename = "CONTRIBUTING FACTOR VEHICLE 1")]
    pub factor: Option<String>,
}

/// Tunable knobs for the aggregation pass.
///
/// The danger-score weights and the factor sentinel are product constants
/// tuned by inspection, so they live here instead of being hard-coded.
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Decimal digits kept when rounding coordinates (3 ≈ 111m cells).
    pub precision: u32,
    /// Rows per chunk; bounds memory and sets progress-log granularity.
    pub chunk_size: usize,
    pub death_weight: f64,
    pub injury_weight: f64,
    pub count_weight: f64,
    /// Factor label excluded from tallies, compared case-insensitively.
    pub factor_sentinel: String,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            precision: 3,
            chunk_size: 100_000,
            death_weight: 10.0,
            injury_weight: 1.0,
            count_weight: 0.1,
            factor_sentinel: "unspecified".to_string(),
        }
    }
}

impl GridConfig {
    /// Weighted danger score used to rank finalized cells.
    pub fn danger_score(&self, spot: &Hotspot) -> f64 {
        spot.deaths as f64 * self.death_weight
            + spot.injuries as f64 * self.injury_weight
            + spot.count as f64 * self.count_weight
    }
}

/// A contributing factor and how often it appeared in a cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FactorCount {
    pub factor: String,
    pub count: u64,
}

/// A finalized grid cell, ranked into the heatmap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotspot {
    pub lat: f64,
    pub lng: f64,
    pub count: u64,
    pub injuries: u64,
    pub deaths: u64,
    #[serde(rename = "topFactors")]
    pub top_factors: Vec<FactorCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMetadata {
    #[serde(rename = "gridPrecision")]
    pub grid_precision: u32,
    #[serde(rename = "totalHotspots")]
    pub total_hotspots: usize,
}

/// Complete aggregation result, written as the JSON artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotspotSummary {
    #[serde(rename = "heatmapData")]
    pub heatmap_data: Vec<Hotspot>,
    #[serde(rename = "totalRecords")]
    pub total_records: u64,
    #[serde(rename = "validCoordinates")]
    pub valid_coordinates: u64,
    pub metadata: SummaryMetadata,
}
