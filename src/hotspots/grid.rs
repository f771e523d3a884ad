//! Spatial grid accumulation for collision records.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::hotspots::types::{
    CollisionRow, FactorCount, GridConfig, Hotspot, HotspotSummary, SummaryMetadata, TOP_FACTORS,
};

/// Grid cell key: coordinates rounded to the configured precision, held as
/// scaled integers so hashing and ordering are exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridKey {
    pub lat: i64,
    pub lng: i64,
}

#[derive(Debug)]
struct FactorTally {
    count: u64,
    /// Insertion rank within the cell, used to break count ties.
    first_seen: usize,
}

/// Running totals for one grid cell.
///
/// `lat`/`lng` are the first raw coordinates observed for the cell and are
/// never overwritten; every other field only grows.
#[derive(Debug)]
struct CellAccumulator {
    lat: f64,
    lng: f64,
    count: u64,
    injuries: u64,
    deaths: u64,
    factors: HashMap<String, FactorTally>,
}

impl CellAccumulator {
    fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            count: 0,
            injuries: 0,
            deaths: 0,
            factors: HashMap::new(),
        }
    }

    fn into_hotspot(self) -> Hotspot {
        let mut factors: Vec<(String, FactorTally)> = self.factors.into_iter().collect();
        factors.sort_by(|a, b| {
            b.1.count
                .cmp(&a.1.count)
                .then(a.1.first_seen.cmp(&b.1.first_seen))
        });
        factors.truncate(TOP_FACTORS);

        Hotspot {
            lat: self.lat,
            lng: self.lng,
            count: self.count,
            injuries: self.injuries,
            deaths: self.deaths,
            top_factors: factors
                .into_iter()
                .map(|(factor, tally)| FactorCount {
                    factor,
                    count: tally.count,
                })
                .collect(),
        }
    }
}

/// The accumulation pass over collision rows.
pub struct Grid {
    config: GridConfig,
    cells: HashMap<GridKey, CellAccumulator>,
    total_records: u64,
    valid_coordinates: u64,
}

impl Grid {
    pub fn new(config: GridConfig) -> Self {
        Self {
            config,
            cells: HashMap::new(),
            total_records: 0,
            valid_coordinates: 0,
        }
    }

    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    pub fn valid_coordinates(&self) -> u64 {
        self.valid_coordinates
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    fn key_for(&self, lat: f64, lng: f64) -> GridKey {
        let scale = 10f64.powi(self.config.precision as i32);
        GridKey {
            lat: (lat * scale).round() as i64,
            lng: (lng * scale).round() as i64,
        }
    }

    /// Counts a row that could not be deserialized at all.
    pub fn record_unreadable(&mut self) {
        self.total_records += 1;
    }

    /// Folds one collision row into the grid.
    ///
    /// Rows with blank coordinates count toward `total_records` only; rows
    /// whose coordinates fail numeric parsing are skipped the same way, per
    /// the malformed-row policy.
    pub fn record(&mut self, row: &CollisionRow) {
        self.total_records += 1;

        let (Some(lat_raw), Some(lng_raw)) = (non_blank(&row.latitude), non_blank(&row.longitude))
        else {
            return;
        };
        let (Ok(lat), Ok(lng)) = (lat_raw.parse::<f64>(), lng_raw.parse::<f64>()) else {
            return;
        };

        self.valid_coordinates += 1;

        let key = self.key_for(lat, lng);
        let cell = self
            .cells
            .entry(key)
            .or_insert_with(|| CellAccumulator::new(lat, lng));

        cell.count += 1;
        cell.injuries += parse_count(&row.injured);
        cell.deaths += parse_count(&row.killed);

        if let Some(factor) = non_blank(&row.factor) {
            if !factor.eq_ignore_ascii_case(&self.config.factor_sentinel) {
                let rank = cell.factors.len();
                cell.factors
                    .entry(factor.to_string())
                    .or_insert(FactorTally {
                        count: 0,
                        first_seen: rank,
                    })
                    .count += 1;
            }
        }
    }

    /// Extracts top factors per cell and ranks cells by danger score.
    ///
    /// Cells are pre-sorted by grid key so the stable score sort breaks ties
    /// deterministically, making repeated runs byte-identical.
    pub fn finalize(self) -> HotspotSummary {
        let config = self.config;

        let mut entries: Vec<(GridKey, CellAccumulator)> = self.cells.into_iter().collect();
        entries.sort_by_key(|(key, _)| *key);

        let mut heatmap: Vec<Hotspot> = entries
            .into_iter()
            .map(|(_, cell)| cell.into_hotspot())
            .collect();
        heatmap.sort_by(|a, b| {
            config
                .danger_score(b)
                .partial_cmp(&config.danger_score(a))
                .unwrap_or(Ordering::Equal)
        });

        HotspotSummary {
            total_records: self.total_records,
            valid_coordinates: self.valid_coordinates,
            metadata: SummaryMetadata {
                grid_precision: config.precision,
                total_hotspots: heatmap.len(),
            },
            heatmap_data: heatmap,
        }
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Parses an injury/death count, treating missing or non-numeric as 0.
fn parse_count(field: &Option<String>) -> u64 {
    non_blank(field)
        .and_then(|s| s.parse::<f64>().ok())
        .map(|v| v.max(0.0) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(lat: &str, lng: &str, injured: &str, killed: &str, factor: &str) -> CollisionRow {
        let opt = |s: &str| Some(s.to_string());
        CollisionRow {
            latitude: opt(lat),
            longitude: opt(lng),
            injured: opt(injured),
            killed: opt(killed),
            factor: opt(factor),
        }
    }

    #[test]
    fn test_nearby_coordinates_collapse_into_one_cell() {
        let mut grid = Grid::new(GridConfig::default());
        grid.record(&row("40.7128001", "-74.0059001", "1", "0", "Driver Inattention"));
        grid.record(&row("40.71281", "-74.00591", "2", "1", "Driver Inattention"));

        assert_eq!(grid.cell_count(), 1);
        let summary = grid.finalize();
        let spot = &summary.heatmap_data[0];
        assert_eq!(spot.count, 2);
        assert_eq!(spot.injuries, 3);
        assert_eq!(spot.deaths, 1);
        // Representative coordinates come from the first record
        assert_eq!(spot.lat, 40.7128001);
        assert_eq!(spot.lng, -74.0059001);
    }

    #[test]
    fn test_blank_coordinates_count_as_invalid() {
        let mut grid = Grid::new(GridConfig::default());
        grid.record(&row("", "-74.0", "0", "0", ""));
        grid.record(&row("40.7", "", "0", "0", ""));

        assert_eq!(grid.total_records(), 2);
        assert_eq!(grid.valid_coordinates(), 0);
        assert_eq!(grid.cell_count(), 0);
    }

    #[test]
    fn test_unparseable_coordinates_are_skipped_silently() {
        let mut grid = Grid::new(GridConfig::default());
        grid.record(&row("not-a-number", "-74.0", "0", "0", ""));

        assert_eq!(grid.total_records(), 1);
        assert_eq!(grid.valid_coordinates(), 0);
    }

    #[test]
    fn test_non_numeric_injury_counts_fold_to_zero() {
        let mut grid = Grid::new(GridConfig::default());
        grid.record(&row("40.7", "-74.0", "abc", "", ""));

        let summary = grid.finalize();
        assert_eq!(summary.heatmap_data[0].injuries, 0);
        assert_eq!(summary.heatmap_data[0].deaths, 0);
    }

    #[test]
    fn test_unspecified_factor_excluded_case_insensitively() {
        let mut grid = Grid::new(GridConfig::default());
        grid.record(&row("40.7", "-74.0", "0", "0", "Unspecified"));
        grid.record(&row("40.7", "-74.0", "0", "0", "UNSPECIFIED"));
        grid.record(&row("40.7", "-74.0", "0", "0", "Backing Unsafely"));

        let summary = grid.finalize();
        let factors = &summary.heatmap_data[0].top_factors;
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].factor, "Backing Unsafely");
    }

    #[test]
    fn test_top_factors_capped_at_three_sorted_desc() {
        let mut grid = Grid::new(GridConfig::default());
        for _ in 0..4 {
            grid.record(&row("40.7", "-74.0", "0", "0", "Following Too Closely"));
        }
        for _ in 0..3 {
            grid.record(&row("40.7", "-74.0", "0", "0", "Driver Inattention"));
        }
        for _ in 0..2 {
            grid.record(&row("40.7", "-74.0", "0", "0", "Failure to Yield"));
        }
        grid.record(&row("40.7", "-74.0", "0", "0", "Backing Unsafely"));

        let summary = grid.finalize();
        let factors = &summary.heatmap_data[0].top_factors;
        assert_eq!(factors.len(), 3);
        assert!(factors.windows(2).all(|w| w[0].count >= w[1].count));
        assert_eq!(factors[0].factor, "Following Too Closely");
    }

    #[test]
    fn test_factor_ties_break_by_first_encountered() {
        let mut grid = Grid::new(GridConfig::default());
        grid.record(&row("40.7", "-74.0", "0", "0", "Glare"));
        grid.record(&row("40.7", "-74.0", "0", "0", "Fatigued"));
        grid.record(&row("40.7", "-74.0", "0", "0", "Obstruction"));

        let summary = grid.finalize();
        let factors = &summary.heatmap_data[0].top_factors;
        let names: Vec<&str> = factors.iter().map(|f| f.factor.as_str()).collect();
        assert_eq!(names, vec!["Glare", "Fatigued", "Obstruction"]);
    }

    #[test]
    fn test_heatmap_sorted_by_danger_score() {
        let mut grid = Grid::new(GridConfig::default());
        // Low score cell: 1 record, no injuries
        grid.record(&row("40.700", "-74.000", "0", "0", ""));
        // High score cell: a death
        grid.record(&row("40.800", "-74.100", "0", "1", ""));
        // Middle cell: injuries only
        grid.record(&row("40.900", "-74.200", "4", "0", ""));

        let config = GridConfig::default();
        let summary = grid.finalize();
        let scores: Vec<f64> = summary
            .heatmap_data
            .iter()
            .map(|s| config.danger_score(s))
            .collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(summary.heatmap_data[0].deaths, 1);
    }

    #[test]
    fn test_cell_counts_sum_to_valid_coordinates() {
        let mut grid = Grid::new(GridConfig::default());
        grid.record(&row("40.7", "-74.0", "0", "0", ""));
        grid.record(&row("40.8", "-74.1", "0", "0", ""));
        grid.record(&row("40.8", "-74.1", "0", "0", ""));
        grid.record(&row("", "", "0", "0", ""));

        let valid = grid.valid_coordinates();
        let summary = grid.finalize();
        let total: u64 = summary.heatmap_data.iter().map(|s| s.count).sum();
        assert_eq!(total, valid);
        assert_eq!(summary.valid_coordinates, 3);
        assert_eq!(summary.total_records, 4);
    }

    #[test]
    fn test_score_ties_break_by_grid_key() {
        let mut grid = Grid::new(GridConfig::default());
        // Two cells with identical scores, inserted high-key first
        grid.record(&row("40.900", "-74.000", "0", "0", ""));
        grid.record(&row("40.100", "-74.000", "0", "0", ""));

        let summary = grid.finalize();
        assert_eq!(summary.heatmap_data[0].lat, 40.100);
        assert_eq!(summary.heatmap_data[1].lat, 40.900);
    }
}
