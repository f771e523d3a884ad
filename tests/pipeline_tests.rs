use collision_etl::hotspots::{GridConfig, aggregate_file};
use collision_etl::output::{load_summary, write_json_atomic};
use std::env;
use std::path::{Path, PathBuf};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/collisions.csv")
}

#[test]
fn test_full_aggregation_pipeline() {
    let summary = aggregate_file(&fixture(), GridConfig::default()).expect("aggregation failed");

    // 10 data rows: 8 with usable coordinates, one blank, one unparseable
    assert_eq!(summary.total_records, 10);
    assert_eq!(summary.valid_coordinates, 8);

    // Cell counts sum back to the valid-coordinate total
    let cell_total: u64 = summary.heatmap_data.iter().map(|s| s.count).sum();
    assert_eq!(cell_total, summary.valid_coordinates);

    // The two near-identical Whitman Drive records share one cell
    let whitman = summary
        .heatmap_data
        .iter()
        .find(|s| s.lat == 40.7128001)
        .expect("collapsed cell missing");
    assert_eq!(whitman.count, 2);
    assert_eq!(whitman.injuries, 3);
    assert_eq!(whitman.deaths, 0);
    assert_eq!(whitman.top_factors[0].factor, "Driver Inattention/Distraction");
    assert_eq!(whitman.top_factors[0].count, 2);

    // Ranked descending by danger score; the fatality cell leads
    let config = GridConfig::default();
    let scores: Vec<f64> = summary
        .heatmap_data
        .iter()
        .map(|s| config.danger_score(s))
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(summary.heatmap_data[0].deaths, 1);

    // Per-cell factor lists respect the cap and ordering
    for spot in &summary.heatmap_data {
        assert!(spot.top_factors.len() <= 3);
        assert!(
            spot.top_factors
                .windows(2)
                .all(|w| w[0].count >= w[1].count)
        );
    }

    assert_eq!(summary.metadata.grid_precision, 3);
    assert_eq!(summary.metadata.total_hotspots, summary.heatmap_data.len());
}

#[test]
fn test_aggregation_is_idempotent() {
    let first = aggregate_file(&fixture(), GridConfig::default()).unwrap();
    let second = aggregate_file(&fixture(), GridConfig::default()).unwrap();

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_artifact_round_trips_with_contract_field_names() {
    let out_path = env::temp_dir().join("collision_etl_pipeline_artifact.json");
    let _ = std::fs::remove_file(&out_path);

    let summary = aggregate_file(&fixture(), GridConfig::default()).unwrap();
    write_json_atomic(&out_path, &summary).unwrap();

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&out_path).unwrap()).unwrap();
    assert!(raw["heatmapData"].is_array());
    assert!(raw["totalRecords"].is_u64());
    assert!(raw["validCoordinates"].is_u64());
    assert!(raw["metadata"]["gridPrecision"].is_u64());
    assert!(raw["metadata"]["totalHotspots"].is_u64());

    let reloaded = load_summary(&out_path).unwrap();
    assert_eq!(reloaded.total_records, summary.total_records);

    std::fs::remove_file(&out_path).unwrap();
}

#[test]
fn test_coarser_precision_merges_cells() {
    let fine = aggregate_file(&fixture(), GridConfig::default()).unwrap();
    let coarse = aggregate_file(
        &fixture(),
        GridConfig {
            precision: 1,
            ..GridConfig::default()
        },
    )
    .unwrap();

    assert!(coarse.metadata.total_hotspots <= fine.metadata.total_hotspots);
    assert_eq!(coarse.valid_coordinates, fine.valid_coordinates);
    assert_eq!(coarse.metadata.grid_precision, 1);
}
