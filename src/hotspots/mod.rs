pub mod aggregate;
pub mod grid;
pub mod types;

pub use aggregate::aggregate_file;
pub use grid::Grid;
pub use types::{GridConfig, HotspotSummary};
