pub mod fetch;
pub mod hotspots;
pub mod output;
pub mod weather;
