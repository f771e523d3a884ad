pub mod cache;
pub mod client;
pub mod dates;
pub mod enrich;
pub mod error;
pub mod limiter;

pub use cache::WeatherCache;
pub use client::{ArchiveClient, DailyWeather};
pub use enrich::{EnrichConfig, enrich_file};
pub use error::WeatherError;
pub use limiter::RateLimiter;
