//! Weather result cache keyed by `(latitude, longitude, date)`.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::weather::client::DailyWeather;

/// Shared cache of successful fetches, scoped to one batch run.
///
/// Only successes are stored: a failed key stays absent so a later
/// duplicate (or a rerun against a persisted cache) can retry it. The first
/// successful result for a key wins.
#[derive(Default)]
pub struct WeatherCache {
    entries: Mutex<HashMap<String, DailyWeather>>,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a persisted cache; a missing file yields an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let body = std::fs::read(path)
            .with_context(|| format!("cannot read weather cache {}", path.display()))?;
        let entries: HashMap<String, DailyWeather> = serde_json::from_slice(&body)
            .with_context(|| format!("corrupt weather cache {}", path.display()))?;
        info!(entries = entries.len(), path = %path.display(), "loaded weather cache");
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    pub fn get(&self, key: &str) -> Option<DailyWeather> {
        self.entries.lock().unwrap().get(key).copied()
    }

    pub fn insert(&self, key: String, weather: DailyWeather) {
        self.entries.lock().unwrap().entry(key).or_insert(weather);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persists the cache for reuse across runs.
    pub fn save(&self, path: &Path) -> Result<()> {
        let entries = self.entries.lock().unwrap();
        crate::output::write_json_atomic(path, &*entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn sample() -> DailyWeather {
        DailyWeather {
            temp_max: Some(10.0),
            temp_min: Some(2.0),
            precipitation: Some(0.0),
            rain: Some(0.0),
            snow: None,
            windspeed_max: Some(15.0),
        }
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = WeatherCache::new();
        cache.insert("a".into(), sample());
        let mut second = sample();
        second.temp_max = Some(99.0);
        cache.insert("a".into(), second);

        assert_eq!(cache.get("a").unwrap().temp_max, Some(10.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_round_trips_through_disk() {
        let path = env::temp_dir().join("collision_etl_cache_roundtrip.json");
        let _ = fs::remove_file(&path);

        let cache = WeatherCache::new();
        cache.insert("40.7_-74.0_2024-03-15".into(), sample());
        cache.save(&path).unwrap();

        let reloaded = WeatherCache::load(&path).unwrap();
        assert_eq!(reloaded.get("40.7_-74.0_2024-03-15"), Some(sample()));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let cache = WeatherCache::load(Path::new("/nonexistent/cache.json")).unwrap();
        assert!(cache.is_empty());
    }
}
