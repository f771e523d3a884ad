//! Batch weather enrichment over a (location, date) table.
//!
//! Reads a CSV, deduplicates `(latitude, longitude, date)` keys, fetches
//! each unique key once through a bounded worker pool, and writes the table
//! back out with six weather columns appended. Row identity and order are
//! preserved; rows whose fetch ultimately failed keep blank weather cells.

use anyhow::{Context, Result, bail};
use csv::StringRecord;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::fetch::HttpClient;
use crate::weather::cache::WeatherCache;
use crate::weather::client::ArchiveClient;
use crate::weather::dates::normalize_date;
use crate::weather::limiter::RateLimiter;

pub const DATE_COLUMN: &str = "Date";
pub const LATITUDE_COLUMN: &str = "Latitude";
pub const LONGITUDE_COLUMN: &str = "Longitude";

/// Output columns, in the order matching [`DailyWeather::values`].
///
/// [`DailyWeather::values`]: crate::weather::client::DailyWeather::values
pub const WEATHER_COLUMNS: [&str; 6] = [
    "temp_max",
    "temp_min",
    "precipitation",
    "rain",
    "snow",
    "windspeed_max",
];

#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Bounded worker count for concurrent fetches.
    pub concurrency: usize,
    /// Sliding-window request quota shared by all workers.
    pub max_per_minute: usize,
    /// Optional persistent cache; successful keys are not re-fetched on
    /// reruns when this is set.
    pub cache_path: Option<PathBuf>,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_per_minute: 550,
            cache_path: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct EnrichReport {
    pub rows: usize,
    pub rows_skipped: usize,
    pub unique_keys: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub failed_keys: usize,
}

/// A row's fetch plan: dedup key plus the parsed query parameters.
struct PlannedFetch {
    key: String,
    lat: f64,
    lon: f64,
    date: String,
}

/// Enriches every row of `input` with historical daily weather and writes
/// the result to `output`.
///
/// The whole batch is a join point: all submitted fetches complete (or
/// exhaust retries) before the output is produced. Only a failure to read
/// the source table aborts the run.
#[tracing::instrument(skip(http, config), fields(input = %input.display(), output = %output.display()))]
pub async fn enrich_file<C>(
    http: C,
    input: &Path,
    output: &Path,
    config: &EnrichConfig,
) -> Result<EnrichReport>
where
    C: HttpClient + 'static,
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(input)
        .with_context(|| format!("cannot open enrichment input {}", input.display()))?;
    let headers = reader.headers()?.clone();

    let date_idx = find_column(&headers, DATE_COLUMN)?;
    let lat_idx = find_column(&headers, LATITUDE_COLUMN)?;
    let lon_idx = find_column(&headers, LONGITUDE_COLUMN)?;

    let mut rows: Vec<StringRecord> = Vec::new();
    for record in reader.records() {
        rows.push(record.with_context(|| format!("cannot read {}", input.display()))?);
    }

    // Group rows by key so each unique (lat, lon, date) is fetched once.
    let mut row_keys: Vec<Option<String>> = Vec::with_capacity(rows.len());
    let mut jobs: HashMap<String, PlannedFetch> = HashMap::new();
    let mut rows_skipped = 0usize;

    for (i, row) in rows.iter().enumerate() {
        match plan_row(row, date_idx, lat_idx, lon_idx) {
            Some(plan) => {
                row_keys.push(Some(plan.key.clone()));
                jobs.entry(plan.key.clone()).or_insert(plan);
            }
            None => {
                debug!(row = i, "row excluded from fetch batch");
                rows_skipped += 1;
                row_keys.push(None);
            }
        }
    }

    let cache = match &config.cache_path {
        Some(path) => Arc::new(WeatherCache::load(path)?),
        None => Arc::new(WeatherCache::new()),
    };
    let limiter = Arc::new(RateLimiter::new(config.max_per_minute));
    let client = Arc::new(ArchiveClient::new(http, limiter));
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));

    let unique_keys = jobs.len();
    let mut cache_hits = 0usize;
    let mut tasks = Vec::new();

    for (key, plan) in jobs {
        if cache.get(&key).is_some() {
            cache_hits += 1;
            continue;
        }

        let semaphore = semaphore.clone();
        let client = client.clone();
        let cache = cache.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.unwrap();
            match client.fetch_daily(plan.lat, plan.lon, &plan.date).await {
                Ok(weather) => {
                    cache.insert(key, weather);
                    true
                }
                Err(e) => {
                    warn!(%key, error = %e, "weather fetch failed for key");
                    false
                }
            }
        }));
    }

    // Barrier: every outcome lands before any output is written.
    let mut fetched = 0usize;
    let mut failed_keys = 0usize;
    for task in tasks {
        if task.await? {
            fetched += 1;
        } else {
            failed_keys += 1;
        }
    }

    write_enriched(output, &headers, &rows, &row_keys, &cache)?;

    if let Some(path) = &config.cache_path {
        cache.save(path)?;
    }

    let report = EnrichReport {
        rows: rows.len(),
        rows_skipped,
        unique_keys,
        cache_hits,
        fetched,
        failed_keys,
    };
    info!(
        rows = report.rows,
        unique_keys = report.unique_keys,
        cache_hits = report.cache_hits,
        fetched = report.fetched,
        failed_keys = report.failed_keys,
        "enrichment complete"
    );

    Ok(report)
}

fn find_column(headers: &StringRecord, name: &str) -> Result<usize> {
    match headers.iter().position(|h| h == name) {
        Some(idx) => Ok(idx),
        None => bail!("source table is missing required column {name:?}"),
    }
}

/// Builds the fetch plan for one row, or `None` if the row cannot be
/// enriched (blank fields, invalid date, unparseable coordinates).
fn plan_row(
    row: &StringRecord,
    date_idx: usize,
    lat_idx: usize,
    lon_idx: usize,
) -> Option<PlannedFetch> {
    let date_raw = row.get(date_idx).map(str::trim).filter(|s| !s.is_empty())?;
    let lat_raw = row.get(lat_idx).map(str::trim).filter(|s| !s.is_empty())?;
    let lon_raw = row.get(lon_idx).map(str::trim).filter(|s| !s.is_empty())?;

    let date = match normalize_date(date_raw) {
        Ok(date) => date,
        Err(e) => {
            warn!(error = %e, "row excluded");
            return None;
        }
    };

    let (Ok(lat), Ok(lon)) = (lat_raw.parse::<f64>(), lon_raw.parse::<f64>()) else {
        warn!(lat = lat_raw, lon = lon_raw, "row has unparseable coordinates");
        return None;
    };

    // Key built from the raw coordinate text so formatting differences in
    // the source never merge distinct locations.
    Some(PlannedFetch {
        key: format!("{lat_raw}_{lon_raw}_{date}"),
        lat,
        lon,
        date,
    })
}

/// Writes the table back out with weather columns filled where available.
///
/// Columns already present in the input (a rerun over enriched output) are
/// reused in place instead of being appended twice.
fn write_enriched(
    output: &Path,
    headers: &StringRecord,
    rows: &[StringRecord],
    row_keys: &[Option<String>],
    cache: &WeatherCache,
) -> Result<()> {
    let mut out_headers = headers.clone();
    let mut weather_slots = [0usize; 6];
    for (slot, name) in weather_slots.iter_mut().zip(WEATHER_COLUMNS) {
        match headers.iter().position(|h| h == name) {
            Some(idx) => *slot = idx,
            None => {
                *slot = out_headers.len();
                out_headers.push_field(name);
            }
        }
    }
    let width = out_headers.len();

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("cannot write enriched output {}", output.display()))?;
    writer.write_record(&out_headers)?;

    for (row, key) in rows.iter().zip(row_keys) {
        let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
        if fields.len() < width {
            fields.resize(width, String::new());
        }

        if let Some(weather) = key.as_deref().and_then(|k| cache.get(k)) {
            for (slot, value) in weather_slots.iter().zip(weather.values()) {
                fields[*slot] = value.map(|v| v.to_string()).unwrap_or_default();
            }
        }

        writer.write_record(&fields)?;
    }

    writer.flush()?;
    Ok(())
}
