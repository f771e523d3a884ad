//! CLI entry point for the collision ETL tool.
//!
//! Provides subcommands for aggregating collision records into a spatial
//! hotspot grid, inspecting a previous aggregation, and enriching traffic
//! tables with historical weather.

use anyhow::Result;
use clap::{Parser, Subcommand};
use collision_etl::fetch::BasicClient;
use collision_etl::hotspots::{GridConfig, aggregate_file};
use collision_etl::output::{load_summary, log_top_locations, write_json_atomic};
use collision_etl::weather::{EnrichConfig, enrich_file};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "collision_etl")]
#[command(about = "Aggregates NYC collision records into hotspots and enriches traffic tables with weather", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a collision CSV into a ranked hotspot JSON artifact
    Hotspots {
        /// Path to the collision CSV
        #[arg(value_name = "CSV")]
        input: PathBuf,

        /// Path for the hotspot JSON artifact
        #[arg(short, long, default_value = "hotspots.json")]
        output: PathBuf,

        /// Rows per processing chunk
        #[arg(long, default_value_t = 100_000)]
        chunk_size: usize,

        /// Decimal digits kept when rounding coordinates into grid cells
        #[arg(long, default_value_t = 3)]
        precision: u32,
    },
    /// Log the highest-ranked hotspots from a previous aggregation
    Top {
        /// Path to a hotspot JSON artifact
        #[arg(value_name = "JSON")]
        input: PathBuf,

        /// Number of hotspots to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// Fetch historical daily weather for each (location, date) row of a table
    Enrich {
        /// Path to the traffic CSV with Date/Latitude/Longitude columns
        #[arg(value_name = "CSV")]
        input: PathBuf,

        /// Path for the enriched CSV
        #[arg(short, long, default_value = "enriched.csv")]
        output: PathBuf,

        /// Maximum number of concurrent weather fetches
        #[arg(short, long, default_value_t = 10)]
        concurrency: usize,

        /// Request quota per sliding 60-second window
        #[arg(long, default_value_t = 550)]
        max_per_minute: usize,

        /// Optional: persistent weather cache so reruns skip fetched keys
        #[arg(long)]
        cache: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/collision_etl.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("collision_etl.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Hotspots {
            input,
            output,
            chunk_size,
            precision,
        } => {
            let config = GridConfig {
                precision,
                chunk_size,
                ..GridConfig::default()
            };
            let summary = aggregate_file(&input, config)?;
            write_json_atomic(&output, &summary)?;
            info!(
                output = %output.display(),
                total_records = summary.total_records,
                valid_coordinates = summary.valid_coordinates,
                hotspots = summary.metadata.total_hotspots,
                "hotspot artifact written"
            );
        }
        Commands::Top { input, count } => {
            let summary = load_summary(&input)?;
            log_top_locations(&summary, count);
        }
        Commands::Enrich {
            input,
            output,
            concurrency,
            max_per_minute,
            cache,
        } => {
            let http = BasicClient::new(Duration::from_secs(10))?;
            let config = EnrichConfig {
                concurrency,
                max_per_minute,
                cache_path: cache,
            };
            let report = enrich_file(http, &input, &output, &config).await?;
            info!(
                output = %output.display(),
                rows = report.rows,
                fetched = report.fetched,
                failed_keys = report.failed_keys,
                "enriched table written"
            );
        }
    }

    Ok(())
}
