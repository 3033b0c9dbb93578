//! Reckon - keyspace sampler for Redis-compatible stores
//!
//! A CLI tool that samples random keys from one or more instances,
//! groups them into buckets and writes a size and frequency report
//! per bucket.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, sampling failure, etc.)
//!   2 - Completed, but some instances were skipped (--keep-going)

use anyhow::{Context, Result};
use chrono::Utc;
use reckon::analysis::{into_named, Aggregator, AggregatorKind};
use reckon::cli::Args;
use reckon::config::{Config, ConfigSource, DEFAULT_CONFIG_FILE};
use reckon::models::ReportMetadata;
use reckon::report;
use reckon::sampler::{sample_fleet, BarProgress, LogProgress, Progress, Silent};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Configuration is resolved first so `general.verbose` can set the log level
    let (config, source) = match Config::resolve(args.config.as_deref(), Path::new(".")) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&args, config.general.verbose);

    info!("Reckon v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    log_config_source(&source);

    match run_sampling(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Sampling failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .reckon.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set instances, sample size, aggregation and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config_verbose: bool) {
    let level = args.log_level(config_verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete sampling workflow. Returns exit code (0 or 2).
async fn run_sampling(args: Args, mut config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.merge_with_args(&args);
    config.validate().context("Invalid configuration")?;

    let instances = config.run_options()?;
    let aggregator: Arc<dyn Aggregator> = Arc::from(config.aggregator());
    let progress: Arc<dyn Progress> = if args.quiet {
        Arc::new(Silent)
    } else if args.no_progress {
        Arc::new(LogProgress)
    } else {
        Arc::new(BarProgress::new())
    };

    if !args.quiet {
        println!(
            "🔎 Sampling {} keys from each of {} instance(s)",
            config.sampling.samples,
            instances.len()
        );
        println!("   Aggregation: {}", aggregator_description(&config));
        println!("   On error: {:?}\n", config.sampling.on_error);
    }

    let summary = sample_fleet(
        instances,
        config.connection_settings(),
        aggregator,
        progress,
        config.sampling.on_error,
    )
    .await
    .context("Sampling failed")?;

    // Build the reports
    let metadata = ReportMetadata {
        generated_at: Utc::now(),
        instances: summary.instances.clone(),
        skipped: summary.failures.iter().map(|f| f.address.clone()).collect(),
        aggregator: aggregator_description(&config),
        key_count: summary.key_count,
        sampled: summary.sampled,
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };
    let buckets = into_named(summary.totals);

    let written = report::write_reports(
        &config.general.output_dir,
        config.general.format,
        &buckets,
        &metadata,
        config.report.top_n,
    )?;

    // Print summary
    if !args.quiet {
        println!("\n📊 Sampling Summary:");
        println!("   Instances sampled: {}", metadata.instances.len());
        println!("   Keys in keyspace: {}", metadata.key_count);
        println!("   Keys sampled: {}", metadata.sampled);
        println!("   Buckets: {}", buckets.len());
        for results in &buckets {
            println!("   - {}: {} keys", results.name, results.total());
        }
        println!("   Duration: {:.1}s", metadata.duration_seconds);
        println!("\n✅ Sampling complete! Reports saved to:");
        for path in &written {
            println!("   {}", path.display());
        }
    }

    if !summary.failures.is_empty() {
        for failure in &summary.failures {
            warn!("Skipped {}: {}", failure.address, failure.reason);
        }
        eprintln!(
            "\n⛔ {} instance(s) were skipped. Failing (exit code 2).",
            summary.failures.len()
        );
        return Ok(2);
    }

    Ok(0)
}

fn aggregator_description(config: &Config) -> String {
    let sampling = &config.sampling;
    match sampling.aggregator {
        AggregatorKind::Prefix => format!(
            "prefix (delimiter {:?}, depth {})",
            sampling.prefix_delimiter, sampling.prefix_depth
        ),
        AggregatorKind::AnyKey => "any-key".to_string(),
        AggregatorKind::Type => "type".to_string(),
    }
}

/// Report where the configuration came from.
fn log_config_source(source: &ConfigSource) {
    match source {
        ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
        ConfigSource::Defaults => debug!("No config file found, using defaults"),
        ConfigSource::InvalidDefault(e) => warn!("Failed to load config: {}", e),
    }
}
