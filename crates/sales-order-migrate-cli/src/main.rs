//! sales-order-migrate CLI - paged sales order migration with EAV mirroring.

use clap::{Parser, Subcommand};
use sales_order_migrate::core::ProgressReporter;
use sales_order_migrate::{
    Config, JsonProgress, LogProgress, MigrateError, Orchestrator, ProgressMode,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sales-order-migrate")]
#[command(about = "Paged sales order migration with EAV attribute mirroring")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to write the run report (state file)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every configured document
    Run {
        /// Override rows per page
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Validate row counts between source and destination
    Validate,

    /// Test database connections
    HealthCheck,

    /// Undo a migration (not supported)
    Rollback,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    match &cli.command {
        // Needs neither configuration nor connections
        Commands::Rollback => return Err(MigrateError::RollbackUnsupported),

        Commands::Run { page_size } => {
            let mut config = load_config(&cli)?;
            if let Some(size) = *page_size {
                config.migration.page_size = size;
                config.validate()?;
            }

            let mode = if cli.verbosity.eq_ignore_ascii_case("debug") {
                ProgressMode::Row
            } else {
                ProgressMode::Document
            };
            let progress: Arc<dyn ProgressReporter> = if cli.progress {
                Arc::new(JsonProgress::new())
            } else if mode == ProgressMode::Row {
                Arc::new(LogProgress::new(1000))
            } else {
                Arc::new(LogProgress::new(1))
            };

            let mut orchestrator = Orchestrator::connect(config)
                .await?
                .with_progress(progress, mode);
            if let Some(ref path) = cli.state_file {
                orchestrator = orchestrator.with_state_file(path.clone());
            }

            let outcome = orchestrator.perform().await;
            orchestrator.close().await;
            let result = outcome?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!(
                    "  Documents: {}/{}",
                    result.documents_migrated, result.documents_total
                );
                println!("  Rows: {}", result.rows_migrated);
                println!("  Attribute rows: {}", result.attribute_rows);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
                if !result.skipped_documents.is_empty() {
                    println!("  Skipped (unmapped): {:?}", result.skipped_documents);
                }
                if result.derivation.missing_join_keys > 0 {
                    println!(
                        "  Rows missing store_id/entity_id: {}",
                        result.derivation.missing_join_keys
                    );
                }
            }
        }

        Commands::Validate => {
            let config = load_config(&cli)?;
            let orchestrator = Orchestrator::connect(config).await?;
            let outcome = orchestrator.validate().await;
            orchestrator.close().await;
            let counts = outcome?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            }
            let mismatched: Vec<&String> = counts
                .iter()
                .filter(|(_, c)| !c.matches())
                .map(|(name, _)| name)
                .collect();
            if !mismatched.is_empty() {
                return Err(MigrateError::Store(format!(
                    "Row count mismatch for: {:?}",
                    mismatched
                )));
            }
            if !cli.output_json {
                println!("Validation completed successfully");
            }
        }

        Commands::HealthCheck => {
            let config = load_config(&cli)?;
            let orchestrator = Orchestrator::connect(config).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source: {} ({}ms)",
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Destination: {} ({}ms)",
                    if result.destination_connected { "OK" } else { "FAILED" },
                    result.destination_latency_ms
                );
                if let Some(ref err) = result.destination_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Store("Health check failed".to_string()));
            }
        }
    }

    Ok(())
}

/// Install logging, then load and validate the configuration file.
fn load_config(cli: &Cli) -> Result<Config, MigrateError> {
    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;
    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    Ok(config)
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = if format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
    installed.map_err(|e| e.to_string())
}
