use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use energymetrics::config::{self, Config};
use energymetrics::email::AttachmentHarvester;
use energymetrics::gmail_client::GmailClient;
use energymetrics::influx::InfluxWriter;
use energymetrics::logging;
use energymetrics::metrics::{DryRunSink, MetricSink};
use energymetrics::smartmeter::MeterCsvIngestor;
use energymetrics::solar::{ReportWindow, SolarEdgeClient, SolarReporter};

#[derive(Parser)]
#[command(name = "energymetrics")]
#[command(about = "Smart meter and SolarEdge energy metrics to InfluxDB")]
#[command(version = "0.1.0")]
struct Args {
    /// Dry-run mode: read everything, change nothing (no label change, no database write)
    #[arg(long, global = true)]
    dry_run: bool,

    /// Check the configuration without connecting anywhere
    #[arg(long, global = true)]
    check_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Download smart meter CSV attachments from unread Gmail messages
    Harvest {
        /// Attachment directory (default: SMARTMETER_DIR or ./smartmeter)
        #[arg(short = 'o', long)]
        output_dir: Option<String>,
    },
    /// Load smart meter CSV files into InfluxDB
    Ingest {
        /// File pattern (default: SMARTMETER_PATTERN or ./smartmeter/Interval*.CSV)
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Report SolarEdge production for the last hour and/or day
    Solar {
        /// Energy produced during the last full hour (also `-hr`)
        #[arg(long)]
        hour: bool,
        /// Energy produced during the previous day
        #[arg(short = 'd', long)]
        day: bool,
    },
    /// Print SolarEdge production power samples for the last full hour
    Power,
}

/// `-hr` is accepted as a spelling of `--hour`.
fn normalized_args() -> Vec<String> {
    std::env::args()
        .map(|arg| if arg == "-hr" { "--hour".to_string() } else { arg })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    // Charger le fichier d'environnement (SLR_CONFIG ou .env) avant le logging,
    // il peut définir LOG_FILE. Son erreur éventuelle est remontée plus bas.
    let env_file = config::load_env_file();

    // Parser les arguments CLI
    let args = Args::parse_from(normalized_args());

    // Initialiser le logging (console + fichier)
    let log_file = std::env::var("LOG_FILE").unwrap_or_else(|_| "debug.log".to_string());
    if let Err(e) = logging::init(&PathBuf::from(log_file)) {
        eprintln!("❌ {:#}", e);
        return ExitCode::FAILURE;
    }

    // Every failure from here on goes through the logger only
    match run(args, env_file).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, env_file: Result<Option<PathBuf>>) -> Result<()> {
    if let Some(path) = env_file? {
        info!("Configuration loaded from {}", path.display());
    }

    // Charger la configuration
    let config = Config::new()?;

    // Si demandé, vérifier seulement la configuration
    if args.check_config {
        println!("✅ Configuration valid!");
        println!("{}", config.describe());
        return Ok(());
    }

    let Some(command) = args.command else {
        println!("Nothing to do: choose one of harvest, ingest, solar, power (see --help)");
        return Ok(());
    };

    match command {
        Command::Harvest { output_dir } => run_harvest(&config, output_dir, args.dry_run).await,
        Command::Ingest { pattern } => run_ingest(&config, pattern, args.dry_run).await,
        Command::Solar { hour, day } => run_solar(&config, hour, day, args.dry_run).await,
        Command::Power => run_power(&config).await,
    }
}

async fn run_harvest(config: &Config, output_dir: Option<String>, dry_run: bool) -> Result<()> {
    if dry_run {
        info!("🧪 Starting mail harvest in DRY-RUN mode (messages stay unread)");
    } else {
        info!("🚀 Starting mail harvest");
    }

    // CLI directory wins over SMARTMETER_DIR
    let output_dir = output_dir.unwrap_or_else(|| config.smartmeter.output_dir.clone());

    // Authentifier avant toute recherche
    let gmail = GmailClient::new(&config.gmail).await?;

    let report = AttachmentHarvester::new(&gmail, output_dir)
        .dry_run(dry_run)
        .harvest(&config.gmail.query)
        .await?;

    info!(
        "✅ Harvest done: {} attachment(s) from {} message(s)",
        report.attachments_written, report.messages_found
    );
    Ok(())
}

async fn run_ingest(config: &Config, pattern: Option<String>, dry_run: bool) -> Result<()> {
    let pattern = pattern.unwrap_or_else(|| config.smartmeter.pattern.clone());

    // Dry-run prints the batches instead of writing them
    let report = if dry_run {
        info!("🧪 Starting smart meter ingestion in DRY-RUN mode");
        MeterCsvIngestor::new(&DryRunSink, config.timezone)
            .ingest_pattern(&pattern)
            .await?
    } else {
        info!("🚀 Starting smart meter ingestion");
        let writer = InfluxWriter::new(config.require_influx()?, &config.http)?;
        MeterCsvIngestor::new(&writer, config.timezone)
            .ingest_pattern(&pattern)
            .await?
    };

    // Failed files were skipped, the run still reports them
    if !report.is_success() {
        anyhow::bail!(
            "{} file(s) could not be ingested: {:?}",
            report.files_failed.len(),
            report.files_failed
        );
    }
    Ok(())
}

async fn run_solar(config: &Config, hour: bool, day: bool, dry_run: bool) -> Result<()> {
    let windows = ReportWindow::from_flags(hour, day);
    if windows.is_empty() {
        info!("No window requested (use --hour and/or --day), nothing to do");
        return Ok(());
    }

    let client = SolarEdgeClient::new(&config.require_solaredge()?, &config.http)?;

    if dry_run {
        info!("🧪 Starting solar report in DRY-RUN mode");
        report_solar(&client, &DryRunSink, config, &windows).await
    } else {
        info!("🚀 Starting solar report");
        let writer = InfluxWriter::new(config.require_influx()?, &config.http)?;
        report_solar(&client, &writer, config, &windows).await
    }
}

async fn report_solar<S: MetricSink>(
    client: &SolarEdgeClient,
    sink: &S,
    config: &Config,
    windows: &[ReportWindow],
) -> Result<()> {
    let reports = SolarReporter::new(client, sink, config.timezone)
        .report(windows)
        .await?;

    let degraded = reports.iter().filter(|r| r.reading.degraded).count();
    info!(
        "✅ Solar report done: {} point(s), {} substituted with 0",
        reports.len(),
        degraded
    );
    Ok(())
}

async fn run_power(config: &Config) -> Result<()> {
    let client = SolarEdgeClient::new(&config.require_solaredge()?, &config.http)?;
    // Same window as the hourly energy report
    let span = ReportWindow::LastHour.span(config.timezone.now());

    let Some(details) = client.power_details(&span).await? else {
        println!("❌ Power details unavailable for {}", span);
        return Ok(());
    };

    println!(
        "⚡ Production power {} (unit: {}, resolution: {})",
        span,
        details.unit.as_deref().unwrap_or("?"),
        details.time_unit.as_deref().unwrap_or("?")
    );
    for meter in &details.meters {
        println!("   📡 Meter: {}", meter.meter_type.as_deref().unwrap_or("Unknown"));
        for value in &meter.values {
            let shown = value
                .value
                .map(|v| format!("{:.1}", v))
                .unwrap_or_else(|| "N/A".to_string());
            println!("      {} | {}", value.date.as_deref().unwrap_or("?"), shown);
        }
    }
    Ok(())
}
