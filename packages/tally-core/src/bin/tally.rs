//! Tally CLI - load holdings, collect prices and report exposure and risk.
//!
//! Results are printed to stdout as a JSON `ApiResponse`; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tally_core::{
    exposure::portfolio_exposure, ApiResponse, Collector, Config, CsvPriceSource, Database,
    Ingester, Period, PriceSource, Report, RiskCalculator, YahooSource,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally - portfolio price history, exposure and risk")]
#[command(version)]
struct Cli {
    /// Database file (overrides the configured location)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (defaults to $TALLY_CONFIG or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a holdings CSV and record its assets
    Load {
        /// Path to the holdings CSV
        csv: PathBuf,
        /// Portfolio name
        #[arg(short, long, default_value = "Main")]
        name: String,
    },
    /// Fetch daily prices for every known ticker
    Collect {
        /// Lookback period (1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd, max)
        #[arg(short, long)]
        period: Option<String>,
        /// Read prices from a ticker,date,price CSV instead of the network
        #[arg(long)]
        from_csv: Option<PathBuf>,
    },
    /// Build the exposure and risk report for a holdings CSV
    Report {
        /// Path to the holdings CSV
        csv: PathBuf,
        /// Portfolio name
        #[arg(short, long, default_value = "Main")]
        name: String,
        /// Also write the report as Markdown
        #[arg(long)]
        markdown: Option<PathBuf>,
        /// Confidence level for VaR (0.95 = 95%)
        #[arg(long)]
        confidence: Option<f64>,
        /// Seed for the Monte Carlo simulation
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List known tickers with their stored price coverage
    Tickers,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(response) => {
            print_json(&response);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            print_json(&ApiResponse::<()>::err(format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("failed to encode response: {}", e),
    }
}

fn run(cli: Cli) -> anyhow::Result<ApiResponse<serde_json::Value>> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("failed to load configuration")?;

    let db = match &cli.db {
        Some(path) => {
            Database::open_with_timeout(path, Duration::from_millis(config.busy_timeout_ms))
        }
        None => Database::open_with_config(&config),
    }
    .context("failed to open database")?;
    db.health_check().context("database is not usable")?;

    match cli.command {
        Commands::Load { csv, name } => {
            let portfolio = Ingester::new(&db)
                .load_portfolio_from_csv(&csv, &name)
                .with_context(|| format!("failed to load {}", csv.display()))?;
            Ok(ApiResponse::ok(json!({
                "portfolio": portfolio.name,
                "position_count": portfolio.position_count(),
                "total_cost": portfolio.total_cost(),
                "tickers": portfolio.tickers(),
            })))
        }
        Commands::Collect { period, from_csv } => {
            let period: Period = period
                .as_deref()
                .unwrap_or(&config.default_period)
                .parse()?;
            let summary = match from_csv {
                Some(path) => collect(&db, CsvPriceSource::from_path(path)?, period)?,
                None => collect(&db, YahooSource::from_config(&config)?, period)?,
            };
            Ok(ApiResponse::ok(json!({
                "period": period.as_str(),
                "updated": summary.updated,
                "empty": summary.empty,
                "failed": summary.failed,
                "points_written": summary.points_written(),
            })))
        }
        Commands::Report {
            csv,
            name,
            markdown,
            confidence,
            seed,
        } => {
            let portfolio = Ingester::new(&db)
                .load_portfolio_from_csv(&csv, &name)
                .with_context(|| format!("failed to load {}", csv.display()))?;

            let mut settings = config.risk.clone();
            if let Some(confidence) = confidence {
                settings.confidence = confidence;
            }
            if seed.is_some() {
                settings.seed = seed;
            }

            let exposure = portfolio_exposure(&portfolio);
            let risk = RiskCalculator::with_settings(&db, settings).portfolio_risk_metrics(&portfolio);
            let report = Report::assemble(&portfolio, exposure, risk)?;

            if let Some(path) = &markdown {
                std::fs::write(path, report.to_markdown())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                tracing::info!("Wrote Markdown report to {:?}", path);
            }

            let risk_error = report.risk_error.clone();
            Ok(ApiResponse {
                ok: true,
                data: Some(serde_json::to_value(&report)?),
                error: risk_error,
            })
        }
        Commands::Tickers => {
            let mut tickers = Vec::new();
            for ticker in db.list_known_tickers()? {
                tickers.push(json!({
                    "ticker": ticker,
                    "prices": db.price_count(&ticker)?,
                    "latest": db.latest_price_date(&ticker)?,
                }));
            }
            Ok(ApiResponse::ok(json!({ "tickers": tickers })))
        }
    }
}

fn collect<S: PriceSource>(
    db: &Database,
    source: S,
    period: Period,
) -> tally_core::Result<tally_core::CollectSummary> {
    Collector::new(db, source).update_all_assets(period)
}
