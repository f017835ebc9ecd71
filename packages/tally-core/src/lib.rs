//! Tally Core - portfolio ingestion, price history and risk reporting.
//!
//! This crate provides the building blocks behind the `tally` CLI:
//!
//! - **Store**: SQLite-backed asset and daily price history, upserted on
//!   `(ticker, date)` so repeated overlapping fetches never duplicate rows
//! - **Exposure**: cost-basis exposure grouped by (type, sector) with
//!   look-through of composite assets
//! - **Risk**: returns, annualized volatility, historical and Monte Carlo VaR,
//!   annualized covariance
//! - **Collection**: pluggable market-data sources feeding the price store
//!
//! # Example
//!
//! ```rust,no_run
//! use tally_core::{ingest::Ingester, report::Report, Database, RiskCalculator};
//!
//! let db = Database::open_in_memory()?;
//! let portfolio = Ingester::new(&db).load_portfolio_from_csv("holdings.csv", "Main")?;
//!
//! let exposure = tally_core::exposure::portfolio_exposure(&portfolio);
//! let risk = RiskCalculator::new(&db).portfolio_risk_metrics(&portfolio)?;
//! let report = Report::assemble(&portfolio, exposure, Ok(risk))?;
//! println!("{}", report.to_markdown());
//! # Ok::<(), tally_core::Error>(())
//! ```

pub mod collector;
pub mod config;
pub mod exposure;
pub mod frame;
pub mod ingest;
pub mod report;
pub mod risk;
pub mod source;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use types::{
    ApiResponse, Asset, AssetType, Constituent, CovarianceMatrix, Portfolio, Position, PricePoint,
    RiskMetrics,
};

// Re-export main functionality
pub use collector::{CollectSummary, Collector};
pub use ingest::Ingester;
pub use config::Config;
pub use exposure::{group_exposure, portfolio_exposure, ExposureRow, ExposureTable};
pub use frame::{PriceHistory, ReturnTable};
pub use risk::{
    covariance_matrix, historical_var, monte_carlo_var, percentile, sample_std, RiskCalculator,
};
pub use report::Report;
pub use source::{CsvPriceSource, Period, PriceSource, YahooSource};
pub use store::{CalendarDay, Database};

/// Error types for tally-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Fetch failed for {ticker}: {reason}")]
    FetchFailed { ticker: String, reason: String },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::StorageUnavailable(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::StorageUnavailable(e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::MalformedInput(e.to_string())
    }
}

/// Result type for tally-core operations.
pub type Result<T> = std::result::Result<T, Error>;
