//! Core data types for the tally portfolio tracker.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Broad asset class of a holding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetType {
    Stock,
    Bond,
    #[serde(rename = "ETF")]
    Etf,
    Fund,
    Cash,
    Crypto,
}

impl AssetType {
    /// Label used in CSV input, storage and reports.
    pub fn label(&self) -> &'static str {
        match self {
            AssetType::Stock => "Stock",
            AssetType::Bond => "Bond",
            AssetType::Etf => "ETF",
            AssetType::Fund => "Fund",
            AssetType::Cash => "Cash",
            AssetType::Crypto => "Crypto",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AssetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Stock" => Ok(AssetType::Stock),
            "Bond" => Ok(AssetType::Bond),
            "ETF" => Ok(AssetType::Etf),
            "Fund" => Ok(AssetType::Fund),
            "Cash" => Ok(AssetType::Cash),
            "Crypto" => Ok(AssetType::Crypto),
            other => Err(Error::MalformedInput(format!(
                "unknown asset type '{}' (expected one of Stock, Bond, ETF, Fund, Cash, Crypto)",
                other
            ))),
        }
    }
}

/// An underlying holding of a composite asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Constituent {
    /// Look-through ticker; not required to exist as its own asset
    pub ticker: String,
    /// Fraction of the parent's exposure (0.0 to 1.0 by convention)
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Constituent {
    pub fn new(ticker: &str, weight: f64) -> Self {
        Self {
            ticker: ticker.to_string(),
            weight,
            name: None,
        }
    }
}

/// Asset identity and look-through mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    /// Unique ticker symbol
    pub ticker: String,
    pub name: String,
    pub asset_type: AssetType,
    /// ISO currency code, "USD" unless given
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    /// Ordered constituents; non-empty means the asset is composite
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constituents: Vec<Constituent>,
}

impl Asset {
    /// Create a non-composite asset in USD with no sector.
    pub fn new(ticker: &str, name: &str, asset_type: AssetType) -> Self {
        Self {
            ticker: ticker.to_string(),
            name: name.to_string(),
            asset_type,
            currency: "USD".to_string(),
            sector: None,
            constituents: Vec::new(),
        }
    }

    pub fn with_sector(mut self, sector: &str) -> Self {
        self.sector = Some(sector.to_string());
        self
    }

    pub fn with_constituents(mut self, constituents: Vec<Constituent>) -> Self {
        self.constituents = constituents;
        self
    }

    /// Whether exposure should be attributed to constituents instead of the asset itself.
    pub fn is_composite(&self) -> bool {
        !self.constituents.is_empty()
    }
}

/// A holding of one asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub asset: Asset,
    /// Number of units held
    pub quantity: f64,
    /// Price per unit at acquisition
    pub cost_basis: f64,
}

impl Position {
    pub fn new(asset: Asset, quantity: f64, cost_basis: f64) -> Self {
        Self {
            asset,
            quantity,
            cost_basis,
        }
    }

    /// Cost-basis value of the position (quantity * cost_basis).
    pub fn base_value(&self) -> f64 {
        self.quantity * self.cost_basis
    }

    pub fn ticker(&self) -> &str {
        &self.asset.ticker
    }
}

/// A named, ordered list of positions. Rebuilt from CSV on every run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Portfolio {
    pub name: String,
    pub positions: Vec<Position>,
}

impl Portfolio {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            positions: Vec::new(),
        }
    }

    pub fn with_positions(name: &str, positions: Vec<Position>) -> Self {
        Self {
            name: name.to_string(),
            positions,
        }
    }

    /// Calculate total cost basis of all positions.
    pub fn total_cost(&self) -> f64 {
        self.positions.iter().map(Position::base_value).sum()
    }

    /// Distinct tickers in first-seen order.
    pub fn tickers(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for position in &self.positions {
            if !seen.iter().any(|t: &String| t == position.ticker()) {
                seen.push(position.ticker().to_string());
            }
        }
        seen
    }

    /// Get the number of positions.
    pub fn position_count(&self) -> usize {
        self.positions.len()
    }
}

/// A single daily closing price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// Annualized covariance of per-asset returns, labelled by ticker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CovarianceMatrix {
    pub tickers: Vec<String>,
    /// Row-major, `tickers.len()` x `tickers.len()`
    pub values: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    /// Number of rows (and columns).
    pub fn dim(&self) -> usize {
        self.tickers.len()
    }

    /// Look up the covariance of two tickers.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        Some(self.values[i][j])
    }
}

/// Portfolio-level risk metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskMetrics {
    /// Confidence level used for both VaR figures (e.g., 0.95)
    pub confidence_level: f64,
    /// Annualized volatility of the weighted portfolio return (sample std * sqrt(252))
    pub volatility: f64,
    /// Empirical return quantile at 1 - confidence
    pub historical_var: f64,
    /// Simulated return quantile at 1 - confidence
    pub monte_carlo_var: f64,
    pub covariance_matrix: CovarianceMatrix,
    /// Number of return observations behind the figures
    pub observations: usize,
}

impl RiskMetrics {
    /// Whether every scalar and covariance cell is finite.
    pub fn is_finite(&self) -> bool {
        self.volatility.is_finite()
            && self.historical_var.is_finite()
            && self.monte_carlo_var.is_finite()
            && self
                .covariance_matrix
                .values
                .iter()
                .flatten()
                .all(|v| v.is_finite())
    }
}

/// API response wrapper for CLI output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
