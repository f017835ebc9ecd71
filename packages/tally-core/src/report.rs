//! Report assembly and Markdown rendering.

use crate::exposure::ExposureTable;
use crate::types::{Portfolio, RiskMetrics};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

/// One row of the holdings table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub name: String,
    pub asset_type: String,
    pub quantity: f64,
    pub cost_basis: f64,
    /// quantity * cost_basis
    pub base_value: f64,
}

/// Exposure and risk for one portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub portfolio: String,
    pub generated_at: DateTime<Utc>,
    pub holdings: Vec<Holding>,
    pub exposure: ExposureTable,
    /// `None` when the risk half could not be computed
    pub risk: Option<RiskMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_error: Option<String>,
}

impl Report {
    /// Combine exposure with the outcome of the risk calculation.
    ///
    /// Insufficient data and invalid inputs leave the exposure half intact
    /// and are recorded in `risk_error`. Any other failure is returned.
    pub fn assemble(
        portfolio: &Portfolio,
        exposure: ExposureTable,
        risk: Result<RiskMetrics>,
    ) -> Result<Self> {
        let (risk, risk_error) = match risk {
            Ok(metrics) => (Some(metrics), None),
            Err(e @ (Error::InsufficientData(_) | Error::InvalidInput(_))) => {
                tracing::warn!("Risk metrics unavailable for '{}': {}", portfolio.name, e);
                (None, Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        let holdings = portfolio
            .positions
            .iter()
            .map(|p| Holding {
                ticker: p.asset.ticker.clone(),
                name: p.asset.name.clone(),
                asset_type: p.asset.asset_type.label().to_string(),
                quantity: p.quantity,
                cost_basis: p.cost_basis,
                base_value: p.base_value(),
            })
            .collect();

        Ok(Self {
            portfolio: portfolio.name.clone(),
            generated_at: Utc::now(),
            holdings,
            exposure,
            risk,
            risk_error,
        })
    }

    /// Render the report as a Markdown document.
    pub fn to_markdown(&self) -> String {
        self.to_string()
    }

    pub fn write_markdown<W: Write>(&self, w: &mut W) -> fmt::Result {
        writeln!(w, "# Portfolio Report: {}", cell(&self.portfolio))?;
        writeln!(w)?;
        writeln!(w, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(w)?;

        writeln!(w, "## Holdings")?;
        writeln!(w)?;
        if self.holdings.is_empty() {
            writeln!(w, "No holdings.")?;
        } else {
            writeln!(w, "| Ticker | Name | Type | Quantity | Cost Basis | Value |")?;
            writeln!(w, "|---|---|---|---:|---:|---:|")?;
            for h in &self.holdings {
                writeln!(
                    w,
                    "| {} | {} | {} | {} | {:.2} | {:.2} |",
                    cell(&h.ticker),
                    cell(&h.name),
                    h.asset_type,
                    h.quantity,
                    h.cost_basis,
                    h.base_value
                )?;
            }
        }
        writeln!(w)?;

        writeln!(w, "## Exposure Analysis")?;
        writeln!(w)?;
        if self.exposure.is_empty() {
            writeln!(w, "No exposure.")?;
        } else {
            writeln!(w, "| Type | Sector | Exposure | Share |")?;
            writeln!(w, "|---|---|---:|---:|")?;
            for b in &self.exposure.buckets {
                writeln!(
                    w,
                    "| {} | {} | {:.2} | {:.2}% |",
                    cell(&b.asset_type),
                    b.sector.as_deref().map(cell).unwrap_or_else(|| "-".to_string()),
                    b.weight,
                    b.fraction * 100.0
                )?;
            }
            writeln!(w, "| **Total** | | {:.2} | |", self.exposure.total)?;
        }
        writeln!(w)?;

        writeln!(w, "## Risk Metrics")?;
        writeln!(w)?;
        match (&self.risk, &self.risk_error) {
            (Some(risk), _) => {
                writeln!(w, "- Confidence Level: {:.4}", risk.confidence_level)?;
                writeln!(w, "- Volatility (annualized): {:.4}", risk.volatility)?;
                writeln!(w, "- Historical VaR: {:.4}", risk.historical_var)?;
                writeln!(w, "- Monte Carlo VaR: {:.4}", risk.monte_carlo_var)?;
                writeln!(w, "- Observations: {}", risk.observations)?;
                writeln!(w)?;

                let cov = &risk.covariance_matrix;
                writeln!(w, "### Covariance Matrix")?;
                writeln!(w)?;
                write!(w, "| |")?;
                for t in &cov.tickers {
                    write!(w, " {} |", cell(t))?;
                }
                writeln!(w)?;
                write!(w, "|---|")?;
                for _ in &cov.tickers {
                    write!(w, "---:|")?;
                }
                writeln!(w)?;
                for (t, row) in cov.tickers.iter().zip(&cov.values) {
                    write!(w, "| {} |", cell(t))?;
                    for v in row {
                        write!(w, " {:.4} |", v)?;
                    }
                    writeln!(w)?;
                }
            }
            (None, Some(err)) => writeln!(w, "Risk metrics unavailable: {}", err)?,
            (None, None) => writeln!(w, "Risk metrics unavailable.")?,
        }

        Ok(())
    }
}

/// Formats as Markdown.
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_markdown(f)
    }
}

/// Escape table separators in free text.
fn cell(s: &str) -> String {
    s.replace('|', "\\|")
}
