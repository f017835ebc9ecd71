//! Portfolio risk metrics calculation.
//!
//! Provides returns, annualized volatility, historical and Monte Carlo VaR and
//! the annualized covariance matrix. All dispersion statistics use the
//! unbiased (n - 1) estimator, and all quantiles interpolate linearly between
//! order statistics.

use crate::config::RiskSettings;
use crate::frame::ReturnTable;
use crate::store::Database;
use crate::types::{CovarianceMatrix, Portfolio, RiskMetrics};
use crate::{Error, Result};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

/// Trading days per year.
pub const TRADING_DAYS: f64 = 252.0;

/// Risk calculator bound to a price store.
pub struct RiskCalculator<'a> {
    db: &'a Database,
    settings: RiskSettings,
}

impl<'a> RiskCalculator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_settings(db, RiskSettings::default())
    }

    pub fn with_settings(db: &'a Database, settings: RiskSettings) -> Self {
        Self { db, settings }
    }

    pub fn settings(&self) -> &RiskSettings {
        &self.settings
    }

    /// Simple returns for `tickers`, keeping only fully populated dates.
    pub fn compute_returns<I, S>(&self, tickers: I, start_date: Option<NaiveDate>) -> Result<ReturnTable>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prices = self.db.get_price_history(tickers, start_date)?;
        let returns = prices.pct_change();
        tracing::debug!(
            "Computed {} return rows from {} price rows across {} tickers",
            returns.len(),
            prices.len(),
            prices.tickers().len()
        );
        Ok(returns)
    }

    /// Volatility, both VaR figures and covariance for a portfolio.
    ///
    /// Weights are cost-basis values per ticker normalized to sum to 1. Every
    /// ticker in the portfolio needs return history.
    pub fn portfolio_risk_metrics(&self, portfolio: &Portfolio) -> Result<RiskMetrics> {
        if portfolio.positions.is_empty() {
            return Err(Error::InsufficientData(
                "portfolio has no positions".to_string(),
            ));
        }

        let tickers = portfolio.tickers();
        let returns = self.compute_returns(&tickers, None)?;

        let missing: Vec<&str> = tickers
            .iter()
            .filter(|t| !returns.tickers().contains(*t))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::InsufficientData(format!(
                "no price history for {}",
                missing.join(", ")
            )));
        }

        let weights = portfolio_weights(portfolio, returns.tickers())?;
        let portfolio_returns = returns.weighted_sum(&weights)?;

        let volatility = annualized_volatility(&portfolio_returns)?;
        let hist_var = historical_var(&portfolio_returns, self.settings.confidence)?;
        let mc_var = monte_carlo_var(
            &portfolio_returns,
            self.settings.confidence,
            self.settings.simulations,
            self.settings.horizon_days,
            &mut self.rng(),
        )?;
        let covariance = covariance_matrix(&returns)?;

        tracing::info!(
            "Risk metrics for '{}': {} observations, volatility {:.4}",
            portfolio.name,
            returns.len(),
            volatility
        );

        Ok(RiskMetrics {
            confidence_level: self.settings.confidence,
            volatility,
            historical_var: hist_var,
            monte_carlo_var: mc_var,
            covariance_matrix: covariance,
            observations: returns.len(),
        })
    }

    fn rng(&self) -> StdRng {
        match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Cost-basis weights per ticker, aligned to `tickers` and summing to 1.
///
/// Positions sharing a ticker are added together. A total that is not a
/// positive finite number cannot be normalized and is rejected.
pub fn portfolio_weights(portfolio: &Portfolio, tickers: &[String]) -> Result<Vec<f64>> {
    let mut by_ticker: BTreeMap<&str, f64> = BTreeMap::new();
    for position in &portfolio.positions {
        *by_ticker.entry(position.ticker()).or_insert(0.0) += position.base_value();
    }

    let total: f64 = by_ticker.values().sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(Error::InvalidInput(format!(
            "total cost basis must be positive to weight positions, got {}",
            total
        )));
    }

    tickers
        .iter()
        .map(|t| {
            by_ticker
                .get(t.as_str())
                .map(|v| v / total)
                .ok_or_else(|| Error::InvalidInput(format!("{} is not held in the portfolio", t)))
        })
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn require_observations(values: &[f64], what: &str) -> Result<()> {
    if values.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "{} needs at least 2 observations, got {}",
            what,
            values.len()
        )));
    }
    Ok(())
}

fn validate_confidence(confidence: f64) -> Result<()> {
    if !(confidence > 0.0 && confidence < 1.0) {
        return Err(Error::InvalidInput(format!(
            "confidence level must be between 0 and 1, got {}",
            confidence
        )));
    }
    Ok(())
}

/// Sample standard deviation (n - 1).
pub fn sample_std(values: &[f64]) -> Result<f64> {
    require_observations(values, "standard deviation")?;
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Ok(variance.sqrt())
}

/// Sample covariance (n - 1) of two equally long series.
pub fn sample_covariance(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::InvalidInput(format!(
            "series lengths differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }
    require_observations(a, "covariance")?;

    let (ma, mb) = (mean(a), mean(b));
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    Ok(sum / (a.len() - 1) as f64)
}

/// Annualized volatility: sample std * sqrt(252).
pub fn annualized_volatility(returns: &[f64]) -> Result<f64> {
    Ok(sample_std(returns)? * TRADING_DAYS.sqrt())
}

/// Quantile `q` (0..=1) with linear interpolation between order statistics.
///
/// Position `(n - 1) * q` in the sorted sample (the common "linear" method).
pub fn percentile(values: &[f64], q: f64) -> Result<f64> {
    require_observations(values, "percentile")?;
    if !(0.0..=1.0).contains(&q) {
        return Err(Error::InvalidInput(format!(
            "quantile must be within [0, 1], got {}",
            q
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (sorted.len() - 1) as f64 * q;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;

    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Historical VaR: the empirical `1 - confidence` quantile of `returns`.
///
/// Typically negative; the loss threshold breached with probability
/// `1 - confidence`.
pub fn historical_var(returns: &[f64], confidence: f64) -> Result<f64> {
    validate_confidence(confidence)?;
    percentile(returns, 1.0 - confidence)
}

/// Monte Carlo VaR from a normal fit of `returns`.
///
/// Draws `num_simulations` samples from Normal(mean, sample std) and returns
/// their `1 - confidence` quantile. `horizon_days` is accepted but does not
/// scale the simulated distribution.
pub fn monte_carlo_var<R: Rng + ?Sized>(
    returns: &[f64],
    confidence: f64,
    num_simulations: usize,
    horizon_days: u32,
    rng: &mut R,
) -> Result<f64> {
    validate_confidence(confidence)?;
    if num_simulations < 2 {
        return Err(Error::InvalidInput(format!(
            "need at least 2 simulations, got {}",
            num_simulations
        )));
    }

    require_observations(returns, "Monte Carlo VaR")?;
    let mu = mean(returns);
    let sigma = sample_std(returns)?;

    if horizon_days != 1 {
        tracing::debug!(
            "horizon_days = {} is not applied to the simulated distribution",
            horizon_days
        );
    }

    let normal = Normal::new(mu, sigma)
        .map_err(|e| Error::InvalidInput(format!("cannot fit normal({}, {}): {}", mu, sigma, e)))?;
    let simulated: Vec<f64> = (0..num_simulations).map(|_| normal.sample(rng)).collect();

    percentile(&simulated, 1.0 - confidence)
}

/// Annualized (x 252) sample covariance of every pair of return columns.
pub fn covariance_matrix(returns: &ReturnTable) -> Result<CovarianceMatrix> {
    if returns.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "covariance needs at least 2 observations, got {}",
            returns.len()
        )));
    }

    let columns = returns.columns();
    let n = columns.len();
    let mut values = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in i..n {
            let cov = sample_covariance(&columns[i], &columns[j])? * TRADING_DAYS;
            values[i][j] = cov;
            values[j][i] = cov;
        }
    }

    Ok(CovarianceMatrix {
        tickers: returns.tickers().to_vec(),
        values,
    })
}
