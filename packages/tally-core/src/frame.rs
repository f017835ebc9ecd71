//! Small typed tables for price history and returns.
//!
//! [`PriceHistory`] is a date-indexed wide table (one column per ticker, cells
//! may be absent). [`ReturnTable`] holds only fully populated rows, so every
//! column has the same length and the dates are intersected across tickers.

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Wide table of prices indexed by ascending date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    /// One row per date, one cell per ticker
    cells: Vec<Vec<Option<f64>>>,
}

impl PriceHistory {
    /// Pivot long `(ticker, date, price)` rows into a wide table.
    ///
    /// Columns are the distinct tickers in ascending order. A `None` price
    /// keeps the column but leaves the cell absent.
    pub fn pivot<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, NaiveDate, Option<f64>)>,
    {
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, Option<f64>>> = BTreeMap::new();
        let mut tickers = BTreeSet::new();

        for (ticker, date, price) in rows {
            tickers.insert(ticker.clone());
            by_date.entry(date).or_default().insert(ticker, price);
        }

        let tickers: Vec<String> = tickers.into_iter().collect();
        let mut dates = Vec::with_capacity(by_date.len());
        let mut cells = Vec::with_capacity(by_date.len());

        for (date, row) in by_date {
            dates.push(date);
            cells.push(
                tickers
                    .iter()
                    .map(|t| row.get(t).copied().flatten())
                    .collect(),
            );
        }

        Self {
            dates,
            tickers,
            cells,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Number of dates (rows).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    /// Price for a ticker on a date, if present.
    pub fn get(&self, date: NaiveDate, ticker: &str) -> Option<f64> {
        let col = self.tickers.iter().position(|t| t == ticker)?;
        let row = self.dates.binary_search(&date).ok()?;
        self.cells[row][col]
    }

    /// Present `(date, price)` pairs of one column, ascending by date.
    pub fn column(&self, ticker: &str) -> Vec<(NaiveDate, f64)> {
        let Some(col) = self.tickers.iter().position(|t| t == ticker) else {
            return Vec::new();
        };

        self.dates
            .iter()
            .zip(&self.cells)
            .filter_map(|(date, row)| row[col].map(|p| (*date, p)))
            .collect()
    }

    /// Simple period-over-period returns between consecutive rows.
    ///
    /// A row survives only when every column has a finite return, i.e. both
    /// the row and its predecessor carry a price for every ticker.
    pub fn pct_change(&self) -> ReturnTable {
        let mut dates = Vec::new();
        let mut rows = Vec::new();

        for i in 1..self.cells.len() {
            let prev = &self.cells[i - 1];
            let curr = &self.cells[i];

            let row: Option<Vec<f64>> = prev
                .iter()
                .zip(curr)
                .map(|(p0, p1)| match (p0, p1) {
                    (Some(p0), Some(p1)) => {
                        let r = (p1 - p0) / p0;
                        r.is_finite().then_some(r)
                    }
                    _ => None,
                })
                .collect();

            if let Some(row) = row {
                dates.push(self.dates[i]);
                rows.push(row);
            }
        }

        ReturnTable {
            dates,
            tickers: self.tickers.clone(),
            rows,
        }
    }
}

/// Fully populated table of per-date returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl ReturnTable {
    /// Build a table from explicit rows; every row must have one value per ticker.
    pub fn from_rows(
        tickers: Vec<String>,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if dates.len() != rows.len() || rows.iter().any(|r| r.len() != tickers.len()) {
            return Err(Error::InvalidInput(format!(
                "return table shape mismatch: {} tickers, {} dates, {} rows",
                tickers.len(),
                dates.len(),
                rows.len()
            )));
        }
        Ok(Self {
            dates,
            tickers,
            rows,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of observations (rows).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Return series of one ticker.
    pub fn column(&self, ticker: &str) -> Option<Vec<f64>> {
        let col = self.tickers.iter().position(|t| t == ticker)?;
        Some(self.rows.iter().map(|row| row[col]).collect())
    }

    /// All columns in ticker order.
    pub fn columns(&self) -> Vec<Vec<f64>> {
        (0..self.tickers.len())
            .map(|col| self.rows.iter().map(|row| row[col]).collect())
            .collect()
    }

    /// Dot product of every row with `weights` (one weight per ticker column).
    pub fn weighted_sum(&self, weights: &[f64]) -> Result<Vec<f64>> {
        if weights.len() != self.tickers.len() {
            return Err(Error::InvalidInput(format!(
                "expected {} weights, got {}",
                self.tickers.len(),
                weights.len()
            )));
        }

        Ok(self
            .rows
            .iter()
            .map(|row| row.iter().zip(weights).map(|(r, w)| r * w).sum())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn row(ticker: &str, d: u32, price: f64) -> (String, NaiveDate, Option<f64>) {
        (ticker.to_string(), day(d), Some(price))
    }

    #[test]
    fn test_pivot_sorts_dates_and_columns() {
        let history = PriceHistory::pivot(vec![
            row("BBB", 3, 21.0),
            row("AAA", 2, 10.0),
            row("BBB", 2, 20.0),
            row("AAA", 3, 11.0),
        ]);

        assert_eq!(history.tickers(), &["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(history.dates(), &[day(2), day(3)]);
        assert_eq!(history.get(day(3), "BBB"), Some(21.0));
        assert_eq!(history.get(day(4), "BBB"), None);
        assert_eq!(history.column("AAA"), vec![(day(2), 10.0), (day(3), 11.0)]);
        assert!(history.column("ZZZ").is_empty());
    }

    #[test]
    fn test_pivot_leaves_gaps_absent() {
        let history = PriceHistory::pivot(vec![row("AAA", 2, 10.0), row("BBB", 3, 20.0)]);

        assert_eq!(history.len(), 2);
        assert_eq!(history.get(day(2), "BBB"), None);
        assert_eq!(history.get(day(3), "AAA"), None);
    }

    #[test]
    fn test_pct_change_drops_first_row() {
        let history = PriceHistory::pivot(vec![
            row("AAA", 2, 100.0),
            row("AAA", 3, 110.0),
            row("AAA", 4, 99.0),
        ]);
        let returns = history.pct_change();

        assert_eq!(returns.len(), 2);
        assert_eq!(returns.dates(), &[day(3), day(4)]);
        let col = returns.column("AAA").unwrap();
        assert_relative_eq!(col[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(col[1], -0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_pct_change_intersects_dates_across_tickers() {
        // BBB is missing on day 3, so the returns for days 3 and 4 are undefined
        let history = PriceHistory::pivot(vec![
            row("AAA", 2, 10.0),
            row("BBB", 2, 20.0),
            row("AAA", 3, 11.0),
            row("AAA", 4, 12.0),
            row("BBB", 4, 22.0),
            row("AAA", 5, 13.0),
            row("BBB", 5, 24.0),
        ]);
        let returns = history.pct_change();

        assert_eq!(returns.dates(), &[day(5)]);
        assert_eq!(returns.rows()[0].len(), 2);
    }

    #[test]
    fn test_pct_change_drops_division_by_zero() {
        let history = PriceHistory::pivot(vec![
            row("AAA", 2, 0.0),
            row("AAA", 3, 1.0),
            row("AAA", 4, 2.0),
        ]);
        let returns = history.pct_change();

        assert_eq!(returns.dates(), &[day(4)]);
    }

    #[test]
    fn test_weighted_sum() {
        let table = ReturnTable::from_rows(
            vec!["AAA".to_string(), "BBB".to_string()],
            vec![day(2), day(3)],
            vec![vec![0.01, 0.03], vec![-0.02, 0.02]],
        )
        .unwrap();

        let portfolio = table.weighted_sum(&[0.5, 0.5]).unwrap();
        assert_relative_eq!(portfolio[0], 0.02, epsilon = 1e-12);
        assert_relative_eq!(portfolio[1], 0.0, epsilon = 1e-12);

        assert!(matches!(
            table.weighted_sum(&[1.0]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let result = ReturnTable::from_rows(
            vec!["AAA".to_string()],
            vec![day(2)],
            vec![vec![0.01, 0.02]],
        );
        assert!(result.is_err());
    }
}
