//! Price collection: fetch from a [`PriceSource`] and upsert into the store.

use crate::source::{Period, PriceSource};
use crate::store::Database;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectSummary {
    /// Points written per ticker
    pub updated: BTreeMap<String, usize>,
    /// Tickers the source had no data for
    pub empty: Vec<String>,
    /// Tickers whose fetch failed, with the reason
    pub failed: BTreeMap<String, String>,
}

impl CollectSummary {
    /// Total points written across all tickers.
    pub fn points_written(&self) -> usize {
        self.updated.values().sum()
    }
}

/// Pulls price history for known tickers into the store.
pub struct Collector<'a, S: PriceSource> {
    db: &'a Database,
    source: S,
}

impl<'a, S: PriceSource> Collector<'a, S> {
    pub fn new(db: &'a Database, source: S) -> Self {
        Self { db, source }
    }

    /// Fetch and store history for each ticker.
    ///
    /// A ticker whose fetch fails is logged and skipped. A storage failure
    /// aborts the run.
    pub fn collect_prices<I, T>(&self, tickers: I, period: Period) -> Result<CollectSummary>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut summary = CollectSummary::default();

        for ticker in tickers {
            let ticker = ticker.as_ref();
            let points = match self.source.fetch_history(ticker, period) {
                Ok(points) => points,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", ticker, e);
                    summary.failed.insert(ticker.to_string(), e.to_string());
                    continue;
                }
            };

            if points.is_empty() {
                tracing::info!("No data for {}", ticker);
                summary.empty.push(ticker.to_string());
                continue;
            }

            self.db.upsert_price_points(ticker, &points)?;
            tracing::info!("Updated {} with {} prices", ticker, points.len());
            summary.updated.insert(ticker.to_string(), points.len());
        }

        Ok(summary)
    }

    /// Refresh every ticker with an asset record.
    pub fn update_all_assets(&self, period: Period) -> Result<CollectSummary> {
        let tickers = self.db.list_known_tickers()?;
        if tickers.is_empty() {
            tracing::info!("No known tickers to update");
            return Ok(CollectSummary::default());
        }

        tracing::info!("Updating {} tickers over {}", tickers.len(), period);
        let summary = self.collect_prices(&tickers, period)?;
        tracing::info!(
            "Collection finished: {} updated, {} empty, {} failed",
            summary.updated.len(),
            summary.empty.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}
