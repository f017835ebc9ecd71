//! Daily price history, reconciled on `(ticker, date)`.

use super::dates::{format_day, parse_day, CalendarDay};
use super::Database;
use crate::frame::PriceHistory;
use crate::types::PricePoint;
use crate::Result;
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use std::collections::BTreeSet;

impl Database {
    /// Insert or replace prices for one ticker.
    ///
    /// Dates are normalized to calendar days first; a later point for the same
    /// `(ticker, date)` replaces the earlier one, both within `series` and
    /// against what is already stored. Prices are stored as given. The whole
    /// series is written in one transaction.
    pub fn upsert_prices<D, I>(&self, ticker: &str, series: I) -> Result<()>
    where
        D: CalendarDay,
        I: IntoIterator<Item = (D, f64)>,
    {
        let points = series
            .into_iter()
            .map(|(date, price)| Ok((format_day(date.calendar_day()?), price)))
            .collect::<Result<Vec<_>>>()?;

        if points.is_empty() {
            return Ok(());
        }

        self.transaction(|conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO prices (ticker, date, price) VALUES (?1, ?2, ?3)
                 ON CONFLICT(ticker, date) DO UPDATE SET price = excluded.price",
            )?;
            for (date, price) in &points {
                stmt.execute(rusqlite::params![ticker, date, price])?;
            }
            Ok(())
        })?;

        tracing::debug!("Upserted {} prices for {}", points.len(), ticker);
        Ok(())
    }

    /// Convenience wrapper over [`Database::upsert_prices`] for fetched points.
    pub fn upsert_price_points(&self, ticker: &str, points: &[PricePoint]) -> Result<()> {
        self.upsert_prices(ticker, points.iter().map(|p| (p.date, p.price)))
    }

    /// Wide price table for `tickers`, optionally from `start_date` inclusive.
    ///
    /// Tickers without stored prices are absent from the columns; no data at
    /// all yields an empty table.
    pub fn get_price_history<I, S>(
        &self,
        tickers: I,
        start_date: Option<NaiveDate>,
    ) -> Result<PriceHistory>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tickers: BTreeSet<String> = tickers
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect();
        if tickers.is_empty() {
            return Ok(PriceHistory::default());
        }

        let placeholders = vec!["?"; tickers.len()].join(", ");
        let mut sql = format!(
            "SELECT ticker, date, price FROM prices WHERE ticker IN ({})",
            placeholders
        );
        let mut params: Vec<String> = tickers.into_iter().collect();
        if let Some(start) = start_date {
            sql.push_str(" AND date >= ?");
            params.push(format_day(start));
        }
        sql.push_str(" ORDER BY date, ticker");

        let rows = self.with_connection(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<f64>>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(raw)
        })?;

        let rows = rows
            .into_iter()
            .map(|(ticker, date, price)| Ok((ticker, stored_day(&date)?, price)))
            .collect::<Result<Vec<_>>>()?;

        Ok(PriceHistory::pivot(rows))
    }

    /// Every ticker with an asset record; drives refresh-all.
    pub fn list_known_tickers(&self) -> Result<BTreeSet<String>> {
        self.get_all_tickers()
    }

    /// Number of stored price rows for a ticker.
    pub fn price_count(&self, ticker: &str) -> Result<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM prices WHERE ticker = ?1",
                [ticker],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Most recent stored day for a ticker.
    pub fn latest_price_date(&self, ticker: &str) -> Result<Option<NaiveDate>> {
        let latest = self.with_connection(|conn| {
            let latest: Option<String> = conn
                .query_row(
                    "SELECT MAX(date) FROM prices WHERE ticker = ?1",
                    [ticker],
                    |row| row.get(0),
                )
                .optional()?
                .flatten();
            Ok(latest)
        })?;

        latest.as_deref().map(stored_day).transpose()
    }
}

fn stored_day(raw: &str) -> Result<NaiveDate> {
    parse_day(raw).map_err(|_| {
        crate::Error::StorageUnavailable(format!("corrupt date '{}' in prices table", raw))
    })
}
