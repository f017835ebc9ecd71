//! Asset identity and constituent look-through mapping.

use super::Database;
use crate::types::{Asset, AssetType, Constituent};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;

impl Database {
    /// Replace the asset record for `asset.ticker` and all of its constituents.
    pub fn upsert_asset(&self, asset: &Asset) -> Result<()> {
        self.transaction(|conn| write_asset(conn, asset))?;
        tracing::debug!(
            "Upserted asset {} ({} constituents)",
            asset.ticker,
            asset.constituents.len()
        );
        Ok(())
    }

    /// Upsert a batch of assets atomically.
    pub fn upsert_assets(&self, assets: &[Asset]) -> Result<()> {
        if assets.is_empty() {
            return Ok(());
        }
        self.transaction(|conn| {
            for asset in assets {
                write_asset(conn, asset)?;
            }
            Ok(())
        })?;
        tracing::info!("Upserted {} assets", assets.len());
        Ok(())
    }

    /// Every ticker with an asset record.
    pub fn get_all_tickers(&self) -> Result<BTreeSet<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT ticker FROM assets")?;
            let tickers = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<BTreeSet<_>>>()?;
            Ok(tickers)
        })
    }

    /// Load one asset with its constituents in stored order.
    pub fn get_asset(&self, ticker: &str) -> Result<Option<Asset>> {
        self.with_connection(|conn| {
            let header = conn
                .query_row(
                    "SELECT ticker, name, asset_type, currency, sector FROM assets WHERE ticker = ?1",
                    [ticker],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((ticker, name, asset_type, currency, sector)) = header else {
                return Ok(None);
            };

            let asset_type: AssetType = asset_type.parse().map_err(|_| {
                Error::StorageUnavailable(format!(
                    "corrupt asset type '{}' for {}",
                    asset_type, ticker
                ))
            })?;

            let mut stmt = conn.prepare(
                "SELECT constituent_ticker, weight, name FROM constituents
                 WHERE parent_ticker = ?1 ORDER BY position",
            )?;
            let constituents = stmt
                .query_map([&ticker], |row| {
                    Ok(Constituent {
                        ticker: row.get(0)?,
                        weight: row.get(1)?,
                        name: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(Some(Asset {
                ticker,
                name,
                asset_type,
                currency,
                sector,
                constituents,
            }))
        })
    }
}

/// Full replace: the asset row is overwritten and its constituents are deleted
/// and reinserted, never merged.
fn write_asset(conn: &Connection, asset: &Asset) -> Result<()> {
    conn.execute(
        "INSERT INTO assets (ticker, name, asset_type, currency, sector)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(ticker) DO UPDATE SET
            name = excluded.name,
            asset_type = excluded.asset_type,
            currency = excluded.currency,
            sector = excluded.sector",
        rusqlite::params![
            asset.ticker,
            asset.name,
            asset.asset_type.label(),
            asset.currency,
            asset.sector
        ],
    )?;

    conn.execute(
        "DELETE FROM constituents WHERE parent_ticker = ?1",
        [&asset.ticker],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO constituents (parent_ticker, position, constituent_ticker, name, weight)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, c) in asset.constituents.iter().enumerate() {
        stmt.execute(rusqlite::params![
            asset.ticker,
            position as i64,
            c.ticker,
            c.name,
            c.weight
        ])?;
    }

    Ok(())
}
