//! Cost-basis exposure grouped by (type, sector).
//!
//! Composite assets are expanded into their constituents, which all land in
//! the coarse `("Constituent", "Look-through")` bucket. A constituent ticker
//! is never looked up as an asset of its own, even when one exists.

use crate::types::Portfolio;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type label given to look-through rows.
pub const LOOK_THROUGH_TYPE: &str = "Constituent";
/// Sector label given to look-through rows.
pub const LOOK_THROUGH_SECTOR: &str = "Look-through";

/// One ungrouped exposure contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRow {
    pub ticker: String,
    pub asset_type: String,
    pub sector: Option<String>,
    pub weight: f64,
}

/// Aggregated exposure of one (type, sector) bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureBucket {
    pub asset_type: String,
    /// `None` is its own bucket, distinct from every named sector
    pub sector: Option<String>,
    pub weight: f64,
    /// Share of total exposure, 0 when the total is 0
    pub fraction: f64,
}

/// Exposure buckets ordered by (type, sector).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureTable {
    pub buckets: Vec<ExposureBucket>,
    pub total: f64,
}

impl ExposureTable {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Aggregate weight of a bucket.
    pub fn get(&self, asset_type: &str, sector: Option<&str>) -> Option<f64> {
        self.buckets
            .iter()
            .find(|b| b.asset_type == asset_type && b.sector.as_deref() == sector)
            .map(|b| b.weight)
    }
}

/// Expand a portfolio into per-asset (or per-constituent) exposure rows.
pub fn exposure_rows(portfolio: &Portfolio) -> Vec<ExposureRow> {
    let mut rows = Vec::new();

    for position in &portfolio.positions {
        let base_value = position.base_value();
        let asset = &position.asset;

        if asset.is_composite() {
            rows.extend(asset.constituents.iter().map(|c| ExposureRow {
                ticker: c.ticker.clone(),
                asset_type: LOOK_THROUGH_TYPE.to_string(),
                sector: Some(LOOK_THROUGH_SECTOR.to_string()),
                weight: c.weight * base_value,
            }));
        } else {
            rows.push(ExposureRow {
                ticker: asset.ticker.clone(),
                asset_type: asset.asset_type.label().to_string(),
                sector: asset.sector.clone(),
                weight: base_value,
            });
        }
    }

    rows
}

/// Group rows by (type, sector) and sum their weights.
pub fn group_exposure(rows: &[ExposureRow]) -> ExposureTable {
    let mut grouped: BTreeMap<(&str, Option<&str>), f64> = BTreeMap::new();
    for row in rows {
        *grouped
            .entry((row.asset_type.as_str(), row.sector.as_deref()))
            .or_insert(0.0) += row.weight;
    }

    let total: f64 = grouped.values().sum();
    let buckets = grouped
        .into_iter()
        .map(|((asset_type, sector), weight)| ExposureBucket {
            asset_type: asset_type.to_string(),
            sector: sector.map(str::to_string),
            weight,
            fraction: if total != 0.0 { weight / total } else { 0.0 },
        })
        .collect();

    ExposureTable { buckets, total }
}

/// Grouped exposure of a portfolio.
pub fn portfolio_exposure(portfolio: &Portfolio) -> ExposureTable {
    group_exposure(&exposure_rows(portfolio))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Asset, AssetType, Constituent, Position};
    use approx::assert_relative_eq;

    fn portfolio(positions: Vec<Position>) -> Portfolio {
        Portfolio::with_positions("Test", positions)
    }

    #[test]
    fn test_single_stock_exposure() {
        let asset = Asset::new("AAA", "Triple A", AssetType::Stock).with_sector("Tech");
        let table = portfolio_exposure(&portfolio(vec![Position::new(asset, 10.0, 5.0)]));

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("Stock", Some("Tech")), Some(50.0));
        assert_relative_eq!(table.buckets[0].fraction, 1.0);
    }

    #[test]
    fn test_look_through_rows() {
        let fund = Asset::new("FND", "Fund", AssetType::Etf)
            .with_sector("Broad")
            .with_constituents(vec![Constituent::new("X", 0.6), Constituent::new("Y", 0.4)]);
        let p = portfolio(vec![Position::new(fund, 4.0, 25.0)]);

        let rows = exposure_rows(&p);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ticker, "X");
        assert_relative_eq!(rows[0].weight, 60.0, epsilon = 1e-9);
        assert_relative_eq!(rows[1].weight, 40.0, epsilon = 1e-9);
        for row in &rows {
            assert_eq!(row.asset_type, LOOK_THROUGH_TYPE);
            assert_eq!(row.sector.as_deref(), Some(LOOK_THROUGH_SECTOR));
        }

        let table = group_exposure(&rows);
        assert_eq!(table.len(), 1);
        assert_relative_eq!(
            table.get(LOOK_THROUGH_TYPE, Some(LOOK_THROUGH_SECTOR)).unwrap(),
            100.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_constituent_not_resolved_as_asset() {
        // X also held directly as a Tech stock; the look-through slice stays separate
        let x = Asset::new("X", "Ex", AssetType::Stock).with_sector("Tech");
        let fund = Asset::new("FND", "Fund", AssetType::Fund)
            .with_constituents(vec![Constituent::new("X", 1.0)]);
        let table = portfolio_exposure(&portfolio(vec![
            Position::new(x, 1.0, 10.0),
            Position::new(fund, 1.0, 20.0),
        ]));

        assert_eq!(table.get("Stock", Some("Tech")), Some(10.0));
        assert_eq!(
            table.get(LOOK_THROUGH_TYPE, Some(LOOK_THROUGH_SECTOR)),
            Some(20.0)
        );
        assert_relative_eq!(table.total, 30.0);
    }

    #[test]
    fn test_missing_sector_is_its_own_bucket() {
        let named = Asset::new("AAA", "A", AssetType::Stock).with_sector("Tech");
        let unnamed = Asset::new("BBB", "B", AssetType::Stock);
        let table = portfolio_exposure(&portfolio(vec![
            Position::new(named, 1.0, 10.0),
            Position::new(unnamed.clone(), 2.0, 10.0),
            Position::new(unnamed, 1.0, 5.0),
        ]));

        assert_eq!(table.len(), 2);
        assert_eq!(table.get("Stock", None), Some(25.0));
        assert_eq!(table.get("Stock", Some("Tech")), Some(10.0));
    }

    #[test]
    fn test_grouping_is_deterministic() {
        let assets = vec![
            Position::new(Asset::new("C", "C", AssetType::Crypto), 1.0, 1.0),
            Position::new(Asset::new("B", "B", AssetType::Bond).with_sector("Gov"), 1.0, 2.0),
            Position::new(Asset::new("S", "S", AssetType::Stock).with_sector("Energy"), 1.0, 3.0),
        ];
        let mut reversed = assets.clone();
        reversed.reverse();

        let a = portfolio_exposure(&portfolio(assets));
        let b = portfolio_exposure(&portfolio(reversed));
        assert_eq!(a, b);

        let order: Vec<&str> = a.buckets.iter().map(|b| b.asset_type.as_str()).collect();
        assert_eq!(order, vec!["Bond", "Crypto", "Stock"]);
    }

    #[test]
    fn test_empty_portfolio() {
        let table = portfolio_exposure(&Portfolio::new("Empty"));
        assert!(table.is_empty());
        assert_eq!(table.total, 0.0);
    }
}
