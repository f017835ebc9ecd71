//! Portfolio ingestion from CSV.
//!
//! Expected headers: `Ticker, Name, Type, Quantity, CostBasis`, optionally
//! `Currency` (default USD), `Sector`, and the comma-separated parallel lists
//! `ConstituentTickers` / `ConstituentWeights`.

use crate::store::Database;
use crate::types::{Asset, AssetType, Constituent, Portfolio, Position};
use crate::{Error, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct HoldingRecord {
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Type")]
    asset_type: String,
    #[serde(rename = "Quantity")]
    quantity: f64,
    #[serde(rename = "CostBasis")]
    cost_basis: f64,
    #[serde(rename = "Currency", default)]
    currency: Option<String>,
    #[serde(rename = "Sector", default)]
    sector: Option<String>,
    #[serde(rename = "ConstituentTickers", default)]
    constituent_tickers: Option<String>,
    #[serde(rename = "ConstituentWeights", default)]
    constituent_weights: Option<String>,
}

/// Loads portfolios and records their assets in the store.
pub struct Ingester<'a> {
    db: &'a Database,
}

impl<'a> Ingester<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Parse a holdings CSV and upsert every asset it names.
    ///
    /// Nothing is written unless the whole file parses.
    pub fn load_portfolio_from_csv(&self, path: impl AsRef<Path>, name: &str) -> Result<Portfolio> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::MalformedInput(format!("{}: {}", path.display(), e)))?;

        let portfolio = parse_portfolio(file, name)?;

        let assets: Vec<Asset> = portfolio
            .positions
            .iter()
            .map(|p| p.asset.clone())
            .collect();
        self.db.upsert_assets(&assets)?;

        tracing::info!(
            "Loaded portfolio '{}' with {} positions from {:?}",
            name,
            portfolio.position_count(),
            path
        );
        Ok(portfolio)
    }
}

/// Parse holdings CSV content into a portfolio without touching the store.
pub fn parse_portfolio<R: Read>(reader: R, name: &str) -> Result<Portfolio> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut positions = Vec::new();
    for (i, record) in csv.deserialize::<HoldingRecord>().enumerate() {
        let row = i + 1;
        let record = record.map_err(|e| Error::MalformedInput(format!("row {}: {}", row, e)))?;
        positions.push(
            to_position(record).map_err(|e| Error::MalformedInput(format!("row {}: {}", row, e)))?,
        );
    }

    Ok(Portfolio::with_positions(name, positions))
}

fn to_position(record: HoldingRecord) -> Result<Position> {
    let asset_type: AssetType = record.asset_type.parse()?;
    let constituents = parse_constituents(
        record.constituent_tickers.as_deref(),
        record.constituent_weights.as_deref(),
    )?;

    let asset = Asset {
        ticker: record.ticker,
        name: record.name,
        asset_type,
        currency: record.currency.unwrap_or_else(|| "USD".to_string()),
        sector: record.sector,
        constituents,
    };

    Ok(Position::new(asset, record.quantity, record.cost_basis))
}

/// Zip the parallel ticker/weight lists; unmatched trailing entries are dropped.
///
/// Entries are positional, so a blank weight or a blank ticker paired with a
/// weight is rejected rather than skipped.
fn parse_constituents(tickers: Option<&str>, weights: Option<&str>) -> Result<Vec<Constituent>> {
    let Some(tickers) = tickers else {
        return Ok(Vec::new());
    };
    let Some(weights) = weights else {
        return Err(Error::MalformedInput(
            "ConstituentTickers given without ConstituentWeights".to_string(),
        ));
    };

    let weights = split_list(weights)
        .enumerate()
        .map(|(i, w)| {
            w.parse::<f64>().map_err(|_| {
                Error::MalformedInput(format!("invalid constituent weight '{}' at position {}", w, i + 1))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    split_list(tickers)
        .zip(weights)
        .enumerate()
        .map(|(i, (ticker, weight))| {
            if ticker.is_empty() {
                return Err(Error::MalformedInput(format!(
                    "blank constituent ticker at position {}",
                    i + 1
                )));
            }
            Ok(Constituent::new(ticker, weight))
        })
        .collect()
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HOLDINGS: &str = "\
Ticker,Name,Type,Quantity,CostBasis,Currency,Sector,ConstituentTickers,ConstituentWeights
AAA,Triple A,Stock,10,10,USD,Tech,,
BBB,Triple B,Bond,5,20,,,,
FND,World Fund,ETF,2,50,EUR,,\"X, Y\",\"0.6,0.4\"
";

    #[test]
    fn test_parse_portfolio() {
        let portfolio = parse_portfolio(HOLDINGS.as_bytes(), "Main").unwrap();

        assert_eq!(portfolio.name, "Main");
        assert_eq!(portfolio.position_count(), 3);

        let aaa = &portfolio.positions[0];
        assert_eq!(aaa.asset.asset_type, AssetType::Stock);
        assert_eq!(aaa.asset.sector.as_deref(), Some("Tech"));
        assert_eq!(aaa.base_value(), 100.0);

        let bbb = &portfolio.positions[1];
        assert_eq!(bbb.asset.currency, "USD");
        assert_eq!(bbb.asset.sector, None);
        assert!(!bbb.asset.is_composite());

        let fund = &portfolio.positions[2];
        assert_eq!(fund.asset.asset_type, AssetType::Etf);
        assert_eq!(fund.asset.currency, "EUR");
        assert_eq!(
            fund.asset.constituents,
            vec![Constituent::new("X", 0.6), Constituent::new("Y", 0.4)]
        );
    }

    #[test]
    fn test_optional_columns_may_be_absent() {
        let csv = "Ticker,Name,Type,Quantity,CostBasis\nAAA,Triple A,Crypto,1.5,2\n";
        let portfolio = parse_portfolio(csv.as_bytes(), "Main").unwrap();

        let asset = &portfolio.positions[0].asset;
        assert_eq!(asset.currency, "USD");
        assert_eq!(asset.sector, None);
        assert!(asset.constituents.is_empty());
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let csv = "Ticker,Name,Type,Quantity,CostBasis\nAAA,Triple A,Equity,1,2\n";
        let err = parse_portfolio(csv.as_bytes(), "Main").unwrap_err();
        assert!(matches!(err, Error::MalformedInput(ref m) if m.starts_with("row 1")));
    }

    #[test]
    fn test_bad_quantity_is_malformed() {
        let csv = "Ticker,Name,Type,Quantity,CostBasis\nAAA,A,Stock,1,2\nBBB,B,Stock,lots,2\n";
        let err = parse_portfolio(csv.as_bytes(), "Main").unwrap_err();
        assert!(matches!(err, Error::MalformedInput(ref m) if m.starts_with("row 2")));
    }

    #[test]
    fn test_constituent_lists() {
        assert!(parse_constituents(None, None).unwrap().is_empty());
        assert!(parse_constituents(Some("X"), None).is_err());
        assert!(parse_constituents(Some("X"), Some("half")).is_err());

        // Extra weight is dropped, like an unmatched ticker would be
        let zipped = parse_constituents(Some("X,Y"), Some("0.5,0.3,0.2")).unwrap();
        assert_eq!(zipped.len(), 2);
    }

    #[test]
    fn test_blank_constituent_entries_rejected() {
        assert!(matches!(
            parse_constituents(Some("X,,Y"), Some("0.5,0.3,0.2")),
            Err(Error::MalformedInput(_))
        ));
        assert!(matches!(
            parse_constituents(Some("X,Y"), Some("0.6,,0.4")),
            Err(Error::MalformedInput(_))
        ));

        let csv = "Ticker,Name,Type,Quantity,CostBasis,ConstituentTickers,ConstituentWeights\n\
                   FND,Fund,ETF,1,100,\"X,,Y\",\"0.5,0.3,0.2\"\n";
        let err = parse_portfolio(csv.as_bytes(), "Main").unwrap_err();
        assert!(matches!(err, Error::MalformedInput(ref m) if m.starts_with("row 1")));
    }

    #[test]
    fn test_load_upserts_assets() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(HOLDINGS.as_bytes()).unwrap();

        let db = Database::open_in_memory().unwrap();
        let portfolio = Ingester::new(&db)
            .load_portfolio_from_csv(file.path(), "Main")
            .unwrap();

        assert_eq!(portfolio.position_count(), 3);
        let tickers: Vec<String> = db.get_all_tickers().unwrap().into_iter().collect();
        assert_eq!(tickers, vec!["AAA", "BBB", "FND"]);
        assert_eq!(db.get_asset("FND").unwrap().unwrap().constituents.len(), 2);
    }

    #[test]
    fn test_failed_load_writes_nothing() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"Ticker,Name,Type,Quantity,CostBasis\nAAA,A,Stock,1,2\nBBB,B,Nope,1,2\n")
            .unwrap();

        let db = Database::open_in_memory().unwrap();
        let result = Ingester::new(&db).load_portfolio_from_csv(file.path(), "Main");

        assert!(matches!(result, Err(Error::MalformedInput(_))));
        assert!(db.get_all_tickers().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_malformed_input() {
        let db = Database::open_in_memory().unwrap();
        let result = Ingester::new(&db).load_portfolio_from_csv("/nonexistent/holdings.csv", "Main");
        assert!(matches!(result, Err(Error::MalformedInput(_))));
    }
}
