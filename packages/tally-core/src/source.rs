//! Market-data sources for daily closing prices.

use crate::config::Config;
use crate::types::PricePoint;
use crate::{Error, Result};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = concat!("tally/", env!("CARGO_PKG_VERSION"));

/// Lookback window for a history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    TenYears,
    YearToDate,
    Max,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneDay => "1d",
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
            Period::TenYears => "10y",
            Period::YearToDate => "ytd",
            Period::Max => "max",
        }
    }

    /// First date covered by the window ending at `end`; `None` for [`Period::Max`].
    pub fn start_from(&self, end: NaiveDate) -> Option<NaiveDate> {
        let months = |n| end.checked_sub_months(Months::new(n));
        match self {
            Period::OneDay => end.checked_sub_days(Days::new(1)),
            Period::FiveDays => end.checked_sub_days(Days::new(5)),
            Period::OneMonth => months(1),
            Period::ThreeMonths => months(3),
            Period::SixMonths => months(6),
            Period::OneYear => months(12),
            Period::TwoYears => months(24),
            Period::FiveYears => months(60),
            Period::TenYears => months(120),
            Period::YearToDate => NaiveDate::from_ymd_opt(end.year(), 1, 1),
            Period::Max => None,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1d" => Ok(Period::OneDay),
            "5d" => Ok(Period::FiveDays),
            "1mo" => Ok(Period::OneMonth),
            "3mo" => Ok(Period::ThreeMonths),
            "6mo" => Ok(Period::SixMonths),
            "1y" => Ok(Period::OneYear),
            "2y" => Ok(Period::TwoYears),
            "5y" => Ok(Period::FiveYears),
            "10y" => Ok(Period::TenYears),
            "ytd" => Ok(Period::YearToDate),
            "max" => Ok(Period::Max),
            other => Err(Error::InvalidInput(format!(
                "unknown period '{}' (expected 1d, 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, 10y, ytd or max)",
                other
            ))),
        }
    }
}

/// Anything that can supply a ticker's daily closing prices.
pub trait PriceSource {
    /// Daily closes in ascending date order, at most one per date.
    ///
    /// An unknown ticker may yield an empty series rather than an error.
    fn fetch_history(&self, ticker: &str, period: Period) -> Result<Vec<PricePoint>>;
}

/// Daily closes from the Yahoo Finance chart endpoint.
pub struct YahooSource {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl YahooSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: YAHOO_CHART_URL.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(Duration::from_secs(config.fetch_timeout_secs))
    }

    /// Point the client at another chart endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl PriceSource for YahooSource {
    fn fetch_history(&self, ticker: &str, period: Period) -> Result<Vec<PricePoint>> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ticker);
        let failed = |reason: String| Error::FetchFailed {
            ticker: ticker.to_string(),
            reason,
        };

        tracing::debug!("Fetching {} history for {}", period, ticker);
        let resp = self
            .client
            .get(&url)
            .query(&[("range", period.as_str()), ("interval", "1d")])
            .send()
            .map_err(|e| failed(e.to_string()))?;

        let status = resp.status();
        // Yahoo answers 404 with a chart error body for unknown symbols
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!("{} not found upstream", ticker);
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status)));
        }

        let body = resp.text().map_err(|e| failed(e.to_string()))?;
        parse_chart(ticker, &body)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// Turn a chart response body into daily closes.
///
/// Bars without a close are skipped. Timestamps are shifted into exchange
/// time before taking the calendar day, and the last bar of a day wins.
fn parse_chart(ticker: &str, body: &str) -> Result<Vec<PricePoint>> {
    let failed = |reason: String| Error::FetchFailed {
        ticker: ticker.to_string(),
        reason,
    };

    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| failed(format!("unreadable response: {}", e)))?;

    if let Some(error) = response.chart.error {
        if error.code.as_deref() == Some("Not Found") {
            return Ok(Vec::new());
        }
        return Err(failed(
            error
                .description
                .or(error.code)
                .unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    let Some(result) = response.chart.result.and_then(|mut r| r.pop()) else {
        return Ok(Vec::new());
    };

    let closes = result
        .indicators
        .quote
        .into_iter()
        .next()
        .map(|q| q.close)
        .unwrap_or_default();

    let mut points: Vec<PricePoint> = Vec::with_capacity(result.timestamp.len());
    for (ts, close) in result.timestamp.iter().zip(closes) {
        let Some(close) = close else { continue };
        let date = DateTime::from_timestamp(ts + result.meta.gmtoffset, 0)
            .ok_or_else(|| failed(format!("bad timestamp {}", ts)))?
            .date_naive();
        points.push(PricePoint::new(date, close));
    }

    points.sort_by_key(|p| p.date);
    let mut daily: Vec<PricePoint> = Vec::with_capacity(points.len());
    for point in points {
        match daily.last_mut() {
            Some(last) if last.date == point.date => *last = point,
            _ => daily.push(point),
        }
    }

    Ok(daily)
}

#[derive(Debug, Deserialize)]
struct PriceRecord {
    ticker: String,
    date: String,
    price: f64,
}

/// Offline source backed by a `ticker,date,price` CSV file.
///
/// The period window is measured back from each ticker's latest date in the
/// file.
#[derive(Debug, Default)]
pub struct CsvPriceSource {
    series: BTreeMap<String, Vec<PricePoint>>,
}

impl CsvPriceSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::MalformedInput(format!("{}: {}", path.display(), e)))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut series: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
        for (i, record) in csv.deserialize::<PriceRecord>().enumerate() {
            let record =
                record.map_err(|e| Error::MalformedInput(format!("row {}: {}", i + 1, e)))?;
            let date = crate::store::parse_day(&record.date)
                .map_err(|e| Error::MalformedInput(format!("row {}: {}", i + 1, e)))?;
            series
                .entry(record.ticker)
                .or_default()
                .insert(date, record.price);
        }

        Ok(Self {
            series: series
                .into_iter()
                .map(|(ticker, days)| {
                    let points = days
                        .into_iter()
                        .map(|(date, price)| PricePoint::new(date, price))
                        .collect();
                    (ticker, points)
                })
                .collect(),
        })
    }

    /// Tickers present in the file.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }
}

impl PriceSource for CsvPriceSource {
    fn fetch_history(&self, ticker: &str, period: Period) -> Result<Vec<PricePoint>> {
        let Some(points) = self.series.get(ticker) else {
            return Ok(Vec::new());
        };
        let start = points.last().and_then(|p| period.start_from(p.date));

        Ok(points
            .iter()
            .filter(|p| start.map_or(true, |s| p.date >= s))
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_parsing() {
        for s in ["1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max"] {
            let period: Period = s.parse().unwrap();
            assert_eq!(period.as_str(), s);
        }
        assert!(matches!("2w".parse::<Period>(), Err(Error::InvalidInput(_))));
        assert!(matches!("".parse::<Period>(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_period_start() {
        let end = day(2024, 3, 31);
        assert_eq!(Period::OneMonth.start_from(end), Some(day(2024, 2, 29)));
        assert_eq!(Period::FiveDays.start_from(end), Some(day(2024, 3, 26)));
        assert_eq!(Period::YearToDate.start_from(end), Some(day(2024, 1, 1)));
        assert_eq!(Period::Max.start_from(end), None);
    }

    #[test]
    fn test_parse_chart() {
        // 2024-01-02 and 2024-01-03 14:30 UTC, with a null close on the second bar
        let body = r#"{
            "chart": {
                "result": [{
                    "meta": {"currency": "USD", "gmtoffset": -18000},
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "indicators": {"quote": [{"close": [185.64, null, 181.91]}]}
                }],
                "error": null
            }
        }"#;

        let points = parse_chart("AAPL", body).unwrap();
        assert_eq!(
            points,
            vec![
                PricePoint::new(day(2024, 1, 2), 185.64),
                PricePoint::new(day(2024, 1, 4), 181.91),
            ]
        );
    }

    #[test]
    fn test_parse_chart_keeps_last_bar_per_day() {
        let body = r#"{"chart": {"result": [{
            "timestamp": [1704205800, 1704220000],
            "indicators": {"quote": [{"close": [1.0, 2.0]}]}
        }], "error": null}}"#;

        let points = parse_chart("X", body).unwrap();
        assert_eq!(points, vec![PricePoint::new(day(2024, 1, 2), 2.0)]);
    }

    #[test]
    fn test_parse_chart_errors() {
        let not_found = r#"{"chart": {"result": null, "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}}}"#;
        assert!(parse_chart("NOPE", not_found).unwrap().is_empty());

        let bad_request = r#"{"chart": {"result": null, "error": {"code": "Bad Request", "description": "Invalid input"}}}"#;
        assert!(matches!(
            parse_chart("X", bad_request),
            Err(Error::FetchFailed { ref ticker, .. }) if ticker == "X"
        ));

        assert!(matches!(
            parse_chart("X", "<html>rate limited</html>"),
            Err(Error::FetchFailed { .. })
        ));
    }

    #[test]
    fn test_csv_source() {
        let csv = "\
ticker,date,price
AAA,2024-01-03,11.0
AAA,2024-01-02,10.0
AAA,2023-06-01,8.0
BBB,2024-01-02T16:00:00Z,20.0
";
        let source = CsvPriceSource::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(source.tickers().collect::<Vec<_>>(), vec!["AAA", "BBB"]);

        let recent = source.fetch_history("AAA", Period::OneMonth).unwrap();
        assert_eq!(
            recent,
            vec![
                PricePoint::new(day(2024, 1, 2), 10.0),
                PricePoint::new(day(2024, 1, 3), 11.0),
            ]
        );
        assert_eq!(source.fetch_history("AAA", Period::Max).unwrap().len(), 3);
        assert_eq!(
            source.fetch_history("BBB", Period::OneYear).unwrap(),
            vec![PricePoint::new(day(2024, 1, 2), 20.0)]
        );
        assert!(source.fetch_history("CCC", Period::Max).unwrap().is_empty());
    }

    #[test]
    fn test_csv_source_bad_date() {
        let csv = "ticker,date,price\nAAA,yesterday,1.0\n";
        assert!(matches!(
            CsvPriceSource::from_reader(csv.as_bytes()),
            Err(Error::MalformedInput(_))
        ));
    }
}
