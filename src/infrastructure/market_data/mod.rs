//! CSV-backed market data source.
//!
//! Reads `Date,Open,High,Low,Close,Volume` rows, the export format of the
//! usual daily-history downloads. Bars are returned strictly date-ordered.

use crate::domain::errors::DataError;
use crate::domain::ports::MarketDataSource;
use crate::domain::types::PriceBar;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CsvBar {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: f64,
}

pub struct CsvMarketData {
    path: PathBuf,
}

impl CsvMarketData {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl MarketDataSource for CsvMarketData {
    fn daily_bars(&self) -> Result<Vec<PriceBar>, DataError> {
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| DataError::Source {
            reason: format!("failed to open {:?}: {}", self.path, e),
        })?;

        let mut bars = Vec::new();
        for record in reader.deserialize() {
            let bar: CsvBar = record.map_err(|e| DataError::Source {
                reason: format!("malformed row in {:?}: {}", self.path, e),
            })?;
            bars.push(PriceBar {
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            });
        }

        if bars.is_empty() {
            return Err(DataError::Empty);
        }
        bars.sort_by_key(|b| b.date);
        info!(rows = bars.len(), "loaded daily bars from {:?}", self.path);
        Ok(bars)
    }
}
