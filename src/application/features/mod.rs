//! Feature table construction from a monthly price series.
//!
//! One row per monthly bar, carrying every indicator output for that
//! period plus lagged returns and the forward-shifted direction label.
//! Rows never read values later than their own date; the label is the
//! single deliberate exception and is excluded from inference features.

use crate::application::market_data::indicators;
use crate::domain::types::{Direction, PriceBar};
use chrono::NaiveDate;

/// One feature row, aligned with exactly one monthly bar.
#[derive(Debug, Clone)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub close: f64,
    /// Index of the source bar in the monthly series this row came from.
    pub source_index: usize,
    /// Values aligned with `FeatureTable::feature_names`; `None` during
    /// rolling warm-up or after a division by zero.
    pub values: Vec<Option<f64>>,
    /// Next-period direction; `None` on the last row of any series.
    pub label: Option<Direction>,
}

impl FeatureRow {
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }
}

/// A row that survived cleaning: all features and the label present.
#[derive(Debug, Clone)]
pub struct CleanRow {
    pub date: NaiveDate,
    pub close: f64,
    pub source_index: usize,
    pub features: Vec<f64>,
    pub label: Direction,
}

#[derive(Debug, Clone)]
pub struct FeatureTable {
    pub feature_names: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Rows usable for training and backtesting: every feature and the
    /// label present. This is the single missing-value contract used by
    /// the whole pipeline.
    pub fn clean_rows(&self) -> Vec<CleanRow> {
        self.rows
            .iter()
            .filter(|row| row.is_complete() && row.label.is_some())
            .map(|row| CleanRow {
                date: row.date,
                close: row.close,
                source_index: row.source_index,
                features: row.values.iter().map(|v| v.unwrap_or(0.0)).collect(),
                label: row.label.expect("filtered above"),
            })
            .collect()
    }

    /// The most recent fully-populated row, for inference. The label is
    /// not required here.
    pub fn latest_complete(&self) -> Option<(&FeatureRow, Vec<f64>)> {
        self.rows.iter().rev().find(|row| row.is_complete()).map(|row| {
            let features = row.values.iter().map(|v| v.unwrap_or(0.0)).collect();
            (row, features)
        })
    }
}

/// Builds the monthly feature table consumed by the ensemble classifier.
pub struct FeatureBuilder;

impl FeatureBuilder {
    const MACD_FAST: usize = 12;
    const MACD_SLOW: usize = 26;
    const MACD_SIGNAL: usize = 9;
    const BAND_PERIOD: usize = 12;
    const BAND_K: f64 = 2.0;

    pub fn feature_names() -> Vec<String> {
        [
            "return_1m",
            "return_2m",
            "return_3m",
            "return_6m",
            "return_12m",
            "price_sma3_ratio",
            "price_sma6_ratio",
            "price_sma12_ratio",
            "sma3_sma6_ratio",
            "sma6_sma12_ratio",
            "volatility_3m",
            "volatility_6m",
            "volatility_12m",
            "rsi_6",
            "rsi_12",
            "macd",
            "macd_signal",
            "macd_hist",
            "bb_width",
            "bb_position",
            "drawdown",
            "hl_range",
            "hl_range_3m",
            "return_lag1",
            "return_lag2",
            "return_lag3",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn build(monthly: &[PriceBar]) -> FeatureTable {
        let close: Vec<f64> = monthly.iter().map(|b| b.close).collect();
        let n = close.len();

        let return_1m = indicators::pct_change(&close, 1);
        let return_2m = indicators::pct_change(&close, 2);
        let return_3m = indicators::pct_change(&close, 3);
        let return_6m = indicators::pct_change(&close, 6);
        let return_12m = indicators::pct_change(&close, 12);

        let sma_3 = indicators::sma(&close, 3);
        let sma_6 = indicators::sma(&close, 6);
        let sma_12 = indicators::sma(&close, 12);
        let price_sma3_ratio = ratio_to(&close, &sma_3);
        let price_sma6_ratio = ratio_to(&close, &sma_6);
        let price_sma12_ratio = ratio_to(&close, &sma_12);
        let sma3_sma6_ratio = ratio_opt(&sma_3, &sma_6);
        let sma6_sma12_ratio = ratio_opt(&sma_6, &sma_12);

        let volatility_3m = indicators::rolling_std(&return_1m, 3);
        let volatility_6m = indicators::rolling_std(&return_1m, 6);
        let volatility_12m = indicators::rolling_std(&return_1m, 12);

        let rsi_6 = indicators::rsi(&close, 6);
        let rsi_12 = indicators::rsi(&close, 12);

        let (macd, macd_signal, macd_hist) =
            indicators::macd(&close, Self::MACD_FAST, Self::MACD_SLOW, Self::MACD_SIGNAL);

        let bands = indicators::bollinger(&close, Self::BAND_PERIOD, Self::BAND_K);

        let drawdown = indicators::drawdown(&close);

        let hl_range: Vec<Option<f64>> = monthly
            .iter()
            .map(|b| {
                if b.close != 0.0 {
                    Some((b.high - b.low) / b.close)
                } else {
                    None
                }
            })
            .collect();
        let hl_range_3m = indicators::rolling_mean(&hl_range, 3);

        let return_lag1 = shift(&return_1m, 1);
        let return_lag2 = shift(&return_1m, 2);
        let return_lag3 = shift(&return_1m, 3);

        let columns: Vec<&Vec<Option<f64>>> = vec![
            &return_1m,
            &return_2m,
            &return_3m,
            &return_6m,
            &return_12m,
            &price_sma3_ratio,
            &price_sma6_ratio,
            &price_sma12_ratio,
            &sma3_sma6_ratio,
            &sma6_sma12_ratio,
            &volatility_3m,
            &volatility_6m,
            &volatility_12m,
            &rsi_6,
            &rsi_12,
            &macd,
            &macd_signal,
            &macd_hist,
            &bands.width,
            &bands.position,
            &drawdown,
            &hl_range,
            &hl_range_3m,
            &return_lag1,
            &return_lag2,
            &return_lag3,
        ];

        let rows = (0..n)
            .map(|i| {
                let label = if i + 1 < n {
                    Some(if close[i + 1] > close[i] {
                        Direction::Up
                    } else {
                        Direction::Down
                    })
                } else {
                    None
                };
                FeatureRow {
                    date: monthly[i].date,
                    close: close[i],
                    source_index: i,
                    values: columns.iter().map(|col| col[i]).collect(),
                    label,
                }
            })
            .collect();

        FeatureTable {
            feature_names: Self::feature_names(),
            rows,
        }
    }
}

fn ratio_to(values: &[f64], denom: &[Option<f64>]) -> Vec<Option<f64>> {
    values
        .iter()
        .zip(denom.iter())
        .map(|(v, d)| match d {
            Some(d) if *d != 0.0 => Some(v / d),
            _ => None,
        })
        .collect()
}

fn ratio_opt(num: &[Option<f64>], denom: &[Option<f64>]) -> Vec<Option<f64>> {
    num.iter()
        .zip(denom.iter())
        .map(|(n, d)| match (n, d) {
            (Some(n), Some(d)) if *d != 0.0 => Some(n / d),
            _ => None,
        })
        .collect()
}

fn shift(series: &[Option<f64>], lag: usize) -> Vec<Option<f64>> {
    (0..series.len())
        .map(|i| if i >= lag { series[i - lag] } else { None })
        .collect()
}
