//! Walk-forward evaluation of the prediction pipeline.
//!
//! The leading 70% of usable rows is reserved as training history; each
//! later row is decided using only information available up to that row,
//! then checked one period later. Capital compounds multiplicatively over
//! the replay and the summary derives return, win rate, Sharpe and max
//! drawdown with explicit fallbacks for degenerate windows.

use crate::application::analysis::trend::{TrendAdjuster, TrendAnalysis};
use crate::application::features::{CleanRow, FeatureBuilder};
use crate::application::ml::ensemble::TrainedModel;
use crate::config::{AdjusterConfig, BacktestConfig};
use crate::domain::errors::PredictionError;
use crate::domain::types::{Direction, PriceBar};
use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::{Data, Distribution};
use tracing::info;

/// Which decision chain drives the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BacktestMode {
    /// Raw soft-vote ensemble.
    Ensemble,
    /// Ensemble blended through the trend adjuster.
    TrendAdjusted,
}

/// One evaluated period of the replay.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestRecord {
    pub date: NaiveDate,
    pub prediction: Direction,
    pub actual: Direction,
    pub confidence: f64,
    pub allocation: f64,
    pub asset_return: f64,
    pub portfolio_return: f64,
    pub capital: f64,
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestPeriod {
    pub start: String,
    pub end: String,
    pub months: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReturns {
    pub strategy_pct: f64,
    pub buy_hold_pct: f64,
    pub excess_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestMetrics {
    pub win_rate_pct: f64,
    pub total_periods: usize,
    pub correct_periods: usize,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub volatility_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocationStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BacktestSummary {
    pub mode: BacktestMode,
    pub period: BacktestPeriod,
    pub returns: BacktestReturns,
    pub metrics: BacktestMetrics,
    pub allocation_stats: AllocationStats,
    pub final_capital: f64,
    pub history: Vec<BacktestRecord>,
}

/// Allocation bucket used by the plain ensemble replay. Kept separate
/// from `adjusted_policy`: the two mappings are tuned independently even
/// though their constants currently coincide.
pub fn ensemble_policy(prediction: Direction, confidence: f64) -> f64 {
    match prediction {
        Direction::Up => {
            if confidence >= 0.7 {
                1.0
            } else if confidence >= 0.6 {
                0.7
            } else {
                0.5
            }
        }
        Direction::Down => {
            if confidence >= 0.7 {
                0.0
            } else if confidence >= 0.6 {
                0.3
            } else {
                0.5
            }
        }
    }
}

/// Allocation bucket used by the trend-adjusted replay.
pub fn adjusted_policy(prediction: Direction, confidence: f64) -> f64 {
    match prediction {
        Direction::Up => {
            if confidence >= 0.7 {
                1.0
            } else if confidence >= 0.6 {
                0.7
            } else {
                0.5
            }
        }
        Direction::Down => {
            if confidence >= 0.7 {
                0.0
            } else if confidence >= 0.6 {
                0.3
            } else {
                0.5
            }
        }
    }
}

pub struct WalkForwardBacktester<'a> {
    model: &'a TrainedModel,
    config: BacktestConfig,
    adjuster_config: AdjusterConfig,
}

impl<'a> WalkForwardBacktester<'a> {
    pub fn new(
        model: &'a TrainedModel,
        config: BacktestConfig,
        adjuster_config: AdjusterConfig,
    ) -> Self {
        Self {
            model,
            config,
            adjuster_config,
        }
    }

    /// Replay the pipeline over the monthly series.
    pub fn run(
        &self,
        monthly: &[PriceBar],
        mode: BacktestMode,
    ) -> Result<BacktestSummary, PredictionError> {
        let table = FeatureBuilder::build(monthly);
        let clean = table.clean_rows();
        if clean.len() < self.config.min_rows {
            return Err(PredictionError::InsufficientData {
                rows: clean.len(),
                min: self.config.min_rows,
            });
        }

        let start = (clean.len() as f64 * self.config.train_fraction) as usize;
        info!(
            mode = ?mode,
            rows = clean.len(),
            start,
            "running walk-forward backtest"
        );

        let adjuster = TrendAdjuster::new(self.adjuster_config.clone());
        let decide = |i: usize,
                      row: &CleanRow|
         -> Result<(Direction, f64), PredictionError> {
            let base = self.model.predict_row(&row.features)?;
            match mode {
                BacktestMode::Ensemble => Ok((base.prediction, base.confidence)),
                BacktestMode::TrendAdjusted => {
                    // The analysis may only read bars up to the decision
                    // row; later bars stay out of reach.
                    let prefix = &monthly[..=clean[i].source_index];
                    let adjusted = adjuster.adjust(&base, TrendAnalysis::from_monthly(prefix));
                    Ok((adjusted.prediction, adjusted.confidence))
                }
            }
        };
        let policy = match mode {
            BacktestMode::Ensemble => ensemble_policy,
            BacktestMode::TrendAdjusted => adjusted_policy,
        };

        let history = simulate(&clean, start, self.config.initial_capital, |i, row| {
            let (prediction, confidence) = decide(i, row)?;
            Ok((prediction, confidence, policy(prediction, confidence)))
        }, self.config.bond_return_monthly)?;

        Ok(self.summarize(mode, &clean, start, history))
    }

    fn summarize(
        &self,
        mode: BacktestMode,
        clean: &[CleanRow],
        start: usize,
        history: Vec<BacktestRecord>,
    ) -> BacktestSummary {
        let final_capital = history
            .last()
            .map(|r| r.capital)
            .unwrap_or(self.config.initial_capital);
        let strategy_pct =
            (final_capital - self.config.initial_capital) / self.config.initial_capital * 100.0;

        let start_close = clean[start].close;
        let end_close = clean[clean.len() - 1].close;
        let buy_hold_pct = if start_close != 0.0 {
            (end_close - start_close) / start_close * 100.0
        } else {
            0.0
        };

        let total = history.len();
        let correct = history.iter().filter(|r| r.correct).count();
        let win_rate_pct = if total > 0 {
            correct as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        let step_returns: Vec<f64> = history.iter().map(|r| r.portfolio_return).collect();
        let (sharpe_ratio, volatility_pct) = sharpe_and_volatility(
            &step_returns,
            self.config.periods_per_year,
        );
        let max_drawdown_pct = max_drawdown_pct(&step_returns);

        let allocations: Vec<f64> = history.iter().map(|r| r.allocation).collect();
        let allocation_stats = AllocationStats {
            mean: if allocations.is_empty() {
                0.0
            } else {
                allocations.iter().sum::<f64>() / allocations.len() as f64
            },
            min: allocations.iter().copied().fold(f64::INFINITY, f64::min),
            max: allocations
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max),
        };

        let period = BacktestPeriod {
            start: clean[start].date.format("%Y-%m").to_string(),
            end: clean[clean.len() - 1].date.format("%Y-%m").to_string(),
            months: total,
        };

        BacktestSummary {
            mode,
            period,
            returns: BacktestReturns {
                strategy_pct,
                buy_hold_pct,
                excess_pct: strategy_pct - buy_hold_pct,
            },
            metrics: BacktestMetrics {
                win_rate_pct,
                total_periods: total,
                correct_periods: correct,
                sharpe_ratio,
                max_drawdown_pct,
                volatility_pct,
            },
            allocation_stats,
            final_capital,
            history,
        }
    }
}

/// The compounding core of the replay: for each index in
/// [start, len - 2], ask the decider for (prediction, confidence,
/// allocation), realize the close-to-close return into the next row, and
/// compound capital.
pub(crate) fn simulate<F>(
    clean: &[CleanRow],
    start: usize,
    initial_capital: f64,
    mut decide: F,
    bond_return: f64,
) -> Result<Vec<BacktestRecord>, PredictionError>
where
    F: FnMut(usize, &CleanRow) -> Result<(Direction, f64, f64), PredictionError>,
{
    let mut capital = initial_capital;
    let mut history = Vec::new();

    for i in start..clean.len().saturating_sub(1) {
        let current = &clean[i];
        let next = &clean[i + 1];
        let (prediction, confidence, allocation) = decide(i, current)?;

        let asset_return = (next.close - current.close) / current.close;
        let actual = Direction::from_return(asset_return);
        let portfolio_return = allocation * asset_return + (1.0 - allocation) * bond_return;
        capital *= 1.0 + portfolio_return;

        history.push(BacktestRecord {
            date: current.date,
            prediction,
            actual,
            confidence,
            allocation,
            asset_return,
            portfolio_return,
            capital,
            correct: prediction == actual,
        });
    }

    Ok(history)
}

/// Annualized Sharpe and volatility of the step returns; both 0 for
/// degenerate windows (fewer than two samples or no real dispersion).
fn sharpe_and_volatility(step_returns: &[f64], periods_per_year: f64) -> (f64, f64) {
    if step_returns.len() < 2 {
        return (0.0, 0.0);
    }
    let data = Data::new(step_returns.to_vec());
    let mean = data.mean().unwrap_or(0.0);
    let std = data.std_dev().unwrap_or(0.0);
    // Dispersion at rounding-noise scale counts as zero.
    if std > 1e-12 {
        let sharpe = (mean * periods_per_year) / (std * periods_per_year.sqrt());
        let volatility = std * periods_per_year.sqrt() * 100.0;
        (sharpe, volatility)
    } else {
        (0.0, 0.0)
    }
}

/// Max drawdown (percent, <= 0) of the compounded return curve.
fn max_drawdown_pct(step_returns: &[f64]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0f64;
    for r in step_returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        if peak > 0.0 {
            worst = worst.min((cumulative - peak) / peak);
        }
    }
    worst * 100.0
}
