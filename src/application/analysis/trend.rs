//! Trend context and rule-based prediction adjustment.
//!
//! The base classifier under-predicts the bullish class in trending
//! markets; this module recomputes a rule-based bullish/bearish score
//! from trend, momentum, oscillator and drawdown context and blends it
//! with the ensemble probability into the final calibrated prediction.

use crate::application::market_data::indicators;
use crate::config::AdjusterConfig;
use crate::domain::types::{ClassProbabilities, Direction, MarketContext, PredictionResult, PriceBar};
use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics};

const TREND_SMA_PERIOD: usize = 6;
const RSI_PERIOD: usize = 6;
const VOLATILITY_WINDOW: usize = 6;
const VOLATILITY_MEDIAN_WINDOW: usize = 12;
const PERIODS_PER_YEAR: f64 = 12.0;

/// One weighted component of the composite trend score. `bullish` is
/// `None` when the component is neutral or its inputs are not yet
/// defined.
#[derive(Debug, Clone, Serialize)]
pub struct TrendSignal {
    pub name: &'static str,
    pub bullish: Option<bool>,
    pub weight: f64,
}

/// Market context derived from the monthly series as of its last bar.
#[derive(Debug, Clone, Serialize)]
pub struct TrendAnalysis {
    /// Composite score, 0 (strong downtrend) to 100 (strong uptrend).
    pub trend_score: f64,
    pub momentum_3m_pct: f64,
    pub momentum_6m_pct: f64,
    pub rsi: Option<f64>,
    pub drawdown_pct: f64,
    pub volatility_pct: f64,
    pub signals: Vec<TrendSignal>,
}

impl TrendAnalysis {
    /// Compute the analysis from a monthly series. Only past-or-current
    /// bars are read; callers replaying history pass the prefix ending at
    /// the decision bar.
    pub fn from_monthly(monthly: &[PriceBar]) -> Self {
        let close: Vec<f64> = monthly.iter().map(|b| b.close).collect();

        let momentum_3m_pct = last_value(&indicators::pct_change(&close, 3))
            .map(|r| r * 100.0)
            .unwrap_or(0.0);
        let momentum_6m_pct = last_value(&indicators::pct_change(&close, 6))
            .map(|r| r * 100.0)
            .unwrap_or(0.0);
        let rsi = last_value(&indicators::rsi(&close, RSI_PERIOD));
        let drawdown_pct = last_value(&indicators::drawdown(&close))
            .map(|d| d * 100.0)
            .unwrap_or(0.0);

        let volatility = indicators::volatility_pct(&close, VOLATILITY_WINDOW, PERIODS_PER_YEAR);
        let volatility_pct = last_value(&volatility).unwrap_or(10.0);
        let volatility_median = rolling_median_last(&volatility, VOLATILITY_MEDIAN_WINDOW);

        let sma_6 = last_value(&indicators::sma(&close, TREND_SMA_PERIOD));
        let last_close = close.last().copied();

        let signals = vec![
            TrendSignal {
                name: "trend_sma6",
                bullish: match (last_close, sma_6) {
                    (Some(c), Some(s)) => Some(c > s),
                    _ => None,
                },
                weight: 0.25,
            },
            TrendSignal {
                name: "momentum_3m",
                bullish: last_value(&indicators::pct_change(&close, 3)).map(|r| r > 0.0),
                weight: 0.25,
            },
            TrendSignal {
                name: "rsi",
                bullish: rsi.and_then(|r| {
                    if r < 35.0 {
                        Some(true)
                    } else if r > 65.0 {
                        Some(false)
                    } else {
                        None
                    }
                }),
                weight: 0.25,
            },
            TrendSignal {
                name: "volatility",
                bullish: volatility_median
                    .and_then(|m| last_value(&volatility).map(|v| v < m * 1.2)),
                weight: 0.15,
            },
            TrendSignal {
                name: "drawdown",
                bullish: last_value(&indicators::drawdown(&close)).map(|d| d * 100.0 > -15.0),
                weight: 0.10,
            },
        ];

        // Bearish components count against the score at half weight; the
        // raw score is mapped through (score + 0.3) / 1.3 onto 0..100.
        let mut score = 0.0;
        for signal in &signals {
            match signal.bullish {
                Some(true) => score += signal.weight,
                Some(false) => score -= signal.weight * 0.5,
                None => {}
            }
        }
        let trend_score = (((score + 0.3) / 1.3) * 100.0).clamp(0.0, 100.0);

        Self {
            trend_score,
            momentum_3m_pct,
            momentum_6m_pct,
            rsi,
            drawdown_pct,
            volatility_pct,
            signals,
        }
    }

    pub fn market_context(&self) -> MarketContext {
        MarketContext {
            volatility_pct: self.volatility_pct,
            drawdown_pct: self.drawdown_pct,
            trend_score: self.trend_score,
        }
    }
}

fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

fn rolling_median_last(series: &[Option<f64>], window: usize) -> Option<f64> {
    if series.len() < window {
        return None;
    }
    let tail = &series[series.len() - window..];
    if tail.iter().any(Option::is_none) {
        return None;
    }
    let values: Vec<f64> = tail.iter().map(|v| v.unwrap_or(0.0)).collect();
    let mut data = Data::new(values);
    Some(data.median())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Polarity {
    Bullish,
    Bearish,
}

/// Inputs read by the vote rules.
pub struct SignalInputs {
    /// trend_score / 100.
    pub trend: f64,
    pub momentum_3m: f64,
    pub momentum_6m: f64,
    pub rsi: Option<f64>,
    pub drawdown_pct: f64,
}

/// One entry of the vote schedule. Rules are evaluated uniformly in
/// order; predicates within a family are mutually exclusive.
pub struct VoteRule {
    pub name: &'static str,
    pub polarity: Polarity,
    pub weight: u32,
    applies: fn(&SignalInputs, &AdjusterConfig) -> bool,
}

pub const VOTE_RULES: &[VoteRule] = &[
    VoteRule {
        name: "trend_strong_up",
        polarity: Polarity::Bullish,
        weight: 2,
        applies: |s, c| s.trend > c.strong_trend,
    },
    VoteRule {
        name: "trend_mild_up",
        polarity: Polarity::Bullish,
        weight: 1,
        applies: |s, c| s.trend > c.mild_trend && s.trend <= c.strong_trend,
    },
    VoteRule {
        name: "trend_strong_down",
        polarity: Polarity::Bearish,
        weight: 2,
        applies: |s, c| s.trend < c.weak_trend,
    },
    VoteRule {
        name: "trend_mild_down",
        polarity: Polarity::Bearish,
        weight: 1,
        applies: |s, c| s.trend < c.mild_trend && s.trend >= c.weak_trend,
    },
    VoteRule {
        name: "momentum_strong_up",
        polarity: Polarity::Bullish,
        weight: 2,
        applies: |s, c| s.momentum_3m > c.momentum_3m_strong && s.momentum_6m > c.momentum_6m_strong,
    },
    VoteRule {
        name: "momentum_up",
        polarity: Polarity::Bullish,
        weight: 1,
        applies: |s, c| {
            s.momentum_3m > 0.0
                && s.momentum_6m > 0.0
                && !(s.momentum_3m > c.momentum_3m_strong && s.momentum_6m > c.momentum_6m_strong)
        },
    },
    VoteRule {
        name: "momentum_strong_down",
        polarity: Polarity::Bearish,
        weight: 2,
        applies: |s, c| {
            s.momentum_3m < -c.momentum_3m_strong && s.momentum_6m < -c.momentum_6m_strong
        },
    },
    VoteRule {
        name: "momentum_down",
        polarity: Polarity::Bearish,
        weight: 1,
        applies: |s, c| {
            s.momentum_3m < 0.0
                && s.momentum_6m < 0.0
                && !(s.momentum_3m < -c.momentum_3m_strong && s.momentum_6m < -c.momentum_6m_strong)
        },
    },
    VoteRule {
        name: "rsi_oversold",
        polarity: Polarity::Bullish,
        weight: 1,
        applies: |s, c| s.rsi.map(|r| r < c.rsi_oversold).unwrap_or(false),
    },
    VoteRule {
        name: "rsi_overbought",
        polarity: Polarity::Bearish,
        weight: 1,
        applies: |s, c| s.rsi.map(|r| r > c.rsi_overbought).unwrap_or(false),
    },
    VoteRule {
        name: "drawdown_deep",
        polarity: Polarity::Bullish,
        weight: 1,
        applies: |s, c| s.drawdown_pct < c.deep_drawdown_pct,
    },
    VoteRule {
        name: "drawdown_near_peak",
        polarity: Polarity::Bearish,
        weight: 1,
        applies: |s, c| s.drawdown_pct > c.shallow_drawdown_pct,
    },
];

/// Prediction after the trend blend, with the raw ensemble output kept
/// for observability.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustedPrediction {
    pub prediction: Direction,
    pub confidence: f64,
    pub base_prediction: Direction,
    pub base_confidence: f64,
    pub bullish_votes: u32,
    pub bearish_votes: u32,
    pub vote_ratio: f64,
    pub blended_up_probability: f64,
    pub changed: bool,
    pub fired_rules: Vec<&'static str>,
    pub trend: TrendAnalysis,
}

/// Blends the ensemble probability with the rule-vote ratio.
pub struct TrendAdjuster {
    config: AdjusterConfig,
}

impl TrendAdjuster {
    pub fn new(config: AdjusterConfig) -> Self {
        Self { config }
    }

    pub fn adjust(&self, base: &PredictionResult, trend: TrendAnalysis) -> AdjustedPrediction {
        let inputs = SignalInputs {
            trend: trend.trend_score / 100.0,
            momentum_3m: trend.momentum_3m_pct,
            momentum_6m: trend.momentum_6m_pct,
            rsi: trend.rsi,
            drawdown_pct: trend.drawdown_pct,
        };

        let mut bullish_votes = 0;
        let mut bearish_votes = 0;
        let mut fired_rules = Vec::new();
        for rule in VOTE_RULES {
            if (rule.applies)(&inputs, &self.config) {
                match rule.polarity {
                    Polarity::Bullish => bullish_votes += rule.weight,
                    Polarity::Bearish => bearish_votes += rule.weight,
                }
                fired_rules.push(rule.name);
            }
        }

        let total = bullish_votes + bearish_votes;
        let vote_ratio = if total > 0 {
            bullish_votes as f64 / total as f64
        } else {
            0.5
        };

        let blended_up = self.config.ensemble_weight * base.probabilities.up
            + self.config.signal_weight * vote_ratio;
        let probabilities = ClassProbabilities::from_up(blended_up);
        let prediction = if blended_up > 0.5 {
            Direction::Up
        } else {
            Direction::Down
        };

        AdjustedPrediction {
            prediction,
            confidence: probabilities.confidence(),
            base_prediction: base.prediction,
            base_confidence: base.confidence,
            bullish_votes,
            bearish_votes,
            vote_ratio,
            blended_up_probability: blended_up,
            changed: prediction != base.prediction,
            fired_rules,
            trend,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ModelVote;
    use chrono::NaiveDate;

    fn monthly_series(closes: &[f64]) -> Vec<PriceBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: NaiveDate::from_ymd_opt(2019 + (i / 12) as i32, (i % 12) as u32 + 1, 28)
                    .unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 0.0,
            })
            .collect()
    }

    fn base_result(up: f64) -> PredictionResult {
        let probabilities = ClassProbabilities::from_up(up);
        PredictionResult {
            prediction: probabilities.predicted(),
            confidence: probabilities.confidence(),
            votes: vec![ModelVote {
                model: "shallow".to_string(),
                prediction: probabilities.predicted(),
                confidence: probabilities.confidence(),
            }],
            probabilities,
        }
    }

    fn analysis(
        trend_score: f64,
        momentum_3m: f64,
        momentum_6m: f64,
        rsi: Option<f64>,
        drawdown_pct: f64,
    ) -> TrendAnalysis {
        TrendAnalysis {
            trend_score,
            momentum_3m_pct: momentum_3m,
            momentum_6m_pct: momentum_6m,
            rsi,
            drawdown_pct,
            volatility_pct: 10.0,
            signals: Vec::new(),
        }
    }

    #[test]
    fn no_votes_blend_to_plain_average() {
        // Neutral context: trend 0.5 exactly, flat momentum either sign
        // mismatch, RSI midrange, drawdown between the thresholds.
        let adjuster = TrendAdjuster::new(AdjusterConfig::default());
        let trend = analysis(50.0, 1.0, -1.0, Some(50.0), -10.0);
        let out = adjuster.adjust(&base_result(0.8), trend);
        assert_eq!(out.bullish_votes, 0);
        assert_eq!(out.bearish_votes, 0);
        assert!((out.vote_ratio - 0.5).abs() < 1e-12);
        // 0.6 * 0.8 + 0.4 * 0.5
        assert!((out.blended_up_probability - 0.68).abs() < 1e-12);
        assert_eq!(out.prediction, Direction::Up);
        assert!(!out.changed);
    }

    #[test]
    fn strong_uptrend_flips_a_weak_bearish_call() {
        let adjuster = TrendAdjuster::new(AdjusterConfig::default());
        // Strong trend (+2), strong momentum (+2), deep drawdown (+1).
        let trend = analysis(85.0, 4.0, 6.0, Some(50.0), -20.0);
        let out = adjuster.adjust(&base_result(0.45), trend);
        assert_eq!(out.bullish_votes, 5);
        assert_eq!(out.bearish_votes, 0);
        // 0.6 * 0.45 + 0.4 * 1.0 = 0.67
        assert!((out.blended_up_probability - 0.67).abs() < 1e-12);
        assert_eq!(out.prediction, Direction::Up);
        assert_eq!(out.base_prediction, Direction::Down);
        assert!(out.changed);
        assert!(out.fired_rules.contains(&"trend_strong_up"));
        assert!(out.fired_rules.contains(&"momentum_strong_up"));
    }

    #[test]
    fn bearish_context_votes_down() {
        let adjuster = TrendAdjuster::new(AdjusterConfig::default());
        // Strong downtrend (+2), strong negative momentum (+2),
        // overbought RSI (+1), near peak (+1).
        let trend = analysis(20.0, -4.0, -6.0, Some(75.0), -2.0);
        let out = adjuster.adjust(&base_result(0.55), trend);
        assert_eq!(out.bullish_votes, 0);
        assert_eq!(out.bearish_votes, 6);
        // 0.6 * 0.55 + 0.4 * 0.0 = 0.33
        assert_eq!(out.prediction, Direction::Down);
        assert!((out.confidence - 0.67).abs() < 1e-12);
    }

    #[test]
    fn momentum_families_are_mutually_exclusive() {
        let adjuster = TrendAdjuster::new(AdjusterConfig::default());
        let trend = analysis(50.0, 4.0, 6.0, Some(50.0), -10.0);
        let out = adjuster.adjust(&base_result(0.5), trend);
        assert!(out.fired_rules.contains(&"momentum_strong_up"));
        assert!(!out.fired_rules.contains(&"momentum_up"));
    }

    #[test]
    fn oversold_rsi_is_contrarian_bullish() {
        let adjuster = TrendAdjuster::new(AdjusterConfig::default());
        let trend = analysis(50.0, 1.0, -1.0, Some(25.0), -10.0);
        let out = adjuster.adjust(&base_result(0.5), trend);
        assert_eq!(out.bullish_votes, 1);
        assert!(out.fired_rules.contains(&"rsi_oversold"));
    }

    #[test]
    fn trend_score_is_high_for_rising_series() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 1.02f64.powi(i)).collect();
        let analysis = TrendAnalysis::from_monthly(&monthly_series(&closes));
        assert!(analysis.trend_score > 50.0);
        assert!(analysis.momentum_3m_pct > 0.0);
        assert!(analysis.drawdown_pct.abs() < 1e-9);
    }

    #[test]
    fn trend_score_is_low_for_falling_series() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 * 0.97f64.powi(i)).collect();
        let analysis = TrendAnalysis::from_monthly(&monthly_series(&closes));
        assert!(analysis.trend_score < 50.0);
        assert!(analysis.momentum_3m_pct < 0.0);
        assert!(analysis.drawdown_pct < -5.0);
    }

    #[test]
    fn short_series_defaults_to_neutral_context() {
        let analysis = TrendAnalysis::from_monthly(&monthly_series(&[100.0, 101.0]));
        assert_eq!(analysis.momentum_3m_pct, 0.0);
        assert_eq!(analysis.rsi, None);
        assert_eq!(analysis.volatility_pct, 10.0);
    }
}
