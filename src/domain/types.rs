use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One OHLCV bar of a price series (daily or monthly).
///
/// Bars are the single source of truth for every derived value; once
/// fetched they are never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Predicted or realized next-period market direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Down,
    Up,
}

impl Direction {
    /// Binary class label: Up = 1, Down = 0.
    pub fn as_label(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => 0.0,
        }
    }

    pub fn from_return(ret: f64) -> Self {
        if ret > 0.0 { Direction::Up } else { Direction::Down }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "Bullish"),
            Direction::Down => write!(f, "Bearish"),
        }
    }
}

/// Class-probability pair produced by the soft vote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub down: f64,
    pub up: f64,
}

impl ClassProbabilities {
    pub fn from_up(up: f64) -> Self {
        Self { down: 1.0 - up, up }
    }

    /// Argmax class; an exact tie resolves to `Down`.
    pub fn predicted(&self) -> Direction {
        if self.up > self.down {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// Probability of the predicted class, always in [0.5, 1.0].
    pub fn confidence(&self) -> f64 {
        self.up.max(self.down)
    }
}

/// One ensemble member's sub-prediction, reported for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVote {
    pub model: String,
    pub prediction: Direction,
    pub confidence: f64,
}

/// Output of a single ensemble prediction. Recomputed on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction: Direction,
    pub confidence: f64,
    pub votes: Vec<ModelVote>,
    pub probabilities: ClassProbabilities,
}

/// Market context consumed by the risk manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketContext {
    /// Annualized volatility of monthly returns, in percent.
    pub volatility_pct: f64,
    /// Decline from the running peak, in percent (<= 0).
    pub drawdown_pct: f64,
    /// Composite trend score, 0 (strong downtrend) to 100 (strong uptrend).
    pub trend_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probabilities_tie_resolves_down() {
        let p = ClassProbabilities::from_up(0.5);
        assert_eq!(p.predicted(), Direction::Down);
        assert!((p.confidence() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn confidence_is_of_predicted_class() {
        let p = ClassProbabilities::from_up(0.3);
        assert_eq!(p.predicted(), Direction::Down);
        assert!((p.confidence() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn direction_from_return_treats_flat_as_down() {
        assert_eq!(Direction::from_return(0.0), Direction::Down);
        assert_eq!(Direction::from_return(0.01), Direction::Up);
    }
}
