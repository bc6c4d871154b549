//! Configuration module for Fundcast.
//!
//! Every empirically chosen constant in the pipeline (blend weights, risk
//! multipliers, confidence buckets) lives here as a named field with a
//! validated default, optionally overridden from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

fn parse_f64(key: &str, default: f64) -> Result<f64> {
    match env::var(key) {
        Ok(val) => val
            .parse::<f64>()
            .with_context(|| format!("Failed to parse {} as f64: {}", key, val)),
        Err(_) => Ok(default),
    }
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {} as u64: {}", key, val)),
        Err(_) => Ok(default),
    }
}

/// Ensemble training configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Minimum usable rows after cleaning before training is allowed.
    pub min_training_rows: usize,
    /// Leading fraction of rows used for fitting; the trailing remainder
    /// is the evaluation segment. Chronological, never shuffled.
    pub train_split: f64,
    /// Seed shared by all ensemble members for reproducibility.
    pub seed: u64,
    /// Number of ranked features reported in training metrics.
    pub top_features: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            min_training_rows: 30,
            train_split: 0.7,
            seed: 42,
            top_features: 10,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.min_training_rows < 10 {
            return Err(format!(
                "min_training_rows too small: {}",
                self.min_training_rows
            ));
        }
        if self.train_split <= 0.0 || self.train_split >= 1.0 {
            return Err(format!("Invalid train_split: {}", self.train_split));
        }
        Ok(())
    }
}

/// Trend/momentum adjustment configuration.
///
/// The 0.6/0.4 blend and the signal thresholds are empirically chosen;
/// they are preserved as-is, not re-derived.
#[derive(Debug, Clone)]
pub struct AdjusterConfig {
    pub ensemble_weight: f64,
    pub signal_weight: f64,
    /// trend_score / 100 thresholds.
    pub strong_trend: f64,
    pub mild_trend: f64,
    pub weak_trend: f64,
    /// Momentum thresholds in percent.
    pub momentum_3m_strong: f64,
    pub momentum_6m_strong: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Drawdown thresholds in percent.
    pub deep_drawdown_pct: f64,
    pub shallow_drawdown_pct: f64,
}

impl Default for AdjusterConfig {
    fn default() -> Self {
        Self {
            ensemble_weight: 0.6,
            signal_weight: 0.4,
            strong_trend: 0.7,
            mild_trend: 0.5,
            weak_trend: 0.3,
            momentum_3m_strong: 3.0,
            momentum_6m_strong: 5.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            deep_drawdown_pct: -15.0,
            shallow_drawdown_pct: -5.0,
        }
    }
}

impl AdjusterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if (self.ensemble_weight + self.signal_weight - 1.0).abs() > 1e-9 {
            return Err(format!(
                "Blend weights must sum to 1.0: {} + {}",
                self.ensemble_weight, self.signal_weight
            ));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err("rsi_oversold must be below rsi_overbought".to_string());
        }
        Ok(())
    }
}

/// Risk management configuration.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Hard ceiling on the equity allocation (e.g. 0.80 = 80%).
    pub max_allocation: f64,
    /// Confidence below this gets the most defensive base bucket.
    pub min_confidence: f64,
    /// Annualized volatility (percent) above which a penalty applies.
    pub volatility_threshold: f64,
    /// Multiplier on bullish allocations during a deep drawdown.
    pub deep_drawdown_boost: f64,
    /// Multiplier applied near the running peak.
    pub near_peak_penalty: f64,
    /// Multiplier on bullish allocations against a weak trend.
    pub weak_trend_penalty: f64,
    /// Multiplier on bearish allocations against a strong trend.
    pub strong_trend_boost: f64,
    /// Trend-score boundaries for the conflict adjustments.
    pub weak_trend_score: f64,
    pub strong_trend_score: f64,
    /// Drawdown boundaries in percent.
    pub deep_drawdown_pct: f64,
    pub near_peak_drawdown_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_allocation: 0.80,
            min_confidence: 0.60,
            volatility_threshold: 15.0,
            deep_drawdown_boost: 1.1,
            near_peak_penalty: 0.9,
            weak_trend_penalty: 0.8,
            strong_trend_boost: 1.2,
            weak_trend_score: 30.0,
            strong_trend_score: 70.0,
            deep_drawdown_pct: -20.0,
            near_peak_drawdown_pct: -5.0,
        }
    }
}

impl RiskConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_allocation: parse_f64("MAX_ALLOCATION", defaults.max_allocation)?,
            min_confidence: parse_f64("MIN_CONFIDENCE", defaults.min_confidence)?,
            volatility_threshold: parse_f64(
                "VOLATILITY_THRESHOLD_PCT",
                defaults.volatility_threshold,
            )?,
            ..defaults
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_allocation <= 0.0 || self.max_allocation > 1.0 {
            return Err(format!("Invalid max_allocation: {}", self.max_allocation));
        }
        if self.min_confidence < 0.5 || self.min_confidence >= 1.0 {
            return Err(format!("Invalid min_confidence: {}", self.min_confidence));
        }
        if self.volatility_threshold <= 0.0 {
            return Err(format!(
                "Invalid volatility_threshold: {}",
                self.volatility_threshold
            ));
        }
        Ok(())
    }
}

/// Walk-forward backtest configuration.
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    /// Minimum usable rows after cleaning before a backtest is allowed.
    pub min_rows: usize,
    /// Leading fraction reserved as training history.
    pub train_fraction: f64,
    /// Fixed risk-free return per month applied to the bond sleeve.
    pub bond_return_monthly: f64,
    pub initial_capital: f64,
    pub periods_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            min_rows: 50,
            train_fraction: 0.7,
            bond_return_monthly: 0.003,
            initial_capital: 100_000.0,
            periods_per_year: 12.0,
        }
    }
}

impl BacktestConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            bond_return_monthly: parse_f64("BOND_RETURN_MONTHLY", defaults.bond_return_monthly)?,
            initial_capital: parse_f64("INITIAL_CAPITAL", defaults.initial_capital)?,
            ..defaults
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.train_fraction <= 0.0 || self.train_fraction >= 1.0 {
            return Err(format!("Invalid train_fraction: {}", self.train_fraction));
        }
        if self.initial_capital <= 0.0 {
            return Err(format!("Invalid initial_capital: {}", self.initial_capital));
        }
        if self.periods_per_year <= 0.0 {
            return Err(format!(
                "Invalid periods_per_year: {}",
                self.periods_per_year
            ));
        }
        Ok(())
    }
}

/// Aggregate configuration for the allocation advisor.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub model: ModelConfig,
    pub adjuster: AdjusterConfig,
    pub risk: RiskConfig,
    pub backtest: BacktestConfig,
    /// Location of the persisted trained-model artifact.
    pub model_path: PathBuf,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            adjuster: AdjusterConfig::default(),
            risk: RiskConfig::default(),
            backtest: BacktestConfig::default(),
            model_path: PathBuf::from("models/ensemble.json"),
        }
    }
}

impl AdvisorConfig {
    /// Load configuration with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let model_path = env::var("MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_path);
        let config = Self {
            model: ModelConfig {
                seed: parse_u64("MODEL_SEED", defaults.model.seed)?,
                ..defaults.model
            },
            adjuster: defaults.adjuster,
            risk: RiskConfig::from_env()?,
            backtest: BacktestConfig::from_env()?,
            model_path,
        };
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.model.validate()?;
        self.adjuster.validate()?;
        self.risk.validate()?;
        self.backtest.validate()?;
        Ok(())
    }
}
