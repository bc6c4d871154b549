//! Risk-bounded mapping from a prediction to an equity allocation.
//!
//! The adjustments compose multiplicatively and in a fixed order:
//! confidence bucket, volatility penalty, drawdown adjustment, trend
//! conflict, then the hard ceiling and floor. Reordering them changes the
//! result, so the order is preserved exactly and every applied step is
//! recorded in the audit trail.

use crate::config::RiskConfig;
use crate::domain::types::{Direction, MarketContext};
use serde::Serialize;

/// A bounded allocation plus the ordered list of reasons behind it.
#[derive(Debug, Clone, Serialize)]
pub struct AllocationDecision {
    /// Equity fraction in [0, ceiling].
    pub allocation: f64,
    pub reasons: Vec<String>,
    pub prediction: Direction,
    pub confidence: f64,
    pub context: MarketContext,
}

pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn allocation(
        &self,
        prediction: Direction,
        confidence: f64,
        context: MarketContext,
    ) -> AllocationDecision {
        let cfg = &self.config;
        let mut reasons = Vec::new();

        // 1. Base allocation from the confidence bucket.
        let mut allocation = match prediction {
            Direction::Up => {
                if confidence < cfg.min_confidence {
                    reasons.push(format!("low confidence ({:.1}%)", confidence * 100.0));
                    0.3
                } else if confidence < 0.65 {
                    reasons.push(format!("moderate confidence ({:.1}%)", confidence * 100.0));
                    0.5
                } else if confidence < 0.75 {
                    reasons.push(format!("good confidence ({:.1}%)", confidence * 100.0));
                    0.7
                } else {
                    reasons.push(format!("high confidence ({:.1}%)", confidence * 100.0));
                    0.85
                }
            }
            Direction::Down => {
                let base = if confidence < cfg.min_confidence {
                    0.5
                } else if confidence < 0.65 {
                    0.4
                } else if confidence < 0.75 {
                    0.2
                } else {
                    0.1
                };
                reasons.push(format!("bearish signal ({:.1}%)", confidence * 100.0));
                base
            }
        };

        // 2. Volatility penalty above the threshold.
        if context.volatility_pct > cfg.volatility_threshold {
            let penalty = (context.volatility_pct - cfg.volatility_threshold) / 100.0;
            allocation *= 1.0 - penalty;
            reasons.push(format!(
                "high volatility ({:.1}%), reduced {:.0}%",
                context.volatility_pct,
                penalty * 100.0
            ));
        }

        // 3. Drawdown adjustment: deep drawdown is a contrarian boost for
        // a bullish call; near the peak everything is trimmed.
        if context.drawdown_pct < cfg.deep_drawdown_pct {
            if prediction == Direction::Up {
                allocation *= cfg.deep_drawdown_boost;
                reasons.push(format!(
                    "deep drawdown ({:.1}%), oversold boost",
                    context.drawdown_pct
                ));
            }
        } else if context.drawdown_pct > cfg.near_peak_drawdown_pct {
            allocation *= cfg.near_peak_penalty;
            reasons.push(format!("near peak ({:.1}%), trimmed", context.drawdown_pct));
        }

        // 4. Trend-conflict adjustment.
        if context.trend_score < cfg.weak_trend_score && prediction == Direction::Up {
            allocation *= cfg.weak_trend_penalty;
            reasons.push(format!(
                "bullish against weak trend (score {:.0})",
                context.trend_score
            ));
        } else if context.trend_score > cfg.strong_trend_score && prediction == Direction::Down {
            allocation *= cfg.strong_trend_boost;
            reasons.push(format!(
                "bearish against strong trend (score {:.0})",
                context.trend_score
            ));
        }

        // 5. Hard ceiling and floor, applied last.
        if allocation > cfg.max_allocation {
            reasons.push(format!(
                "capped at {:.0}%",
                cfg.max_allocation * 100.0
            ));
            allocation = cfg.max_allocation;
        }
        let allocation = allocation.max(0.0);

        AllocationDecision {
            allocation,
            reasons,
            prediction,
            confidence,
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig::default())
    }

    fn ctx(volatility_pct: f64, drawdown_pct: f64, trend_score: f64) -> MarketContext {
        MarketContext {
            volatility_pct,
            drawdown_pct,
            trend_score,
        }
    }

    #[test]
    fn bullish_confidence_buckets() {
        let quiet = ctx(10.0, -10.0, 50.0);
        let cases = [(0.55, 0.3), (0.62, 0.5), (0.70, 0.7), (0.80, 0.8)];
        for (confidence, expected) in cases {
            let decision = manager().allocation(Direction::Up, confidence, quiet);
            assert!(
                (decision.allocation - expected).abs() < 1e-9,
                "confidence {} -> {}",
                confidence,
                decision.allocation
            );
        }
    }

    #[test]
    fn bearish_buckets_stay_defensive() {
        let quiet = ctx(10.0, -10.0, 50.0);
        let cases = [(0.55, 0.5), (0.62, 0.4), (0.70, 0.2), (0.80, 0.1)];
        for (confidence, expected) in cases {
            let decision = manager().allocation(Direction::Down, confidence, quiet);
            assert!((decision.allocation - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn high_confidence_bullish_hits_the_ceiling() {
        let decision = manager().allocation(Direction::Up, 0.80, ctx(10.0, -10.0, 50.0));
        assert!((decision.allocation - 0.8).abs() < 1e-9);
        assert!(decision.reasons.iter().any(|r| r.contains("capped")));
    }

    #[test]
    fn volatility_penalty_is_proportional() {
        // 25% volatility: base 0.7 * (1 - 0.10) = 0.63.
        let decision = manager().allocation(Direction::Up, 0.70, ctx(25.0, -10.0, 50.0));
        assert!((decision.allocation - 0.63).abs() < 1e-9);
    }

    #[test]
    fn deep_drawdown_boosts_only_bullish() {
        let up = manager().allocation(Direction::Up, 0.70, ctx(10.0, -25.0, 50.0));
        assert!((up.allocation - 0.7 * 1.1).abs() < 1e-9);

        let down = manager().allocation(Direction::Down, 0.70, ctx(10.0, -25.0, 50.0));
        assert!((down.allocation - 0.2).abs() < 1e-9);
    }

    #[test]
    fn near_peak_trims_any_direction() {
        let up = manager().allocation(Direction::Up, 0.70, ctx(10.0, -2.0, 50.0));
        assert!((up.allocation - 0.7 * 0.9).abs() < 1e-9);

        let down = manager().allocation(Direction::Down, 0.70, ctx(10.0, -2.0, 50.0));
        assert!((down.allocation - 0.2 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn trend_conflict_adjustments() {
        let weak = manager().allocation(Direction::Up, 0.70, ctx(10.0, -10.0, 20.0));
        assert!((weak.allocation - 0.7 * 0.8).abs() < 1e-9);

        let strong = manager().allocation(Direction::Down, 0.70, ctx(10.0, -10.0, 80.0));
        assert!((strong.allocation - 0.2 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn adjustments_compose_in_order() {
        // Base 0.85, vol 20% -> *0.95, deep drawdown -> *1.1, weak trend
        // -> *0.8, then the ceiling.
        let decision = manager().allocation(Direction::Up, 0.80, ctx(20.0, -25.0, 20.0));
        let expected = (0.85 * 0.95 * 1.1 * 0.8f64).min(0.80);
        assert!((decision.allocation - expected).abs() < 1e-9);
        assert_eq!(decision.reasons.len(), 4);
    }

    #[test]
    fn allocation_never_leaves_bounds() {
        let m = manager();
        for &prediction in &[Direction::Up, Direction::Down] {
            for confidence in [0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.9, 0.99] {
                for volatility in [0.0, 10.0, 15.0, 40.0, 90.0] {
                    for drawdown in [-60.0, -25.0, -10.0, -3.0, 0.0] {
                        for trend in [0.0, 20.0, 50.0, 80.0, 100.0] {
                            let decision = m.allocation(
                                prediction,
                                confidence,
                                ctx(volatility, drawdown, trend),
                            );
                            assert!(
                                (0.0..=0.80).contains(&decision.allocation),
                                "out of bounds: {:?}",
                                decision.allocation
                            );
                        }
                    }
                }
            }
        }
    }
}
