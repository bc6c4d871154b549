//! End-to-end pipeline scenarios: train, predict, adjust and backtest
//! against synthetic monthly series with known behavior.

use chrono::NaiveDate;
use fundcast::application::advisor::AllocationAdvisor;
use fundcast::application::backtest::BacktestMode;
use fundcast::config::AdvisorConfig;
use fundcast::domain::errors::PredictionError;
use fundcast::domain::types::{Direction, PriceBar};

fn monthly_spaced_daily(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            date: NaiveDate::from_ymd_opt(2010 + (i / 12) as i32, (i % 12) as u32 + 1, 28)
                .unwrap(),
            open: close,
            high: close * 1.005,
            low: close * 0.995,
            close,
            volume: 1_000.0,
        })
        .collect()
}

fn rising_series(months: usize) -> Vec<PriceBar> {
    monthly_spaced_daily(
        &(0..months)
            .map(|i| 100.0 * 1.01f64.powi(i as i32))
            .collect::<Vec<_>>(),
    )
}

fn advisor_in(dir: &tempfile::TempDir) -> AllocationAdvisor {
    let mut config = AdvisorConfig::default();
    config.model_path = dir.path().join("ensemble.json");
    AllocationAdvisor::new(config)
}

#[test]
fn rising_market_is_called_bullish_and_tracks_buy_and_hold() {
    let dir = tempfile::tempdir().unwrap();
    let advisor = advisor_in(&dir);
    let bars = rising_series(72);

    let metrics = advisor.train(&bars).unwrap();
    assert!(metrics.test_accuracy > 0.9);

    let prediction = advisor.predict(&bars).unwrap();
    assert_eq!(prediction.prediction, Direction::Up);
    assert!(prediction.confidence > 0.5);

    let summary = advisor.backtest(&bars, BacktestMode::Ensemble).unwrap();
    // Allocation rides at the ceiling, so the strategy tracks buy & hold.
    assert!((summary.returns.strategy_pct - summary.returns.buy_hold_pct).abs() < 1e-6);
    assert!((summary.metrics.win_rate_pct - 100.0).abs() < 1e-9);
    assert!((summary.allocation_stats.mean - 1.0).abs() < 1e-9);
    // Constant steps: dispersion-based metrics degrade to their explicit
    // fallbacks instead of NaN.
    assert_eq!(summary.metrics.sharpe_ratio, 0.0);
    assert_eq!(summary.metrics.max_drawdown_pct, 0.0);
    assert!(summary.final_capital > 100_000.0);
}

#[test]
fn adjusted_backtest_matches_on_a_clean_uptrend() {
    let dir = tempfile::tempdir().unwrap();
    let advisor = advisor_in(&dir);
    let bars = rising_series(72);
    advisor.train(&bars).unwrap();

    let summary = advisor.backtest(&bars, BacktestMode::TrendAdjusted).unwrap();
    assert!((summary.returns.strategy_pct - summary.returns.buy_hold_pct).abs() < 1e-6);
    assert!((summary.metrics.win_rate_pct - 100.0).abs() < 1e-9);
}

#[test]
fn backtest_requires_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let advisor = advisor_in(&dir);
    assert!(matches!(
        advisor.backtest(&rising_series(72), BacktestMode::Ensemble),
        Err(PredictionError::NotTrained)
    ));
}

#[test]
fn backtest_requires_fifty_usable_rows() {
    let dir = tempfile::tempdir().unwrap();
    let advisor = advisor_in(&dir);
    advisor.train(&rising_series(72)).unwrap();

    // 60 months leave 47 usable rows after warm-up and the label shift.
    let result = advisor.backtest(&rising_series(60), BacktestMode::Ensemble);
    match result {
        Err(PredictionError::InsufficientData { rows, min }) => {
            assert_eq!(rows, 47);
            assert_eq!(min, 50);
        }
        other => panic!("expected InsufficientData, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn prediction_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let advisor = advisor_in(&dir);
    let bars = rising_series(72);
    advisor.train(&bars).unwrap();

    let first = advisor.predict(&bars).unwrap();
    let second = advisor.predict(&bars).unwrap();
    assert_eq!(first.prediction, second.prediction);
    assert_eq!(first.confidence, second.confidence);
    assert_eq!(first.probabilities.up, second.probabilities.up);

    let adjusted_first = advisor.predict_with_adjustment(&bars).unwrap();
    let adjusted_second = advisor.predict_with_adjustment(&bars).unwrap();
    assert_eq!(adjusted_first.prediction, adjusted_second.prediction);
    assert_eq!(adjusted_first.confidence, adjusted_second.confidence);
}

#[test]
fn flat_series_yields_no_valid_data() {
    let dir = tempfile::tempdir().unwrap();
    let advisor = advisor_in(&dir);
    advisor.train(&rising_series(72)).unwrap();

    // Every oscillator window is zero-gain/zero-loss, so every row is
    // dropped and the failure is explicit, not a crash or a default.
    let flat = monthly_spaced_daily(&vec![50.0; 72]);
    assert!(matches!(
        advisor.predict(&flat),
        Err(PredictionError::NoValidData)
    ));
}

#[test]
fn allocation_decision_is_bounded_and_audited() {
    let dir = tempfile::tempdir().unwrap();
    let advisor = advisor_in(&dir);
    let bars = rising_series(72);
    advisor.train(&bars).unwrap();

    let adjusted = advisor.predict_with_adjustment(&bars).unwrap();
    let context = advisor.market_context(&bars);
    let decision = advisor.compute_allocation(adjusted.prediction, adjusted.confidence, context);

    assert!(decision.allocation >= 0.0);
    assert!(decision.allocation <= 0.80);
    assert!(!decision.reasons.is_empty());
}
