//! The owning allocation-advisor component.
//!
//! Holds the trained artifact behind a read/write lock with an explicit
//! load/train/swap lifecycle: `train` fits and persists a fresh artifact,
//! then installs it in one step, so concurrent readers only ever observe
//! the most recently completed model.

use crate::application::analysis::trend::{AdjustedPrediction, TrendAdjuster, TrendAnalysis};
use crate::application::backtest::{BacktestMode, BacktestSummary, WalkForwardBacktester};
use crate::application::features::FeatureBuilder;
use crate::application::market_data::resample_monthly;
use crate::application::ml::ensemble::{EnsembleClassifier, TrainedModel, TrainingMetrics};
use crate::application::risk_management::{AllocationDecision, RiskManager};
use crate::config::AdvisorConfig;
use crate::domain::errors::PredictionError;
use crate::domain::types::{Direction, MarketContext, PredictionResult, PriceBar};
use crate::infrastructure::persistence::ModelStore;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

pub struct AllocationAdvisor {
    config: AdvisorConfig,
    store: ModelStore,
    model: RwLock<Option<Arc<TrainedModel>>>,
}

impl AllocationAdvisor {
    pub fn new(config: AdvisorConfig) -> Self {
        let store = ModelStore::new(config.model_path.clone());
        Self {
            config,
            store,
            model: RwLock::new(None),
        }
    }

    /// Install the persisted artifact if one exists. Returns whether a
    /// model is now available.
    pub fn load(&self) -> Result<bool, PredictionError> {
        match self.store.load() {
            Ok(Some(model)) => {
                self.install(model);
                Ok(true)
            }
            Ok(None) => Ok(self.is_trained()),
            Err(e) => Err(PredictionError::Model {
                reason: format!("failed to load model artifact: {}", e),
            }),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().map(|m| m.is_some()).unwrap_or(false)
    }

    /// Fit a fresh artifact from daily bars, persist it, then swap it in.
    pub fn train(&self, daily: &[PriceBar]) -> Result<TrainingMetrics, PredictionError> {
        let monthly = resample_monthly(daily);
        let table = FeatureBuilder::build(&monthly);
        let classifier = EnsembleClassifier::new(self.config.model.clone());
        let (model, metrics) = classifier.train(&table)?;

        if let Err(e) = self.store.save(&model) {
            return Err(PredictionError::Model {
                reason: format!("failed to persist model artifact: {}", e),
            });
        }
        self.install(model);
        info!(
            train_accuracy = metrics.train_accuracy,
            test_accuracy = metrics.test_accuracy,
            "model trained and installed"
        );
        Ok(metrics)
    }

    /// Raw ensemble prediction from the latest fully-populated row.
    pub fn predict(&self, daily: &[PriceBar]) -> Result<PredictionResult, PredictionError> {
        let model = self.current_model()?;
        let monthly = resample_monthly(daily);
        let table = FeatureBuilder::build(&monthly);
        let (_, features) = table.latest_complete().ok_or(PredictionError::NoValidData)?;
        model.predict_row(&features)
    }

    /// Ensemble prediction blended through the trend adjuster.
    pub fn predict_with_adjustment(
        &self,
        daily: &[PriceBar],
    ) -> Result<AdjustedPrediction, PredictionError> {
        let model = self.current_model()?;
        let monthly = resample_monthly(daily);
        let table = FeatureBuilder::build(&monthly);
        let (_, features) = table.latest_complete().ok_or(PredictionError::NoValidData)?;
        let base = model.predict_row(&features)?;

        let adjuster = TrendAdjuster::new(self.config.adjuster.clone());
        let adjusted = adjuster.adjust(&base, TrendAnalysis::from_monthly(&monthly));
        if adjusted.changed {
            warn!(
                base = %adjusted.base_prediction,
                adjusted = %adjusted.prediction,
                "trend adjustment changed the prediction"
            );
        }
        Ok(adjusted)
    }

    /// Current market context for the risk manager, derived from the same
    /// monthly series the predictions read.
    pub fn market_context(&self, daily: &[PriceBar]) -> MarketContext {
        let monthly = resample_monthly(daily);
        TrendAnalysis::from_monthly(&monthly).market_context()
    }

    /// Risk-bounded allocation for an already-formed prediction.
    pub fn compute_allocation(
        &self,
        prediction: Direction,
        confidence: f64,
        context: MarketContext,
    ) -> AllocationDecision {
        RiskManager::new(self.config.risk.clone()).allocation(prediction, confidence, context)
    }

    /// Walk-forward backtest over the daily series.
    pub fn backtest(
        &self,
        daily: &[PriceBar],
        mode: BacktestMode,
    ) -> Result<BacktestSummary, PredictionError> {
        let model = self.current_model()?;
        let monthly = resample_monthly(daily);
        let backtester = WalkForwardBacktester::new(
            model.as_ref(),
            self.config.backtest.clone(),
            self.config.adjuster.clone(),
        );
        backtester.run(&monthly, mode)
    }

    fn install(&self, model: TrainedModel) {
        if let Ok(mut slot) = self.model.write() {
            *slot = Some(Arc::new(model));
        }
    }

    fn current_model(&self) -> Result<Arc<TrainedModel>, PredictionError> {
        self.model
            .read()
            .ok()
            .and_then(|m| m.clone())
            .ok_or(PredictionError::NotTrained)
    }
}
