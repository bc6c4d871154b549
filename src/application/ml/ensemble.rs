//! Soft-vote ensemble over three independently parameterized tree models.
//!
//! Each member is a random-forest regressor fit against the 0/1 direction
//! label; its output is read as an up-probability. The ensemble
//! probability is the unweighted mean of the member probabilities and the
//! predicted class is its argmax. Training replaces the artifact
//! wholesale; there is no incremental refit.

use crate::application::features::{CleanRow, FeatureTable};
use crate::application::ml::scaler::StandardScaler;
use crate::config::ModelConfig;
use crate::domain::errors::PredictionError;
use crate::domain::types::{ClassProbabilities, Direction, ModelVote, PredictionResult};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use tracing::info;

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Fixed hyperparameters of one ensemble member.
struct MemberSpec {
    name: &'static str,
    n_trees: usize,
    max_depth: u16,
    min_samples_split: usize,
    feature_subsample: bool,
}

/// The three member parameterizations. The first entry is the reference
/// model used for feature-importance reporting.
const MEMBER_SPECS: [MemberSpec; 3] = [
    MemberSpec {
        name: "shallow",
        n_trees: 100,
        max_depth: 3,
        min_samples_split: 2,
        feature_subsample: false,
    },
    MemberSpec {
        name: "deep",
        n_trees: 100,
        max_depth: 5,
        min_samples_split: 5,
        feature_subsample: false,
    },
    MemberSpec {
        name: "sparse",
        n_trees: 100,
        max_depth: 4,
        min_samples_split: 2,
        feature_subsample: true,
    },
];

#[derive(Serialize, Deserialize)]
pub struct EnsembleMember {
    pub name: String,
    forest: Forest,
}

impl EnsembleMember {
    /// Up-probabilities for a batch of scaled rows, clamped to [0, 1].
    fn probabilities(&self, x: &DenseMatrix<f64>) -> Result<Vec<f64>, PredictionError> {
        let preds = self.forest.predict(x).map_err(|e| PredictionError::Model {
            reason: format!("member {} predict failed: {}", self.name, e),
        })?;
        Ok(preds.into_iter().map(|p| p.clamp(0.0, 1.0)).collect())
    }
}

/// The immutable trained artifact: members, scaler and feature order
/// travel together so training and serving can never skew apart.
#[derive(Serialize, Deserialize)]
pub struct TrainedModel {
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub members: Vec<EnsembleMember>,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    /// Predict from one unscaled feature row.
    pub fn predict_row(&self, features: &[f64]) -> Result<PredictionResult, PredictionError> {
        if features.len() != self.scaler.width() {
            return Err(PredictionError::Model {
                reason: format!(
                    "feature width mismatch: got {}, model expects {}",
                    features.len(),
                    self.scaler.width()
                ),
            });
        }
        let scaled = self.scaler.transform_row(features);
        let x = row_matrix(&scaled)?;

        let mut votes = Vec::with_capacity(self.members.len());
        let mut sum = 0.0;
        for member in &self.members {
            let p = member
                .probabilities(&x)?
                .first()
                .copied()
                .ok_or_else(|| PredictionError::Model {
                    reason: format!("member {} returned no prediction", member.name),
                })?;
            sum += p;
            let probs = ClassProbabilities::from_up(p);
            votes.push(ModelVote {
                model: member.name.clone(),
                prediction: probs.predicted(),
                confidence: probs.confidence(),
            });
        }

        let probabilities = ClassProbabilities::from_up(sum / self.members.len() as f64);
        Ok(PredictionResult {
            prediction: probabilities.predicted(),
            confidence: probabilities.confidence(),
            votes,
            probabilities,
        })
    }

    /// Soft-vote up-probabilities for a batch of already-scaled rows.
    fn ensemble_probabilities(&self, x: &DenseMatrix<f64>) -> Result<Vec<f64>, PredictionError> {
        let mut sums: Option<Vec<f64>> = None;
        for member in &self.members {
            let probs = member.probabilities(x)?;
            match &mut sums {
                Some(acc) => {
                    for (a, p) in acc.iter_mut().zip(probs.iter()) {
                        *a += p;
                    }
                }
                None => sums = Some(probs),
            }
        }
        let count = self.members.len() as f64;
        Ok(sums
            .unwrap_or_default()
            .into_iter()
            .map(|s| s / count)
            .collect())
    }
}

/// One ranked entry of the feature-importance report.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingMetrics {
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub train_samples: usize,
    pub test_samples: usize,
    pub features_used: usize,
    pub top_features: Vec<FeatureImportance>,
}

/// Trains the soft-vote ensemble from a feature table.
pub struct EnsembleClassifier {
    config: ModelConfig,
}

impl EnsembleClassifier {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Fit a fresh artifact. Rows are split chronologically (leading 70%
    /// train, trailing 30% test); the scaler is fit on the training
    /// segment only and applied identically to the test segment.
    pub fn train(
        &self,
        table: &FeatureTable,
    ) -> Result<(TrainedModel, TrainingMetrics), PredictionError> {
        let clean = table.clean_rows();
        if clean.len() < self.config.min_training_rows {
            return Err(PredictionError::InsufficientData {
                rows: clean.len(),
                min: self.config.min_training_rows,
            });
        }

        let split = (clean.len() as f64 * self.config.train_split) as usize;
        let (train_rows, test_rows) = clean.split_at(split);
        info!(
            train = train_rows.len(),
            test = test_rows.len(),
            features = table.feature_names.len(),
            "fitting ensemble"
        );

        let train_x_raw: Vec<Vec<f64>> = train_rows.iter().map(|r| r.features.clone()).collect();
        let scaler = StandardScaler::fit(&train_x_raw);
        let train_x = scaler.transform(&train_x_raw);
        let test_x_raw: Vec<Vec<f64>> = test_rows.iter().map(|r| r.features.clone()).collect();
        let test_x = scaler.transform(&test_x_raw);

        let train_y: Vec<f64> = train_rows.iter().map(|r| r.label.as_label()).collect();

        let x_matrix = matrix(&train_x)?;
        let feature_count = table.feature_names.len();
        let mut members = Vec::with_capacity(MEMBER_SPECS.len());
        for spec in &MEMBER_SPECS {
            let mut params = RandomForestRegressorParameters::default()
                .with_n_trees(spec.n_trees)
                .with_max_depth(spec.max_depth)
                .with_min_samples_split(spec.min_samples_split)
                .with_seed(self.config.seed);
            if spec.feature_subsample {
                let m = (feature_count as f64).sqrt().round().max(1.0) as usize;
                params = params.with_m(m);
            }
            let forest =
                Forest::fit(&x_matrix, &train_y, params).map_err(|e| PredictionError::Model {
                    reason: format!("member {} fit failed: {}", spec.name, e),
                })?;
            members.push(EnsembleMember {
                name: spec.name.to_string(),
                forest,
            });
        }

        let model = TrainedModel {
            feature_names: table.feature_names.clone(),
            scaler,
            members,
            trained_at: Utc::now(),
        };

        let metrics = self.evaluate(&model, &train_x, train_rows, &test_x, test_rows)?;
        Ok((model, metrics))
    }

    fn evaluate(
        &self,
        model: &TrainedModel,
        train_x: &[Vec<f64>],
        train_rows: &[CleanRow],
        test_x: &[Vec<f64>],
        test_rows: &[CleanRow],
    ) -> Result<TrainingMetrics, PredictionError> {
        let train_matrix = matrix(train_x)?;
        let test_matrix = matrix(test_x)?;

        let train_pred = classify(&model.ensemble_probabilities(&train_matrix)?);
        let test_pred = classify(&model.ensemble_probabilities(&test_matrix)?);
        let train_actual: Vec<Direction> = train_rows.iter().map(|r| r.label).collect();
        let test_actual: Vec<Direction> = test_rows.iter().map(|r| r.label).collect();

        let top_features = self.permutation_importance(model, test_x, &test_actual)?;

        Ok(TrainingMetrics {
            train_accuracy: accuracy(&train_pred, &train_actual),
            test_accuracy: accuracy(&test_pred, &test_actual),
            precision: precision(&test_pred, &test_actual),
            recall: recall(&test_pred, &test_actual),
            f1_score: f1(&test_pred, &test_actual),
            train_samples: train_rows.len(),
            test_samples: test_rows.len(),
            features_used: model.feature_names.len(),
            top_features,
        })
    }

    /// Permutation importance against the reference member: shuffle one
    /// scaled test column at a time with a seeded generator and measure
    /// the accuracy drop. Drops are clamped at zero and normalized to sum
    /// to one when any feature matters at all.
    fn permutation_importance(
        &self,
        model: &TrainedModel,
        test_x: &[Vec<f64>],
        actual: &[Direction],
    ) -> Result<Vec<FeatureImportance>, PredictionError> {
        let reference = &model.members[0];
        let baseline_matrix = matrix(test_x)?;
        let baseline = accuracy(&classify(&reference.probabilities(&baseline_matrix)?), actual);

        let width = model.feature_names.len();
        let mut importances = Vec::with_capacity(width);
        for col in 0..width {
            let mut permuted: Vec<Vec<f64>> = test_x.to_vec();
            let mut column: Vec<f64> = permuted.iter().map(|r| r[col]).collect();
            let mut rng = StdRng::seed_from_u64(self.config.seed + col as u64);
            column.shuffle(&mut rng);
            for (row, value) in permuted.iter_mut().zip(column.into_iter()) {
                row[col] = value;
            }
            let acc = accuracy(
                &classify(&reference.probabilities(&matrix(&permuted)?)?),
                actual,
            );
            importances.push((baseline - acc).max(0.0));
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in importances.iter_mut() {
                *imp /= total;
            }
        }

        let mut ranked: Vec<FeatureImportance> = model
            .feature_names
            .iter()
            .zip(importances.into_iter())
            .map(|(name, importance)| FeatureImportance {
                name: name.clone(),
                importance,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        ranked.truncate(self.config.top_features);
        Ok(ranked)
    }
}

fn matrix(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>, PredictionError> {
    DenseMatrix::from_2d_vec(&rows.to_vec()).map_err(|e| PredictionError::Model {
        reason: format!("matrix creation failed: {}", e),
    })
}

fn row_matrix(row: &[f64]) -> Result<DenseMatrix<f64>, PredictionError> {
    matrix(&[row.to_vec()])
}

fn classify(probabilities: &[f64]) -> Vec<Direction> {
    probabilities
        .iter()
        .map(|&p| ClassProbabilities::from_up(p).predicted())
        .collect()
}

fn accuracy(predicted: &[Direction], actual: &[Direction]) -> f64 {
    if predicted.is_empty() {
        return 0.0;
    }
    let correct = predicted
        .iter()
        .zip(actual.iter())
        .filter(|(p, a)| p == a)
        .count();
    correct as f64 / predicted.len() as f64
}

fn precision(predicted: &[Direction], actual: &[Direction]) -> f64 {
    let tp = count(predicted, actual, Direction::Up, Direction::Up);
    let fp = count(predicted, actual, Direction::Up, Direction::Down);
    if tp + fp == 0 {
        0.0
    } else {
        tp as f64 / (tp + fp) as f64
    }
}

fn recall(predicted: &[Direction], actual: &[Direction]) -> f64 {
    let tp = count(predicted, actual, Direction::Up, Direction::Up);
    let fn_ = count(predicted, actual, Direction::Down, Direction::Up);
    if tp + fn_ == 0 {
        0.0
    } else {
        tp as f64 / (tp + fn_) as f64
    }
}

fn f1(predicted: &[Direction], actual: &[Direction]) -> f64 {
    let p = precision(predicted, actual);
    let r = recall(predicted, actual);
    if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
}

fn count(predicted: &[Direction], actual: &[Direction], pred: Direction, act: Direction) -> usize {
    predicted
        .iter()
        .zip(actual.iter())
        .filter(|(p, a)| **p == pred && **a == act)
        .count()
}
