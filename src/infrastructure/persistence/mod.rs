//! On-disk persistence of the trained-model artifact.

use crate::application::ml::ensemble::TrainedModel;
use std::fs::File;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("model store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model artifact serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Loads and stores the serialized ensemble artifact.
///
/// `save` is all-or-nothing: the artifact is written to a sibling
/// temporary file and renamed over the target, so readers either see the
/// previous complete artifact or the new one, never a partial write.
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<Option<TrainedModel>, StoreError> {
        if !self.path.exists() {
            warn!("No model artifact at {:?}; advisor starts untrained", self.path);
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let model: TrainedModel = serde_json::from_reader(file)?;
        info!(
            trained_at = %model.trained_at,
            "Loaded model artifact from {:?}", self.path
        );
        Ok(Some(model))
    }

    pub fn save(&self, model: &TrainedModel) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            serde_json::to_writer(file, model)?;
        }
        std::fs::rename(&tmp, &self.path)?;
        info!("Saved model artifact to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::features::FeatureBuilder;
    use crate::application::ml::ensemble::EnsembleClassifier;
    use crate::config::ModelConfig;
    use crate::domain::types::PriceBar;
    use chrono::NaiveDate;

    fn trained_model() -> TrainedModel {
        let bars: Vec<PriceBar> = (0..72)
            .map(|i| {
                let close = 100.0 * 1.01f64.powi(i as i32);
                PriceBar {
                    date: NaiveDate::from_ymd_opt(2014 + (i / 12) as i32, (i % 12) as u32 + 1, 28)
                        .unwrap(),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                }
            })
            .collect();
        let table = FeatureBuilder::build(&bars);
        let (model, _) = EnsembleClassifier::new(ModelConfig::default())
            .train(&table)
            .unwrap();
        model
    }

    #[test]
    fn missing_artifact_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("missing.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("models/ensemble.json"));
        let model = trained_model();
        store.save(&model).unwrap();

        let loaded = store.load().unwrap().expect("artifact present");
        assert_eq!(loaded.feature_names, model.feature_names);
        assert_eq!(loaded.members.len(), 3);
        assert_eq!(loaded.trained_at, model.trained_at);
    }

    #[test]
    fn save_replaces_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("ensemble.json"));
        let first = trained_model();
        store.save(&first).unwrap();
        let second = trained_model();
        store.save(&second).unwrap();

        let loaded = store.load().unwrap().expect("artifact present");
        assert_eq!(loaded.trained_at, second.trained_at);
        assert!(!dir.path().join("ensemble.json.tmp").exists());
    }
}
