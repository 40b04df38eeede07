// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Inference over a trained artifact set
//!
//! [`TrainedModel`] is the immutable, loaded model. [`InferenceService`]
//! owns the process-wide copy: loaded once (eagerly or on first request) and
//! shared read-only across threads. Both implement [`Predictor`], whose
//! single method never fails: problems come back as an error-status
//! [`PredictionResult`].

use crate::artifacts::{ModelArtifacts, ModelMetadata};
use crate::error::{DetectorError, Result};
use crate::labels::{LabelMapping, FAKE, REAL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Success,
    Error,
}

/// Outcome of a single `predict` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub status: PredictionStatus,
    /// "Real" or "Fake"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    /// Winning label as it appeared in the training data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_index: Option<u8>,
    /// "Fake"/"Real" -> probability; sums to 1
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub confidence: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_real: Option<bool>,
    /// `p_real * 100`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_percentage: Option<f64>,
    /// Held-out accuracy recorded at training time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: PredictionStatus::Error,
            prediction: None,
            raw_label: None,
            prediction_index: None,
            confidence: BTreeMap::new(),
            is_real: None,
            confidence_percentage: None,
            model_accuracy: None,
            error: Some(message.into()),
        }
    }

    pub fn from_error(err: &DetectorError) -> Self {
        Self::error(err.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status == PredictionStatus::Success
    }
}

/// Inference entrypoint, independent of transport
pub trait Predictor: Send + Sync {
    fn predict(&self, text: &str) -> PredictionResult;
}

/// Signed contribution of one vocabulary term to the decision score.
/// Positive values push towards "Real".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermContribution {
    pub term: String,
    /// TF-IDF value of the term in this text
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// Immutable loaded model
#[derive(Debug, Clone)]
pub struct TrainedModel {
    artifacts: ModelArtifacts,
    mapping: LabelMapping,
}

impl TrainedModel {
    pub fn new(artifacts: ModelArtifacts) -> Result<Self> {
        let mapping = artifacts.label_mapping()?;
        Ok(Self { artifacts, mapping })
    }

    pub fn load(dir: &Path) -> Result<Self> {
        Self::new(ModelArtifacts::load(dir)?)
    }

    pub fn artifacts(&self) -> &ModelArtifacts {
        &self.artifacts
    }

    pub fn metadata(&self) -> &ModelMetadata {
        self.artifacts.metadata()
    }

    pub fn label_mapping(&self) -> &LabelMapping {
        &self.mapping
    }

    /// Like [`Predictor::predict`], but blank input is an `Err`
    pub fn try_predict(&self, text: &str) -> Result<PredictionResult> {
        if text.trim().is_empty() {
            return Err(DetectorError::EmptyInput);
        }

        let vector = self.artifacts.vocabulary().transform_one(text);
        let classifier = self.artifacts.classifier();
        let (p_fake, p_real) = classifier.predict_proba(&vector);
        let index = classifier.predict(&vector);
        let raw_label = self.mapping.decode(index as usize)?;

        let mut confidence = BTreeMap::new();
        confidence.insert(FAKE.to_string(), p_fake);
        confidence.insert(REAL.to_string(), p_real);

        Ok(PredictionResult {
            status: PredictionStatus::Success,
            prediction: Some(LabelMapping::display_name(index).to_string()),
            raw_label: Some(raw_label.to_string()),
            prediction_index: Some(index),
            confidence,
            is_real: Some(p_real > 0.5),
            confidence_percentage: Some(p_real * 100.0),
            model_accuracy: Some(self.metadata().accuracy),
            error: None,
        })
    }

    /// Top `k` vocabulary terms of `text` by absolute contribution
    pub fn explain(&self, text: &str, k: usize) -> Vec<TermContribution> {
        let vocabulary = self.artifacts.vocabulary();
        let weights = self.artifacts.classifier().weights();

        let mut contributions: Vec<TermContribution> = vocabulary
            .transform_one(text)
            .iter()
            .filter_map(|(idx, value)| {
                let term = vocabulary.term(idx)?;
                let weight = weights.get(idx).copied()?;
                Some(TermContribution {
                    term: term.to_string(),
                    value,
                    weight,
                    contribution: value * weight,
                })
            })
            .collect();

        contributions.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.term.cmp(&b.term))
        });
        contributions.truncate(k);
        contributions
    }
}

impl Predictor for TrainedModel {
    fn predict(&self, text: &str) -> PredictionResult {
        self.try_predict(text)
            .unwrap_or_else(|e| PredictionResult::from_error(&e))
    }
}

/// Process-wide model holder.
///
/// The model is loaded at most once; after that every call reads the same
/// immutable value without locking. A failed lazy load is not memoized, so a
/// request made before training simply reports "Model not trained yet".
#[derive(Debug)]
pub struct InferenceService {
    model_dir: PathBuf,
    model: OnceLock<TrainedModel>,
}

impl InferenceService {
    /// Service that loads artifacts from `model_dir` on first request
    pub fn lazy(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            model: OnceLock::new(),
        }
    }

    /// Load artifacts now, failing fast at startup
    pub fn load(model_dir: impl Into<PathBuf>) -> Result<Self> {
        let service = Self::lazy(model_dir);
        service.model()?;
        Ok(service)
    }

    /// Wrap an already loaded model
    pub fn from_model(model: TrainedModel) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(model);
        Self {
            model_dir: PathBuf::new(),
            model: cell,
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// The loaded model, loading it on first use
    pub fn model(&self) -> Result<&TrainedModel> {
        if let Some(model) = self.model.get() {
            return Ok(model);
        }

        let loaded = TrainedModel::load(&self.model_dir)?;
        // Another thread may have won the race; either copy is identical
        let _ = self.model.set(loaded);
        self.model.get().ok_or(DetectorError::ArtifactsNotLoaded)
    }
}

impl Predictor for InferenceService {
    fn predict(&self, text: &str) -> PredictionResult {
        if text.trim().is_empty() {
            return PredictionResult::from_error(&DetectorError::EmptyInput);
        }

        match self.model() {
            Ok(model) => model.predict(text),
            Err(e) => {
                tracing::warn!("Prediction unavailable: {}", e);
                PredictionResult::from_error(&e)
            }
        }
    }
}
