// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! TF-IDF + logistic regression fake news detector
//!
//! This crate provides:
//! - Tabular data loading with a seeded stratified train/test split
//! - A TF-IDF featurizer with a frozen unigram/bigram vocabulary
//! - Binary label encoding and L2-regularized logistic regression
//! - Held-out metrics (accuracy, weighted precision/recall/F1)
//! - Versioned, atomically persisted artifact sets
//! - A load-once inference service returning structured predictions

pub mod artifacts;
pub mod classifier;
pub mod datasets;
pub mod error;
pub mod featurizer;
pub mod inference;
pub mod labels;
pub mod metrics;
pub mod pipeline;

pub use artifacts::{ModelArtifacts, ModelMetadata, ARTIFACT_FORMAT_VERSION};
pub use classifier::{ClassifierConfig, ClassifierParameters, LogisticRegression};
pub use datasets::{CsvSource, InMemorySource, LabeledExample, TabularSource};
pub use error::{DetectorError, Result};
pub use featurizer::{FeatureVector, FeatureVocabulary, Tokenizer, VectorizerConfig};
pub use inference::{InferenceService, PredictionResult, PredictionStatus, Predictor, TrainedModel};
pub use labels::LabelMapping;
pub use metrics::{ClassificationReport, ConfusionMatrix};
pub use pipeline::{train, TrainingConfig, TrainingPipeline, TrainingReport, TrainingState};
