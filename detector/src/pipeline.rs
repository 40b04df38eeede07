// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible training pipeline
//!
//! Orchestrates:
//! - Loading labeled rows from a tabular source
//! - Seeded stratified train/test split
//! - Vectorizer, label encoder and classifier fitting (train split only)
//! - Held-out evaluation
//! - Atomic persistence of the artifact set
//! - Report generation

use crate::artifacts::{ModelArtifacts, ModelMetadata, MODEL_TYPE, VECTORIZER_TYPE};
use crate::classifier::{ClassifierConfig, ClassifierParameters, LogisticRegression};
use crate::datasets::{label_distribution, stratified_split, TabularSource};
use crate::error::{DetectorError, Result};
use crate::featurizer::{FeatureVector, FeatureVocabulary, VectorizerConfig};
use crate::labels::LabelMapping;
use crate::metrics::ClassificationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Configuration for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Random seed for the split
    pub seed: u64,
    /// Fraction of each class held out for evaluation
    pub test_fraction: f64,
    pub text_column: String,
    pub label_column: String,
    /// Directory receiving the artifact set
    pub model_dir: PathBuf,
    pub vectorizer: VectorizerConfig,
    pub classifier: ClassifierConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            text_column: "Eng_Trans_Statement".to_string(),
            label_column: "Label".to_string(),
            model_dir: PathBuf::from("public/ml_models"),
            vectorizer: VectorizerConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Load from a JSON file; absent fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }
}

/// Stages of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingState {
    Idle,
    DataLoaded,
    FeaturesFitted,
    ModelFitted,
    Evaluated,
    Persisted,
    Failed,
}

/// Everything a run learned and measured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub config: TrainingConfig,
    pub source: String,
    pub run_id: String,
    pub total_examples: usize,
    pub dropped_rows: usize,
    pub label_distribution: BTreeMap<String, usize>,
    pub label_mapping: BTreeMap<String, u8>,
    pub train_samples: usize,
    pub test_samples: usize,
    pub n_features: usize,
    pub converged: bool,
    pub iterations: usize,
    pub metrics: ClassificationReport,
    pub artifact_paths: Vec<PathBuf>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

struct FittedClassifier {
    parameters: ClassifierParameters,
    converged: bool,
    iterations: usize,
}

/// Main training pipeline
pub struct TrainingPipeline {
    config: TrainingConfig,
    state: TrainingState,
}

impl TrainingPipeline {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            state: TrainingState::Idle,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    fn advance(&mut self, state: TrainingState) {
        tracing::debug!("Training state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Run the full pipeline. Any error leaves the state at `Failed` and
    /// nothing on disk.
    pub fn run(&mut self, source: &dyn TabularSource) -> Result<TrainingReport> {
        self.state = TrainingState::Idle;
        match self.run_stages(source) {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!("Training failed during {:?}: {}", self.state, e);
                self.state = TrainingState::Failed;
                Err(e)
            }
        }
    }

    fn run_stages(&mut self, source: &dyn TabularSource) -> Result<TrainingReport> {
        let config = self.config.clone();

        // Load
        tracing::info!("Loading data from {}", source.describe());
        let loaded = source
            .read_table()?
            .labeled_examples(&config.text_column, &config.label_column)?;
        let examples = loaded.examples;
        if examples.is_empty() {
            return Err(DetectorError::InsufficientData(format!(
                "no usable rows in {}",
                source.describe()
            )));
        }

        let distribution = label_distribution(&examples);
        tracing::info!("Loaded {} examples, label distribution: {:?}", examples.len(), distribution);
        // Binary check over the whole set, before any fitting
        LabelMapping::fit(distribution.keys())?;
        self.advance(TrainingState::DataLoaded);

        // Split and featurize
        let split = stratified_split(&examples, config.test_fraction, config.seed);
        tracing::info!("Split: train={}, test={}", split.train.len(), split.test.len());
        if split.test.is_empty() {
            tracing::warn!("Test split is empty; reported metrics will be zero");
        }

        let train_texts: Vec<&str> = split.train.iter().map(|e| e.text.as_str()).collect();
        let test_texts: Vec<&str> = split.test.iter().map(|e| e.text.as_str()).collect();

        let vocabulary = FeatureVocabulary::fit(&train_texts, &config.vectorizer)?;
        let mapping = LabelMapping::fit(split.train.iter().map(|e| e.raw_label.as_str()))?;

        let train_vectors = vocabulary.transform(&train_texts);
        let test_vectors = vocabulary.transform(&test_texts);
        let train_labels = split
            .train
            .iter()
            .map(|e| mapping.encode(&e.raw_label))
            .collect::<Result<Vec<u8>>>()?;
        let test_labels = split
            .test
            .iter()
            .map(|e| mapping.encode(&e.raw_label))
            .collect::<Result<Vec<u8>>>()?;

        tracing::info!("Vectorizer fitted: {} features", vocabulary.len());
        tracing::info!("Label mapping: {:?}", mapping.to_map());
        self.advance(TrainingState::FeaturesFitted);

        // Classifier
        let fitted = Self::fit_classifier(&config.classifier, &train_vectors, &train_labels)?;
        self.advance(TrainingState::ModelFitted);

        // Evaluate
        let predictions: Vec<u8> = test_vectors.iter().map(|x| fitted.parameters.predict(x)).collect();
        let metrics = ClassificationReport::from_predictions(&predictions, &test_labels, mapping.labels().clone());
        tracing::info!(
            "Test metrics - Accuracy: {:.4}, Precision: {:.4}, Recall: {:.4}, F1: {:.4}",
            metrics.accuracy,
            metrics.precision,
            metrics.recall,
            metrics.f1_score
        );
        self.advance(TrainingState::Evaluated);

        // Persist
        let timestamp = Utc::now();
        let metadata = ModelMetadata {
            label_mapping: mapping.to_map(),
            accuracy: metrics.accuracy,
            precision: metrics.precision,
            recall: metrics.recall,
            f1_score: metrics.f1_score,
            text_column: config.text_column.clone(),
            label_column: config.label_column.clone(),
            model_type: MODEL_TYPE.to_string(),
            vectorizer_type: VECTORIZER_TYPE.to_string(),
            n_features: vocabulary.len(),
            train_samples: split.train.len(),
            test_samples: split.test.len(),
            converged: fitted.converged,
            iterations: fitted.iterations,
            trained_at: timestamp,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        let n_features = vocabulary.len();
        let artifacts = ModelArtifacts::new(vocabulary, fitted.parameters, metadata)?;
        let artifact_paths = artifacts.save(&config.model_dir)?;
        self.advance(TrainingState::Persisted);

        Ok(TrainingReport {
            source: source.describe(),
            run_id: artifacts.run_id().to_string(),
            total_examples: examples.len(),
            dropped_rows: loaded.dropped_rows,
            label_distribution: distribution,
            label_mapping: mapping.to_map(),
            train_samples: split.train.len(),
            test_samples: split.test.len(),
            n_features,
            converged: fitted.converged,
            iterations: fitted.iterations,
            metrics,
            artifact_paths,
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
        })
    }

    /// Fit, retrying once warm-started if the solver hits its cap.
    /// Non-convergence is not fatal: the best parameters are kept.
    fn fit_classifier(
        config: &ClassifierConfig,
        vectors: &[FeatureVector],
        labels: &[u8],
    ) -> Result<FittedClassifier> {
        let solver = LogisticRegression::new(config.clone());

        let (start, first_iterations) = match solver.fit(vectors, labels) {
            Ok(summary) => {
                tracing::info!("Classifier converged after {} iterations", summary.iterations);
                return Ok(FittedClassifier {
                    parameters: summary.parameters,
                    converged: true,
                    iterations: summary.iterations,
                });
            }
            Err(DetectorError::Convergence {
                iterations,
                gradient_norm,
                stalled: true,
                best,
            }) => {
                tracing::warn!(
                    "Classifier line search stalled after {} iterations (|g|={:.3e}); keeping best parameters found",
                    iterations,
                    gradient_norm
                );
                return Ok(FittedClassifier {
                    parameters: *best,
                    converged: false,
                    iterations,
                });
            }
            Err(DetectorError::Convergence {
                iterations,
                gradient_norm,
                best,
                ..
            }) => {
                tracing::warn!(
                    "Classifier did not converge after {} iterations (|g|={:.3e}); retrying from best parameters",
                    iterations,
                    gradient_norm
                );
                (best, iterations)
            }
            Err(e) => return Err(e),
        };

        match solver.fit_from(vectors, labels, Some(&*start)) {
            Ok(summary) => Ok(FittedClassifier {
                parameters: summary.parameters,
                converged: true,
                iterations: first_iterations + summary.iterations,
            }),
            Err(DetectorError::Convergence { iterations, best, .. }) => {
                tracing::warn!("Classifier still not converged; keeping best parameters found");
                Ok(FittedClassifier {
                    parameters: *best,
                    converged: false,
                    iterations: first_iterations + iterations,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Save the report as JSON
    pub fn save_report(report: &TrainingReport, output_path: &Path) -> Result<()> {
        std::fs::create_dir_all(output_path.parent().unwrap_or(Path::new(".")))?;
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(output_path, json)?;
        tracing::info!("Report saved to {}", output_path.display());
        Ok(())
    }

    /// Generate a markdown report
    pub fn generate_report(report: &TrainingReport) -> String {
        let mut out = String::new();

        out.push_str("# Fake News Detector Training Report\n\n");
        out.push_str(&format!("**Generated:** {}\n\n", report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        out.push_str(&format!("**Version:** {}\n\n", report.version));
        out.push_str(&format!("**Run ID:** `{}`\n\n", report.run_id));

        out.push_str("## Data\n\n");
        out.push_str(&format!("- **Source:** {}\n", report.source));
        out.push_str(&format!(
            "- **Columns:** text=`{}`, label=`{}`\n",
            report.config.text_column, report.config.label_column
        ));
        out.push_str(&format!("- **Usable Examples:** {}\n", report.total_examples));
        out.push_str(&format!("- **Dropped Rows:** {}\n", report.dropped_rows));
        out.push_str(&format!(
            "- **Split Sizes:** Train={}, Test={} (seed {})\n\n",
            report.train_samples, report.test_samples, report.config.seed
        ));

        out.push_str("| Label | Index | Count |\n");
        out.push_str("|-------|-------|-------|\n");
        for (label, count) in &report.label_distribution {
            let index = report
                .label_mapping
                .get(label)
                .map_or("-".to_string(), |i| i.to_string());
            out.push_str(&format!("| {} | {} | {} |\n", label, index, count));
        }

        out.push_str("\n## Model\n\n");
        out.push_str(&format!("- **Vectorizer:** {} ({} features)\n", VECTORIZER_TYPE, report.n_features));
        out.push_str(&format!(
            "- **Classifier:** {} (C={}, max_iter={})\n",
            MODEL_TYPE, report.config.classifier.c, report.config.classifier.max_iter
        ));
        out.push_str(&format!(
            "- **Converged:** {} ({} iterations)\n\n",
            if report.converged { "yes" } else { "no" },
            report.iterations
        ));

        out.push_str("## Held-out Metrics\n\n");
        out.push_str("| Accuracy | Precision | Recall | F1 Score |\n");
        out.push_str("|----------|-----------|--------|----------|\n");
        out.push_str(&format!(
            "| {:.4} | {:.4} | {:.4} | {:.4} |\n\n",
            report.metrics.accuracy, report.metrics.precision, report.metrics.recall, report.metrics.f1_score
        ));
        out.push_str(&format!("```\n{}\n```\n\n", report.metrics.format()));

        out.push_str("## Artifacts\n\n");
        for path in &report.artifact_paths {
            out.push_str(&format!("- `{}`\n", path.display()));
        }

        out.push_str("\n## Configuration\n\n");
        out.push_str(&format!(
            "```json\n{}\n```\n",
            serde_json::to_string_pretty(&report.config).unwrap_or_default()
        ));

        out
    }
}

/// Train with default settings on the given columns, writing artifacts to
/// the default model directory
pub fn train(source: &dyn TabularSource, text_column: &str, label_column: &str) -> Result<TrainingReport> {
    let config = TrainingConfig {
        text_column: text_column.to_string(),
        label_column: label_column.to_string(),
        ..Default::default()
    };
    TrainingPipeline::new(config).run(source)
}
