// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Persisted model artifacts
//!
//! A training run produces three JSON files in one model directory:
//! `vectorizer.json`, `classifier.json` and `metadata.json`. Each is wrapped
//! in an [`Envelope`] carrying the format version and the run id; loading
//! rejects any set whose envelopes disagree.
//!
//! Saving stages the whole directory next to its final location and commits
//! it with a rename, so a failed save never leaves a mixed set behind.

use crate::classifier::ClassifierParameters;
use crate::error::{DetectorError, Result};
use crate::featurizer::FeatureVocabulary;
use crate::labels::LabelMapping;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

pub const VECTORIZER_FILE: &str = "vectorizer.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const METADATA_FILE: &str = "metadata.json";

pub const MODEL_TYPE: &str = "LogisticRegression";
pub const VECTORIZER_TYPE: &str = "TfidfVectorizer";

/// Versioned wrapper around one artifact payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub format_version: u32,
    pub run_id: String,
    pub payload: T,
}

/// Everything about a training run the inference side needs besides the
/// numeric model itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Raw label -> class index
    pub label_mapping: BTreeMap<String, u8>,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub text_column: String,
    pub label_column: String,
    pub model_type: String,
    pub vectorizer_type: String,
    pub n_features: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    /// False when the solver hit its iteration cap
    pub converged: bool,
    pub iterations: usize,
    pub trained_at: DateTime<Utc>,
    pub crate_version: String,
}

/// Matched vocabulary, classifier and metadata from one training run
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifacts {
    run_id: String,
    vocabulary: FeatureVocabulary,
    classifier: ClassifierParameters,
    metadata: ModelMetadata,
}

impl ModelArtifacts {
    /// Bundle freshly trained parts; the run id is derived from their content
    pub fn new(
        vocabulary: FeatureVocabulary,
        classifier: ClassifierParameters,
        metadata: ModelMetadata,
    ) -> Result<Self> {
        let run_id = compute_run_id(&vocabulary, &classifier, &metadata.trained_at)?;
        let artifacts = Self {
            run_id,
            vocabulary,
            classifier,
            metadata,
        };
        artifacts.check_consistency(Path::new("<memory>"))?;
        Ok(artifacts)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn vocabulary(&self) -> &FeatureVocabulary {
        &self.vocabulary
    }

    pub fn classifier(&self) -> &ClassifierParameters {
        &self.classifier
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn label_mapping(&self) -> Result<LabelMapping> {
        LabelMapping::from_map(&self.metadata.label_mapping)
    }

    /// True when all three artifact files are present in `dir`
    pub fn exists(dir: &Path) -> bool {
        artifact_paths(dir).iter().all(|p| p.is_file())
    }

    /// Atomically write the artifact set to `dir`, replacing any previous set.
    ///
    /// Returns the paths of the three committed files.
    pub fn save(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let parent = match dir.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let staging = tempfile::Builder::new()
            .prefix(".model-staging-")
            .tempdir_in(&parent)?;

        self.write_envelope(&staging.path().join(VECTORIZER_FILE), &self.vocabulary)?;
        self.write_envelope(&staging.path().join(CLASSIFIER_FILE), &self.classifier)?;
        self.write_envelope(&staging.path().join(METADATA_FILE), &self.metadata)?;

        commit_directory(staging, dir, &self.run_id)?;

        tracing::info!("Artifacts for run {} saved to {}", short_id(&self.run_id), dir.display());
        Ok(artifact_paths(dir).to_vec())
    }

    fn write_envelope<T: Serialize>(&self, path: &Path, payload: &T) -> Result<()> {
        let envelope = Envelope {
            format_version: ARTIFACT_FORMAT_VERSION,
            run_id: self.run_id.clone(),
            payload,
        };
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &envelope)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Load and cross-check the artifact set in `dir`.
    ///
    /// A missing file yields [`DetectorError::ArtifactsNotLoaded`].
    pub fn load(dir: &Path) -> Result<Self> {
        let vocabulary: Envelope<FeatureVocabulary> = read_envelope(&dir.join(VECTORIZER_FILE))?;
        let classifier: Envelope<ClassifierParameters> = read_envelope(&dir.join(CLASSIFIER_FILE))?;
        let metadata: Envelope<ModelMetadata> = read_envelope(&dir.join(METADATA_FILE))?;

        let mismatch = |reason: String| DetectorError::ArtifactMismatch {
            dir: dir.to_path_buf(),
            reason,
        };

        for (name, version) in [
            (VECTORIZER_FILE, vocabulary.format_version),
            (CLASSIFIER_FILE, classifier.format_version),
            (METADATA_FILE, metadata.format_version),
        ] {
            if version != ARTIFACT_FORMAT_VERSION {
                return Err(mismatch(format!(
                    "{} has format version {} (expected {})",
                    name, version, ARTIFACT_FORMAT_VERSION
                )));
            }
        }

        if vocabulary.run_id != classifier.run_id || vocabulary.run_id != metadata.run_id {
            return Err(mismatch(format!(
                "run ids differ: vectorizer={} classifier={} metadata={}",
                short_id(&vocabulary.run_id),
                short_id(&classifier.run_id),
                short_id(&metadata.run_id)
            )));
        }

        let artifacts = Self {
            run_id: metadata.run_id,
            vocabulary: vocabulary.payload,
            classifier: classifier.payload,
            metadata: metadata.payload,
        };
        artifacts.check_consistency(dir)?;

        tracing::info!(
            "Loaded model run {} ({} features) from {}",
            short_id(&artifacts.run_id),
            artifacts.vocabulary.len(),
            dir.display()
        );
        Ok(artifacts)
    }

    fn check_consistency(&self, dir: &Path) -> Result<()> {
        let mismatch = |reason: String| DetectorError::ArtifactMismatch {
            dir: dir.to_path_buf(),
            reason,
        };

        self.vocabulary.validate().map_err(mismatch)?;

        if self.vocabulary.len() != self.classifier.n_features() {
            return Err(mismatch(format!(
                "vocabulary has {} terms but classifier has {} weights",
                self.vocabulary.len(),
                self.classifier.n_features()
            )));
        }

        if self.metadata.n_features != self.vocabulary.len() {
            return Err(mismatch(format!(
                "metadata records {} features, vocabulary has {}",
                self.metadata.n_features,
                self.vocabulary.len()
            )));
        }

        self.label_mapping()
            .map_err(|e| mismatch(format!("invalid label mapping: {}", e)))?;

        Ok(())
    }
}

fn artifact_paths(dir: &Path) -> [PathBuf; 3] {
    [
        dir.join(VECTORIZER_FILE),
        dir.join(CLASSIFIER_FILE),
        dir.join(METADATA_FILE),
    ]
}

fn read_envelope<T: DeserializeOwned>(path: &Path) -> Result<Envelope<T>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Artifact missing: {}", path.display());
            return Err(DetectorError::ArtifactsNotLoaded);
        }
        Err(e) => return Err(e.into()),
    };
    let envelope = serde_json::from_reader(BufReader::new(file))?;
    Ok(envelope)
}

/// Replace `target` with the staged directory in a single rename
fn commit_directory(staging: tempfile::TempDir, target: &Path, run_id: &str) -> Result<()> {
    let staged = staging.keep();

    let backup = if target.exists() {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let backup = target.with_file_name(format!(".{}.previous-{}", name, short_id(run_id)));
        if backup.exists() {
            fs::remove_dir_all(&backup)?;
        }
        fs::rename(target, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(&staged, target) {
        if let Some(ref backup) = backup {
            let _ = fs::rename(backup, target);
        }
        let _ = fs::remove_dir_all(&staged);
        return Err(e.into());
    }

    if let Some(backup) = backup {
        discard_backup(&backup);
    }
    Ok(())
}

/// The new set is already committed, so a leftover backup is only logged
fn discard_backup(backup: &Path) {
    if let Err(e) = fs::remove_dir_all(backup) {
        tracing::warn!("Could not remove previous model set {}: {}", backup.display(), e);
    }
}

/// SHA-256 over both numeric payloads and the training timestamp
fn compute_run_id(
    vocabulary: &FeatureVocabulary,
    classifier: &ClassifierParameters,
    trained_at: &DateTime<Utc>,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(vocabulary)?);
    hasher.update(serde_json::to_vec(classifier)?);
    hasher.update(trained_at.to_rfc3339().as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn short_id(run_id: &str) -> &str {
    run_id.get(..12).unwrap_or(run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::featurizer::VectorizerConfig;

    fn sample_artifacts() -> ModelArtifacts {
        let corpus = [
            "vaccine trial results confirmed",
            "vaccine study results published",
            "shocking miracle cure revealed",
            "shocking secret cure exposed",
        ];
        let config = VectorizerConfig {
            max_df: 1.0,
            ..Default::default()
        };
        let vocabulary = FeatureVocabulary::fit(&corpus, &config).unwrap();
        let n = vocabulary.len();
        let classifier = ClassifierParameters::new((0..n).map(|i| i as f64 * 0.1 - 0.2).collect(), 0.05);

        let mut label_mapping = BTreeMap::new();
        label_mapping.insert("FALSE".to_string(), 0);
        label_mapping.insert("TRUE".to_string(), 1);

        let metadata = ModelMetadata {
            label_mapping,
            accuracy: 0.9,
            precision: 0.9,
            recall: 0.9,
            f1_score: 0.9,
            text_column: "text".to_string(),
            label_column: "label".to_string(),
            model_type: MODEL_TYPE.to_string(),
            vectorizer_type: VECTORIZER_TYPE.to_string(),
            n_features: n,
            train_samples: 4,
            test_samples: 0,
            converged: true,
            iterations: 3,
            trained_at: Utc::now(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        };

        ModelArtifacts::new(vocabulary, classifier, metadata).unwrap()
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("ml_models");
        let artifacts = sample_artifacts();

        let paths = artifacts.save(&model_dir).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(ModelArtifacts::exists(&model_dir));

        let loaded = ModelArtifacts::load(&model_dir).unwrap();
        assert_eq!(loaded, artifacts);
        assert_eq!(loaded.run_id().len(), 64);
    }

    #[test]
    fn test_save_replaces_previous_set() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("ml_models");

        sample_artifacts().save(&model_dir).unwrap();
        let second = sample_artifacts();
        second.save(&model_dir).unwrap();

        assert_eq!(ModelArtifacts::load(&model_dir).unwrap().run_id(), second.run_id());

        // Only the committed directory remains next to it
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!ModelArtifacts::exists(dir.path()));
        assert!(matches!(
            ModelArtifacts::load(dir.path()),
            Err(DetectorError::ArtifactsNotLoaded)
        ));
    }

    #[test]
    fn test_mismatched_run_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first_dir = dir.path().join("first");
        let second_dir = dir.path().join("second");

        sample_artifacts().save(&first_dir).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        sample_artifacts().save(&second_dir).unwrap();

        fs::copy(second_dir.join(CLASSIFIER_FILE), first_dir.join(CLASSIFIER_FILE)).unwrap();

        assert!(matches!(
            ModelArtifacts::load(&first_dir),
            Err(DetectorError::ArtifactMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_ngram_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("ml_models");
        sample_artifacts().save(&model_dir).unwrap();

        let path = model_dir.join(VECTORIZER_FILE);
        let mut envelope: serde_json::Value =
            serde_json::from_reader(BufReader::new(File::open(&path).unwrap())).unwrap();
        envelope["payload"]["tokenizer"]["ngram_range"] = serde_json::json!([0, 2]);
        serde_json::to_writer_pretty(File::create(&path).unwrap(), &envelope).unwrap();

        match ModelArtifacts::load(&model_dir) {
            Err(DetectorError::ArtifactMismatch { reason, .. }) => {
                assert!(reason.contains("ngram range"), "{}", reason);
            }
            other => panic!("expected ArtifactMismatch, got {:?}", other.map(|a| a.run_id().to_string())),
        }
    }

    #[test]
    fn test_backup_cleanup_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        discard_backup(&dir.path().join(".ml_models.previous-missing"));
        assert!(dir.path().exists());
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        let artifacts = sample_artifacts();
        let result = ModelArtifacts::new(
            artifacts.vocabulary().clone(),
            ClassifierParameters::zeros(1),
            artifacts.metadata().clone(),
        );
        assert!(matches!(result, Err(DetectorError::ArtifactMismatch { .. })));
    }
}
