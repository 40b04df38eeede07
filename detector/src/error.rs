// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error taxonomy for training and inference

use crate::classifier::ClassifierParameters;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    /// Missing or malformed tabular source
    #[error("Failed to load data: {0}")]
    DataLoad(String),

    /// Empty corpus, or nothing survived vocabulary filtering
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Expected exactly 2 distinct labels, found {found}: {labels:?}")]
    LabelCardinality { found: usize, labels: Vec<String> },

    #[error("Label '{0}' is not part of the fitted label mapping")]
    UnknownLabel(String),

    #[error("Class index {0} is outside the binary label mapping")]
    UnknownIndex(usize),

    /// Solver hit its iteration cap, or its line search stalled before the
    /// cap (`stalled`). Carries the best parameters found so the caller can
    /// still use them.
    #[error(
        "Classifier did not converge after {iterations} iterations (gradient norm {gradient_norm:.3e}{})",
        stall_note(.stalled)
    )]
    Convergence {
        iterations: usize,
        gradient_norm: f64,
        stalled: bool,
        best: Box<ClassifierParameters>,
    },

    #[error("Model not trained yet")]
    ArtifactsNotLoaded,

    #[error("Artifact set in {dir} is inconsistent: {reason}")]
    ArtifactMismatch { dir: PathBuf, reason: String },

    #[error("Empty text")]
    EmptyInput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn stall_note(stalled: &bool) -> &'static str {
    if *stalled {
        ", line search stalled"
    } else {
        ""
    }
}

pub type Result<T> = std::result::Result<T, DetectorError>;
