// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone prediction runner
//!
//! Loads a trained artifact set once and classifies the given texts,
//! printing one JSON result per line. With `--explain` the top terms are
//! added to each result under `explanation`.

use anyhow::{Context, Result};
use clap::Parser;
use detector::inference::{InferenceService, PredictionResult, Predictor, TermContribution};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const SAMPLE_TEXTS: &[&str] = &[
    "Breaking news: Scientists discover new renewable energy source that could revolutionize power generation",
    "SHOCKING: Celebrity announces secret plans to take over the world",
];

/// One output line
#[derive(Serialize)]
struct Output<'a> {
    #[serde(flatten)]
    result: &'a PredictionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<Vec<TermContribution>>,
}

fn render(result: &PredictionResult, explanation: Option<Vec<TermContribution>>) -> serde_json::Result<String> {
    serde_json::to_string(&Output { result, explanation })
}

#[derive(Parser, Debug)]
#[command(name = "predict-news")]
#[command(about = "Classify news text as real or fake")]
#[command(version)]
struct Args {
    /// Texts to classify
    texts: Vec<String>,

    /// Directory holding the trained artifact set
    #[arg(short, long, default_value = "public/ml_models")]
    model_dir: PathBuf,

    /// Run the built-in sample texts
    #[arg(long)]
    samples: bool,

    /// Show the top N contributing terms for each text
    #[arg(short, long)]
    explain: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut texts = args.texts;
    if args.samples || texts.is_empty() {
        texts.extend(SAMPLE_TEXTS.iter().map(|s| s.to_string()));
    }

    let service = InferenceService::load(&args.model_dir).with_context(|| {
        format!("Failed to load model from {}; run train-model first", args.model_dir.display())
    })?;

    for text in &texts {
        let preview: String = text.chars().take(100).collect();
        tracing::info!("Analyzing: {}...", preview);

        let result = service.predict(text);
        let explanation = match args.explain {
            Some(k) if result.is_success() => Some(service.model()?.explain(text, k)),
            _ => None,
        };
        println!("{}", render(&result, explanation)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_is_single_json_line() {
        let result = PredictionResult::error("Empty text");
        let plain = render(&result, None).unwrap();
        assert!(!plain.contains('\n'));
        assert!(!plain.contains("explanation"));

        let terms = vec![TermContribution {
            term: "miracle cure".to_string(),
            value: 0.5,
            weight: -1.2,
            contribution: -0.6,
        }];
        let line = render(&result, Some(terms)).unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["error"], "Empty text");
        assert_eq!(value["explanation"][0]["term"], "miracle cure");
        assert_eq!(value["explanation"][0]["contribution"], -0.6);
    }
}
