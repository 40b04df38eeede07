// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Training CLI for the fake news detector
//!
//! Usage:
//!   train-model --data ./data/news.csv
//!   train-model --synthetic 1000 --seed 42 --model-dir ./public/ml_models

use anyhow::{bail, Context, Result};
use clap::Parser;
use detector::datasets::{synthetic_corpus, CsvSource, TabularSource};
use detector::pipeline::{TrainingConfig, TrainingPipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "train-model")]
#[command(about = "Train the TF-IDF + logistic regression fake news model")]
#[command(version)]
struct Args {
    /// CSV file with a header row
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Train on a generated corpus of this many rows instead of a file
    #[arg(long)]
    synthetic: Option<usize>,

    /// JSON training configuration (flags below override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Column holding the news text
    #[arg(long)]
    text_column: Option<String>,

    /// Column holding the label
    #[arg(long)]
    label_column: Option<String>,

    /// Directory receiving the artifact set
    #[arg(short, long)]
    model_dir: Option<PathBuf>,

    /// Random seed for the train/test split
    #[arg(short, long)]
    seed: Option<u64>,

    /// Field delimiter for the CSV file
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Write the training report here (.json or .md)
    #[arg(short, long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => TrainingConfig::from_json_file(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => TrainingConfig::default(),
    };
    if let Some(column) = args.text_column {
        config.text_column = column;
    }
    if let Some(column) = args.label_column {
        config.label_column = column;
    }
    if let Some(dir) = args.model_dir {
        config.model_dir = dir;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let source: Box<dyn TabularSource> = match (args.data, args.synthetic) {
        (Some(path), None) => {
            if !args.delimiter.is_ascii() {
                bail!("Delimiter must be a single ASCII character");
            }
            Box::new(CsvSource::new(path).with_delimiter(args.delimiter as u8))
        }
        (None, Some(size)) => Box::new(synthetic_corpus(size, config.seed, &config.text_column, &config.label_column)),
        (Some(_), Some(_)) => bail!("Use either --data or --synthetic, not both"),
        (None, None) => bail!("No training data: pass --data <csv> or --synthetic <rows>"),
    };

    tracing::info!("Fake News Detector Training");
    tracing::info!("===========================");
    tracing::info!("Source: {}", source.describe());
    tracing::info!("Seed: {}", config.seed);
    tracing::info!("Model directory: {}", config.model_dir.display());

    let mut pipeline = TrainingPipeline::new(config);
    let report = pipeline
        .run(source.as_ref())
        .context("Training failed; no artifacts were written")?;

    // Print summary to console
    println!("\n{}", "=".repeat(60));
    println!("TRAINING SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Examples: {} (dropped {})", report.total_examples, report.dropped_rows);
    println!("Train/Test: {}/{}", report.train_samples, report.test_samples);
    println!("Features: {}", report.n_features);
    println!("Label mapping: {:?}", report.label_mapping);
    if !report.converged {
        println!("WARNING: classifier did not converge ({} iterations)", report.iterations);
    }
    println!("\n{}", report.metrics.format());

    println!("Artifacts:");
    for path in &report.artifact_paths {
        println!("  {}", path.display());
    }

    if let Some(path) = args.report {
        let is_markdown = path.extension().map_or(false, |ext| ext == "md");
        if is_markdown {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, TrainingPipeline::generate_report(&report))?;
        } else {
            TrainingPipeline::save_report(&report, &path)?;
        }
        println!("\nReport saved to: {}", path.display());
    }

    println!("\nTraining complete!");

    Ok(())
}
