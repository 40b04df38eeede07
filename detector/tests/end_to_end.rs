// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

use detector::artifacts::{ModelArtifacts, CLASSIFIER_FILE, METADATA_FILE, VECTORIZER_FILE};
use detector::datasets::{synthetic_corpus, CsvSource, InMemorySource};
use detector::inference::{InferenceService, PredictionStatus, Predictor, TrainedModel};
use detector::pipeline::{TrainingConfig, TrainingPipeline, TrainingState};
use detector::DetectorError;
use std::io::Write;
use std::path::Path;

fn config_for(model_dir: &Path) -> TrainingConfig {
    TrainingConfig {
        text_column: "Eng_Trans_Statement".to_string(),
        label_column: "Label".to_string(),
        model_dir: model_dir.to_path_buf(),
        ..Default::default()
    }
}

#[test]
fn train_then_predict_on_balanced_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = dir.path().join("ml_models");
    let source = synthetic_corpus(100, 42, "Eng_Trans_Statement", "Label");

    let mut pipeline = TrainingPipeline::new(config_for(&model_dir));
    let report = pipeline.run(&source).expect("training should succeed");

    assert_eq!(pipeline.state(), TrainingState::Persisted);
    assert_eq!(report.label_mapping.get("FALSE"), Some(&0));
    assert_eq!(report.label_mapping.get("TRUE"), Some(&1));
    assert!((0.0..=1.0).contains(&report.metrics.accuracy));

    let mut files: Vec<String> = std::fs::read_dir(&model_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    assert_eq!(files, vec![CLASSIFIER_FILE, METADATA_FILE, VECTORIZER_FILE]);

    let service = InferenceService::load(&model_dir).unwrap();
    let result = service.predict("Scientists confirm new vaccine results");

    assert_eq!(result.status, PredictionStatus::Success);
    let prediction = result.prediction.as_deref().unwrap();
    assert!(prediction == "Fake" || prediction == "Real");
    assert_eq!(result.is_real, Some(prediction == "Real"));
    let total = result.confidence["Fake"] + result.confidence["Real"];
    assert!((total - 1.0).abs() < 1e-9);
    assert_eq!(result.model_accuracy, Some(report.metrics.accuracy));
}

#[test]
fn reloaded_artifacts_give_identical_predictions() {
    let dir = tempfile::tempdir().unwrap();
    let first_dir = dir.path().join("first");
    let second_dir = dir.path().join("second");
    let source = synthetic_corpus(120, 9, "Eng_Trans_Statement", "Label");

    TrainingPipeline::new(config_for(&first_dir)).run(&source).unwrap();

    let model = TrainedModel::load(&first_dir).unwrap();
    model.artifacts().save(&second_dir).unwrap();
    let reloaded = TrainedModel::load(&second_dir).unwrap();

    for text in [
        "Scientists confirm new vaccine results",
        "Secret conspiracy revealed by insiders",
        "completely unseen vocabulary here",
    ] {
        assert_eq!(model.predict(text), reloaded.predict(text));
        let first = model.predict(text);
        let second = model.predict(text);
        assert_eq!(first, second);
    }
}

#[test]
fn three_labels_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = dir.path().join("ml_models");
    let pairs: Vec<(String, &str)> = (0..30)
        .map(|i| (format!("council budget story {}", i), ["FALSE", "TRUE", "HALF"][i % 3]))
        .collect();
    let source = InMemorySource::from_pairs("Eng_Trans_Statement", "Label", &pairs);

    let result = TrainingPipeline::new(config_for(&model_dir)).run(&source);

    assert!(matches!(result, Err(DetectorError::LabelCardinality { found: 3, .. })));
    assert!(!model_dir.exists());
    assert!(!ModelArtifacts::exists(&model_dir));
}

#[test]
fn csv_training_drops_incomplete_rows() {
    let dir = tempfile::tempdir().unwrap();
    let model_dir = dir.path().join("ml_models");
    let csv_path = dir.path().join("news.csv");

    let mut file = std::fs::File::create(&csv_path).unwrap();
    writeln!(file, "Id,Eng_Trans_Statement,Label").unwrap();
    let source = synthetic_corpus(60, 5, "text", "label");
    let table = detector::TabularSource::read_table(&source).unwrap();
    for (i, row) in table.rows.iter().enumerate() {
        let text = row[0].as_deref().unwrap();
        let label = row[1].as_deref().unwrap();
        writeln!(file, "{},\"{}\",{}", i, text.replace('"', "\"\""), label).unwrap();
    }
    writeln!(file, "60,,TRUE").unwrap();
    writeln!(file, "61,orphan text without label,").unwrap();
    drop(file);

    let report = TrainingPipeline::new(config_for(&model_dir))
        .run(&CsvSource::new(&csv_path))
        .unwrap();

    assert_eq!(report.total_examples, 60);
    assert_eq!(report.dropped_rows, 2);
    assert!(ModelArtifacts::exists(&model_dir));
}

#[test]
fn service_before_training_reports_not_trained() {
    let dir = tempfile::tempdir().unwrap();
    let service = InferenceService::lazy(dir.path().join("ml_models"));

    let result = service.predict("Scientists confirm new vaccine results");
    assert_eq!(result.status, PredictionStatus::Error);
    assert_eq!(result.error.as_deref(), Some("Model not trained yet"));

    let blank = service.predict("   ");
    assert_eq!(blank.error.as_deref(), Some("Empty text"));
}
