// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Labeled data loading and train/test partitioning

use crate::error::{DetectorError, Result};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A single labeled passage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub text: String,
    /// Label exactly as it appeared in the source table
    pub raw_label: String,
}

/// Header row plus data rows; a missing cell is `None`
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Anything that can produce a table of strings
pub trait TabularSource {
    /// Human-readable origin, used in logs and reports
    fn describe(&self) -> String;

    fn read_table(&self) -> Result<Table>;
}

/// Rows extracted from a table, with the count of rows that were dropped
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub examples: Vec<LabeledExample>,
    pub dropped_rows: usize,
}

impl Table {
    fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| {
                DetectorError::DataLoad(format!(
                    "column '{}' not found (available: {})",
                    name,
                    self.headers.join(", ")
                ))
            })
    }

    /// Extract `(text, label)` pairs, dropping rows where either is absent or blank
    pub fn labeled_examples(&self, text_column: &str, label_column: &str) -> Result<LoadedData> {
        let text_idx = self.column_index(text_column)?;
        let label_idx = self.column_index(label_column)?;

        let mut examples = Vec::with_capacity(self.rows.len());
        let mut dropped_rows = 0;

        for row in &self.rows {
            let cell = |idx: usize| {
                row.get(idx)
                    .and_then(|c| c.as_deref())
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
            };

            match (cell(text_idx), cell(label_idx)) {
                (Some(text), Some(label)) => examples.push(LabeledExample {
                    text: text.to_string(),
                    raw_label: label.to_string(),
                }),
                _ => dropped_rows += 1,
            }
        }

        if dropped_rows > 0 {
            tracing::warn!(
                "Dropped {} rows missing '{}' or '{}'",
                dropped_rows,
                text_column,
                label_column
            );
        }

        Ok(LoadedData {
            examples,
            dropped_rows,
        })
    }
}

/// CSV file with a header row
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TabularSource for CsvSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn read_table(&self) -> Result<Table> {
        let file = File::open(&self.path).map_err(|e| {
            DetectorError::DataLoad(format!("failed to open {}: {}", self.path.display(), e))
        })?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|e| DetectorError::DataLoad(format!("failed to read header of {}: {}", self.path.display(), e)))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                DetectorError::DataLoad(format!("failed to read record {} in {}: {}", idx, self.path.display(), e))
            })?;
            rows.push(record.iter().map(|c| Some(c.to_string())).collect());
        }

        Ok(Table { headers, rows })
    }
}

/// Table already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    name: String,
    table: Table,
}

impl InMemorySource {
    pub fn new(name: &str, headers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            table: Table {
                headers: headers.iter().map(|h| h.to_string()).collect(),
                rows: Vec::new(),
            },
        }
    }

    pub fn push_row(&mut self, row: Vec<Option<&str>>) {
        self.table.rows.push(row.into_iter().map(|c| c.map(str::to_string)).collect());
    }

    /// Two-column `(text, label)` source
    pub fn from_pairs<T: AsRef<str>, L: AsRef<str>>(
        text_column: &str,
        label_column: &str,
        pairs: &[(T, L)],
    ) -> Self {
        let mut source = Self::new("in-memory", &[text_column, label_column]);
        for (text, label) in pairs {
            source.push_row(vec![Some(text.as_ref()), Some(label.as_ref())]);
        }
        source
    }

    pub fn len(&self) -> usize {
        self.table.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.rows.is_empty()
    }
}

impl TabularSource for InMemorySource {
    fn describe(&self) -> String {
        format!("{} ({} rows)", self.name, self.table.rows.len())
    }

    fn read_table(&self) -> Result<Table> {
        Ok(self.table.clone())
    }
}

/// Train/test partition
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<LabeledExample>,
    pub test: Vec<LabeledExample>,
}

/// Seeded stratified split preserving each label's proportion.
///
/// Every class keeps at least one training example.
pub fn stratified_split(examples: &[LabeledExample], test_fraction: f64, seed: u64) -> Split {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut by_label: BTreeMap<&str, Vec<&LabeledExample>> = BTreeMap::new();
    for example in examples {
        by_label.entry(example.raw_label.as_str()).or_default().push(example);
    }

    let mut train = Vec::new();
    let mut test = Vec::new();

    for (_, mut group) in by_label {
        group.shuffle(&mut rng);
        let n_test = ((group.len() as f64 * test_fraction).round() as usize)
            .min(group.len().saturating_sub(1));
        let (test_part, train_part) = group.split_at(n_test);
        test.extend(test_part.iter().map(|e| (*e).clone()));
        train.extend(train_part.iter().map(|e| (*e).clone()));
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Split { train, test }
}

/// Count of examples per raw label
pub fn label_distribution(examples: &[LabeledExample]) -> BTreeMap<String, usize> {
    let mut dist = BTreeMap::new();
    for example in examples {
        *dist.entry(example.raw_label.clone()).or_insert(0) += 1;
    }
    dist
}

/// Seeded synthetic news corpus with labels `FALSE` (fake) and `TRUE` (real),
/// evenly split, for smoke runs and tests.
pub fn synthetic_corpus(size: usize, seed: u64, text_column: &str, label_column: &str) -> InMemorySource {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let fake_phrases = [
        "BREAKING: shocking secret the government doesn't want you to know",
        "You won't believe this miracle cure doctors hate",
        "Secret conspiracy revealed exclusively by anonymous insiders",
        "Celebrity announces shocking plan to control the weather",
        "Miracle pill melts fat overnight, experts stunned",
    ];

    let real_phrases = [
        "According to official reports released by the ministry",
        "Research published in a peer-reviewed journal shows",
        "Statement from verified spokesperson confirms schedule",
        "Data analysis shows consistent economic trends this quarter",
        "Scientists confirm new vaccine results after clinical trial",
    ];

    let topics = [
        "health", "economy", "election", "climate", "technology", "education", "transport",
    ];

    let mut source = InMemorySource::new("synthetic", &[text_column, label_column]);

    for i in 0..size {
        let is_fake = i % 2 == 0;
        let phrases = if is_fake { &fake_phrases } else { &real_phrases };
        let phrase = phrases[rng.gen_range(0..phrases.len())];
        let topic = topics[rng.gen_range(0..topics.len())];
        let text = format!("{} about {} sample {}", phrase, topic, i);
        let label = if is_fake { "FALSE" } else { "TRUE" };
        source.push_row(vec![Some(text.as_str()), Some(label)]);
    }

    source
}
