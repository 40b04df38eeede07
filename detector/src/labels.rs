// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Binary label encoding
//!
//! Raw labels are opaque strings from the source table. They are sorted
//! lexicographically and the first becomes class 0, the second class 1.

use crate::error::{DetectorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Display name for class 0
pub const FAKE: &str = "Fake";
/// Display name for class 1
pub const REAL: &str = "Real";

/// Bijective mapping from the two raw label values to `{0, 1}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMapping {
    /// Raw labels in index order: `labels[0]` encodes to 0, `labels[1]` to 1
    labels: [String; 2],
}

impl LabelMapping {
    /// Fit a mapping from any collection of raw labels (duplicates allowed)
    pub fn fit<I, S>(raw_labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = raw_labels
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect();

        let sorted: Vec<String> = distinct.into_iter().collect();
        let labels: [String; 2] =
            sorted
                .try_into()
                .map_err(|labels: Vec<String>| DetectorError::LabelCardinality {
                    found: labels.len(),
                    labels,
                })?;

        Ok(Self { labels })
    }

    /// Rebuild from the `raw label -> index` map stored in metadata
    pub fn from_map(map: &BTreeMap<String, u8>) -> Result<Self> {
        let mut labels: [Option<String>; 2] = [None, None];
        for (label, &idx) in map {
            let slot = labels
                .get_mut(idx as usize)
                .ok_or(DetectorError::UnknownIndex(idx as usize))?;
            *slot = Some(label.clone());
        }

        match labels {
            [Some(first), Some(second)] if map.len() == 2 => Ok(Self {
                labels: [first, second],
            }),
            _ => Err(DetectorError::LabelCardinality {
                found: map.len(),
                labels: map.keys().cloned().collect(),
            }),
        }
    }

    pub fn encode(&self, raw_label: &str) -> Result<u8> {
        self.labels
            .iter()
            .position(|l| l == raw_label)
            .map(|idx| idx as u8)
            .ok_or_else(|| DetectorError::UnknownLabel(raw_label.to_string()))
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(DetectorError::UnknownIndex(index))
    }

    /// Raw labels in index order
    pub fn labels(&self) -> &[String; 2] {
        &self.labels
    }

    /// `raw label -> index`, the shape stored in model metadata
    pub fn to_map(&self) -> BTreeMap<String, u8> {
        self.labels
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), idx as u8))
            .collect()
    }

    /// Display name for a class index (0 = Fake, 1 = Real)
    pub fn display_name(index: u8) -> &'static str {
        if index == 1 {
            REAL
        } else {
            FAKE
        }
    }
}
