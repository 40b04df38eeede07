// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! TF-IDF text featurizer
//!
//! `FeatureVocabulary::fit` learns a frozen vocabulary of unigrams and
//! bigrams with smoothed IDF weights; `transform` maps new text onto it.
//! Both go through the same [`Tokenizer`], which is stored inside the
//! vocabulary so a reloaded artifact tokenizes exactly like the original.

use crate::error::{DetectorError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::OnceLock;

/// scikit-learn's English stop-word list, sorted for binary search
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst",
    "amoungst", "amount", "an", "and", "another", "any", "anyhow", "anyone", "anything", "anyway",
    "anywhere", "are", "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being", "below", "beside",
    "besides", "between", "beyond", "bill", "both", "bottom", "but", "by", "call", "can",
    "cannot", "cant", "co", "con", "could", "couldnt", "cry", "de", "describe", "detail", "do",
    "done", "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone", "everything",
    "everywhere", "except", "few", "fifteen", "fifty", "fill", "find", "fire", "first", "five",
    "for", "former", "formerly", "forty", "found", "four", "from", "front", "full", "further",
    "get", "give", "go", "had", "has", "hasnt", "have", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed", "interest", "into",
    "is", "it", "its", "itself", "keep", "last", "latter", "latterly", "least", "less", "ltd",
    "made", "many", "may", "me", "meanwhile", "might", "mill", "mine", "more", "moreover",
    "most", "mostly", "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone", "nor", "not",
    "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one", "only", "onto", "or",
    "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over", "own", "part",
    "per", "perhaps", "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side", "since",
    "sincere", "six", "sixty", "so", "some", "somehow", "someone", "something", "sometime",
    "sometimes", "somewhere", "still", "such", "system", "take", "ten", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin", "third", "this",
    "those", "though", "three", "through", "throughout", "thru", "thus", "to", "together", "too",
    "top", "toward", "towards", "twelve", "twenty", "two", "un", "under", "until", "up", "upon",
    "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when", "whence",
    "whenever", "where", "whereafter", "whereas", "whereby", "wherein", "whereupon", "wherever",
    "whether", "which", "while", "whither", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("static token pattern is valid"))
}

/// Vectorizer hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Keep at most this many terms, ranked by corpus term frequency
    pub max_features: usize,
    /// Minimum document count for a term to be kept
    pub min_df: usize,
    /// Maximum document fraction for a term to be kept
    pub max_df: f64,
    /// Inclusive n-gram range
    pub ngram_range: (usize, usize),
    pub stop_words: bool,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: 5000,
            min_df: 2,
            max_df: 0.8,
            ngram_range: (1, 2),
            stop_words: true,
        }
    }
}

/// The single tokenization routine shared by `fit` and `transform`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokenizer {
    ngram_range: (usize, usize),
    stop_words: bool,
}

impl Tokenizer {
    pub fn new(ngram_range: (usize, usize), stop_words: bool) -> Self {
        let min_n = ngram_range.0.max(1);
        Self {
            ngram_range: (min_n, ngram_range.1.max(min_n)),
            stop_words,
        }
    }

    fn is_stop_word(word: &str) -> bool {
        ENGLISH_STOP_WORDS.binary_search(&word).is_ok()
    }

    /// Lowercased words of two or more word characters, stop words removed
    pub fn words(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        token_pattern()
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|w| !(self.stop_words && Self::is_stop_word(w)))
            .map(str::to_string)
            .collect()
    }

    /// All n-grams in the configured range, joined by a single space
    pub fn terms(&self, text: &str) -> Vec<String> {
        let words = self.words(text);
        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();

        for n in min_n..=max_n {
            if n > words.len() {
                break;
            }
            if n == 1 {
                terms.extend(words.iter().cloned());
            } else {
                terms.extend(words.windows(n).map(|w| w.join(" ")));
            }
        }

        terms
    }

    /// Raw term counts for one document
    pub fn term_counts(&self, text: &str) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for term in self.terms(text) {
            *counts.entry(term).or_insert(0) += 1;
        }
        counts
    }
}

/// Sparse, L2-normalized TF-IDF vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    dim: usize,
    /// Column indices in ascending order
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Build from `(column, value)` pairs; pairs are sorted by column
    pub fn from_pairs(dim: usize, mut pairs: Vec<(usize, f64)>) -> Self {
        pairs.sort_by_key(|(idx, _)| *idx);
        let (indices, values) = pairs.into_iter().unzip();
        Self { dim, indices, values }
    }

    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    pub fn get(&self, column: usize) -> f64 {
        self.indices
            .binary_search(&column)
            .map(|pos| self.values[pos])
            .unwrap_or(0.0)
    }

    pub fn dot(&self, dense: &[f64]) -> f64 {
        self.iter().map(|(idx, v)| dense.get(idx).copied().unwrap_or(0.0) * v).sum()
    }

    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }

    fn normalize(&mut self) {
        let norm = self.norm();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
    }
}

/// Frozen vocabulary: terms in column order plus their IDF weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVocabulary {
    tokenizer: Tokenizer,
    /// Terms sorted lexicographically; position is the column index
    terms: Vec<String>,
    idf: Vec<f64>,
    /// Number of documents the vocabulary was fitted on
    n_documents: usize,
}

impl FeatureVocabulary {
    /// Learn vocabulary and IDF weights from a training corpus
    pub fn fit<S: AsRef<str>>(corpus: &[S], config: &VectorizerConfig) -> Result<Self> {
        if corpus.is_empty() {
            return Err(DetectorError::InsufficientData(
                "cannot fit vectorizer on an empty corpus".to_string(),
            ));
        }

        let tokenizer = Tokenizer::new(config.ngram_range, config.stop_words);
        let n_docs = corpus.len();

        let mut df: HashMap<String, usize> = HashMap::new();
        let mut tf: HashMap<String, usize> = HashMap::new();

        for doc in corpus {
            let counts = tokenizer.term_counts(doc.as_ref());
            for (term, count) in counts {
                *df.entry(term.clone()).or_insert(0) += 1;
                *tf.entry(term).or_insert(0) += count;
            }
        }

        let max_doc_count = config.max_df * n_docs as f64;
        let mut candidates: Vec<(String, usize)> = tf
            .into_iter()
            .filter(|(term, _)| {
                let count = df[term];
                count >= config.min_df && count as f64 <= max_doc_count
            })
            .collect();

        // Highest corpus frequency first, ties by term text
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(config.max_features);

        if candidates.is_empty() {
            return Err(DetectorError::InsufficientData(format!(
                "no terms survived vocabulary filtering (documents={}, min_df={}, max_df={})",
                n_docs, config.min_df, config.max_df
            )));
        }

        let mut terms: Vec<String> = candidates.into_iter().map(|(term, _)| term).collect();
        terms.sort();

        let idf = terms
            .iter()
            .map(|term| smoothed_idf(n_docs, df[term]))
            .collect();

        tracing::debug!("Vectorizer fitted: {} terms from {} documents", terms.len(), n_docs);

        Ok(Self {
            tokenizer,
            terms,
            idf,
            n_documents: n_docs,
        })
    }

    /// Vectorize texts against the frozen vocabulary
    pub fn transform<S: AsRef<str>>(&self, texts: &[S]) -> Vec<FeatureVector> {
        texts.iter().map(|t| self.transform_one(t.as_ref())).collect()
    }

    pub fn transform_one(&self, text: &str) -> FeatureVector {
        let pairs = self
            .tokenizer
            .term_counts(text)
            .into_iter()
            .filter_map(|(term, count)| {
                self.column(&term).map(|idx| (idx, count as f64 * self.idf[idx]))
            })
            .collect();

        let mut vector = FeatureVector::from_pairs(self.len(), pairs);
        vector.normalize();
        vector
    }

    /// Column index of a term, `None` when out of vocabulary
    pub fn column(&self, term: &str) -> Option<usize> {
        self.terms
            .binary_search_by(|t| t.as_str().cmp(term))
            .ok()
    }

    pub fn term(&self, column: usize) -> Option<&str> {
        self.terms.get(column).map(String::as_str)
    }

    pub fn idf(&self, column: usize) -> Option<f64> {
        self.idf.get(column).copied()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn n_documents(&self) -> usize {
        self.n_documents
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Structural checks used when loading a persisted vocabulary
    pub fn validate(&self) -> std::result::Result<(), String> {
        let (min_n, max_n) = self.tokenizer.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(format!("invalid ngram range ({min_n}, {max_n})"));
        }
        if self.terms.len() != self.idf.len() {
            return Err(format!(
                "vocabulary has {} terms but {} idf weights",
                self.terms.len(),
                self.idf.len()
            ));
        }
        if self.terms.windows(2).any(|w| w[0].cmp(&w[1]) != Ordering::Less) {
            return Err("vocabulary terms are not strictly sorted".to_string());
        }
        Ok(())
    }
}

/// `ln((1 + n) / (1 + df)) + 1`
fn smoothed_idf(n_docs: usize, df: usize) -> f64 {
    ((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "Scientists confirm vaccine trial results",
            "Scientists publish vaccine study results",
            "Shocking miracle cure doctors hate",
            "Shocking secret cure revealed today",
            "Officials confirm trial data release",
        ]
    }

    #[test]
    fn test_stop_words_sorted() {
        assert!(ENGLISH_STOP_WORDS.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_tokenizer_words_and_bigrams() {
        let tokenizer = Tokenizer::new((1, 2), true);
        let words = tokenizer.words("The Vaccine is SAFE, a 2024 study says!");
        assert_eq!(words, vec!["vaccine", "safe", "2024", "study", "says"]);

        let terms = tokenizer.terms("vaccine trial results");
        assert_eq!(terms, vec!["vaccine", "trial", "results", "vaccine trial", "trial results"]);
    }

    #[test]
    fn test_tokenizer_without_stop_words() {
        let tokenizer = Tokenizer::new((1, 1), false);
        assert_eq!(tokenizer.words("the cat"), vec!["the", "cat"]);
    }

    #[test]
    fn test_fit_filters_by_document_frequency() {
        let vocab = FeatureVocabulary::fit(&corpus(), &VectorizerConfig::default()).unwrap();

        // df >= 2 survives, df == 1 does not
        assert!(vocab.column("scientists").is_some());
        assert!(vocab.column("vaccine").is_some());
        assert!(vocab.column("shocking").is_some());
        assert!(vocab.column("miracle").is_none());
        assert!(vocab.validate().is_ok());
    }

    #[test]
    fn test_fit_drops_terms_above_max_df() {
        let docs = vec!["common alpha", "common beta", "common alpha", "common beta", "common gamma"];
        let vocab = FeatureVocabulary::fit(&docs, &VectorizerConfig::default()).unwrap();

        // "common" appears in 100% of documents
        assert!(vocab.column("common").is_none());
        assert!(vocab.column("alpha").is_some());
    }

    #[test]
    fn test_max_features_keeps_most_frequent() {
        let docs = vec!["alpha alpha beta", "alpha beta", "alpha gamma", "gamma beta", "delta"];
        let config = VectorizerConfig {
            max_features: 1,
            max_df: 1.0,
            ngram_range: (1, 1),
            ..Default::default()
        };
        let vocab = FeatureVocabulary::fit(&docs, &config).unwrap();
        assert_eq!(vocab.terms(), &["alpha".to_string()]);
    }

    #[test]
    fn test_idf_formula() {
        let vocab = FeatureVocabulary::fit(&corpus(), &VectorizerConfig::default()).unwrap();
        let idx = vocab.column("vaccine").unwrap();
        let expected = (6.0f64 / 3.0).ln() + 1.0;
        assert!((vocab.idf(idx).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_fit_insufficient_data() {
        let empty: Vec<&str> = vec![];
        assert!(matches!(
            FeatureVocabulary::fit(&empty, &VectorizerConfig::default()),
            Err(DetectorError::InsufficientData(_))
        ));

        let unique = vec!["alpha", "beta", "gamma"];
        assert!(matches!(
            FeatureVocabulary::fit(&unique, &VectorizerConfig::default()),
            Err(DetectorError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_transform_is_normalized_and_deterministic() {
        let vocab = FeatureVocabulary::fit(&corpus(), &VectorizerConfig::default()).unwrap();
        let text = ["Scientists confirm shocking vaccine results"];

        let first = vocab.transform(&text);
        let second = vocab.transform(&text);
        assert_eq!(first, second);
        assert!((first[0].norm() - 1.0).abs() < 1e-12);
        assert_eq!(first[0].dim(), vocab.len());
    }

    #[test]
    fn test_transform_ignores_unknown_terms() {
        let vocab = FeatureVocabulary::fit(&corpus(), &VectorizerConfig::default()).unwrap();

        let unknown = vocab.transform_one("zebra quantum xylophone");
        assert!(unknown.is_empty());
        assert_eq!(unknown.norm(), 0.0);

        let mixed = vocab.transform_one("zebra vaccine");
        assert_eq!(mixed.nnz(), 1);
        assert!((mixed.get(vocab.column("vaccine").unwrap()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_bad_ngram_range() {
        let vocab = FeatureVocabulary::fit(&corpus(), &VectorizerConfig::default()).unwrap();
        let mut value = serde_json::to_value(&vocab).unwrap();

        value["tokenizer"]["ngram_range"] = serde_json::json!([0, 2]);
        let zero_min: FeatureVocabulary = serde_json::from_value(value.clone()).unwrap();
        assert!(zero_min.validate().unwrap_err().contains("ngram range"));

        value["tokenizer"]["ngram_range"] = serde_json::json!([3, 2]);
        let inverted: FeatureVocabulary = serde_json::from_value(value).unwrap();
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_vocabulary_serde_keeps_tokenizer() {
        let vocab = FeatureVocabulary::fit(&corpus(), &VectorizerConfig::default()).unwrap();
        let json = serde_json::to_string(&vocab).unwrap();
        let restored: FeatureVocabulary = serde_json::from_str(&json).unwrap();

        let text = "Scientists confirm vaccine trial";
        assert_eq!(vocab.transform_one(text), restored.transform_one(text));
        assert_eq!(restored.tokenizer(), vocab.tokenizer());
    }
}
