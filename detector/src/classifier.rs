// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! L2-regularized logistic regression
//!
//! Minimizes `0.5 * |w|^2 + C * sum(log(1 + exp(-y_i * (w.x_i + b))))` with a
//! truncated Newton (Newton-CG) solver. The bias is handled as an extra
//! feature fixed at 1 and is regularized together with the weights.
//!
//! Class 1 is "real": `predict_proba` returns `(p_fake, p_real)`.

use crate::error::{DetectorError, Result};
use crate::featurizer::FeatureVector;
use serde::{Deserialize, Serialize};

/// Solver hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    /// Relative gradient-norm stopping tolerance
    pub tol: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
        }
    }
}

/// Learned weights and bias, immutable after fitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierParameters {
    weights: Vec<f64>,
    bias: f64,
}

impl ClassifierParameters {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    /// All-zero model: every input scores exactly 0.5
    pub fn zeros(n_features: usize) -> Self {
        Self::new(vec![0.0; n_features], 0.0)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn n_features(&self) -> usize {
        self.weights.len()
    }

    /// `w.x + b`
    pub fn decision_function(&self, x: &FeatureVector) -> f64 {
        x.dot(&self.weights) + self.bias
    }

    /// `(p_fake, p_real)` with `p_real = sigmoid(w.x + b)`
    pub fn predict_proba(&self, x: &FeatureVector) -> (f64, f64) {
        let p_real = sigmoid(self.decision_function(x));
        (1.0 - p_real, p_real)
    }

    /// 1 iff `p_real > 0.5`. A tie at exactly 0.5 resolves to 0 (fake).
    pub fn predict(&self, x: &FeatureVector) -> u8 {
        let (_, p_real) = self.predict_proba(x);
        if p_real > 0.5 {
            1
        } else {
            0
        }
    }

    fn to_extended(&self) -> Vec<f64> {
        let mut w = self.weights.clone();
        w.push(self.bias);
        w
    }

    fn from_extended(mut w: Vec<f64>) -> Self {
        let bias = w.pop().unwrap_or(0.0);
        Self::new(w, bias)
    }
}

/// Outcome of a converged fit
#[derive(Debug, Clone)]
pub struct FitSummary {
    pub parameters: ClassifierParameters,
    pub iterations: usize,
    pub gradient_norm: f64,
}

pub struct LogisticRegression {
    config: ClassifierConfig,
}

impl LogisticRegression {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Fit from a zero start
    pub fn fit(&self, vectors: &[FeatureVector], labels: &[u8]) -> Result<FitSummary> {
        self.fit_from(vectors, labels, None)
    }

    /// Fit, optionally warm-started from earlier parameters.
    ///
    /// Hitting `max_iter` yields [`DetectorError::Convergence`] carrying the
    /// best parameters reached so far. A line search that finds no descent
    /// before the cap also ends the fit as non-converged, with `stalled` set.
    pub fn fit_from(
        &self,
        vectors: &[FeatureVector],
        labels: &[u8],
        init: Option<&ClassifierParameters>,
    ) -> Result<FitSummary> {
        if vectors.is_empty() {
            return Err(DetectorError::InsufficientData(
                "cannot fit classifier without training vectors".to_string(),
            ));
        }
        if vectors.len() != labels.len() {
            return Err(DetectorError::InsufficientData(format!(
                "{} training vectors but {} labels",
                vectors.len(),
                labels.len()
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l > 1) {
            return Err(DetectorError::UnknownIndex(bad as usize));
        }

        let dim = vectors[0].dim();
        let objective = Objective::new(vectors, labels, dim, self.config.c);

        let mut w = match init {
            Some(params) if params.n_features() == dim => params.to_extended(),
            Some(params) => {
                tracing::warn!(
                    "Ignoring warm start with {} features (expected {})",
                    params.n_features(),
                    dim
                );
                vec![0.0; dim + 1]
            }
            None => vec![0.0; dim + 1],
        };

        let n_pos = labels.iter().filter(|&&l| l == 1).count();
        let n_neg = labels.len() - n_pos;
        let (_, g_zero, _) = objective.evaluate(&vec![0.0; dim + 1]);
        let eps = self.config.tol * (n_pos.min(n_neg).max(1) as f64) / labels.len() as f64
            * norm(&g_zero);

        let (mut f, mut g, mut d) = objective.evaluate(&w);
        let mut gnorm = norm(&g);
        let mut iterations = 0;
        let mut stalled = false;

        while gnorm > eps && iterations < self.config.max_iter {
            iterations += 1;

            let step = conjugate_gradient(&objective, &d, &g);
            let slope = dot(&g, &step);

            let Some((next, alpha)) = line_search(&objective, &w, f, &step, slope) else {
                tracing::debug!("Line search stalled at iteration {} (|g|={:.3e})", iterations, gnorm);
                stalled = true;
                break;
            };

            w = next;
            (f, g, d) = objective.evaluate(&w);
            gnorm = norm(&g);
            tracing::debug!("newton-cg iter {}: f={:.6} |g|={:.3e} step={}", iterations, f, gnorm, alpha);
        }

        let parameters = ClassifierParameters::from_extended(w);

        if gnorm <= eps {
            Ok(FitSummary {
                parameters,
                iterations,
                gradient_norm: gnorm,
            })
        } else {
            Err(DetectorError::Convergence {
                iterations,
                gradient_norm: gnorm,
                stalled,
                best: Box::new(parameters),
            })
        }
    }
}

/// Backtracking Armijo search along `step`, halving up to 20 times.
///
/// Returns the accepted point and step length, or `None` if no step gives
/// sufficient decrease.
fn line_search(
    objective: &Objective<'_>,
    w: &[f64],
    f: f64,
    step: &[f64],
    slope: f64,
) -> Option<(Vec<f64>, f64)> {
    let mut alpha = 1.0;
    for _ in 0..20 {
        let candidate: Vec<f64> = w.iter().zip(step).map(|(wi, si)| wi + alpha * si).collect();
        if objective.value(&candidate) <= f + 1e-4 * alpha * slope {
            return Some((candidate, alpha));
        }
        alpha *= 0.5;
    }
    None
}

/// Regularized logistic loss over extended weights `[w..., b]`
struct Objective<'a> {
    x: &'a [FeatureVector],
    y: Vec<f64>,
    dim: usize,
    c: f64,
}

impl<'a> Objective<'a> {
    fn new(x: &'a [FeatureVector], labels: &[u8], dim: usize, c: f64) -> Self {
        let y = labels.iter().map(|&l| if l == 1 { 1.0 } else { -1.0 }).collect();
        Self { x, y, dim, c }
    }

    fn score(&self, w: &[f64], i: usize) -> f64 {
        self.x[i].dot(&w[..self.dim]) + w[self.dim]
    }

    fn value(&self, w: &[f64]) -> f64 {
        let loss: f64 = (0..self.x.len())
            .map(|i| log1p_exp(-self.y[i] * self.score(w, i)))
            .sum();
        0.5 * dot(w, w) + self.c * loss
    }

    /// Value, gradient and the Hessian diagonal weights `s_i * (1 - s_i)`
    fn evaluate(&self, w: &[f64]) -> (f64, Vec<f64>, Vec<f64>) {
        let mut grad = w.to_vec();
        let mut diag = Vec::with_capacity(self.x.len());
        let mut loss = 0.0;

        for (i, x) in self.x.iter().enumerate() {
            let margin = self.y[i] * self.score(w, i);
            loss += log1p_exp(-margin);

            let s = sigmoid(margin);
            diag.push(s * (1.0 - s));

            let coef = self.c * (s - 1.0) * self.y[i];
            for (idx, v) in x.iter() {
                grad[idx] += coef * v;
            }
            grad[self.dim] += coef;
        }

        (0.5 * dot(w, w) + self.c * loss, grad, diag)
    }

    /// `(I + C * X^T D X) v`
    fn hessian_vec(&self, diag: &[f64], v: &[f64]) -> Vec<f64> {
        let mut out = v.to_vec();
        for (i, x) in self.x.iter().enumerate() {
            let xv = x.dot(&v[..self.dim]) + v[self.dim];
            let coef = self.c * diag[i] * xv;
            for (idx, val) in x.iter() {
                out[idx] += coef * val;
            }
            out[self.dim] += coef;
        }
        out
    }
}

/// Approximately solve `H s = -g`
fn conjugate_gradient(objective: &Objective<'_>, diag: &[f64], g: &[f64]) -> Vec<f64> {
    let n = g.len();
    let gnorm = norm(g);
    let tolerance = 0.5f64.min(gnorm.sqrt()) * gnorm;
    let max_steps = n.min(200);

    let mut s = vec![0.0; n];
    let mut r: Vec<f64> = g.iter().map(|v| -v).collect();
    let mut p = r.clone();
    let mut rr = dot(&r, &r);

    for _ in 0..max_steps {
        if rr.sqrt() <= tolerance {
            break;
        }
        let hp = objective.hessian_vec(diag, &p);
        let php = dot(&p, &hp);
        if php <= 0.0 {
            break;
        }
        let alpha = rr / php;
        for j in 0..n {
            s[j] += alpha * p[j];
            r[j] -= alpha * hp[j];
        }
        let rr_new = dot(&r, &r);
        let beta = rr_new / rr;
        for j in 0..n {
            p[j] = r[j] + beta * p[j];
        }
        rr = rr_new;
    }

    s
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^t)` without overflow
fn log1p_exp(t: f64) -> f64 {
    if t > 0.0 {
        t + (-t).exp().ln_1p()
    } else {
        t.exp().ln_1p()
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
