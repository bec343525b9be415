//! Trend scoring over the validation window.
//!
//! Two formulas are available. [`TrendRule::RelativeImprovement`] is the
//! default: it averages the relative drop between consecutive epoch means and
//! stalls when that rate falls below the threshold. [`TrendRule::MinSumRatio`]
//! compares how far the latest validation loss sits above its best value with
//! how flat the recent training losses are, and stalls when that ratio rises
//! above the threshold.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::ControllerConfig;

/// Formula used to score recent progress
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TrendRule {
    /// Mean relative improvement between adjacent epochs; stall when `score < threshold`
    #[default]
    RelativeImprovement,
    /// Validation regression over training flatness; stall when `score > threshold`
    MinSumRatio,
}

/// Outcome of a single trend evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Formula that produced the score
    pub rule: TrendRule,
    pub score: f64,
    pub threshold: f64,
    /// Number of validation epochs scored
    pub window_len: usize,
    /// Whether the score fell on the stop side of the threshold
    pub stalled: bool,
}

/// Pure scoring of a window against the configured threshold.
#[derive(Debug, Clone, Copy)]
pub struct TrendEvaluator {
    threshold: f64,
    scale_factor: f64,
    rule: TrendRule,
    train_span: usize,
}

impl TrendEvaluator {
    /// Creates an evaluator.
    ///
    /// # Arguments
    /// * `threshold` - Stop decision cutoff
    /// * `scale_factor` - Sensitivity multiplier (divisor for the legacy rule)
    /// * `rule` - Formula used to score the window
    ///
    /// # Returns
    /// A `TrendEvaluator` whose legacy rule reads a single training loss;
    /// widen that with [`TrendEvaluator::with_train_span`]
    pub fn new(threshold: f64, scale_factor: f64, rule: TrendRule) -> Self {
        Self {
            threshold,
            scale_factor,
            rule,
            train_span: 1,
        }
    }

    /// Evaluator matching a controller config. The legacy rule looks at the
    /// last `window_capacity` training losses.
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            threshold: config.threshold,
            scale_factor: config.scale_factor,
            rule: config.trend_rule,
            train_span: config.window_capacity,
        }
    }

    /// Number of trailing training losses the legacy rule reads.
    pub fn with_train_span(mut self, train_span: usize) -> Self {
        self.train_span = train_span.max(1);
        self
    }

    /// Formula this evaluator applies.
    pub fn rule(&self) -> TrendRule {
        self.rule
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score the window (oldest first).
    ///
    /// Returns `None` when the score is undefined: fewer than two epochs, or,
    /// for the legacy rule, not enough training history or a non-positive
    /// minimum. Callers treat `None` as "continue".
    pub fn score(&self, window: &[f64], train_history: &[f64]) -> Option<f64> {
        self.score_with_best(window, train_history, None)
    }

    /// Score the window, letting the legacy rule compare against the best
    /// validation mean ever seen rather than only the window minimum.
    pub fn score_with_best(
        &self,
        window: &[f64],
        train_history: &[f64],
        best_validation: Option<f64>,
    ) -> Option<f64> {
        if window.len() < 2 {
            return None;
        }
        match self.rule {
            TrendRule::RelativeImprovement => Some(self.relative_improvement(window)),
            TrendRule::MinSumRatio => self.min_sum_ratio(window, train_history, best_validation),
        }
    }

    /// Score the window and apply the threshold.
    pub fn evaluate(&self, window: &[f64], train_history: &[f64]) -> Option<Evaluation> {
        self.evaluate_with_best(window, train_history, None)
    }

    /// [`TrendEvaluator::evaluate`] with the all-time best validation mean.
    pub fn evaluate_with_best(
        &self,
        window: &[f64],
        train_history: &[f64],
        best_validation: Option<f64>,
    ) -> Option<Evaluation> {
        let score = self.score_with_best(window, train_history, best_validation)?;
        let stalled = match self.rule {
            TrendRule::RelativeImprovement => score < self.threshold,
            TrendRule::MinSumRatio => score > self.threshold,
        };
        Some(Evaluation {
            rule: self.rule,
            score,
            threshold: self.threshold,
            window_len: window.len(),
            stalled,
        })
    }

    fn relative_improvement(&self, window: &[f64]) -> f64 {
        let total: f64 = window
            .iter()
            .tuple_windows()
            .filter(|(older, newer)| *older > *newer && **older > 0.0)
            .map(|(older, newer)| (older - newer).abs() / older)
            .sum();
        total / (window.len() - 1) as f64 * self.scale_factor
    }

    fn min_sum_ratio(
        &self,
        window: &[f64],
        train_history: &[f64],
        best_validation: Option<f64>,
    ) -> Option<f64> {
        let k = self.train_span;
        if train_history.len() < k {
            return None;
        }
        let recent = &train_history[train_history.len() - k..];
        let train_min = recent.iter().copied().fold(f64::INFINITY, f64::min);
        let train_sum: f64 = recent.iter().sum();

        let val_min = window
            .iter()
            .copied()
            .chain(best_validation)
            .fold(f64::INFINITY, f64::min);
        let val_current = *window.last()?;
        if train_min <= 0.0 || val_min <= 0.0 {
            return None;
        }

        let flatness = train_sum / (k as f64 * train_min);
        Some((val_current / val_min - 1.0) / flatness / self.scale_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_entry_is_undefined() {
        let evaluator = TrendEvaluator::new(0.05, 1.0, TrendRule::RelativeImprovement);
        assert!(evaluator.evaluate(&[1.0], &[]).is_none());
        assert!(evaluator.evaluate(&[], &[]).is_none());
    }

    #[test]
    fn test_regressions_contribute_nothing() {
        let evaluator = TrendEvaluator::new(0.05, 1.0, TrendRule::RelativeImprovement);
        // 1.0 -> 0.5 is +0.5, 0.5 -> 0.9 is a regression
        let score = evaluator.score(&[1.0, 0.5, 0.9], &[]).unwrap();
        assert!((score - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_scale_factor_multiplies() {
        let plain = TrendEvaluator::new(0.05, 1.0, TrendRule::RelativeImprovement);
        let scaled = TrendEvaluator::new(0.05, 4.0, TrendRule::RelativeImprovement);
        let window = [1.0, 0.99, 0.98];
        let a = plain.score(&window, &[]).unwrap();
        let b = scaled.score(&window, &[]).unwrap();
        assert!((b - 4.0 * a).abs() < 1e-12);
    }

    #[test]
    fn test_zero_padding_is_not_improvement() {
        let evaluator = TrendEvaluator::new(0.05, 1.0, TrendRule::RelativeImprovement);
        let score = evaluator.score(&[0.0, 0.0], &[]).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_min_sum_ratio_needs_history() {
        let evaluator = TrendEvaluator::new(0.1, 1.0, TrendRule::MinSumRatio).with_train_span(3);
        assert!(evaluator.score(&[1.0, 1.2], &[0.5, 0.5]).is_none());
        assert!(evaluator.score(&[1.0, 1.2], &[0.5, 0.5, 0.5]).is_some());
    }

    #[test]
    fn test_min_sum_ratio_uses_evicted_best() {
        let evaluator = TrendEvaluator::new(0.3, 1.0, TrendRule::MinSumRatio).with_train_span(2);
        let window = [0.5, 0.6];
        let history = [1.0, 1.0];

        let windowed = evaluator.evaluate(&window, &history).unwrap();
        assert!((windowed.score - 0.2).abs() < 1e-9);
        assert!(!windowed.stalled);

        let with_best = evaluator.evaluate_with_best(&window, &history, Some(0.4)).unwrap();
        assert!((with_best.score - 0.5).abs() < 1e-9);
        assert!(with_best.stalled);
    }

    #[test]
    fn test_best_does_not_affect_relative_improvement() {
        let evaluator = TrendEvaluator::new(0.05, 1.0, TrendRule::RelativeImprovement);
        let window = [1.0, 0.9];
        assert_eq!(
            evaluator.score(&window, &[]),
            evaluator.score_with_best(&window, &[], Some(0.1))
        );
    }
}
