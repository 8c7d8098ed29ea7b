//! Final linear classification over a completed feature vector.
//!
//! Scores are integer multiply-accumulates in 32 bits. Weights and features
//! are small enough that the sum is expected to fit; accumulation wraps on
//! overflow rather than checking, which is the accelerator's numeric contract.

use crate::channel::types::{FEATURE_DIM, OUTPUT_DIM};
use crate::core::accumulator::FeatureVector;
use crate::error::ParseError;
use std::time::Duration;

/// Raw class scores in accelerator output order.
pub type Scores = [i32; OUTPUT_DIM];

/// Dense `FEATURE_DIM x OUTPUT_DIM` weight matrix, row-major by input index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightMatrix {
    data: Vec<i32>,
}

impl WeightMatrix {
    /// Build a matrix from exactly `FEATURE_DIM * OUTPUT_DIM` values.
    pub fn from_values(values: Vec<i32>) -> Result<Self, ParseError> {
        let expected = FEATURE_DIM * OUTPUT_DIM;
        if values.len() < expected {
            return Err(ParseError::TooFewTokens {
                expected,
                found: values.len(),
            });
        }
        if values.len() > expected {
            return Err(ParseError::TooManyTokens {
                expected,
                found: values.len(),
            });
        }
        Ok(Self { data: values })
    }

    pub fn zeros() -> Self {
        Self {
            data: vec![0; FEATURE_DIM * OUTPUT_DIM],
        }
    }

    /// Weights connecting input `input` to every output.
    pub fn row(&self, input: usize) -> &[i32] {
        &self.data[input * OUTPUT_DIM..(input + 1) * OUTPUT_DIM]
    }

    pub fn weight(&self, input: usize, output: usize) -> i32 {
        self.data[input * OUTPUT_DIM + output]
    }
}

/// Outcome of classifying one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    /// Session this result belongs to
    pub session: u64,
    pub scores: Scores,
    pub predicted_class: u8,
    pub true_class: u8,
    /// Wall time from the start of transmission to classification
    pub elapsed: Duration,
}

impl ClassificationResult {
    pub fn is_correct(&self) -> bool {
        self.predicted_class == self.true_class
    }

    /// Scores from index 9 down to 0, the order they are reported in.
    pub fn reported_scores(&self) -> impl Iterator<Item = i32> + '_ {
        self.scores.iter().rev().copied()
    }
}

/// Dot product of every weight column with the feature vector.
pub fn compute_scores(features: &FeatureVector, weights: &WeightMatrix) -> Scores {
    let mut scores = [0i32; OUTPUT_DIM];

    for (input, &feature) in features.values().iter().enumerate() {
        for (score, &weight) in scores.iter_mut().zip(weights.row(input)) {
            *score = score.wrapping_add(weight.wrapping_mul(feature));
        }
    }

    scores
}

/// Index of the highest score. The lowest index wins ties.
pub fn argmax(scores: &Scores) -> usize {
    let mut best = 0;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = index;
        }
    }
    best
}

/// Class label for a set of scores.
///
/// The accelerator emits classes in reverse order, so raw index `i` is class `9 - i`.
pub fn predicted_class(scores: &Scores) -> u8 {
    (OUTPUT_DIM - 1 - argmax(scores)) as u8
}

/// Classify a completed feature vector.
pub fn classify(
    session: u64,
    features: &FeatureVector,
    weights: &WeightMatrix,
    true_class: u8,
    elapsed: Duration,
) -> ClassificationResult {
    let scores = compute_scores(features, weights);

    ClassificationResult {
        session,
        scores,
        predicted_class: predicted_class(&scores),
        true_class,
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features_from(values: Vec<i32>) -> FeatureVector {
        FeatureVector::from_values(values).unwrap()
    }

    #[test]
    fn test_zero_inputs_predict_class_nine() {
        let features = FeatureVector::new();
        let result = classify(1, &features, &WeightMatrix::zeros(), 4, Duration::ZERO);

        assert_eq!(result.scores, [0; OUTPUT_DIM]);
        assert_eq!(result.predicted_class, 9);
        assert!(!result.is_correct());
    }

    #[test]
    fn test_scores_are_column_dot_products() {
        let features = features_from((0..FEATURE_DIM as i32).map(|i| i % 7 - 3).collect());
        let weights = WeightMatrix::from_values(
            (0..(FEATURE_DIM * OUTPUT_DIM) as i32)
                .map(|i| i % 11 - 5)
                .collect(),
        )
        .unwrap();

        let scores = compute_scores(&features, &weights);
        for (output, &score) in scores.iter().enumerate() {
            let expected: i32 = (0..FEATURE_DIM)
                .map(|input| weights.weight(input, output) * features.values()[input])
                .sum();
            assert_eq!(score, expected);
        }

        // No hidden state between runs
        assert_eq!(compute_scores(&features, &weights), scores);
    }

    #[test]
    fn test_argmax_first_index_wins_ties() {
        let scores = [5, 5, 3, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(argmax(&scores), 0);
        assert_eq!(predicted_class(&scores), 9);

        let scores = [0, 1, 7, 7, 0, 0, 0, 0, 0, -2];
        assert_eq!(argmax(&scores), 2);
        assert_eq!(predicted_class(&scores), 7);
    }

    #[test]
    fn test_argmax_all_very_negative() {
        let scores = [
            -5_000_000,
            -4_000_000,
            -6_000_000,
            -7_000_000,
            -8_000_000,
            -9_000_000,
            -9_000_000,
            -9_000_000,
            -9_000_000,
            -9_000_000,
        ];
        assert_eq!(argmax(&scores), 1);
    }

    #[test]
    fn test_single_hot_feature_selects_class() {
        let mut values = vec![0; FEATURE_DIM];
        values[100] = 3;
        let mut weights = vec![0; FEATURE_DIM * OUTPUT_DIM];
        weights[100 * OUTPUT_DIM + 6] = 2;

        let result = classify(
            7,
            &features_from(values),
            &WeightMatrix::from_values(weights).unwrap(),
            3,
            Duration::from_millis(12),
        );
        assert_eq!(result.scores[6], 6);
        assert_eq!(result.predicted_class, 3);
        assert!(result.is_correct());
        assert_eq!(result.reported_scores().nth(3), Some(6));
    }

    #[test]
    fn test_weight_matrix_size_checked() {
        assert_eq!(
            WeightMatrix::from_values(vec![1; 10]),
            Err(ParseError::TooFewTokens {
                expected: FEATURE_DIM * OUTPUT_DIM,
                found: 10
            })
        );
        assert!(matches!(
            WeightMatrix::from_values(vec![1; FEATURE_DIM * OUTPUT_DIM + 1]),
            Err(ParseError::TooManyTokens { .. })
        ));
    }
}
