use serde::Serialize;

use crate::engine::Classifier;
use crate::labels::LabelCatalog;
use crate::normalize::NormalizedImage;
use crate::{Error, Result};

const PROBABILITY_TOLERANCE: f32 = 1e-3;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    /// Species name from the label catalog
    pub label: String,

    /// Index of the winning class in the model output
    pub index: usize,

    /// Probability of the winning class
    pub confidence: f32,
}

/// Index and value of the highest score.
///
/// Ties go to the lowest index and NaN scores never win. Returns `None`
/// when no score is comparable.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;

    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }

        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }

    best
}

/// Whether the scores already form a probability distribution.
pub fn is_probability_vector(scores: &[f32]) -> bool {
    if scores.is_empty() || scores.iter().any(|s| !(0.0..=1.0).contains(s)) {
        return false;
    }

    let sum: f32 = scores.iter().sum();
    (sum - 1.0).abs() <= PROBABILITY_TOLERANCE
}

/// Numerically stable softmax; NaN inputs map to zero.
///
/// An infinite maximum takes the limit: the mass is split evenly between
/// the entries equal to it.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores
        .iter()
        .copied()
        .filter(|s| !s.is_nan())
        .fold(f32::NEG_INFINITY, f32::max);

    if max.is_infinite() {
        let winners = scores.iter().filter(|&&s| s == max).count() as f32;
        return scores
            .iter()
            .map(|&s| if s == max { 1.0 / winners } else { 0.0 })
            .collect();
    }

    let exp: Vec<f32> = scores
        .iter()
        .map(|s| if s.is_nan() { 0.0 } else { (s - max).exp() })
        .collect();

    let sum: f32 = exp.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return exp;
    }

    exp.into_iter().map(|e| e / sum).collect()
}

/// Reduce a score vector to a labelled prediction.
pub fn decide(scores: &[f32], catalog: &LabelCatalog) -> Result<Prediction> {
    let (index, raw) = argmax(scores).ok_or(Error::EmptyScores)?;

    let confidence = if is_probability_vector(scores) {
        raw
    } else {
        softmax(scores)[index]
    };

    Ok(Prediction {
        label: catalog.get(index)?.to_owned(),
        index,
        confidence,
    })
}

/// Run the model on a normalized image and map the winner to its label.
pub fn predict(
    image: &NormalizedImage,
    model: &dyn Classifier,
    catalog: &LabelCatalog,
) -> Result<Prediction> {
    let scores = model.scores(image)?;
    log::debug!("model returned {} scores", scores.len());

    decide(&scores, catalog)
}
