//! Top-K ranking of classifier scores.
//!
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A label paired with the score the classifier assigned to it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RankError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Return the `k` highest scores paired with their labels, most confident first.
///
/// `scores` and `vocabulary` are indexed by class. Scores that compare equal keep their original
/// order, so the lower class index comes first. NaN ranks below every number.
pub fn rank<S: AsRef<str>>(
    scores: &[f32],
    vocabulary: &[S],
    k: usize,
) -> Result<Vec<Prediction>, RankError> {
    if scores.is_empty() {
        return Err(RankError::InvalidArgument("no scores to rank".into()));
    }
    if scores.len() != vocabulary.len() {
        return Err(RankError::InvalidArgument(format!(
            "{} scores but {} labels",
            scores.len(),
            vocabulary.len()
        )));
    }
    if k > scores.len() {
        return Err(RankError::InvalidArgument(format!(
            "k = {k} exceeds the number of scores ({})",
            scores.len()
        )));
    }

    let by_rank = |a: &usize, b: &usize| descending(scores[*a], scores[*b]).then(a.cmp(b));

    let mut indices: Vec<usize> = (0..scores.len()).collect();
    if k > 0 && k < indices.len() {
        // Everything before position `k` now outranks everything after it
        indices.select_nth_unstable_by(k - 1, by_rank);
    }
    indices.truncate(k);
    indices.sort_unstable_by(by_rank);

    Ok(indices
        .into_iter()
        .map(|i| Prediction::new(vocabulary[i].as_ref(), scores[i]))
        .collect())
}

/// Convert a signed `k` received at an API boundary.
pub fn top_k_from_signed(k: i64) -> Result<usize, RankError> {
    usize::try_from(k).map_err(|_| RankError::InvalidArgument(format!("k = {k} is negative")))
}

/// Order for descending scores with NaN last.
fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
