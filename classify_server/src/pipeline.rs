//! Seams between score production, ranking and result publication.
//!
use std::sync::Arc;

use anyhow::{bail, Result};
use common::{
    labels::Vocabulary,
    ranking::{rank, Prediction},
};
use image::RgbImage;

/// Produces one score per class for a frame.
pub trait ScoreSource {
    fn num_classes(&self) -> usize;

    fn scores(&self, frame: &RgbImage) -> Result<Vec<f32>>;
}

/// Receives classified frames.
pub trait ResultSink {
    fn publish(
        &self,
        channel: u64,
        frame: RgbImage,
        classification: &Classification,
        fps: f32,
    ) -> Result<()>;
}

/// Outcome of classifying a single frame.
#[derive(Clone, Debug)]
pub struct Classification {
    /// Full score vector, indexed like the vocabulary.
    pub scores: Arc<[f32]>,
    /// The `top_k` best predictions, most confident first.
    pub predictions: Vec<Prediction>,
}

pub struct Classifier<S> {
    source: S,
    vocabulary: Arc<Vocabulary>,
    top_k: usize,
}

impl<S: ScoreSource> Classifier<S> {
    pub fn new(source: S, vocabulary: Arc<Vocabulary>, top_k: usize) -> Result<Self> {
        if source.num_classes() != vocabulary.len() {
            bail!(
                "model predicts {} classes but the vocabulary has {} labels",
                source.num_classes(),
                vocabulary.len()
            );
        }
        if top_k > vocabulary.len() {
            bail!(
                "top-k of {top_k} exceeds the {} available labels",
                vocabulary.len()
            );
        }

        Ok(Self {
            source,
            vocabulary,
            top_k,
        })
    }

    pub fn classify(&self, frame: &RgbImage) -> Result<Classification> {
        let scores = self.source.scores(frame)?;
        let predictions = rank(&scores, self.vocabulary.labels(), self.top_k)?;

        Ok(Classification {
            scores: scores.into(),
            predictions,
        })
    }
}
