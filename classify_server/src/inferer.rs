use std::{collections::HashMap, time::Instant};

use anyhow::Result;
use image::{ImageFormat, RgbImage};

use crate::{
    meter::{FpsCounter, METER},
    pipeline::{Classifier, ResultSink, ScoreSource},
    InferJob, InferReceiver, IDLE_CHANNEL_TIMEOUT,
};

/// Classifies queued frames and hands the results to a sink.
pub struct Inferer<S, K> {
    infer_rx: InferReceiver,
    classifier: Classifier<S>,
    sink: K,
    fps: HashMap<u64, FpsCounter>,
}

impl<S: ScoreSource, K: ResultSink> Inferer<S, K> {
    pub fn new(infer_rx: InferReceiver, classifier: Classifier<S>, sink: K) -> Self {
        Self {
            infer_rx,
            classifier,
            sink,
            fps: HashMap::new(),
        }
    }

    /// Process frames until the queue is closed.
    pub async fn run(&mut self) {
        loop {
            let job = match self.infer_rx.recv_ref().await {
                Some(recv_ref) => (*recv_ref).clone(),
                None => break,
            };

            if let Err(err) = self.process(&job) {
                log::warn!("Failed to classify frame: {err:#}");
            }
        }

        log::info!("Inference queue closed, stopping inferer");
    }

    fn process(&mut self, job: &InferJob) -> Result<()> {
        let frame: RgbImage =
            image::load_from_memory_with_format(&job.jpeg, ImageFormat::Jpeg)?.to_rgb8();
        let classification = self.classifier.classify(&frame)?;

        if let Some(best) = classification.predictions.first() {
            log::debug!("Best guess {} ({:.3})", best.label, best.score);
        }

        let fps = self.tick_fps(job.channel, Instant::now());
        self.sink.publish(job.channel, frame, &classification, fps)?;
        METER.tick_classified();

        Ok(())
    }

    /// Tick the frame rate of `channel`, dropping counters of channels that went idle.
    fn tick_fps(&mut self, channel: u64, now: Instant) -> f32 {
        self.fps
            .retain(|_channel, counter| !counter.is_idle(now, IDLE_CHANNEL_TIMEOUT));
        self.fps.entry(channel).or_default().tick_at(now)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{Arc, Mutex};

    use common::ranking::Prediction;

    use super::*;
    use crate::{
        infer_channel,
        pipeline::{
            test::{vocabulary, PixelSource},
            Classification,
        },
    };

    #[derive(Clone, Default)]
    struct CollectSink(Arc<Mutex<Vec<(u64, Vec<Prediction>)>>>);

    impl ResultSink for CollectSink {
        fn publish(
            &self,
            channel: u64,
            _frame: RgbImage,
            classification: &Classification,
            _fps: f32,
        ) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .push((channel, classification.predictions.clone()));
            Ok(())
        }
    }

    fn jpeg(frame: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 100)
            .encode(
                frame.as_raw(),
                frame.width(),
                frame.height(),
                image::ColorType::Rgb8,
            )
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_inferer_classifies_queued_frames() -> Result<()> {
        let (infer_tx, infer_rx) = infer_channel();
        let sink = CollectSink::default();
        let classifier = Classifier::new(PixelSource(3), vocabulary(3), 1)?;
        let mut inferer = Inferer::new(infer_rx, classifier, sink.clone());

        // Brightness falls off to the right, so label_0 wins
        let frame = RgbImage::from_fn(16, 16, |x, _y| {
            let value = 255 - 15 * x as u8;
            image::Rgb([value, value, value])
        });

        infer_tx
            .send(InferJob {
                channel: 7,
                jpeg: vec![0, 1, 2],
            })
            .await
            .map_err(|_| anyhow::anyhow!("inference queue closed"))?;
        infer_tx
            .send(InferJob {
                channel: 7,
                jpeg: jpeg(&frame),
            })
            .await
            .map_err(|_| anyhow::anyhow!("inference queue closed"))?;
        drop(infer_tx);

        inferer.run().await;

        let published = sink.0.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, 7);
        assert_eq!(published[0].1[0].label, "label_0");

        Ok(())
    }

    #[test]
    fn test_idle_fps_counters_are_dropped() -> Result<()> {
        let (_infer_tx, infer_rx) = infer_channel();
        let classifier = Classifier::new(PixelSource(3), vocabulary(3), 1)?;
        let mut inferer = Inferer::new(infer_rx, classifier, CollectSink::default());
        let start = Instant::now();

        inferer.tick_fps(1, start);
        inferer.tick_fps(2, start + IDLE_CHANNEL_TIMEOUT / 2);
        inferer.tick_fps(2, start + IDLE_CHANNEL_TIMEOUT);

        assert!(!inferer.fps.contains_key(&1));
        assert!(inferer.fps.contains_key(&2));

        Ok(())
    }
}
