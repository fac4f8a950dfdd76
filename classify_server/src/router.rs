//! Route incoming frames to stream subscribers and the inferer.
//!
use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, Mutex},
    time::Instant,
};

use anyhow::Result;
use common::protocol::FrameMsg;
use image::{codecs::jpeg::JpegEncoder, ColorType, RgbImage};

use crate::{
    as_jpeg_stream_item, broadcast_channel, hashed,
    overlay::Overlay,
    pipeline::{Classification, ResultSink},
    BroadcastReceiver, BroadcastSender, InferSender, IDLE_CHANNEL_TIMEOUT,
};

const JPEG_QUALITY: u8 = 90;

pub struct FrameRouter {
    frames_broadcast_map: Mutex<HashMap<u64, BroadcastSender>>,
    classified_broadcast_map: Mutex<HashMap<u64, BroadcastSender>>,
    latest_scores: Mutex<HashMap<u64, (Instant, Arc<[f32]>)>>,
    infer_tx: InferSender,
}

impl FrameRouter {
    pub fn new(infer_tx: InferSender) -> Self {
        Self {
            frames_broadcast_map: Mutex::new(HashMap::new()),
            classified_broadcast_map: Mutex::new(HashMap::new()),
            latest_scores: Mutex::new(HashMap::new()),
            infer_tx,
        }
    }

    /// Forward a received frame to raw stream subscribers and queue it for classification.
    ///
    /// Frames are dropped for classification while the inference queue is full.
    pub fn route(&self, frame_msg: FrameMsg) {
        let id = hashed(&frame_msg.id);

        if let Some(sender) = live_sender(&self.frames_broadcast_map, id) {
            sender.send(as_jpeg_stream_item(&frame_msg.data)).ok();
        }

        match self.infer_tx.try_send_ref() {
            Ok(mut job) => {
                job.channel = id;
                job.jpeg.clear();
                job.jpeg.extend_from_slice(&frame_msg.data);
            }
            Err(_) => log::debug!("Inference queue full, dropping frame of {}", &frame_msg.id),
        }
    }

    pub fn get_broadcast_receiver(&self, name: &str) -> BroadcastReceiver {
        subscribe(&self.frames_broadcast_map, hashed(name))
    }

    pub fn get_classified_receiver(&self, name: &str) -> BroadcastReceiver {
        subscribe(&self.classified_broadcast_map, hashed(name))
    }

    /// Broadcast an annotated frame to the subscribers of channel `id`.
    pub fn send_classified(&self, id: u64, jpeg: &[u8]) {
        if let Some(sender) = live_sender(&self.classified_broadcast_map, id) {
            sender.send(as_jpeg_stream_item(jpeg)).ok();
        }
    }

    pub fn store_scores(&self, id: u64, scores: Arc<[f32]>) {
        self.store_scores_at(id, scores, Instant::now());
    }

    /// Store scores classified at `now`, forgetting channels idle for longer than
    /// [`IDLE_CHANNEL_TIMEOUT`].
    pub fn store_scores_at(&self, id: u64, scores: Arc<[f32]>, now: Instant) {
        let mut latest_scores = self.latest_scores.lock().unwrap();
        latest_scores.retain(|_id, (stored, _scores)| {
            now.saturating_duration_since(*stored) < IDLE_CHANNEL_TIMEOUT
        });
        latest_scores.insert(id, (now, scores));
    }

    /// Most recent score vector classified on channel `name`.
    pub fn latest_scores(&self, name: &str) -> Option<Arc<[f32]>> {
        let latest_scores = self.latest_scores.lock().unwrap();
        latest_scores
            .get(&hashed(name))
            .map(|(_, scores)| scores.clone())
    }
}

/// Get the sender of channel `id` if anybody listens, pruning senders without receivers.
fn live_sender(map: &Mutex<HashMap<u64, BroadcastSender>>, id: u64) -> Option<BroadcastSender> {
    let mut map = map.lock().unwrap();
    map.retain(|_id, sender| sender.receiver_count() > 0);
    map.get(&id).cloned()
}

fn subscribe(map: &Mutex<HashMap<u64, BroadcastSender>>, id: u64) -> BroadcastReceiver {
    let mut map = map.lock().unwrap();

    if let Some(tx) = map.get(&id) {
        tx.subscribe()
    } else {
        let (tx, rx) = broadcast_channel();
        map.insert(id, tx);

        rx
    }
}

/// Result sink publishing annotated frames and scores via the [`FrameRouter`].
pub struct StreamSink {
    router: Arc<FrameRouter>,
    overlay: Overlay,
}

impl StreamSink {
    pub fn new(router: Arc<FrameRouter>, overlay: Overlay) -> Self {
        Self { router, overlay }
    }
}

impl ResultSink for StreamSink {
    fn publish(
        &self,
        channel: u64,
        mut frame: RgbImage,
        classification: &Classification,
        fps: f32,
    ) -> Result<()> {
        self.router
            .store_scores(channel, classification.scores.clone());

        self.overlay
            .draw(&mut frame, &classification.predictions, fps);

        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            ColorType::Rgb8,
        )?;
        self.router.send_classified(channel, buf.get_ref());

        Ok(())
    }
}
