//! Server classifying live camera streams and serving the results via HTTP.
//!
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    time::Duration,
};

use bytes::Bytes;
use tokio::sync::broadcast;

pub mod data_socket;
pub mod endpoints;
pub mod inferer;
pub mod meter;
pub mod nn;
pub mod overlay;
pub mod pipeline;
pub mod router;
pub mod utils;

/// Capacity of the queue between frame router and inferer.
pub const INFER_QUEUE_CAPACITY: usize = 4;

const BROADCAST_CAPACITY: usize = 8;

/// Per-channel state is forgotten after a channel sent no frame for this long.
pub const IDLE_CHANNEL_TIMEOUT: Duration = Duration::from_secs(60);

pub type BroadcastSender = broadcast::Sender<Bytes>;
pub type BroadcastReceiver = broadcast::Receiver<Bytes>;

/// Frame waiting to be classified.
#[derive(Clone, Debug, Default)]
pub struct InferJob {
    pub channel: u64,
    pub jpeg: Vec<u8>,
}

pub type InferSender = thingbuf::mpsc::Sender<InferJob>;
pub type InferReceiver = thingbuf::mpsc::Receiver<InferJob>;

pub fn infer_channel() -> (InferSender, InferReceiver) {
    thingbuf::mpsc::channel(INFER_QUEUE_CAPACITY)
}

pub fn broadcast_channel() -> (BroadcastSender, BroadcastReceiver) {
    broadcast::channel(BROADCAST_CAPACITY)
}

/// Hash a channel name to the id used for routing.
pub fn hashed(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Wrap a JPEG image as one part of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Bytes {
    Bytes::copy_from_slice(
        &[
            "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
            data,
            "\r\n\r\n".as_bytes(),
        ]
        .concat(),
    )
}
