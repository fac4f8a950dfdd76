//! Protocol definition for the data socket.
//!
use serde::{Deserialize, Serialize};

/// Definition of protocol messages.
#[derive(Debug, Deserialize, PartialEq, Eq, Serialize)]
pub enum ProtoMsg {
    /// Announces the channel a sender is about to publish on.
    ConnectReq(String),
    FrameMsg(FrameMsg),
}

/// One JPEG-encoded camera frame published on channel `id`.
#[derive(Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FrameMsg {
    pub id: String,
    pub data: Vec<u8>,
}

impl FrameMsg {
    pub fn new(id: String, data: Vec<u8>) -> Self {
        Self { id, data }
    }
}

impl ProtoMsg {
    pub fn serialize(&self) -> Result<Vec<u8>, Box<bincode::ErrorKind>> {
        bincode::serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Box<bincode::ErrorKind>> {
        bincode::deserialize(bytes)
    }
}
