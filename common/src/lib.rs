//! Common code shared between `classify_server` and `cam_sender`.
pub mod labels;
pub mod protocol;
pub mod ranking;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
