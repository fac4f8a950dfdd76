//! Capture webcam frames and send them to the classify server.
pub mod sensors;
