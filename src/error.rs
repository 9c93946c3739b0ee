// src/error.rs
//
// Fatal error taxonomy of the counting core. DetectionGap and malformed
// detections are absorbed locally (see crossing.rs) and never surface here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CountError {
    /// The video source cannot be opened or read further. Fatal, no retry.
    #[error("video source error: {0}")]
    Source(String),

    /// Invalid region or allow-list, caught before any frame is processed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CountError {
    pub fn source<S: Into<String>>(msg: S) -> Self {
        Self::Source(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
}
