//! Error types for the tracking pipeline

use thiserror::Error;

use crate::detection::TrackId;
use crate::frame::FrameNo;

/// Result type alias for the tracking library
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Errors that abort a tracking run
///
/// None of these are retriable: they either describe a broken upstream
/// collaborator (frame ordering, detection geometry) or an unusable
/// configuration.
#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Frame {received} received after frame {previous}: frame numbers must strictly increase")]
    FrameOutOfOrder { previous: FrameNo, received: FrameNo },

    #[error("Malformed detection #{index} in frame {frame}: {reason}")]
    MalformedDetection {
        frame: FrameNo,
        index: usize,
        reason: String,
    },

    #[error("Track {track_id} resolved in frame {frame} but was never observed")]
    UnknownTrack { frame: FrameNo, track_id: TrackId },

    #[error("Track ids exhausted in frame {frame}")]
    TrackIdsExhausted { frame: FrameNo },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackingError {
    pub fn invalid_parameter<V: ToString, R: Into<String>>(
        name: &'static str,
        value: V,
        reason: R,
    ) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed<S: Into<String>>(frame: FrameNo, index: usize, reason: S) -> Self {
        Self::MalformedDetection {
            frame,
            index,
            reason: reason.into(),
        }
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
