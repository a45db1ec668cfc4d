//! Streaming IOU-based multi-object tracking
//!
//! This crate assigns per-frame object detections to persistent tracks with a
//! greedy IOU tracker, and finalizes the tracked frames so that every emitted
//! detection carries exact first/last/discarded flags.
//!
//! # Pipeline
//!
//! ```text
//! Frame<S> ──► IouTracker ──► TrackedItem<S> ──► FinalizationBuffer ──► FinishedFrame<S>
//! ```
//!
//! ```rust,ignore
//! use streamtrack::{FinalizingTracker, TrackerConfig};
//!
//! let config = TrackerConfig::from_file("track.json")?;
//! let mut tracker = FinalizingTracker::from_config(&config)?;
//! for frame in tracker.track(frames) {
//!     let frame = frame?;
//!     for record in frame.to_detection_records() {
//!         // hand over to serialization
//!     }
//! }
//! ```

pub mod active_track;
pub mod bbox;
pub mod config;
pub mod detection;
pub mod error;
pub mod finalize;
pub mod frame;
pub mod id_generator;
pub mod trackers;

pub use active_track::{ActiveTrack, TrackFate};
pub use bbox::{calculate_iou, iou_matrix, Bbox};
pub use config::{IouParameters, TrackerConfig};
pub use detection::{Detection, DetectionRecord, FinishedDetection, TrackId, TrackedDetection};
pub use error::{Result, TrackingError};
pub use finalize::{FinalizationBuffer, FinalizingTracker, FinishedFrames};
pub use frame::{
    offset_frames, FinishedFrame, Frame, FrameNo, ImageData, ImageFormat, TrackedFrame,
};
pub use id_generator::TrackIdGenerator;
pub use trackers::{IouTracker, TrackFlush, TrackedFrames, TrackedItem, Tracker};

/// Get library version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
