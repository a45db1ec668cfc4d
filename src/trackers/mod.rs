//! Frame-by-frame trackers
//!
//! A tracker turns an ordered stream of [`Frame`]s into a lazy stream of
//! [`TrackedItem`]s: one [`TrackedFrame`] per input frame, followed by a
//! single [`TrackFlush`] once the input is exhausted, so that every track
//! still active at the end gets a definite fate.

use std::collections::BTreeSet;

use crate::detection::TrackId;
use crate::error::Result;
use crate::frame::{Frame, TrackedFrame};

mod iou;

pub use iou::IouTracker;

/// Track fates decided when the input stream ends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackFlush {
    pub finished_tracks: BTreeSet<TrackId>,
    pub discarded_tracks: BTreeSet<TrackId>,
}

/// Item of a tracked stream
#[derive(Debug, Clone)]
pub enum TrackedItem<S> {
    Frame(TrackedFrame<S>),
    /// Emitted exactly once, after the last frame
    Flush(TrackFlush),
}

/// Common interface of stateful frame trackers
///
/// Frames must be fed in strictly increasing frame number order.
pub trait Tracker<S> {
    /// Associate the detections of one frame with tracks
    fn track_frame(&mut self, frame: Frame<S>) -> Result<TrackedFrame<S>>;

    /// Force-resolve every active track at end of input. The next frame
    /// starts a new run; track ids are not reused.
    fn flush(&mut self) -> TrackFlush;

    /// Drop all state, including the track id sequence
    fn reset(&mut self);

    /// Number of tracks still eligible for new detections
    fn active_track_count(&self) -> usize;

    /// Lazily track a whole frame stream
    fn track<I>(&mut self, frames: I) -> TrackedFrames<'_, Self, I::IntoIter>
    where
        Self: Sized,
        I: IntoIterator<Item = Frame<S>>,
    {
        TrackedFrames {
            tracker: self,
            frames: frames.into_iter(),
            flushed: false,
            failed: false,
        }
    }
}

/// Lazy stream returned by [`Tracker::track`]
///
/// Fused after the first error.
pub struct TrackedFrames<'a, T, I> {
    tracker: &'a mut T,
    frames: I,
    flushed: bool,
    failed: bool,
}

impl<'a, S, T, I> Iterator for TrackedFrames<'a, T, I>
where
    T: Tracker<S>,
    I: Iterator<Item = Frame<S>>,
{
    type Item = Result<TrackedItem<S>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.flushed {
            return None;
        }
        match self.frames.next() {
            Some(frame) => match self.tracker.track_frame(frame) {
                Ok(tracked) => Some(Ok(TrackedItem::Frame(tracked))),
                Err(e) => {
                    log::warn!("Tracking aborted: {}", e);
                    self.failed = true;
                    Some(Err(e))
                }
            },
            None => {
                self.flushed = true;
                Some(Ok(TrackedItem::Flush(self.tracker.flush())))
            }
        }
    }
}
