//! Finalization of tracked frames
//!
//! A tracked frame cannot be released as soon as it is produced: a track
//! observed in it may still be extended, finished or discarded many frames
//! later. [`FinalizationBuffer`] holds frames back until every track they
//! observe has a known fate, stamps their detections with `is_last` /
//! `is_discarded`, and releases them in strictly increasing frame order.
//!
//! Memory is bounded only by the lifetime of the longest open track: the
//! earliest frame of a long-lived track stays buffered until it resolves.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use crate::config::TrackerConfig;
use crate::detection::TrackId;
use crate::error::{Result, TrackingError};
use crate::frame::{FinishedFrame, Frame, FrameNo, TrackedFrame};
use crate::trackers::{IouTracker, TrackFlush, TrackedFrames, TrackedItem, Tracker};

#[derive(Debug)]
struct PendingFrame<S> {
    frame: TrackedFrame<S>,
    /// observed tracks whose fate is still unknown
    unresolved: BTreeSet<TrackId>,
}

/// Buffer turning tracked frames into finished frames
#[derive(Debug)]
pub struct FinalizationBuffer<S> {
    keep_discarded: bool,
    pending: BTreeMap<FrameNo, PendingFrame<S>>,
    /// latest frame observing each track that still has buffered frames
    last_observed: HashMap<TrackId, FrameNo>,
    /// discarded tracks that still have buffered frames
    discarded: BTreeSet<TrackId>,
    last_received: Option<FrameNo>,
}

impl<S> FinalizationBuffer<S> {
    pub fn new(keep_discarded: bool) -> Self {
        Self {
            keep_discarded,
            pending: BTreeMap::new(),
            last_observed: HashMap::new(),
            discarded: BTreeSet::new(),
            last_received: None,
        }
    }

    pub fn keep_discarded(&self) -> bool {
        self.keep_discarded
    }

    /// Number of frames held back
    pub fn buffered_frames(&self) -> usize {
        self.pending.len()
    }

    /// Add a newly tracked frame and return every frame that became
    /// releasable, in frame order.
    pub fn push(&mut self, frame: TrackedFrame<S>) -> Result<Vec<FinishedFrame<S>>> {
        if let Some(previous) = self.last_received {
            if frame.no <= previous {
                return Err(TrackingError::FrameOutOfOrder {
                    previous,
                    received: frame.no,
                });
            }
        }
        let observed = frame.observed_tracks();
        self.check_known(frame.no, &frame.finished_tracks, &observed)?;
        self.check_known(frame.no, &frame.discarded_tracks, &observed)?;

        let no = frame.no;
        self.last_received = Some(no);
        for track_id in observed {
            self.last_observed.insert(track_id, no);
        }

        let unresolved = frame.unfinished_tracks();
        let finished = frame.finished_tracks.clone();
        let discarded = frame.discarded_tracks.clone();
        self.pending.insert(no, PendingFrame { frame, unresolved });

        self.resolve_tracks(&finished, &discarded);
        Ok(self.release_ready())
    }

    /// Apply the end-of-stream fates and return every frame that became
    /// releasable.
    pub fn resolve(&mut self, flush: TrackFlush) -> Result<Vec<FinishedFrame<S>>> {
        let frame = self.last_received.unwrap_or_default();
        self.check_known(frame, &flush.finished_tracks, &BTreeSet::new())?;
        self.check_known(frame, &flush.discarded_tracks, &BTreeSet::new())?;

        self.resolve_tracks(&flush.finished_tracks, &flush.discarded_tracks);
        Ok(self.release_ready())
    }

    /// Finalize every remaining frame in frame order and reset all state.
    ///
    /// Tracks without a fate at this point are reported as not discarded.
    pub fn drain(&mut self) -> Vec<FinishedFrame<S>> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            log::debug!("Draining {} buffered frames", pending.len());
        }
        let finished = pending
            .into_values()
            .map(|p| self.finalize(p.frame))
            .collect();

        self.last_observed.clear();
        self.discarded.clear();
        self.last_received = None;
        finished
    }

    /// Every resolved track must have been observed, earlier or in `observed`
    fn check_known(
        &self,
        frame: FrameNo,
        tracks: &BTreeSet<TrackId>,
        observed: &BTreeSet<TrackId>,
    ) -> Result<()> {
        let unknown = tracks
            .iter()
            .find(|id| !observed.contains(*id) && !self.last_observed.contains_key(*id));
        match unknown {
            Some(&track_id) => Err(TrackingError::UnknownTrack { frame, track_id }),
            None => Ok(()),
        }
    }

    fn resolve_tracks(&mut self, finished: &BTreeSet<TrackId>, discarded: &BTreeSet<TrackId>) {
        if finished.is_empty() && discarded.is_empty() {
            return;
        }
        self.discarded.extend(discarded.iter().copied());
        for pending in self.pending.values_mut() {
            pending
                .unresolved
                .retain(|id| !finished.contains(id) && !discarded.contains(id));
        }
    }

    /// Pop resolved frames from the front of the buffer. A resolved frame
    /// behind an unresolved one waits, keeping the output in frame order.
    fn release_ready(&mut self) -> Vec<FinishedFrame<S>> {
        let mut ready = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if !entry.get().unresolved.is_empty() {
                break;
            }
            let pending = entry.remove();
            ready.push(self.finalize(pending.frame));
        }
        if !ready.is_empty() {
            log::trace!(
                "Released {} frames, {} still buffered",
                ready.len(),
                self.pending.len()
            );
        }
        ready
    }

    fn finalize(&mut self, frame: TrackedFrame<S>) -> FinishedFrame<S> {
        let no = frame.no;
        let last_observed = &self.last_observed;
        let finished = frame.finish(
            |frame_no, track_id| last_observed.get(&track_id) == Some(&frame_no),
            &self.discarded,
            self.keep_discarded,
        );

        // frames leave in order, so a track whose last frame is out has no
        // buffered frames left
        let done: Vec<TrackId> = self
            .last_observed
            .iter()
            .filter(|&(_, &last)| last <= no)
            .map(|(&id, _)| id)
            .collect();
        for track_id in done {
            self.last_observed.remove(&track_id);
            self.discarded.remove(&track_id);
        }
        finished
    }
}

/// Tracker wrapper producing finished frames
///
/// Same input as the wrapped tracker, but the output carries complete
/// lifecycle flags and is strictly ordered by frame number.
#[derive(Debug)]
pub struct FinalizingTracker<T> {
    tracker: T,
    keep_discarded: bool,
}

impl FinalizingTracker<IouTracker> {
    /// IOU tracker with finalization, configured and validated in one step
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(IouTracker::new(config.iou)?, config.keep_discarded))
    }
}

impl<T> FinalizingTracker<T> {
    pub fn new(tracker: T, keep_discarded: bool) -> Self {
        Self {
            tracker,
            keep_discarded,
        }
    }

    pub fn inner(&self) -> &T {
        &self.tracker
    }

    pub fn into_inner(self) -> T {
        self.tracker
    }

    /// Lazily track and finalize a whole frame stream
    pub fn track<S, I>(&mut self, frames: I) -> FinishedFrames<'_, S, T, I::IntoIter>
    where
        T: Tracker<S>,
        I: IntoIterator<Item = Frame<S>>,
    {
        FinishedFrames {
            tracked: self.tracker.track(frames),
            buffer: FinalizationBuffer::new(self.keep_discarded),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

/// Lazy stream returned by [`FinalizingTracker::track`]
///
/// Single pass and fused after the first error; frames still buffered when
/// iteration stops early are lost.
pub struct FinishedFrames<'a, S, T, I> {
    tracked: TrackedFrames<'a, T, I>,
    buffer: FinalizationBuffer<S>,
    ready: VecDeque<FinishedFrame<S>>,
    done: bool,
}

impl<'a, S, T, I> FinishedFrames<'a, S, T, I> {
    pub fn buffered_frames(&self) -> usize {
        self.buffer.buffered_frames()
    }
}

impl<'a, S, T, I> Iterator for FinishedFrames<'a, S, T, I>
where
    T: Tracker<S>,
    I: Iterator<Item = Frame<S>>,
{
    type Item = Result<FinishedFrame<S>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Some(Ok(frame));
            }
            if self.done {
                return None;
            }

            let released = match self.tracked.next() {
                Some(Ok(TrackedItem::Frame(frame))) => self.buffer.push(frame),
                Some(Ok(TrackedItem::Flush(flush))) => {
                    self.buffer.resolve(flush).map(|mut released| {
                        released.extend(self.buffer.drain());
                        released
                    })
                }
                Some(Err(e)) => Err(e),
                None => {
                    self.done = true;
                    Ok(self.buffer.drain())
                }
            };

            match released {
                Ok(frames) => self.ready.extend(frames),
                Err(e) => {
                    log::warn!("Finalization aborted: {}", e);
                    self.done = true;
                    self.ready.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
