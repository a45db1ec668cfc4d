//! Frames of detections and their tracked / finished forms

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::detection::{Detection, DetectionRecord, FinishedDetection, TrackId, TrackedDetection};

/// Frame number, unique and increasing across one stream
pub type FrameNo = u64;

/// Pixel layout of a pass-through image payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    RGB,
    BGR,
    RGBA,
    BGRA,
    Grayscale,
}

/// Raw frame image, carried along but never interpreted by tracking
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageData {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
        }
    }
}

/// One frame of untracked detections.
///
/// `S` is an opaque provenance, e.g. the path of the detection file the
/// frame was parsed from.
#[derive(Debug, Clone)]
pub struct Frame<S> {
    pub no: FrameNo,
    pub occurrence: DateTime<Utc>,
    pub source: S,
    pub detections: Vec<Detection>,
    pub image: Option<Arc<ImageData>>,
}

impl<S> Frame<S> {
    pub fn new(no: FrameNo, occurrence: DateTime<Utc>, source: S, detections: Vec<Detection>) -> Self {
        Self {
            no,
            occurrence,
            source,
            detections,
            image: None,
        }
    }

    pub fn with_image(mut self, image: Arc<ImageData>) -> Self {
        self.image = Some(image);
        self
    }
}

/// Shift the frame numbers of a chunk by `offset`.
///
/// Used when concatenating several sources whose numbering each restarts at
/// 1 into a single, globally increasing stream.
pub fn offset_frames<S, I>(frames: I, offset: FrameNo) -> impl Iterator<Item = Frame<S>>
where
    I: IntoIterator<Item = Frame<S>>,
{
    frames.into_iter().map(move |mut frame| {
        frame.no += offset;
        frame
    })
}

/// Frame whose detections are assigned to tracks.
///
/// Observed and unfinished tracks are derived from the detections and the
/// finished/discarded sets rather than stored, so they cannot diverge.
#[derive(Debug, Clone)]
pub struct TrackedFrame<S> {
    pub no: FrameNo,
    pub occurrence: DateTime<Utc>,
    pub source: S,
    pub detections: Vec<TrackedDetection>,
    pub image: Option<Arc<ImageData>>,
    /// Tracks that were just completed successfully and are no longer pursued
    pub finished_tracks: BTreeSet<TrackId>,
    /// Tracks that were just given up as noise
    pub discarded_tracks: BTreeSet<TrackId>,
}

impl<S> TrackedFrame<S> {
    pub fn observed_tracks(&self) -> BTreeSet<TrackId> {
        self.detections.iter().map(|d| d.track_id).collect()
    }

    pub fn unfinished_tracks(&self) -> BTreeSet<TrackId> {
        self.detections
            .iter()
            .map(|d| d.track_id)
            .filter(|id| !self.finished_tracks.contains(id) && !self.discarded_tracks.contains(id))
            .collect()
    }

    /// Stamp every detection with its lifecycle flags.
    ///
    /// `is_last` decides whether this frame holds the last detection of a
    /// track; `discarded` is every track known to be discarded. Detections of
    /// discarded tracks are dropped unless `keep_discarded` is set.
    pub fn finish<F>(
        self,
        is_last: F,
        discarded: &BTreeSet<TrackId>,
        keep_discarded: bool,
    ) -> FinishedFrame<S>
    where
        F: Fn(FrameNo, TrackId) -> bool,
    {
        let no = self.no;
        let mut discarded_tracks = self.discarded_tracks;
        discarded_tracks.extend(
            self.detections
                .iter()
                .map(|d| d.track_id)
                .filter(|id| discarded.contains(id)),
        );
        let detections = self
            .detections
            .into_iter()
            .filter_map(|det| {
                let is_discarded = discarded.contains(&det.track_id);
                if is_discarded && !keep_discarded {
                    return None;
                }
                let last = is_last(no, det.track_id);
                Some(det.finish(last, is_discarded))
            })
            .collect();

        FinishedFrame {
            no,
            occurrence: self.occurrence,
            source: self.source,
            detections,
            image: self.image,
            finished_tracks: self.finished_tracks,
            discarded_tracks,
        }
    }
}

/// Terminal frame representation with complete first/last/discarded flags
#[derive(Debug, Clone)]
pub struct FinishedFrame<S> {
    pub no: FrameNo,
    pub occurrence: DateTime<Utc>,
    pub source: S,
    pub detections: Vec<FinishedDetection>,
    pub image: Option<Arc<ImageData>>,
    pub finished_tracks: BTreeSet<TrackId>,
    /// Tracks discarded at this frame or observed here and later discarded
    pub discarded_tracks: BTreeSet<TrackId>,
}

impl<S> FinishedFrame<S> {
    pub fn observed_tracks(&self) -> BTreeSet<TrackId> {
        self.detections.iter().map(|d| d.track_id).collect()
    }

    /// Flatten into serializable records, sorted by track id
    pub fn to_detection_records(&self) -> Vec<DetectionRecord> {
        let occurrence = self.occurrence.timestamp_micros() as f64 / 1_000_000.0;
        let mut records: Vec<DetectionRecord> = self
            .detections
            .iter()
            .map(|d| DetectionRecord::new(d, self.no, occurrence))
            .collect();
        records.sort_by_key(|r| r.track_id);
        records
    }
}
