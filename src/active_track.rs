//! Working state of a single track while it can still receive detections

use crate::bbox::Bbox;
use crate::config::IouParameters;
use crate::detection::{Detection, TrackId};
use crate::frame::FrameNo;

/// Outcome of a track once it stops being pursued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFate {
    /// Long and confident enough to be a real object
    Finished,
    /// Too short or never confident enough; treated as noise
    Discarded,
}

#[derive(Debug, Clone)]
pub struct ActiveTrack {
    /// track id
    pub id: TrackId,
    /// frame numbers of all matched detections
    pub frames: Vec<FrameNo>,
    pub bboxes: Vec<Bbox<f32>>,
    pub confidences: Vec<f32>,
    pub labels: Vec<String>,
    pub max_confidence: f32,
    /// number of consecutive frames without a matching detection
    pub age: u32,
    pub start_frame: FrameNo,
}

impl ActiveTrack {
    /// Start a new track from an unmatched detection
    pub fn new(id: TrackId, frame: FrameNo, detection: &Detection) -> Self {
        ActiveTrack {
            id,
            frames: vec![frame],
            bboxes: vec![detection.bbox()],
            confidences: vec![detection.conf],
            labels: vec![detection.label.clone()],
            max_confidence: detection.conf,
            age: 0,
            start_frame: frame,
        }
    }

    /// Extend the track with a matched detection
    pub fn extend(&mut self, frame: FrameNo, detection: &Detection) {
        self.frames.push(frame);
        self.bboxes.push(detection.bbox());
        self.confidences.push(detection.conf);
        self.labels.push(detection.label.clone());
        self.max_confidence = self.max_confidence.max(detection.conf);
        self.age = 0;
    }

    /// Box of the most recent detection, used for matching
    pub fn last_bbox(&self) -> &Bbox<f32> {
        // a track is created with one box and never loses any
        &self.bboxes[self.bboxes.len() - 1]
    }

    pub fn last_frame(&self) -> FrameNo {
        self.frames.last().copied().unwrap_or(self.start_frame)
    }

    /// Frames between first and last detection
    pub fn frame_span(&self) -> FrameNo {
        self.last_frame() - self.start_frame
    }

    /// Age the track by one unmatched frame.
    /// Returns the fate if the miss tolerance is now exceeded.
    pub fn miss(&mut self, params: &IouParameters) -> Option<TrackFate> {
        self.age += 1;
        if self.age <= params.t_miss_max {
            None
        } else {
            Some(self.fate(params))
        }
    }

    /// Finish/discard decision, independent of age
    pub fn fate(&self, params: &IouParameters) -> TrackFate {
        if self.max_confidence >= params.sigma_h && self.frame_span() >= FrameNo::from(params.t_min) {
            TrackFate::Finished
        } else {
            TrackFate::Discarded
        }
    }

    /// Most frequent label, ties going to the label seen first
    pub fn majority_label(&self) -> &str {
        let mut best: Option<(&str, usize)> = None;
        for label in &self.labels {
            let count = self.labels.iter().filter(|l| *l == label).count();
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((label.as_str(), count));
            }
        }
        best.map_or("", |(label, _)| label)
    }
}
