//! Detection types, from raw detector output to finalized track members

use serde::{Deserialize, Serialize};

use crate::bbox::Bbox;
use crate::error::{Result, TrackingError};
use crate::frame::FrameNo;

/// Process-unique, monotonically assigned track identifier (never 0)
pub type TrackId = u64;

/// A single detector output without any track context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Assigned class label, e.g. vehicle class
    pub label: String,
    /// Confidence of the detected class (0-1)
    pub conf: f32,
    /// X coordinate of the box center
    pub x: f32,
    /// Y coordinate of the box center
    pub y: f32,
    /// Box width
    pub w: f32,
    /// Box height
    pub h: f32,
}

impl Detection {
    pub fn new<L: Into<String>>(label: L, conf: f32, x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            label: label.into(),
            conf,
            x,
            y,
            w,
            h,
        }
    }

    pub fn bbox(&self) -> Bbox<f32> {
        Bbox::from_center(self.x, self.y, self.w, self.h)
    }

    /// Check the geometry contract: finite values and non-negative size.
    /// `frame` and `index` only locate the detection in the error.
    pub fn validate(&self, frame: FrameNo, index: usize) -> Result<()> {
        let fields = [
            ("conf", self.conf),
            ("x", self.x),
            ("y", self.y),
            ("w", self.w),
            ("h", self.h),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TrackingError::malformed(
                frame,
                index,
                format!("{name} is not finite ({value})"),
            ));
        }
        if self.w < 0.0 || self.h < 0.0 {
            return Err(TrackingError::malformed(
                frame,
                index,
                format!("negative box size {}x{}", self.w, self.h),
            ));
        }
        Ok(())
    }

    /// Attach track membership
    pub fn of_track(self, track_id: TrackId, is_first: bool) -> TrackedDetection {
        TrackedDetection {
            detection: self,
            track_id,
            is_first,
        }
    }
}

/// Detection assigned to a track by the association step.
///
/// Whether it is the last detection of its track is unknown at this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
    #[serde(flatten)]
    pub detection: Detection,
    pub track_id: TrackId,
    /// True iff this is the earliest detection of the track
    pub is_first: bool,
}

impl TrackedDetection {
    pub fn finish(self, is_last: bool, is_discarded: bool) -> FinishedDetection {
        FinishedDetection {
            tracked: self,
            is_last,
            is_discarded,
        }
    }
}

impl std::ops::Deref for TrackedDetection {
    type Target = Detection;

    fn deref(&self) -> &Detection {
        &self.detection
    }
}

/// Tracked detection with complete lifecycle flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedDetection {
    #[serde(flatten)]
    pub tracked: TrackedDetection,
    pub is_last: bool,
    pub is_discarded: bool,
}

impl std::ops::Deref for FinishedDetection {
    type Target = TrackedDetection;

    fn deref(&self) -> &TrackedDetection {
        &self.tracked
    }
}

/// Flat record handed to the serialization collaborator, one per
/// finished detection, annotated with its frame number and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(rename = "class")]
    pub label: String,
    pub conf: f32,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    #[serde(rename = "interpolated-detection")]
    pub interpolated: bool,
    pub first: bool,
    pub finished: bool,
    #[serde(rename = "track-id")]
    pub track_id: TrackId,
    pub frame: FrameNo,
    /// Unix timestamp in seconds
    pub occurrence: f64,
}

impl DetectionRecord {
    pub fn new(detection: &FinishedDetection, frame: FrameNo, occurrence: f64) -> Self {
        Self {
            label: detection.label.clone(),
            conf: detection.conf,
            x: detection.x,
            y: detection.y,
            w: detection.w,
            h: detection.h,
            interpolated: false,
            first: detection.is_first,
            finished: detection.is_last,
            track_id: detection.track_id,
            frame,
            occurrence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_zero_size() {
        let det = Detection::new("car", 0.5, 10.0, 10.0, 0.0, 0.0);
        assert!(det.validate(1, 0).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let det = Detection::new("car", 0.5, f32::NAN, 10.0, 5.0, 5.0);
        match det.validate(7, 3) {
            Err(TrackingError::MalformedDetection { frame, index, reason }) => {
                assert_eq!(frame, 7);
                assert_eq!(index, 3);
                assert!(reason.contains('x'));
            }
            other => panic!("expected malformed detection, got {other:?}"),
        }

        let det = Detection::new("car", f32::INFINITY, 1.0, 1.0, 1.0, 1.0);
        assert!(det.validate(1, 0).is_err());
    }

    #[test]
    fn test_validate_rejects_negative_size() {
        let det = Detection::new("car", 0.5, 10.0, 10.0, -1.0, 5.0);
        assert!(matches!(
            det.validate(2, 0),
            Err(TrackingError::MalformedDetection { frame: 2, .. })
        ));
    }

    #[test]
    fn test_lifecycle_conversions_keep_geometry() {
        let det = Detection::new("bicycle", 0.8, 1.0, 2.0, 3.0, 4.0);
        let finished = det.clone().of_track(9, true).finish(true, false);
        assert_eq!(finished.label, "bicycle");
        assert_eq!(finished.track_id, 9);
        assert!(finished.is_first);
        assert!(finished.is_last);
        assert!(!finished.is_discarded);
        assert_eq!(finished.tracked.detection, det);
    }

    #[test]
    fn test_detection_record_keys() {
        let finished = Detection::new("car", 0.9, 1.0, 2.0, 3.0, 4.0)
            .of_track(4, false)
            .finish(true, false);
        let record = DetectionRecord::new(&finished, 12, 1.5);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["class"], "car");
        assert_eq!(value["track-id"], 4);
        assert_eq!(value["finished"], true);
        assert_eq!(value["first"], false);
        assert_eq!(value["interpolated-detection"], false);
        assert_eq!(value["frame"], 12);
    }
}
