//! Greedy IOU tracker
//! Based on "High-Speed Tracking-by-Detection Without Using Image Information"
//! (Bochinski, Eiselein, Sikora), extended with a miss tolerance.

use std::collections::{BTreeMap, BTreeSet};

use crate::active_track::{ActiveTrack, TrackFate};
use crate::bbox::{iou_matrix, Bbox};
use crate::config::IouParameters;
use crate::detection::{Detection, TrackId, TrackedDetection};
use crate::error::{Result, TrackingError};
use crate::frame::{Frame, FrameNo, TrackedFrame};
use crate::id_generator::TrackIdGenerator;
use crate::trackers::{TrackFlush, Tracker};

/// Per-frame association result before it is assembled into a frame
#[derive(Debug, Default)]
struct Association {
    tracked: Vec<TrackedDetection>,
    finished: BTreeSet<TrackId>,
    discarded: BTreeSet<TrackId>,
    extended: usize,
}

/// IOU tracker with greedy best-overlap association
///
/// Active tracks are visited in ascending track id order, so when two tracks
/// compete for the same detection the older track wins. Among candidates of
/// equal overlap a track takes the one listed first in the frame.
#[derive(Debug, Clone)]
pub struct IouTracker {
    pub params: IouParameters,
    id_generator: TrackIdGenerator,
    tracklets: BTreeMap<TrackId, ActiveTrack>,
    last_frame: Option<FrameNo>,
    /// frames tracked in the current run
    frames_tracked: u64,
}

impl IouTracker {
    pub fn new(params: IouParameters) -> Result<Self> {
        Self::with_id_generator(params, TrackIdGenerator::new())
    }

    pub fn with_id_generator(params: IouParameters, id_generator: TrackIdGenerator) -> Result<Self> {
        params.validate()?;
        log::info!(
            "Creating IouTracker: sigma_l={:.3}, sigma_h={:.3}, sigma_iou={:.3}, t_min={}, t_miss_max={}",
            params.sigma_l,
            params.sigma_h,
            params.sigma_iou,
            params.t_min,
            params.t_miss_max
        );
        Ok(IouTracker {
            params,
            id_generator,
            tracklets: BTreeMap::new(),
            last_frame: None,
            frames_tracked: 0,
        })
    }

    /// Read-only view of the active tracks, ordered by id
    pub fn tracklets(&self) -> impl Iterator<Item = &ActiveTrack> {
        self.tracklets.values()
    }

    fn check_frame(&self, frame_no: FrameNo, detections: &[Detection]) -> Result<()> {
        if let Some(previous) = self.last_frame {
            if frame_no <= previous {
                return Err(TrackingError::FrameOutOfOrder {
                    previous,
                    received: frame_no,
                });
            }
        }
        for (index, det) in detections.iter().enumerate() {
            det.validate(frame_no, index)?;
        }
        Ok(())
    }

    /// Extend, age and terminate the active tracks, then start new tracks
    /// from whatever detections are left over.
    fn associate(&mut self, frame_no: FrameNo, detections: Vec<Detection>) -> Result<Association> {
        let candidates: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.conf >= self.params.sigma_l)
            .collect();
        let candidate_boxes: Vec<Bbox<f32>> = candidates.iter().map(Detection::bbox).collect();
        let track_boxes: Vec<Bbox<f32>> = self.tracklets.values().map(|t| *t.last_bbox()).collect();
        let ious = iou_matrix(&track_boxes, &candidate_boxes);

        // candidate slots are emptied as tracks claim them
        let mut remaining: Vec<Option<Detection>> = candidates.into_iter().map(Some).collect();
        let mut result = Association::default();
        let mut terminated = Vec::new();

        for (row, (&track_id, track)) in self.tracklets.iter_mut().enumerate() {
            let mut best: Option<(usize, f32)> = None;
            for (col, slot) in remaining.iter().enumerate() {
                if slot.is_none() {
                    continue;
                }
                let iou = ious[[row, col]];
                if best.map_or(true, |(_, best_iou)| iou > best_iou) {
                    best = Some((col, iou));
                }
            }

            if let Some((col, iou)) = best.filter(|&(_, iou)| iou >= self.params.sigma_iou) {
                if let Some(det) = remaining[col].take() {
                    log::trace!("Frame {}: track {} extended (iou={:.3})", frame_no, track_id, iou);
                    track.extend(frame_no, &det);
                    result.tracked.push(det.of_track(track_id, false));
                    result.extended += 1;
                    continue;
                }
            }

            if let Some(fate) = track.miss(&self.params) {
                log::debug!(
                    "Frame {}: track {} ({}) {:?} after {} frames, max_conf={:.3}",
                    frame_no,
                    track_id,
                    track.majority_label(),
                    fate,
                    track.frames.len(),
                    track.max_confidence
                );
                match fate {
                    TrackFate::Finished => result.finished.insert(track_id),
                    TrackFate::Discarded => result.discarded.insert(track_id),
                };
                terminated.push(track_id);
            }
        }

        for track_id in terminated {
            self.tracklets.remove(&track_id);
        }

        for det in remaining.into_iter().flatten() {
            let track_id = self
                .id_generator
                .next()
                .ok_or(TrackingError::TrackIdsExhausted { frame: frame_no })?;
            self.tracklets
                .insert(track_id, ActiveTrack::new(track_id, frame_no, &det));
            result.tracked.push(det.of_track(track_id, true));
        }

        Ok(result)
    }
}

impl<S> Tracker<S> for IouTracker {
    fn track_frame(&mut self, frame: Frame<S>) -> Result<TrackedFrame<S>> {
        self.check_frame(frame.no, &frame.detections)?;
        self.last_frame = Some(frame.no);

        let Frame {
            no,
            occurrence,
            source,
            detections,
            image,
        } = frame;
        let n_input = detections.len();
        let association = self.associate(no, detections)?;
        self.frames_tracked += 1;

        log::debug!(
            "Frame {}: {} detections, {} extended, {} started, {} finished, {} discarded, {} active",
            no,
            n_input,
            association.extended,
            association.tracked.len() - association.extended,
            association.finished.len(),
            association.discarded.len(),
            self.tracklets.len()
        );

        Ok(TrackedFrame {
            no,
            occurrence,
            source,
            detections: association.tracked,
            image,
            finished_tracks: association.finished,
            discarded_tracks: association.discarded,
        })
    }

    fn flush(&mut self) -> TrackFlush {
        let mut flush = TrackFlush::default();
        for (track_id, track) in std::mem::take(&mut self.tracklets) {
            match track.fate(&self.params) {
                TrackFate::Finished => flush.finished_tracks.insert(track_id),
                TrackFate::Discarded => flush.discarded_tracks.insert(track_id),
            };
        }
        log::debug!(
            "End of stream after {} frames: {} tracks finished, {} discarded",
            self.frames_tracked,
            flush.finished_tracks.len(),
            flush.discarded_tracks.len()
        );
        // the next frame starts a new run; track ids keep counting
        self.last_frame = None;
        self.frames_tracked = 0;
        flush
    }

    fn reset(&mut self) {
        self.tracklets.clear();
        self.id_generator.reset();
        self.last_frame = None;
        self.frames_tracked = 0;
    }

    fn active_track_count(&self) -> usize {
        self.tracklets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trackers::TrackedItem;
    use chrono::Utc;

    fn frame(no: FrameNo, detections: Vec<Detection>) -> Frame<&'static str> {
        Frame::new(no, Utc::now(), "test.otdet", detections)
    }

    fn car(x: f32, conf: f32) -> Detection {
        Detection::new("car", conf, x, 50.0, 20.0, 20.0)
    }

    fn params(t_min: u32, t_miss_max: u32) -> IouParameters {
        IouParameters::new(0.1, 0.5, 0.3, t_min, t_miss_max)
    }

    #[test]
    fn test_new_tracks_from_unmatched() {
        let mut tracker = IouTracker::new(params(0, 0)).unwrap();
        let tracked = tracker
            .track_frame(frame(1, vec![car(10.0, 0.9), car(200.0, 0.8)]))
            .unwrap();

        assert_eq!(tracked.detections.len(), 2);
        assert!(tracked.detections.iter().all(|d| d.is_first));
        assert_eq!(tracked.observed_tracks(), BTreeSet::from([1, 2]));
        assert_eq!(tracked.unfinished_tracks(), BTreeSet::from([1, 2]));
        assert_eq!(Tracker::<&str>::active_track_count(&tracker), 2);
    }

    #[test]
    fn test_low_confidence_ignored() {
        let mut tracker = IouTracker::new(params(0, 0)).unwrap();
        let tracked = tracker
            .track_frame(frame(1, vec![car(10.0, 0.05)]))
            .unwrap();
        assert!(tracked.detections.is_empty());
        assert_eq!(Tracker::<&str>::active_track_count(&tracker), 0);
    }

    #[test]
    fn test_track_extended_on_overlap() {
        let mut tracker = IouTracker::new(params(0, 0)).unwrap();
        tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        let tracked = tracker.track_frame(frame(2, vec![car(12.0, 0.9)])).unwrap();

        assert_eq!(tracked.detections.len(), 1);
        assert_eq!(tracked.detections[0].track_id, 1);
        assert!(!tracked.detections[0].is_first);
    }

    #[test]
    fn test_detection_matched_to_one_track_only() {
        let mut tracker = IouTracker::new(params(0, 5)).unwrap();
        tracker
            .track_frame(frame(1, vec![car(10.0, 0.9), car(12.0, 0.9)]))
            .unwrap();
        let tracked = tracker.track_frame(frame(2, vec![car(11.0, 0.9)])).unwrap();

        // the older track claims the detection, the other one ages
        assert_eq!(tracked.detections.len(), 1);
        assert_eq!(tracked.detections[0].track_id, 1);
        let ages: Vec<u32> = tracker.tracklets().map(|t| t.age).collect();
        assert_eq!(ages, vec![0, 1]);
    }

    #[test]
    fn test_equal_overlap_prefers_first_candidate() {
        let mut tracker = IouTracker::new(params(0, 0)).unwrap();
        tracker.track_frame(frame(1, vec![car(50.0, 0.9)])).unwrap();
        let tracked = tracker
            .track_frame(frame(2, vec![car(55.0, 0.6), car(45.0, 0.7)]))
            .unwrap();

        let extended = tracked.detections.iter().find(|d| d.track_id == 1).unwrap();
        assert_eq!(extended.x, 55.0);
        assert_eq!(tracked.detections.iter().filter(|d| d.is_first).count(), 1);
    }

    #[test]
    fn test_miss_tolerance_keeps_track() {
        let mut tracker = IouTracker::new(params(0, 2)).unwrap();
        tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        for no in 2..=3 {
            let tracked = tracker.track_frame(frame(no, vec![])).unwrap();
            assert!(tracked.finished_tracks.is_empty());
            assert!(tracked.discarded_tracks.is_empty());
        }
        let tracked = tracker.track_frame(frame(4, vec![car(10.0, 0.9)])).unwrap();
        assert_eq!(tracked.detections[0].track_id, 1);
        assert!(!tracked.detections[0].is_first);
    }

    #[test]
    fn test_track_finished_after_miss_tolerance() {
        let mut tracker = IouTracker::new(params(2, 1)).unwrap();
        for no in 1..=3 {
            tracker.track_frame(frame(no, vec![car(10.0, 0.9)])).unwrap();
        }
        let tracked = tracker.track_frame(frame(4, vec![])).unwrap();
        assert!(tracked.finished_tracks.is_empty());
        let tracked = tracker.track_frame(frame(5, vec![])).unwrap();
        assert_eq!(tracked.finished_tracks, BTreeSet::from([1]));
        assert_eq!(Tracker::<&str>::active_track_count(&tracker), 0);
    }

    #[test]
    fn test_short_track_discarded() {
        let mut tracker = IouTracker::new(params(3, 0)).unwrap();
        tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        let tracked = tracker.track_frame(frame(2, vec![])).unwrap();
        assert_eq!(tracked.discarded_tracks, BTreeSet::from([1]));
    }

    #[test]
    fn test_track_never_confident_discarded() {
        let mut tracker = IouTracker::new(params(0, 0)).unwrap();
        tracker.track_frame(frame(1, vec![car(10.0, 0.4)])).unwrap();
        tracker.track_frame(frame(2, vec![car(10.0, 0.4)])).unwrap();
        let tracked = tracker.track_frame(frame(3, vec![])).unwrap();
        assert_eq!(tracked.discarded_tracks, BTreeSet::from([1]));
    }

    #[test]
    fn test_flush_resolves_active_tracks() {
        let mut tracker = IouTracker::new(params(1, 10)).unwrap();
        tracker
            .track_frame(frame(1, vec![car(10.0, 0.9), car(300.0, 0.9)]))
            .unwrap();
        tracker.track_frame(frame(2, vec![car(10.0, 0.9)])).unwrap();

        let flush = Tracker::<&str>::flush(&mut tracker);
        assert_eq!(flush.finished_tracks, BTreeSet::from([1]));
        assert_eq!(flush.discarded_tracks, BTreeSet::from([2]));
        assert_eq!(Tracker::<&str>::active_track_count(&tracker), 0);
    }

    #[test]
    fn test_out_of_order_frame_rejected() {
        let mut tracker = IouTracker::new(params(0, 0)).unwrap();
        tracker.track_frame(frame(5, vec![])).unwrap();
        let err = tracker.track_frame(frame(5, vec![])).unwrap_err();
        assert!(matches!(
            err,
            TrackingError::FrameOutOfOrder {
                previous: 5,
                received: 5
            }
        ));
        assert!(tracker.track_frame(frame(3, vec![])).is_err());
    }

    #[test]
    fn test_malformed_frame_rejected_without_state_change() {
        let mut tracker = IouTracker::new(params(0, 0)).unwrap();
        let bad = Detection::new("car", 0.9, 1.0, 1.0, -2.0, 1.0);
        let err = tracker
            .track_frame(frame(1, vec![car(10.0, 0.9), bad]))
            .unwrap_err();
        assert!(matches!(
            err,
            TrackingError::MalformedDetection { frame: 1, index: 1, .. }
        ));
        assert_eq!(Tracker::<&str>::active_track_count(&tracker), 0);
        assert!(tracker.track_frame(frame(1, vec![])).is_ok());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(IouTracker::new(IouParameters::new(0.1, 0.5, 1.2, 0, 0)).is_err());
    }

    #[test]
    fn test_track_stream_appends_flush() {
        let mut tracker = IouTracker::new(params(0, 3)).unwrap();
        let frames = vec![frame(1, vec![car(10.0, 0.9)]), frame(2, vec![car(10.0, 0.9)])];
        let items: Vec<TrackedItem<&str>> = tracker.track(frames).collect::<Result<_>>().unwrap();

        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], TrackedItem::Frame(f) if f.no == 1));
        assert!(matches!(&items[1], TrackedItem::Frame(f) if f.no == 2));
        match &items[2] {
            TrackedItem::Flush(flush) => assert_eq!(flush.finished_tracks, BTreeSet::from([1])),
            other => panic!("expected flush, got {other:?}"),
        }
    }

    #[test]
    fn test_track_stream_stops_after_error() {
        let mut tracker = IouTracker::new(params(0, 3)).unwrap();
        let frames = vec![frame(2, vec![]), frame(1, vec![]), frame(3, vec![])];
        let items: Vec<Result<TrackedItem<&str>>> = tracker.track(frames).collect();

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    #[test]
    fn test_reset_restarts_ids() {
        let mut tracker = IouTracker::new(params(0, 3)).unwrap();
        tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        Tracker::<&str>::reset(&mut tracker);

        let tracked = tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        assert_eq!(tracked.detections[0].track_id, 1);
    }

    #[test]
    fn test_flush_ends_run_and_keeps_ids() {
        let mut tracker = IouTracker::new(params(0, 3)).unwrap();
        tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        tracker.track_frame(frame(2, vec![car(10.0, 0.9)])).unwrap();
        Tracker::<&str>::flush(&mut tracker);

        let tracked = tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        assert_eq!(tracked.detections[0].track_id, 2);
        assert!(tracked.detections[0].is_first);
    }

    #[test]
    fn test_exhausted_track_ids_abort_frame() {
        let mut tracker =
            IouTracker::with_id_generator(params(0, 3), TrackIdGenerator::starting_at(TrackId::MAX))
                .unwrap();
        let tracked = tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        assert_eq!(tracked.detections[0].track_id, TrackId::MAX);

        let err = tracker
            .track_frame(frame(2, vec![car(10.0, 0.9), car(300.0, 0.9)]))
            .unwrap_err();
        assert!(matches!(err, TrackingError::TrackIdsExhausted { frame: 2 }));
    }

    #[test]
    fn test_custom_id_generator() {
        let mut tracker =
            IouTracker::with_id_generator(params(0, 0), TrackIdGenerator::starting_at(100)).unwrap();
        let tracked = tracker.track_frame(frame(1, vec![car(10.0, 0.9)])).unwrap();
        assert_eq!(tracked.detections[0].track_id, 100);
    }
}
