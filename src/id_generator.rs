//! Track id allocation

use crate::detection::TrackId;

/// Hands out strictly increasing track ids, never reusing one.
#[derive(Debug, Clone)]
pub struct TrackIdGenerator {
    first: TrackId,
    /// `None` once `TrackId::MAX` has been handed out
    next: Option<TrackId>,
}

impl TrackIdGenerator {
    /// Generator starting at 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Generator starting at `first` (clamped to 1); lets a later run
    /// continue the id space of an earlier one.
    pub fn starting_at(first: TrackId) -> Self {
        let first = first.max(1);
        Self {
            first,
            next: Some(first),
        }
    }

    /// Restart from the initial id
    pub fn reset(&mut self) {
        self.next = Some(self.first);
    }
}

impl Default for TrackIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for TrackIdGenerator {
    type Item = TrackId;

    fn next(&mut self) -> Option<TrackId> {
        let id = self.next?;
        self.next = id.checked_add(1);
        Some(id)
    }
}
