//! Absent-resource bookkeeping.
//!
//! A tile that the server cannot or will not provide is marked absent so
//! render-time lookups stop enqueueing fetches for it. Marks are permanent
//! for the session: nothing expires them, and re-fetch happens only after
//! an explicit clear (a user-triggered refresh) or a successful fetch that
//! raced an earlier mark.

use std::fmt;
use std::time::SystemTime;

use dashmap::DashMap;
use tracing::debug;

use crate::coord::TileId;

/// Why a tile was marked absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    /// Server answered 204 No Content: the tile does not exist.
    NoContent,
    /// Server answered with a non-success status.
    HttpStatus(u16),
    /// Server answered 200 with an error document instead of imagery.
    ErrorDocument,
    /// Payload could not be decoded.
    CorruptData,
    /// Decoded image failed content validation.
    InvalidTile,
}

impl fmt::Display for AbsentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbsentReason::NoContent => write!(f, "no content"),
            AbsentReason::HttpStatus(status) => write!(f, "HTTP status {}", status),
            AbsentReason::ErrorDocument => write!(f, "error document"),
            AbsentReason::CorruptData => write!(f, "corrupt data"),
            AbsentReason::InvalidTile => write!(f, "invalid tile content"),
        }
    }
}

/// A recorded absence.
#[derive(Debug, Clone)]
pub struct AbsentMark {
    /// Why the tile is absent.
    pub reason: AbsentReason,
    /// When the mark was recorded.
    pub marked_at: SystemTime,
}

/// Concurrent map of absent tiles.
pub struct AbsentResourceTracker {
    marks: DashMap<TileId, AbsentMark>,
}

impl AbsentResourceTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            marks: DashMap::new(),
        }
    }

    /// Marks a tile absent. A later mark replaces an earlier reason.
    pub fn mark(&self, id: &TileId, reason: AbsentReason) {
        debug!(tile = %id, %reason, "marking tile absent");
        self.marks.insert(
            id.clone(),
            AbsentMark {
                reason,
                marked_at: SystemTime::now(),
            },
        );
    }

    /// True if the tile is currently marked absent.
    pub fn is_absent(&self, id: &TileId) -> bool {
        self.marks.contains_key(id)
    }

    /// The mark for a tile, if any.
    pub fn mark_info(&self, id: &TileId) -> Option<AbsentMark> {
        self.marks.get(id).map(|entry| entry.value().clone())
    }

    /// Clears the mark for a tile. Returns true if one was present.
    pub fn clear(&self, id: &TileId) -> bool {
        self.marks.remove(id).is_some()
    }

    /// Clears every mark for a dataset. Returns the number cleared.
    pub fn clear_dataset(&self, dataset: &str) -> usize {
        let before = self.marks.len();
        self.marks.retain(|id, _| id.dataset.as_ref() != dataset);
        before - self.marks.len()
    }

    /// Number of marked tiles.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// True if nothing is marked.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

impl Default for AbsentResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::TileAddress;

    fn id(dataset: &str, col: u32) -> TileId {
        TileId::new(dataset.to_string(), TileAddress::new(4, 2, col))
    }

    #[test]
    fn test_mark_and_check() {
        let tracker = AbsentResourceTracker::new();
        let tile = id("a", 1);

        assert!(!tracker.is_absent(&tile));
        tracker.mark(&tile, AbsentReason::NoContent);
        assert!(tracker.is_absent(&tile));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_clear() {
        let tracker = AbsentResourceTracker::new();
        let tile = id("a", 1);

        tracker.mark(&tile, AbsentReason::ErrorDocument);
        assert!(tracker.clear(&tile));
        assert!(!tracker.is_absent(&tile));
        assert!(!tracker.clear(&tile));
    }

    #[test]
    fn test_marks_do_not_expire() {
        let tracker = AbsentResourceTracker::new();
        let tile = id("a", 1);

        tracker.mark(&tile, AbsentReason::HttpStatus(500));
        // No time-based path exists; only clear() removes the mark
        assert!(tracker.is_absent(&tile));
        let info = tracker.mark_info(&tile).unwrap();
        assert_eq!(info.reason, AbsentReason::HttpStatus(500));
    }

    #[test]
    fn test_later_mark_replaces_reason() {
        let tracker = AbsentResourceTracker::new();
        let tile = id("a", 1);

        tracker.mark(&tile, AbsentReason::CorruptData);
        tracker.mark(&tile, AbsentReason::NoContent);
        assert_eq!(
            tracker.mark_info(&tile).unwrap().reason,
            AbsentReason::NoContent
        );
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_clear_dataset() {
        let tracker = AbsentResourceTracker::new();
        tracker.mark(&id("a", 1), AbsentReason::NoContent);
        tracker.mark(&id("a", 2), AbsentReason::NoContent);
        tracker.mark(&id("b", 1), AbsentReason::NoContent);

        assert_eq!(tracker.clear_dataset("a"), 2);
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_absent(&id("b", 1)));
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(AbsentReason::NoContent.to_string(), "no content");
        assert_eq!(AbsentReason::HttpStatus(503).to_string(), "HTTP status 503");
    }
}
