use chrono::{DateTime, Utc};
use serde::Serialize;

use super::MediaCandidate;

/// The aggregator's published view of what is playing.
///
/// Snapshots are shared behind `Arc` and never mutated once published; every
/// decision produces a fresh one with a higher `version`.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentMediaSnapshot {
    /// Monotonically increasing publish counter. Zero is the empty start state.
    pub version: u64,
    /// The winning candidate, or `None` when nothing is playing.
    pub media: Option<MediaCandidate>,
    /// When the aggregator made this decision.
    pub last_updated: DateTime<Utc>,
    /// Served without a fresh re-evaluation.
    pub cached: bool,
}

impl CurrentMediaSnapshot {
    /// The empty snapshot every aggregator starts with.
    pub fn initial() -> Self {
        Self {
            version: 0,
            media: None,
            last_updated: Utc::now(),
            cached: false,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.media.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_is_absent() {
        let snapshot = CurrentMediaSnapshot::initial();
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.is_absent());
        assert!(!snapshot.cached);
    }

    #[test]
    fn test_absent_serializes_media_null() {
        let json = serde_json::to_value(CurrentMediaSnapshot::initial()).unwrap();
        assert!(json["media"].is_null());
        assert_eq!(json["cached"], false);
        assert!(json["last_updated"].is_string());
    }
}
