mod candidate;
mod snapshot;

pub use candidate::{MediaCandidate, PlaybackStatus, RawCandidate};
pub use snapshot::CurrentMediaSnapshot;
