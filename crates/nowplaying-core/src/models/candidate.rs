use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Source name used when an adapter reports an empty one.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Playback state as reported by a media source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    #[default]
    #[serde(other)]
    Unknown,
}

impl PlaybackStatus {
    /// Selection rank: playing beats paused beats everything else.
    pub fn priority(self) -> u8 {
        match self {
            PlaybackStatus::Playing => 2,
            PlaybackStatus::Paused => 1,
            PlaybackStatus::Stopped | PlaybackStatus::Unknown => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
            PlaybackStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parse: case-insensitive, anything unrecognized is `Unknown`.
impl FromStr for PlaybackStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "playing" => PlaybackStatus::Playing,
            "paused" => PlaybackStatus::Paused,
            "stopped" => PlaybackStatus::Stopped,
            _ => PlaybackStatus::Unknown,
        })
    }
}

/// An untrusted observation as produced by an adapter.
///
/// Nothing here is validated; [`MediaCandidate::normalize`] turns it into
/// something the aggregator can rank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    /// App, package, or player that produced the observation.
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub position_ms: Option<i64>,
    /// `None` when the adapter could not determine a status at all.
    #[serde(default)]
    pub status: Option<PlaybackStatus>,
    #[serde(default)]
    pub artwork_url: Option<String>,
}

impl RawCandidate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn album(mut self, album: impl Into<String>) -> Self {
        self.album = album.into();
        self
    }

    pub fn duration_ms(mut self, ms: i64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn position_ms(mut self, ms: i64) -> Self {
        self.position_ms = Some(ms);
        self
    }

    pub fn status(mut self, status: PlaybackStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn artwork_url(mut self, url: impl Into<String>) -> Self {
        self.artwork_url = Some(url.into());
        self
    }
}

/// A normalized observation, stamped by the aggregator on receipt.
#[derive(Debug, Clone, Serialize)]
pub struct MediaCandidate {
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(rename = "duration")]
    pub duration_ms: Option<u64>,
    #[serde(rename = "position")]
    pub position_ms: Option<u64>,
    pub status: PlaybackStatus,
    pub source: String,
    pub artwork_url: Option<String>,
    /// Monotonic receipt time, drives freshness and recency.
    #[serde(skip)]
    pub received_at: Instant,
    /// Wall-clock receipt time.
    #[serde(skip)]
    pub observed_at: DateTime<Utc>,
}

impl MediaCandidate {
    /// Clamp and clean a raw observation. Never fails: bad fields are
    /// dropped rather than rejecting the whole candidate.
    pub fn normalize(raw: RawCandidate, received_at: Instant, observed_at: DateTime<Utc>) -> Self {
        let source = raw.source.trim();
        let source = if source.is_empty() {
            UNKNOWN_SOURCE.to_string()
        } else {
            source.to_string()
        };

        Self {
            title: raw.title.trim().to_string(),
            artist: raw.artist.trim().to_string(),
            album: raw.album.trim().to_string(),
            duration_ms: non_negative(raw.duration_ms),
            position_ms: non_negative(raw.position_ms),
            status: raw.status.unwrap_or_default(),
            source,
            artwork_url: raw
                .artwork_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            received_at,
            observed_at,
        }
    }

    /// True when every field a client can see matches. Receipt times are ignored.
    pub fn same_display(&self, other: &MediaCandidate) -> bool {
        self.source == other.source
            && self.title == other.title
            && self.artist == other.artist
            && self.album == other.album
            && self.duration_ms == other.duration_ms
            && self.position_ms == other.position_ms
            && self.status == other.status
            && self.artwork_url == other.artwork_url
    }
}

fn non_negative(value: Option<i64>) -> Option<u64> {
    value.and_then(|v| u64::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(raw: RawCandidate) -> MediaCandidate {
        MediaCandidate::normalize(raw, Instant::now(), Utc::now())
    }

    #[test]
    fn test_status_priority_order() {
        assert!(PlaybackStatus::Playing.priority() > PlaybackStatus::Paused.priority());
        assert!(PlaybackStatus::Paused.priority() > PlaybackStatus::Stopped.priority());
        assert_eq!(
            PlaybackStatus::Stopped.priority(),
            PlaybackStatus::Unknown.priority()
        );
    }

    #[test]
    fn test_status_parse_is_lenient() {
        assert_eq!("Playing".parse::<PlaybackStatus>(), Ok(PlaybackStatus::Playing));
        assert_eq!(" PAUSED ".parse::<PlaybackStatus>(), Ok(PlaybackStatus::Paused));
        assert_eq!("buffering".parse::<PlaybackStatus>(), Ok(PlaybackStatus::Unknown));
    }

    #[test]
    fn test_status_deserialize_unknown_value() {
        let status: PlaybackStatus = serde_json::from_str("\"cached\"").unwrap();
        assert_eq!(status, PlaybackStatus::Unknown);
    }

    #[test]
    fn test_normalize_clamps_negative_numbers() {
        let c = stamp(
            RawCandidate::new("mpv")
                .duration_ms(-1)
                .position_ms(1500)
                .status(PlaybackStatus::Playing),
        );
        assert_eq!(c.duration_ms, None);
        assert_eq!(c.position_ms, Some(1500));
    }

    #[test]
    fn test_normalize_missing_status_and_source() {
        let c = stamp(RawCandidate::new("   ").title("  Song  "));
        assert_eq!(c.source, UNKNOWN_SOURCE);
        assert_eq!(c.title, "Song");
        assert_eq!(c.status, PlaybackStatus::Unknown);
    }

    #[test]
    fn test_normalize_drops_blank_artwork() {
        let c = stamp(RawCandidate::new("Spotify").artwork_url("  "));
        assert_eq!(c.artwork_url, None);
    }

    #[test]
    fn test_same_display_ignores_timestamps() {
        let raw = RawCandidate::new("Spotify")
            .title("X")
            .status(PlaybackStatus::Playing);
        let a = stamp(raw.clone());
        let b = MediaCandidate::normalize(raw, Instant::now(), Utc::now());
        assert!(a.same_display(&b));

        let c = stamp(RawCandidate::new("Spotify").title("Y"));
        assert!(!a.same_display(&c));
    }

    #[test]
    fn test_json_field_names() {
        let c = stamp(
            RawCandidate::new("Spotify")
                .title("X")
                .artist("A")
                .duration_ms(200_000)
                .status(PlaybackStatus::Paused)
                .artwork_url("https://example.com/a.jpg"),
        );
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["title"], "X");
        assert_eq!(json["artist"], "A");
        assert_eq!(json["album"], "");
        assert_eq!(json["duration"], 200_000);
        assert!(json["position"].is_null());
        assert_eq!(json["status"], "paused");
        assert_eq!(json["source"], "Spotify");
        assert_eq!(json["artwork_url"], "https://example.com/a.jpg");
        assert!(json.get("received_at").is_none());
    }
}
