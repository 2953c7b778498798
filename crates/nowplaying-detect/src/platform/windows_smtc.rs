use tracing::debug;
use windows::Media::Control::{
    GlobalSystemMediaTransportControlsSession, GlobalSystemMediaTransportControlsSessionManager,
    GlobalSystemMediaTransportControlsSessionPlaybackStatus as SmtcStatus,
};

use nowplaying_core::{Adapter, AdapterError, PlaybackStatus, RawCandidate};

use crate::filter::SourceFilter;
use crate::source_db::SourceDatabase;

/// 100 ns ticks per millisecond.
const TICKS_PER_MS: i64 = 10_000;

/// Reports every session known to Windows SMTC (System Media Transport Controls).
pub struct SmtcAdapter {
    db: SourceDatabase,
    filter: SourceFilter,
}

impl SmtcAdapter {
    pub fn new(db: SourceDatabase, filter: SourceFilter) -> Self {
        Self { db, filter }
    }

    fn try_poll(&self) -> windows::core::Result<Vec<RawCandidate>> {
        let manager = GlobalSystemMediaTransportControlsSessionManager::RequestAsync()?.get()?;
        let sessions = manager.GetSessions()?;
        let mut results = Vec::new();

        for i in 0..sessions.Size()? {
            let session = sessions.GetAt(i)?;
            if let Some(candidate) = self.extract_session(&session) {
                results.push(candidate);
            }
        }

        Ok(results)
    }

    fn extract_session(
        &self,
        session: &GlobalSystemMediaTransportControlsSession,
    ) -> Option<RawCandidate> {
        let app_id = session.SourceAppUserModelId().ok()?.to_string();
        let def = self.db.find_by_smtc(&app_id);
        if !self.filter.allows(&app_id, def) {
            debug!(app_id = %app_id, "Filtered out SMTC session");
            return None;
        }

        let source = match def {
            Some(def) => def.name.clone(),
            None => app_id_to_display_name(&app_id),
        };

        let status = match session.GetPlaybackInfo().and_then(|info| info.PlaybackStatus()) {
            Ok(SmtcStatus::Playing) => PlaybackStatus::Playing,
            Ok(SmtcStatus::Paused) => PlaybackStatus::Paused,
            Ok(SmtcStatus::Stopped) | Ok(SmtcStatus::Closed) => PlaybackStatus::Stopped,
            _ => PlaybackStatus::Unknown,
        };

        let props = session.TryGetMediaPropertiesAsync().ok()?.get().ok()?;
        let title = props.Title().map(|s| s.to_string()).unwrap_or_default();
        let artist = props.Artist().map(|s| s.to_string()).unwrap_or_default();
        let album = props.AlbumTitle().map(|s| s.to_string()).unwrap_or_default();

        if title.is_empty() && artist.is_empty() {
            return None;
        }

        let mut candidate = RawCandidate::new(source)
            .title(title)
            .artist(artist)
            .album(album)
            .status(status);

        if let Ok(timeline) = session.GetTimelineProperties() {
            let start = timeline.StartTime().map(|t| t.Duration).unwrap_or(0);
            candidate.position_ms = timeline
                .Position()
                .ok()
                .map(|t| (t.Duration - start) / TICKS_PER_MS);
            candidate.duration_ms = timeline
                .EndTime()
                .ok()
                .map(|t| (t.Duration - start) / TICKS_PER_MS)
                .filter(|ms| *ms > 0);
        }

        debug!(app_id = %app_id, title = %candidate.title, status = %status, "Detected SMTC session");
        Some(candidate)
    }
}

impl Adapter for SmtcAdapter {
    fn name(&self) -> &str {
        "smtc"
    }

    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError> {
        self.try_poll()
            .map_err(|e| AdapterError::Platform(format!("SMTC query failed: {e}")))
    }
}

/// Convert an SMTC app user model ID into a human-readable display name.
///
/// Strips `.exe` suffixes, package family name suffixes (after `_`),
/// the `!App` entry point, and path components.
pub(crate) fn app_id_to_display_name(app_id: &str) -> String {
    let mut name = app_id;

    // "Family_hash!EntryPoint" -> "Family_hash"
    if let Some(pos) = name.find('!') {
        name = &name[..pos];
    }

    if let Some(pos) = name.rfind('\\') {
        name = &name[pos + 1..];
    }

    if let Some(stripped) = name.strip_suffix(".exe") {
        name = stripped;
    }

    // UWP package hash suffix (e.g. "App_1a2b3c4d" -> "App").
    if let Some(pos) = name.rfind('_') {
        let suffix = &name[pos + 1..];
        if suffix.len() >= 8 && suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
            name = &name[..pos];
        }
    }

    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_strips_exe() {
        assert_eq!(app_id_to_display_name("foobar2000.exe"), "foobar2000");
    }

    #[test]
    fn test_display_name_strips_path() {
        assert_eq!(
            app_id_to_display_name("C:\\Program Files\\MusicBee\\MusicBee.exe"),
            "MusicBee"
        );
    }

    #[test]
    fn test_display_name_strips_uwp_hash_and_entry_point() {
        assert_eq!(
            app_id_to_display_name("SpotifyAB.SpotifyMusic_zpdnekdrzrea0!Spotify"),
            "SpotifyAB.SpotifyMusic"
        );
    }

    #[test]
    fn test_display_name_preserves_short_suffix() {
        assert_eq!(app_id_to_display_name("My_Player"), "My_Player");
    }
}
