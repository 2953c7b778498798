use mpris::{PlaybackStatus as MprisStatus, Player, PlayerFinder};
use tracing::debug;

use nowplaying_core::{Adapter, AdapterError, PlaybackStatus, RawCandidate};

use super::mpris_player_name;
use crate::filter::SourceFilter;
use crate::source_db::SourceDatabase;

/// Reports every MPRIS player on the session bus.
pub struct MprisAdapter {
    db: SourceDatabase,
    filter: SourceFilter,
}

impl MprisAdapter {
    pub fn new(db: SourceDatabase, filter: SourceFilter) -> Self {
        Self { db, filter }
    }

    fn candidate(&self, player: &Player) -> Option<RawCandidate> {
        let bus_name = player.bus_name();
        let identity = player.identity();
        let player_name = mpris_player_name(bus_name);

        let def = self
            .db
            .find_by_mpris(identity)
            .or_else(|| self.db.find_by_mpris(player_name));
        if !self.filter.allows(bus_name, def) || !self.filter.allows(identity, def) {
            debug!(player = %bus_name, "Filtered out MPRIS player");
            return None;
        }

        let source = match def {
            Some(def) => def.name.clone(),
            None if !identity.is_empty() => identity.to_string(),
            None => capitalize(player_name),
        };

        let metadata = match player.get_metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!(player = %bus_name, error = %e, "Failed to read MPRIS metadata");
                return None;
            }
        };

        let status = match player.get_playback_status() {
            Ok(MprisStatus::Playing) => PlaybackStatus::Playing,
            Ok(MprisStatus::Paused) => PlaybackStatus::Paused,
            Ok(MprisStatus::Stopped) => PlaybackStatus::Stopped,
            Err(_) => PlaybackStatus::Unknown,
        };

        let mut candidate = RawCandidate::new(source)
            .title(metadata.title().unwrap_or_default())
            .artist(
                metadata
                    .artists()
                    .and_then(|a| a.first().map(|s| s.to_string()))
                    .unwrap_or_default(),
            )
            .album(metadata.album_name().unwrap_or_default())
            .status(status);
        candidate.duration_ms = metadata.length().map(|d| d.as_millis() as i64);
        candidate.position_ms = player.get_position().ok().map(|d| d.as_millis() as i64);
        candidate.artwork_url = metadata.art_url().map(str::to_string);

        debug!(player = %bus_name, title = %candidate.title, status = %status, "Detected MPRIS player");
        Some(candidate)
    }
}

impl Adapter for MprisAdapter {
    fn name(&self) -> &str {
        "mpris"
    }

    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError> {
        let finder = PlayerFinder::new()
            .map_err(|e| AdapterError::Platform(format!("failed to connect to D-Bus: {e}")))?;

        let players = match finder.find_all() {
            Ok(p) => p,
            Err(e) => {
                debug!("No MPRIS players found: {e}");
                return Ok(Vec::new());
            }
        };

        Ok(players.iter().filter_map(|p| self.candidate(p)).collect())
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
