#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows_smtc;

use nowplaying_core::config::AdaptersConfig;
use nowplaying_core::service::AdapterTask;
use nowplaying_core::Adapter;
use tracing::info;

use crate::filter::SourceFilter;
use crate::source_db::SourceDatabase;

const MPRIS_PREFIX: &str = "org.mpris.MediaPlayer2.";

/// "org.mpris.MediaPlayer2.spotify.instance123" -> "spotify".
pub(crate) fn mpris_player_name(bus_name: &str) -> &str {
    let name = bus_name.strip_prefix(MPRIS_PREFIX).unwrap_or(bus_name);
    match name.find(".instance") {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// Adapters usable on this platform, each paired with its poll interval.
///
/// Honors `config.enabled`; an adapter named there explicitly is started
/// even if its source does not look available yet.
pub fn available_adapters(
    config: &AdaptersConfig,
    filter: SourceFilter,
    db: &SourceDatabase,
) -> Vec<AdapterTask> {
    let mut adapters: Vec<AdapterTask> = Vec::new();

    #[cfg(target_os = "linux")]
    {
        if config.is_enabled("mpris") {
            adapters.push((
                Box::new(linux::MprisAdapter::new(db.clone(), filter)),
                config.poll_interval(),
            ));
        }
        if config.is_enabled("waydroid") {
            let explicit = config.enabled.iter().any(|n| n.eq_ignore_ascii_case("waydroid"));
            if explicit || crate::dumpsys::waydroid_running() {
                adapters.push((
                    Box::new(crate::dumpsys::DumpsysAdapter::waydroid(db.clone(), filter)),
                    config.dumpsys_poll_interval(),
                ));
            } else {
                tracing::debug!("WayDroid not running, skipping its adapter");
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        if config.is_enabled("smtc") {
            adapters.push((
                Box::new(windows_smtc::SmtcAdapter::new(db.clone(), filter)),
                config.poll_interval(),
            ));
        }
    }

    #[cfg(target_os = "android")]
    {
        if config.is_enabled("android") {
            adapters.push((
                Box::new(crate::dumpsys::DumpsysAdapter::android(db.clone(), filter)),
                config.dumpsys_poll_interval(),
            ));
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "android")))]
    {
        let _ = db;
    }

    let names: Vec<&str> = adapters.iter().map(|(a, _)| a.name()).collect();
    info!(adapters = ?names, filter = %filter, "Selected platform adapters");
    adapters
}
