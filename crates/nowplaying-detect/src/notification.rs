//! Track info scraped from media notifications.
//!
//! Some players (Amazon Music on Windows, most Android apps without a
//! proper media session) only announce tracks through notifications. A
//! platform listener pushes the notification text through a
//! [`NotificationSender`]; the [`NotificationFeed`] adapter keeps the latest
//! record per app and re-reports it while it is recent.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use nowplaying_core::{Adapter, AdapterError, PlaybackStatus, RawCandidate};

use crate::source_db::SourceDatabase;

/// How long a notification keeps being reported after it was posted.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// One notification as seen by a platform listener.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationRecord {
    /// App id or package that posted the notification.
    pub app: String,
    /// Text lines in display order, usually `[title, artist, album]`.
    pub texts: Vec<String>,
    /// Set when the listener knows the playback state.
    #[serde(default)]
    pub status: Option<PlaybackStatus>,
}

/// Map notification text lines to a candidate.
///
/// Needs at least a title and an artist line; blank lines are skipped.
pub fn parse_notification_texts(
    source: &str,
    texts: &[String],
    status: Option<PlaybackStatus>,
) -> Option<RawCandidate> {
    let mut lines = texts.iter().map(|t| t.trim()).filter(|t| !t.is_empty());
    let title = lines.next()?;
    let artist = lines.next()?;
    let album = lines.next().unwrap_or_default();

    Some(
        RawCandidate::new(source)
            .title(title)
            .artist(artist)
            .album(album)
            .status(status.unwrap_or(PlaybackStatus::Unknown)),
    )
}

/// Cloneable handle for listeners to push notifications into the feed.
#[derive(Debug, Clone)]
pub struct NotificationSender {
    tx: Sender<NotificationRecord>,
}

impl NotificationSender {
    /// Returns `false` once the feed has been dropped.
    pub fn send(&self, record: NotificationRecord) -> bool {
        self.tx.send(record).is_ok()
    }
}

/// Adapter over notifications pushed by an external listener.
pub struct NotificationFeed {
    name: String,
    rx: Receiver<NotificationRecord>,
    db: SourceDatabase,
    retention: Duration,
    latest: HashMap<String, (RawCandidate, Instant)>,
}

impl NotificationFeed {
    pub fn new(name: impl Into<String>, db: SourceDatabase) -> (NotificationSender, Self) {
        let (tx, rx) = mpsc::channel();
        let feed = Self {
            name: name.into(),
            rx,
            db,
            retention: DEFAULT_RETENTION,
            latest: HashMap::new(),
        };
        (NotificationSender { tx }, feed)
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    fn display_name(&self, app: &str) -> String {
        self.db
            .find_by_smtc(app)
            .or_else(|| self.db.find_by_package(app))
            .map(|def| def.name.clone())
            .unwrap_or_else(|| app.to_string())
    }

    fn drain(&mut self, now: Instant) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(record) => {
                    let source = self.display_name(&record.app);
                    match parse_notification_texts(&source, &record.texts, record.status) {
                        Some(candidate) => {
                            self.latest.insert(record.app, (candidate, now));
                        }
                        None => debug!(app = %record.app, "Ignoring notification without track info"),
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }
}

impl Adapter for NotificationFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError> {
        let now = Instant::now();
        let connected = self.drain(now);

        let retention = self.retention;
        self.latest
            .retain(|_, (_, posted)| now.duration_since(*posted) <= retention);

        if !connected && self.latest.is_empty() {
            return Err(AdapterError::Unavailable("notification listener went away".into()));
        }
        Ok(self.latest.values().map(|(c, _)| c.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_three_lines() {
        let c = parse_notification_texts("Amazon Music", &texts(&["Song", "Artist", "Album"]), None)
            .unwrap();
        assert_eq!(c.title, "Song");
        assert_eq!(c.artist, "Artist");
        assert_eq!(c.album, "Album");
        assert_eq!(c.status, Some(PlaybackStatus::Unknown));
    }

    #[test]
    fn test_parse_two_lines_with_status() {
        let c = parse_notification_texts(
            "x",
            &texts(&["Song", "Artist"]),
            Some(PlaybackStatus::Playing),
        )
        .unwrap();
        assert_eq!(c.album, "");
        assert_eq!(c.status, Some(PlaybackStatus::Playing));
    }

    #[test]
    fn test_parse_too_few_lines() {
        assert!(parse_notification_texts("x", &texts(&["Only title"]), None).is_none());
        assert!(parse_notification_texts("x", &texts(&["Title", "  "]), None).is_none());
        assert!(parse_notification_texts("x", &[], None).is_none());
    }

    #[test]
    fn test_feed_reports_latest_per_app() {
        let (tx, mut feed) = NotificationFeed::new("notifications", SourceDatabase::embedded());
        assert!(feed.poll().unwrap().is_empty());

        tx.send(NotificationRecord {
            app: "AmazonMobileLLC.AmazonMusic_kc6t79cpj4tp0!AmazonMusic".into(),
            texts: texts(&["First", "Artist"]),
            status: None,
        });
        tx.send(NotificationRecord {
            app: "AmazonMobileLLC.AmazonMusic_kc6t79cpj4tp0!AmazonMusic".into(),
            texts: texts(&["Second", "Artist"]),
            status: None,
        });

        let reported = feed.poll().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].source, "Amazon Music");
        assert_eq!(reported[0].title, "Second");

        // Still reported on later polls without new notifications.
        assert_eq!(feed.poll().unwrap().len(), 1);
    }

    #[test]
    fn test_feed_forgets_old_records() {
        let (tx, feed) = NotificationFeed::new("notifications", SourceDatabase::default());
        let mut feed = feed.with_retention(Duration::ZERO);
        tx.send(NotificationRecord {
            app: "com.example.player".into(),
            texts: texts(&["Song", "Artist"]),
            status: None,
        });
        assert_eq!(feed.poll().unwrap().len(), 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(feed.poll().unwrap().is_empty());
    }

    #[test]
    fn test_feed_errors_once_listener_is_gone() {
        let (tx, mut feed) = NotificationFeed::new("notifications", SourceDatabase::default());
        drop(tx);
        assert!(matches!(feed.poll(), Err(AdapterError::Unavailable(_))));
    }
}
