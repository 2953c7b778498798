//! Platform media sources for the now-playing service.
//!
//! Every adapter here implements [`nowplaying_core::Adapter`] and reports raw
//! observations; ranking and expiry happen in the core aggregator.

pub mod dumpsys;
pub mod filter;
pub mod notification;
pub mod platform;
pub mod source_db;

pub use dumpsys::{parse_media_session, DumpsysAdapter, DumpsysFlavor};
pub use filter::SourceFilter;
pub use notification::{parse_notification_texts, NotificationFeed, NotificationRecord, NotificationSender};
pub use platform::available_adapters;
pub use source_db::{SourceDatabase, SourceDef};

#[cfg(target_os = "linux")]
pub use platform::linux::MprisAdapter;

#[cfg(target_os = "windows")]
pub use platform::windows_smtc::SmtcAdapter;
