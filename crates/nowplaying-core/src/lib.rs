pub mod adapter;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod facade;
pub mod hub;
pub mod models;
pub mod service;

pub use adapter::{Adapter, AdapterError};
pub use aggregator::{Aggregator, IngestOutcome};
pub use facade::QueryFacade;
pub use hub::{SubscriberHandle, SubscriptionHub};
pub use models::{CurrentMediaSnapshot, MediaCandidate, PlaybackStatus, RawCandidate};
pub use service::MediaService;
