use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::models::CurrentMediaSnapshot;

/// Read-only entry point for polling clients.
///
/// Hands back whatever the aggregator last published, untouched. HTTP
/// handlers go through this instead of the aggregator so a caching layer
/// can be slotted in later without touching them.
#[derive(Clone)]
pub struct QueryFacade {
    aggregator: Arc<Aggregator>,
}

impl QueryFacade {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }

    pub fn get(&self) -> Arc<CurrentMediaSnapshot> {
        self.aggregator.current_snapshot()
    }

    pub fn freshness_window(&self) -> std::time::Duration {
        self.aggregator.freshness_window()
    }

    /// Sources the aggregator is currently tracking.
    pub fn live_sources(&self) -> Vec<String> {
        self.aggregator.live_sources()
    }
}
