//! The single authoritative holder of "what is playing right now".
//!
//! Adapters feed [`RawCandidate`]s in through [`Aggregator::ingest`]. The
//! aggregator keeps the last observation per source, drops anything older
//! than the freshness window, and publishes the best remaining candidate as
//! a new [`CurrentMediaSnapshot`]. Publishing is serialized behind one lock
//! so versions only ever go up and identical decisions are suppressed.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::AggregatorConfig;
use crate::models::{CurrentMediaSnapshot, MediaCandidate, RawCandidate};

/// Default depth of the change broadcast channel.
const DEFAULT_BROADCAST_CAPACITY: usize = 16;

/// Result of feeding the aggregator (or sweeping it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new snapshot was published with this version.
    Published { version: u64 },
    /// The decision matched the current snapshot; nothing was published.
    Unchanged,
    /// The aggregator is shut down and no longer accepts input.
    Closed,
}

pub struct Aggregator {
    freshness_window: Duration,
    state: Mutex<AggregatorState>,
    changes: broadcast::Sender<Arc<CurrentMediaSnapshot>>,
}

struct AggregatorState {
    /// Last candidate seen per source.
    last_seen: HashMap<String, MediaCandidate>,
    published: Arc<CurrentMediaSnapshot>,
    closed: bool,
}

impl Aggregator {
    pub fn new(config: &AggregatorConfig) -> Self {
        Self::with_capacity(config, DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create an aggregator whose change channel holds `capacity` snapshots.
    pub fn with_capacity(config: &AggregatorConfig, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            freshness_window: config.freshness_window(),
            state: Mutex::new(AggregatorState {
                last_seen: HashMap::new(),
                published: Arc::new(CurrentMediaSnapshot::initial()),
                closed: false,
            }),
            changes,
        }
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    /// Accept an observation from any adapter, stamped with the current time.
    pub fn ingest(&self, raw: RawCandidate) -> IngestOutcome {
        self.ingest_at(raw, Instant::now())
    }

    /// Accept an observation received at `now`.
    pub fn ingest_at(&self, raw: RawCandidate, now: Instant) -> IngestOutcome {
        let mut state = self.lock();
        if state.closed {
            return IngestOutcome::Closed;
        }

        let candidate = MediaCandidate::normalize(raw, now, Utc::now());
        debug!(
            source = %candidate.source,
            status = %candidate.status,
            title = %candidate.title,
            "Ingested candidate"
        );
        state.last_seen.insert(candidate.source.clone(), candidate);

        self.decide(&mut state, now)
    }

    /// Re-evaluate expiry without new input.
    pub fn sweep(&self) -> IngestOutcome {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> IngestOutcome {
        let mut state = self.lock();
        if state.closed {
            return IngestOutcome::Closed;
        }
        self.decide(&mut state, now)
    }

    /// The latest published snapshot. Never waits on adapters.
    pub fn current_snapshot(&self) -> Arc<CurrentMediaSnapshot> {
        Arc::clone(&self.lock().published)
    }

    /// Receive every snapshot as it is published.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Arc<CurrentMediaSnapshot>> {
        self.changes.subscribe()
    }

    /// Sources currently held, expired or not, sorted by name.
    pub fn live_sources(&self) -> Vec<String> {
        let mut sources: Vec<String> = self.lock().last_seen.keys().cloned().collect();
        sources.sort();
        sources
    }

    /// Stop accepting input. An `ingest` already holding the lock finishes first.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            info!(version = state.published.version, "Aggregator closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        // The state is replaced wholesale on publish, so a panic elsewhere
        // cannot leave it half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn decide(&self, state: &mut AggregatorState, now: Instant) -> IngestOutcome {
        let window = self.freshness_window;
        state.last_seen.retain(|source, candidate| {
            let fresh = now.saturating_duration_since(candidate.received_at) <= window;
            if !fresh {
                debug!(source = %source, "Candidate expired");
            }
            fresh
        });

        let winner = state.last_seen.values().max_by(|a, b| rank(a, b)).cloned();

        let unchanged = match (&winner, &state.published.media) {
            (None, None) => true,
            (Some(next), Some(current)) => next.same_display(current),
            _ => false,
        };
        if unchanged {
            return IngestOutcome::Unchanged;
        }

        let version = state.published.version + 1;
        match (&winner, &state.published.media) {
            // Position ticks publish every poll; keep them out of info logs.
            (Some(next), Some(current))
                if next.source == current.source
                    && next.title == current.title
                    && next.status == current.status =>
            {
                debug!(version, source = %next.source, "Published snapshot");
            }
            (Some(media), _) => info!(
                version,
                source = %media.source,
                status = %media.status,
                title = %media.title,
                "Published snapshot"
            ),
            (None, _) => info!(version, "Published absent snapshot"),
        }

        let snapshot = Arc::new(CurrentMediaSnapshot {
            version,
            media: winner,
            last_updated: Utc::now(),
            cached: false,
        });
        state.published = Arc::clone(&snapshot);

        // Sent under the lock so the channel sees versions in order.
        // An error only means nobody is listening.
        let _ = self.changes.send(snapshot);

        IngestOutcome::Published { version }
    }
}

/// Higher status wins, then the most recently received, then the
/// alphabetically first source so the result never depends on map order.
fn rank(a: &MediaCandidate, b: &MediaCandidate) -> Ordering {
    a.status
        .priority()
        .cmp(&b.status.priority())
        .then(a.received_at.cmp(&b.received_at))
        .then_with(|| b.source.cmp(&a.source))
}

/// Periodically re-evaluate expiry so sources that go silent without a final
/// "stopped" event get evicted.
pub fn spawn_sweeper(
    aggregator: Arc<Aggregator>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        debug!(interval_ms = interval.as_millis() as u64, "Expiry sweeper started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if aggregator.sweep() == IngestOutcome::Closed {
                        break;
                    }
                }
            }
        }
        debug!("Expiry sweeper stopped");
    })
}
