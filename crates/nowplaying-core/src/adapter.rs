//! The seam between platform-specific media sources and the aggregator.
//!
//! Every source (MPRIS, SMTC, `dumpsys`, notification listeners, test
//! doubles) implements [`Adapter`]. Polling adapters are driven by
//! [`spawn_adapter`]; event-driven ones can call [`Aggregator::ingest`]
//! directly from their callbacks.

pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregator::{Aggregator, IngestOutcome};
use crate::models::RawCandidate;

/// Failure inside one adapter. Never leaves the adapter's own task.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("platform error: {0}")]
    Platform(String),
}

/// A producer of media observations.
pub trait Adapter: Send + 'static {
    /// Short identifier used in logs and the status endpoint.
    fn name(&self) -> &str;

    /// Observe the source once. May block on platform I/O.
    ///
    /// An empty vector means "nothing to report". Adapters must not invent
    /// a stopped candidate when they merely failed to look.
    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError>;
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn poll(&mut self) -> Result<Vec<RawCandidate>, AdapterError> {
        (**self).poll()
    }
}

/// Drive a polling adapter until `cancel` fires or the aggregator closes.
///
/// Each poll runs on the blocking pool and is abandoned if `cancel` fires
/// while it is still running. Failures are logged once on the transition
/// from healthy to failing, then at debug level until it recovers.
pub fn spawn_adapter<A: Adapter>(
    mut adapter: A,
    aggregator: Arc<Aggregator>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = adapter.name().to_string();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut healthy = true;

        info!(adapter = %name, interval_ms = interval.as_millis() as u64, "Adapter started");

        'poll: loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let poll = tokio::task::spawn_blocking(move || {
                let result = adapter.poll();
                (adapter, result)
            });

            // A poll stuck on platform I/O must not hold up shutdown. The
            // blocking thread is left to finish on its own.
            let polled = tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(adapter = %name, "Abandoning in-flight poll on shutdown");
                    break;
                }
                polled = poll => polled,
            };

            let result = match polled {
                Ok((returned, result)) => {
                    adapter = returned;
                    result
                }
                Err(e) => {
                    error!(adapter = %name, error = %e, "Adapter poll panicked, stopping");
                    break;
                }
            };

            match result {
                Ok(candidates) => {
                    if !healthy {
                        info!(adapter = %name, "Adapter recovered");
                        healthy = true;
                    }
                    for candidate in candidates {
                        if aggregator.ingest(candidate) == IngestOutcome::Closed {
                            break 'poll;
                        }
                    }
                }
                Err(e) if healthy => {
                    warn!(adapter = %name, error = %e, "Adapter produced no data");
                    healthy = false;
                }
                Err(e) => {
                    debug!(adapter = %name, error = %e, "Adapter still failing");
                }
            }
        }

        info!(adapter = %name, "Adapter stopped");
    })
}
