use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::{spawn_adapter, Adapter};
use crate::aggregator::{spawn_sweeper, Aggregator};
use crate::config::AppConfig;
use crate::facade::QueryFacade;
use crate::hub::SubscriptionHub;

/// A polling adapter together with its poll period.
pub type AdapterTask = (Box<dyn Adapter>, Duration);

/// Everything that runs behind the transport: aggregator, subscription hub,
/// expiry sweeper and one task per adapter, sharing a single shutdown token.
pub struct MediaService {
    config: AppConfig,
    aggregator: Arc<Aggregator>,
    hub: Arc<SubscriptionHub>,
    facade: QueryFacade,
    adapter_names: Vec<String>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MediaService {
    /// Wire up and spawn all background tasks. Must be called inside a
    /// tokio runtime.
    pub fn start(config: &AppConfig, adapters: Vec<AdapterTask>) -> Self {
        let aggregator = Arc::new(Aggregator::with_capacity(
            &config.aggregator,
            config.hub.broadcast_capacity,
        ));
        let hub = Arc::new(SubscriptionHub::new(
            config.hub.clone(),
            Arc::clone(&aggregator),
        ));
        let cancel = CancellationToken::new();

        let mut tasks = Vec::with_capacity(adapters.len() + 2);
        tasks.push(hub.start(cancel.child_token()));
        tasks.push(spawn_sweeper(
            Arc::clone(&aggregator),
            config.aggregator.sweep_interval(),
            cancel.child_token(),
        ));

        let mut adapter_names = Vec::with_capacity(adapters.len());
        for (adapter, interval) in adapters {
            adapter_names.push(adapter.name().to_string());
            tasks.push(spawn_adapter(
                adapter,
                Arc::clone(&aggregator),
                interval,
                cancel.child_token(),
            ));
        }

        if adapter_names.is_empty() {
            warn!("No media adapters available, snapshots will stay empty");
        } else {
            info!(adapters = %adapter_names.join(", "), "Media service started");
        }

        Self {
            config: config.clone(),
            facade: QueryFacade::new(Arc::clone(&aggregator)),
            aggregator,
            hub,
            adapter_names,
            cancel,
            tasks,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn facade(&self) -> QueryFacade {
        self.facade.clone()
    }

    pub fn hub(&self) -> Arc<SubscriptionHub> {
        Arc::clone(&self.hub)
    }

    pub fn aggregator(&self) -> Arc<Aggregator> {
        Arc::clone(&self.aggregator)
    }

    pub fn adapter_names(&self) -> &[String] {
        &self.adapter_names
    }

    pub fn has_adapters(&self) -> bool {
        !self.adapter_names.is_empty()
    }

    /// A token that fires when the service begins shutting down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every task and disconnect all subscribers.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.aggregator.close();
        self.hub.close();
        info!("Media service stopped");
    }
}
