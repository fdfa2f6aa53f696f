//! Topology broadcaster.
//!
//! Every interval (and once immediately) a node relays its full inventory,
//! every host with the short names of its services, to its own zone and
//! the parent zone. Receivers keep the latest payload per sender endpoint
//! and forward it on, so ancestor zones learn about membership without a
//! central directory.

use crate::error::{SyncError, SyncResult};
use crate::hub::{RelayScope, ReplicationHub};
use crate::protocol::{param, Envelope, EventMethod, RepositoryParams};
use crate::trust::TrustModel;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use vigil_model::{types, ObjectRegistry};
use vigil_storage::RepositoryStore;
use vigil_types::{timestamp, Origin};

/// Default broadcast interval.
pub const DEFAULT_TOPOLOGY_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the topology broadcaster.
#[derive(Debug, Clone)]
pub struct TopologyConfig {
    pub interval: Duration,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TOPOLOGY_INTERVAL,
        }
    }
}

/// Periodically pushes the local inventory toward the parent zone.
pub struct TopologyBroadcaster {
    registry: Arc<ObjectRegistry>,
    trust: Arc<dyn TrustModel>,
    hub: Arc<dyn ReplicationHub>,
    config: TopologyConfig,
}

impl TopologyBroadcaster {
    pub fn new(
        registry: Arc<ObjectRegistry>,
        trust: Arc<dyn TrustModel>,
        hub: Arc<dyn ReplicationHub>,
        config: TopologyConfig,
    ) -> Self {
        Self {
            registry,
            trust,
            hub,
            config,
        }
    }

    /// Every host mapped to the short names of its services.
    pub fn inventory(&self) -> BTreeMap<String, Vec<String>> {
        let mut repository: BTreeMap<String, Vec<String>> = self
            .registry
            .objects_of(types::HOST)
            .iter()
            .map(|host| (host.name().to_string(), Vec::new()))
            .collect();

        for service in self.registry.objects_of(types::SERVICE) {
            let (Some(host), Some(short_name)) = (service.get_str("host_name"), service.get_str("short_name"))
            else {
                continue;
            };
            if let Some(services) = repository.get_mut(&host) {
                services.push(short_name);
            }
        }
        repository
    }

    pub fn build_envelope(&self) -> SyncResult<Envelope> {
        let local_zone = self.trust.local_zone();
        RepositoryParams {
            seen: timestamp::now(),
            endpoint: self.trust.local_endpoint().to_string(),
            zone: local_zone.to_string(),
            parent_zone: self.trust.parent_zone(local_zone).map(str::to_string),
            repository: self.inventory(),
        }
        .into_envelope()
    }

    /// Relays one inventory snapshot to the local and parent zone.
    pub async fn broadcast(&self) -> SyncResult<usize> {
        let envelope = self.build_envelope()?;
        let zone = self.trust.local_zone().to_string();
        self.hub
            .relay_message(None, RelayScope::Zone(zone), envelope, false)
            .await
    }

    /// Broadcasts on every tick. The first tick fires immediately.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.broadcast().await {
                Ok(delivered) => debug!("Sent repository update to {} endpoints", delivered),
                Err(e) => warn!("Failed to send repository update: {}", e),
            }
        }
    }
}

/// Stores a received inventory under its sender endpoint and forwards it.
pub async fn receive_repository(
    store: &RepositoryStore,
    hub: &dyn ReplicationHub,
    local_zone: &str,
    origin: &Origin,
    params: &Map<String, Value>,
) -> SyncResult<()> {
    if !matches!(params.get("repository"), Some(Value::Object(_))) {
        return Err(SyncError::Protocol(
            "parameter 'repository' must be a dictionary".into(),
        ));
    }
    let endpoint: String = param(params, "endpoint")?;

    store.write(&endpoint, &Value::Object(params.clone())).await?;

    let envelope = Envelope::new(EventMethod::UpdateRepository, params.clone());
    hub.relay_message(
        Some(origin.clone()),
        RelayScope::Zone(local_zone.to_string()),
        envelope,
        true,
    )
    .await?;
    Ok(())
}
