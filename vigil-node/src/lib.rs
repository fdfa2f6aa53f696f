//! Vigil cluster node.
//!
//! Wires the entity model, snapshot engine and event router into a running
//! node. Startup order matters: objects are restored and marked loaded before
//! they are activated, and the change pump is attached only after restore so
//! that replayed state is never relayed.
//!
//! - [`config`] — `vigil.toml` parsing
//! - [`inventory`] — JSON object inventory loading
//! - [`modified`] — persistence of runtime attribute modifications

pub mod config;
pub mod inventory;
pub mod modified;

use anyhow::{Context, Result};
use config::NodeConfig;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use vigil_model::ObjectRegistry;
use vigil_storage::{DumpStats, RepositoryStore, RestoreStats, SnapshotEngine};
use vigil_sync::{ChannelHub, Delivery, EventRouter, TopologyBroadcaster, TrustModel, ZoneTree};
use vigil_types::AttributeClass;

/// A configured node, started with [`Node::start`] and stopped with
/// [`Node::shutdown`].
pub struct Node {
    config: NodeConfig,
    registry: Arc<ObjectRegistry>,
    trust: Arc<ZoneTree>,
    hub: Arc<ChannelHub>,
    router: Arc<EventRouter>,
    topology: Arc<TopologyBroadcaster>,
    snapshot: Arc<SnapshotEngine>,
    inbox: mpsc::UnboundedSender<Delivery>,
    inbox_rx: Option<mpsc::UnboundedReceiver<Delivery>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Builds the registry, zone tree and router. Loads the inventory when
    /// one is configured.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let registry = Arc::new(ObjectRegistry::with_builtin_types());
        if let Some(path) = &config.node.inventory {
            inventory::load_inventory(&registry, path)?;
        }
        Self::with_registry(config, registry)
    }

    /// Builds a node around an already populated registry.
    pub fn with_registry(config: NodeConfig, registry: Arc<ObjectRegistry>) -> Result<Self> {
        let trust = Arc::new(
            ZoneTree::new(config.node.endpoint.clone(), config.zones.clone())
                .context("Invalid zone configuration")?,
        );
        let hub = Arc::new(ChannelHub::new(trust.clone()));
        let router = Arc::new(
            EventRouter::new(
                Arc::clone(&registry),
                trust.clone(),
                hub.clone(),
                config.router_config(),
            )
            .with_repository(RepositoryStore::new(config.repository_dir())),
        );
        let topology = Arc::new(TopologyBroadcaster::new(
            Arc::clone(&registry),
            trust.clone(),
            hub.clone(),
            config.topology_config(),
        ));
        let snapshot = Arc::new(SnapshotEngine::new(
            Arc::clone(&registry),
            config.snapshot_config(),
        ));
        let (inbox, inbox_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            registry,
            trust,
            hub,
            router,
            topology,
            snapshot,
            inbox,
            inbox_rx: Some(inbox_rx),
            tasks: Vec::new(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    pub fn zones(&self) -> &Arc<ZoneTree> {
        &self.trust
    }

    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Sender feeding this node's inbound queue. Peers deliver through it.
    pub fn inbox(&self) -> mpsc::UnboundedSender<Delivery> {
        self.inbox.clone()
    }

    /// Lets this node send to `endpoint` through `sender`.
    pub fn connect_peer(&self, endpoint: impl Into<String>, sender: mpsc::UnboundedSender<Delivery>) {
        self.hub.connect(endpoint, sender);
    }

    /// Restores state, activates every object and starts the background
    /// tasks: change pump, inbox, topology timer and periodic dump.
    pub async fn start(&mut self) -> Result<RestoreStats> {
        let Some(inbox_rx) = self.inbox_rx.take() else {
            anyhow::bail!("Node '{}' is already started", self.config.node.endpoint);
        };

        modified::replay_modified_attributes(&self.registry, &self.config.modified_attributes_path()).await?;

        let state_path = self.config.state_path();
        let mut stats = self
            .snapshot
            .restore_objects(&state_path, AttributeClass::STATE)
            .await
            .with_context(|| format!("Failed to restore {}", state_path.display()))?;
        stats.loaded_without_state += self.registry.complete_state_load();
        info!(
            "Restored {} of {} records ({} skipped, {} objects without state)",
            stats.restored, stats.records, stats.skipped, stats.loaded_without_state
        );

        let changes = self.registry.subscribe();
        self.registry.activate_objects();

        self.tasks.push(tokio::spawn(Arc::clone(&self.router).run(changes)));
        self.tasks.push(tokio::spawn(Arc::clone(&self.router).serve(inbox_rx)));
        self.tasks.push(tokio::spawn(Arc::clone(&self.topology).run()));
        self.tasks.push(tokio::spawn(dump_periodically(
            Arc::clone(&self.snapshot),
            Arc::clone(&self.registry),
            self.config.clone(),
        )));

        info!(
            "Node '{}' started in zone '{}'",
            self.config.node.endpoint,
            self.trust.local_zone()
        );
        Ok(stats)
    }

    /// Writes the state snapshot and the modified attributes.
    pub async fn dump_state(&self) -> Result<DumpStats> {
        dump_state(&self.snapshot, &self.registry, &self.config).await
    }

    /// Stops the background tasks, deactivates every object and writes a
    /// final snapshot.
    pub async fn shutdown(mut self) -> Result<DumpStats> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.registry.stop_objects();
        let stats = self.dump_state().await?;
        info!("Node '{}' stopped", self.config.node.endpoint);
        Ok(stats)
    }
}

async fn dump_state(snapshot: &SnapshotEngine, registry: &ObjectRegistry, config: &NodeConfig) -> Result<DumpStats> {
    let state_path = config.state_path();
    let stats = snapshot
        .dump_objects(&state_path, AttributeClass::STATE)
        .await
        .with_context(|| format!("Failed to dump {}", state_path.display()))?;
    modified::write_modified_attributes(registry, &config.modified_attributes_path()).await?;
    Ok(stats)
}

async fn dump_periodically(snapshot: Arc<SnapshotEngine>, registry: Arc<ObjectRegistry>, config: NodeConfig) {
    let mut ticker = tokio::time::interval(config.dump_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; state was just restored.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = dump_state(&snapshot, &registry, &config).await {
            warn!("Periodic state dump failed: {:#}", e);
        }
    }
}
