//! Replication hub abstraction.
//!
//! The router never talks to connections directly. It asks a
//! [`ReplicationHub`] to relay an envelope to everyone entitled to see it,
//! or to send one point-to-point. [`ChannelHub`] delivers over in-process
//! channels; a TLS transport would implement the same trait.

use crate::error::{SyncError, SyncResult};
use crate::protocol::Envelope;
use crate::trust::TrustModel;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;
use vigil_model::Entity;
use vigil_types::Origin;

/// Who a relayed message is about.
#[derive(Debug, Clone)]
pub enum RelayScope {
    /// The zone owning this object (the local zone when it has none).
    Object(Arc<Entity>),
    /// A zone by name.
    Zone(String),
}

impl RelayScope {
    /// Zone the relay is scoped to.
    pub fn zone(&self, local_zone: &str) -> String {
        match self {
            Self::Object(entity) => entity.zone().unwrap_or_else(|| local_zone.to_string()),
            Self::Zone(zone) => zone.clone(),
        }
    }
}

/// Message transport seen by the router.
#[async_trait]
pub trait ReplicationHub: Send + Sync {
    /// Relays `envelope` to every endpoint entitled to it, excluding the
    /// path described by `origin`. Returns the number of deliveries.
    async fn relay_message(
        &self,
        origin: Option<Origin>,
        scope: RelayScope,
        envelope: Envelope,
        include_descendants: bool,
    ) -> SyncResult<usize>;

    /// Sends `envelope` to a single endpoint.
    async fn sync_send_message(&self, endpoint: &str, envelope: Envelope) -> SyncResult<()>;
}

/// An envelope delivered to a connected endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// The sending node as seen by the receiver.
    pub origin: Origin,
    pub envelope: Envelope,
}

/// Hub delivering to connected endpoints over unbounded channels.
pub struct ChannelHub {
    trust: Arc<dyn TrustModel>,
    peers: Mutex<BTreeMap<String, mpsc::UnboundedSender<Delivery>>>,
}

impl ChannelHub {
    pub fn new(trust: Arc<dyn TrustModel>) -> Self {
        Self {
            trust,
            peers: Mutex::new(BTreeMap::new()),
        }
    }

    fn peers(&self) -> MutexGuard<'_, BTreeMap<String, mpsc::UnboundedSender<Delivery>>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the channel carrying deliveries to `endpoint`, replacing
    /// any previous connection.
    pub fn connect(&self, endpoint: impl Into<String>, sender: mpsc::UnboundedSender<Delivery>) {
        let endpoint = endpoint.into();
        debug!("Endpoint '{}' connected", endpoint);
        self.peers().insert(endpoint, sender);
    }

    pub fn disconnect(&self, endpoint: &str) -> bool {
        let removed = self.peers().remove(endpoint).is_some();
        if removed {
            debug!("Endpoint '{}' disconnected", endpoint);
        }
        removed
    }

    pub fn connected_endpoints(&self) -> Vec<String> {
        self.peers().keys().cloned().collect()
    }

    fn local_origin(&self) -> Origin {
        Origin::from_zone(self.trust.local_endpoint(), self.trust.local_zone())
    }

    /// Delivers to `endpoint`; a closed channel counts as disconnected.
    fn deliver(&self, endpoint: &str, envelope: Envelope) -> bool {
        let mut peers = self.peers();
        let Some(sender) = peers.get(endpoint) else {
            return false;
        };
        let delivery = Delivery {
            origin: self.local_origin(),
            envelope,
        };
        if sender.send(delivery).is_err() {
            peers.remove(endpoint);
            debug!("Endpoint '{}' went away", endpoint);
            return false;
        }
        true
    }
}

#[async_trait]
impl ReplicationHub for ChannelHub {
    async fn relay_message(
        &self,
        origin: Option<Origin>,
        scope: RelayScope,
        envelope: Envelope,
        include_descendants: bool,
    ) -> SyncResult<usize> {
        let zone = scope.zone(self.trust.local_zone());
        let targets = self
            .trust
            .relay_targets(&zone, origin.as_ref(), include_descendants);

        let mut delivered = 0;
        for endpoint in targets {
            if self.deliver(&endpoint, envelope.clone()) {
                delivered += 1;
            } else {
                debug!(
                    "Not relaying '{}' to '{}': endpoint not connected",
                    envelope.method, endpoint
                );
            }
        }
        Ok(delivered)
    }

    async fn sync_send_message(&self, endpoint: &str, envelope: Envelope) -> SyncResult<()> {
        if self.deliver(endpoint, envelope) {
            Ok(())
        } else {
            Err(SyncError::PeerNotFound(endpoint.to_string()))
        }
    }
}

/// A recording hub for testing.
pub mod mock {
    use super::*;

    /// One captured relay.
    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedRelay {
        pub origin: Option<Origin>,
        /// Resolved scope zone.
        pub zone: String,
        pub envelope: Envelope,
        pub include_descendants: bool,
    }

    /// Hub that records every call instead of delivering.
    #[derive(Debug, Default)]
    pub struct RecordingHub {
        local_zone: String,
        relays: Mutex<Vec<RecordedRelay>>,
        sends: Mutex<Vec<(String, Envelope)>>,
    }

    impl RecordingHub {
        /// Objects without a zone resolve to `local_zone`.
        pub fn new(local_zone: impl Into<String>) -> Self {
            Self {
                local_zone: local_zone.into(),
                ..Self::default()
            }
        }

        pub fn relays(&self) -> Vec<RecordedRelay> {
            self.relays.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn sends(&self) -> Vec<(String, Envelope)> {
            self.sends.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }

        pub fn clear(&self) {
            self.relays.lock().unwrap_or_else(PoisonError::into_inner).clear();
            self.sends.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }

    #[async_trait]
    impl ReplicationHub for RecordingHub {
        async fn relay_message(
            &self,
            origin: Option<Origin>,
            scope: RelayScope,
            envelope: Envelope,
            include_descendants: bool,
        ) -> SyncResult<usize> {
            let zone = scope.zone(&self.local_zone);
            self.relays
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RecordedRelay {
                    origin,
                    zone,
                    envelope,
                    include_descendants,
                });
            Ok(1)
        }

        async fn sync_send_message(&self, endpoint: &str, envelope: Envelope) -> SyncResult<()> {
            self.sends
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((endpoint.to_string(), envelope));
            Ok(())
        }
    }
}
