use crate::entity::Entity;
use crate::mutation::Mutation;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use vigil_types::Origin;

/// Notification that a mutation was applied to an object.
#[derive(Debug, Clone)]
pub struct EntityChange {
    pub entity: Arc<Entity>,
    pub mutation: Mutation,
    /// `None` for local changes; otherwise where the change came from.
    pub origin: Option<Origin>,
}

/// Typed publish/subscribe for entity changes.
///
/// Subscribers get an unbounded receiver; closed receivers are dropped on
/// the next publish.
#[derive(Debug, Default)]
pub struct ChangeBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<EntityChange>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EntityChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, change: EntityChange) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}
