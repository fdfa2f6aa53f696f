//! Event routing for Vigil.
//!
//! - [`protocol`] — JSON-RPC envelopes, the event catalogue, param encoding
//! - [`trust`] — zone tree, access checks and relay target computation
//! - [`hub`] — the [`ReplicationHub`] seam plus an in-process [`ChannelHub`]
//! - [`router`] — outbound change relay and the inbound authorization gate
//! - [`command`] — remote check / event handler execution
//! - [`topology`] — periodic inventory broadcast and its receiver

pub mod command;
mod error;
pub mod hub;
pub mod protocol;
pub mod router;
pub mod topology;
pub mod trust;

pub use command::{CommandExecutor, ProcessExecutor};
pub use error::{SyncError, SyncResult};
pub use hub::{ChannelHub, Delivery, RelayScope, ReplicationHub};
pub use protocol::{Envelope, EventMethod};
pub use router::{ApplyOutcome, DiscardReason, EventRouter, RouterConfig};
pub use topology::{TopologyBroadcaster, TopologyConfig};
pub use trust::{TrustModel, Zone, ZoneTree};
