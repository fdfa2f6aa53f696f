//! Provenance of inbound mutations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an inbound envelope came from.
///
/// Used for authorization (is the sender allowed to touch the target?) and
/// for loop suppression (a change applied with an origin is never relayed
/// back toward it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Origin {
    /// Identity presented by the connected client (certificate CN).
    pub client_identity: String,
    /// Zone the sending endpoint belongs to, when it is a known endpoint.
    #[serde(default)]
    pub from_zone: Option<String>,
}

impl Origin {
    /// Creates an origin for a client that is not (yet) mapped to a zone.
    pub fn new(client_identity: impl Into<String>) -> Self {
        Self {
            client_identity: client_identity.into(),
            from_zone: None,
        }
    }

    /// Creates an origin for a client inside `zone`.
    pub fn from_zone(client_identity: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            client_identity: client_identity.into(),
            from_zone: Some(zone.into()),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from_zone {
            Some(zone) => write!(f, "{} (zone '{}')", self.client_identity, zone),
            None => write!(f, "{}", self.client_identity),
        }
    }
}
