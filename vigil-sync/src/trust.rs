//! Zone and endpoint trust model.
//!
//! Zones form a tree. A zone may act on an object when the object's zone is
//! that zone or one of its descendants. Relays fan out along the tree: a
//! node only talks to its own zone, its parent zone and its direct child
//! zones, and each hop forwards further.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use vigil_model::Entity;
use vigil_types::Origin;

/// One zone of the cluster hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl Zone {
    pub fn new(name: impl Into<String>, parent: Option<&str>, endpoints: &[&str]) -> Self {
        Self {
            name: name.into(),
            parent: parent.map(str::to_string),
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Authorization and routing questions the router asks about the cluster.
pub trait TrustModel: Send + Sync {
    /// This node's endpoint name.
    fn local_endpoint(&self) -> &str;

    /// This node's zone.
    fn local_zone(&self) -> &str;

    /// Whether `endpoint` is a configured cluster endpoint.
    fn endpoint_exists(&self, endpoint: &str) -> bool;

    /// Zone `endpoint` belongs to.
    fn endpoint_zone(&self, endpoint: &str) -> Option<&str>;

    /// Parent of `zone`, if any.
    fn parent_zone(&self, zone: &str) -> Option<&str>;

    /// Whether `zone` is `ancestor` or lies below it.
    fn is_child_of(&self, zone: &str, ancestor: &str) -> bool {
        let mut current = Some(zone);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.parent_zone(name);
        }
        false
    }

    /// Whether `zone` may act on `entity`. Objects without a zone belong to
    /// the local zone.
    fn can_access_object(&self, zone: &str, entity: &Entity) -> bool {
        match entity.zone() {
            Some(object_zone) => self.is_child_of(&object_zone, zone),
            None => self.is_child_of(self.local_zone(), zone),
        }
    }

    /// Endpoints a message scoped to `scope_zone` is sent to from this node.
    fn relay_targets(&self, scope_zone: &str, origin: Option<&Origin>, include_descendants: bool) -> Vec<String>;
}

/// In-memory zone tree built from configuration.
#[derive(Debug, Clone)]
pub struct ZoneTree {
    local_endpoint: String,
    local_zone: String,
    zones: BTreeMap<String, Zone>,
    endpoint_zones: BTreeMap<String, String>,
}

impl ZoneTree {
    /// Builds and validates the tree.
    ///
    /// Zone names must be unique, parents must exist, the parent chain must
    /// not loop, each endpoint belongs to exactly one zone, and the local
    /// endpoint must be a member of some zone.
    pub fn new(local_endpoint: impl Into<String>, zones: Vec<Zone>) -> SyncResult<Self> {
        let local_endpoint = local_endpoint.into();
        let mut by_name = BTreeMap::new();
        let mut endpoint_zones = BTreeMap::new();

        for zone in zones {
            for endpoint in &zone.endpoints {
                if let Some(previous) = endpoint_zones.insert(endpoint.clone(), zone.name.clone()) {
                    return Err(SyncError::Config(format!(
                        "endpoint '{}' is a member of both '{}' and '{}'",
                        endpoint, previous, zone.name
                    )));
                }
            }
            let name = zone.name.clone();
            if by_name.insert(name.clone(), zone).is_some() {
                return Err(SyncError::Config(format!("zone '{name}' is defined twice")));
            }
        }

        for zone in by_name.values() {
            if let Some(parent) = &zone.parent {
                if !by_name.contains_key(parent) {
                    return Err(SyncError::Config(format!(
                        "zone '{}' has unknown parent '{}'",
                        zone.name, parent
                    )));
                }
            }
            let mut seen = BTreeSet::new();
            let mut current = Some(zone.name.as_str());
            while let Some(name) = current {
                if !seen.insert(name) {
                    return Err(SyncError::Config(format!(
                        "zone '{}' is its own ancestor",
                        zone.name
                    )));
                }
                current = by_name.get(name).and_then(|z| z.parent.as_deref());
            }
        }

        let local_zone = endpoint_zones
            .get(&local_endpoint)
            .cloned()
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "local endpoint '{local_endpoint}' is not a member of any zone"
                ))
            })?;

        Ok(Self {
            local_endpoint,
            local_zone,
            zones: by_name,
            endpoint_zones,
        })
    }

    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.get(name)
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    /// Direct children of `zone`.
    pub fn children(&self, zone: &str) -> Vec<&str> {
        self.zones
            .values()
            .filter(|z| z.parent.as_deref() == Some(zone))
            .map(|z| z.name.as_str())
            .collect()
    }

    /// `zone` followed by its ancestors up to the root.
    pub fn ancestors(&self, zone: &str) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self.zones.get(zone);
        while let Some(z) = current {
            chain.push(z.name.as_str());
            current = z.parent.as_deref().and_then(|p| self.zones.get(p));
        }
        chain
    }

    /// Every zone strictly below `zone`.
    pub fn descendants(&self, zone: &str) -> Vec<&str> {
        let mut found = Vec::new();
        let mut pending = self.children(zone);
        while let Some(name) = pending.pop() {
            found.push(name);
            pending.extend(self.children(name));
        }
        found
    }

    /// Zones this node exchanges messages with directly.
    fn neighbours(&self) -> BTreeSet<&str> {
        let mut zones: BTreeSet<&str> = self.children(&self.local_zone).into_iter().collect();
        zones.insert(self.local_zone.as_str());
        if let Some(parent) = self.parent_zone(&self.local_zone) {
            zones.insert(parent);
        }
        zones
    }
}

impl TrustModel for ZoneTree {
    fn local_endpoint(&self) -> &str {
        &self.local_endpoint
    }

    fn local_zone(&self) -> &str {
        &self.local_zone
    }

    fn endpoint_exists(&self, endpoint: &str) -> bool {
        self.endpoint_zones.contains_key(endpoint)
    }

    fn endpoint_zone(&self, endpoint: &str) -> Option<&str> {
        self.endpoint_zones.get(endpoint).map(String::as_str)
    }

    fn parent_zone(&self, zone: &str) -> Option<&str> {
        self.zones.get(zone)?.parent.as_deref()
    }

    fn relay_targets(&self, scope_zone: &str, origin: Option<&Origin>, include_descendants: bool) -> Vec<String> {
        let origin_zone = origin.and_then(|o| o.from_zone.as_deref());

        // Peers in our own zone already received it from the sender.
        if origin_zone == Some(self.local_zone.as_str()) {
            return Vec::new();
        }

        let mut scope: BTreeSet<&str> = self.ancestors(scope_zone).into_iter().collect();
        if include_descendants {
            scope.extend(self.descendants(scope_zone));
        }
        let neighbours = self.neighbours();

        let mut targets = BTreeSet::new();
        for zone in scope.intersection(&neighbours) {
            if Some(*zone) == origin_zone {
                continue;
            }
            let Some(zone) = self.zones.get(*zone) else {
                continue;
            };
            for endpoint in &zone.endpoints {
                if *endpoint == self.local_endpoint {
                    continue;
                }
                if origin.is_some_and(|o| o.client_identity == *endpoint) {
                    continue;
                }
                targets.insert(endpoint.clone());
            }
        }
        targets.into_iter().collect()
    }
}
