//! Node configuration file (`vigil.toml`).
//!
//! ```toml
//! [node]
//! endpoint = "sat-1"
//! state_dir = "/var/lib/vigil"
//! inventory = "/etc/vigil/objects.json"
//!
//! [[zones]]
//! name = "master"
//! endpoints = ["master-1"]
//!
//! [[zones]]
//! name = "sat"
//! parent = "master"
//! endpoints = ["sat-1", "sat-2"]
//!
//! [api]
//! accept_commands = true
//! command_concurrency = 16
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigil_storage::SnapshotConfig;
use vigil_sync::router::DEFAULT_COMMAND_CONCURRENCY;
use vigil_sync::topology::DEFAULT_TOPOLOGY_INTERVAL;
use vigil_sync::{RouterConfig, TopologyConfig, Zone};

/// Snapshot file name inside the state directory.
pub const STATE_FILE: &str = "vigil.state";

/// Runtime attribute modifications, replayed on startup.
pub const MODIFIED_ATTRIBUTES_FILE: &str = "modified-attributes.json";

/// Directory of received topology payloads.
pub const REPOSITORY_DIR: &str = "repository";

const DEFAULT_DUMP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub snapshot: SnapshotSection,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub topology: TopologySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// This node's endpoint name.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Directory holding the snapshot and other runtime state.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// JSON object inventory to load at startup.
    #[serde(default)]
    pub inventory: Option<PathBuf>,
}

fn default_endpoint() -> String {
    "localhost".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            state_dir: default_state_dir(),
            inventory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSection {
    /// Seconds between periodic dumps.
    #[serde(default = "default_dump_interval")]
    pub interval_secs: u64,
    /// Restore workers; defaults to the available parallelism.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

fn default_dump_interval() -> u64 {
    DEFAULT_DUMP_INTERVAL_SECS
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            interval_secs: default_dump_interval(),
            concurrency: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    /// Whether remote command execution requests are honoured.
    #[serde(default)]
    pub accept_commands: bool,
    /// Remote commands allowed to run at once.
    #[serde(default = "default_command_concurrency")]
    pub command_concurrency: usize,
}

fn default_command_concurrency() -> usize {
    DEFAULT_COMMAND_CONCURRENCY
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            accept_commands: false,
            command_concurrency: default_command_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySection {
    /// Seconds between inventory broadcasts.
    #[serde(default = "default_topology_interval")]
    pub interval_secs: u64,
}

fn default_topology_interval() -> u64 {
    DEFAULT_TOPOLOGY_INTERVAL.as_secs()
}

impl Default for TopologySection {
    fn default() -> Self {
        Self {
            interval_secs: default_topology_interval(),
        }
    }
}

impl NodeConfig {
    /// Reads and parses a config file. A missing or malformed file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn state_path(&self) -> PathBuf {
        self.node.state_dir.join(STATE_FILE)
    }

    pub fn modified_attributes_path(&self) -> PathBuf {
        self.node.state_dir.join(MODIFIED_ATTRIBUTES_FILE)
    }

    pub fn repository_dir(&self) -> PathBuf {
        self.node.state_dir.join(REPOSITORY_DIR)
    }

    pub fn dump_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot.interval_secs.max(1))
    }

    pub fn snapshot_config(&self) -> SnapshotConfig {
        let mut config = SnapshotConfig::default();
        if let Some(concurrency) = self.snapshot.concurrency {
            config.concurrency = concurrency.max(1);
        }
        config
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            accept_commands: self.api.accept_commands,
            command_concurrency: self.api.command_concurrency.max(1),
        }
    }

    pub fn topology_config(&self) -> TopologyConfig {
        TopologyConfig {
            interval: Duration::from_secs(self.topology.interval_secs.max(1)),
        }
    }
}
