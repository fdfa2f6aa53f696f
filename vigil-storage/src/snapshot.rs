//! Dump and restore of the live object population.
//!
//! A snapshot is a sequence of netstring-framed JSON records
//! `{"type": T, "name": N, "update": {attr: value, ...}}`. Dumps replace the
//! target file atomically. Restores decode records on a bounded worker pool
//! and tolerate records that no longer match any live object.

use crate::atomic::AtomicFile;
use crate::error::{StorageError, StorageResult};
use crate::netstring::{read_netstring, write_netstring};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::BufReader;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use vigil_model::ObjectRegistry;
use vigil_types::AttributeClass;

/// Default restore queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 25_000;

/// One snapshot entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(rename = "type")]
    pub type_name: String,
    pub name: String,
    pub update: Map<String, Value>,
}

impl SnapshotRecord {
    /// Decodes one framed payload.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::InvalidRecord(e.to_string()))
    }
}

/// Snapshot engine configuration.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Number of restore workers.
    pub concurrency: usize,
    /// Records buffered between the file reader and the workers.
    pub queue_capacity: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism().map_or(4, usize::from),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Outcome of a dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    /// Records written.
    pub written: usize,
    /// Objects with nothing to persist under the mask.
    pub empty: usize,
}

/// Outcome of a restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    /// Frames read from the file.
    pub records: usize,
    /// Records applied to a live object.
    pub restored: usize,
    /// Records dropped: unknown type or object, corrupt payload, damaged frame.
    pub skipped: usize,
    /// Live objects that had no record and were marked loaded without state.
    pub loaded_without_state: usize,
}

enum RecordOutcome {
    Restored,
    Skipped,
}

#[derive(Default)]
struct Counters {
    restored: AtomicUsize,
    skipped: AtomicUsize,
}

/// Persists and restores every registered object.
pub struct SnapshotEngine {
    registry: Arc<ObjectRegistry>,
    config: SnapshotConfig,
}

impl SnapshotEngine {
    pub fn new(registry: Arc<ObjectRegistry>, config: SnapshotConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Writes every object's attributes selected by `mask` to `path`.
    ///
    /// Objects serializing to nothing are skipped. The target is replaced
    /// only after every record was written.
    pub async fn dump_objects(&self, path: impl AsRef<Path>, mask: AttributeClass) -> StorageResult<DumpStats> {
        let path = path.as_ref();
        info!("Dumping program state to file '{}'", path.display());

        let mut file = AtomicFile::create(path).await?;
        let stats = match self.write_records(&mut file, mask).await {
            Ok(stats) => stats,
            Err(e) => {
                file.discard().await;
                return Err(e);
            }
        };

        file.commit().await?;
        debug!("Wrote {} records to '{}'", stats.written, path.display());
        Ok(stats)
    }

    async fn write_records(&self, file: &mut AtomicFile, mask: AttributeClass) -> StorageResult<DumpStats> {
        let temp = file.temp_path().to_path_buf();
        let mut stats = DumpStats::default();

        for descriptor in self.registry.types() {
            for entity in self.registry.objects_of(descriptor.name()) {
                let update = entity.serialize(mask);
                if update.is_empty() {
                    stats.empty += 1;
                    continue;
                }

                let record = SnapshotRecord {
                    type_name: descriptor.name().to_string(),
                    name: entity.name().to_string(),
                    update,
                };
                let json = serde_json::to_vec(&record)?;
                write_netstring(file.writer(), &json)
                    .await
                    .map_err(StorageError::io("write", &temp))?;
                stats.written += 1;
            }
        }
        Ok(stats)
    }

    /// Applies the snapshot at `path` to the live objects.
    ///
    /// A missing file restores nothing. Individual bad records are skipped;
    /// only failing to stat or open the file fails the call. Once every queued record
    /// has been applied, objects without a record are marked loaded without
    /// state, so every object sees exactly one state-loaded transition.
    pub async fn restore_objects(&self, path: impl AsRef<Path>, mask: AttributeClass) -> StorageResult<RestoreStats> {
        let path = path.as_ref();
        let mut stats = RestoreStats::default();

        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(StorageError::io("stat", path))?;
        if !exists {
            debug!("No snapshot at '{}'", path.display());
            return Ok(stats);
        }

        info!("Restoring program state from file '{}'", path.display());
        let file = File::open(path)
            .await
            .map_err(StorageError::io("open", path))?;
        let mut reader = BufReader::new(file);

        let (tx, rx) = mpsc::channel::<Vec<u8>>(self.config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let workers: Vec<_> = (0..self.config.concurrency.max(1))
            .map(|_| {
                let rx = Arc::clone(&rx);
                let registry = Arc::clone(&self.registry);
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(record) = next else { break };
                        let counter = match restore_record(&registry, &record, mask) {
                            RecordOutcome::Restored => &counters.restored,
                            RecordOutcome::Skipped => &counters.skipped,
                        };
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        loop {
            match read_netstring(&mut reader).await {
                Ok(Some(record)) => {
                    stats.records += 1;
                    if tx.send(record).await.is_err() {
                        error!("Snapshot restore workers exited early");
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Stopped reading '{}' at a damaged record: {}", path.display(), e);
                    stats.skipped += 1;
                    break;
                }
            }
        }
        drop(tx);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Snapshot restore worker failed: {}", e);
            }
        }

        stats.restored = counters.restored.load(Ordering::Relaxed);
        stats.skipped += counters.skipped.load(Ordering::Relaxed);
        stats.loaded_without_state = self.registry.complete_state_load();

        info!(
            "Restored {} objects. Loaded {} new objects without state.",
            stats.restored, stats.loaded_without_state
        );
        if stats.skipped > 0 {
            info!("Skipped {} snapshot records", stats.skipped);
        }
        Ok(stats)
    }
}

fn restore_record(registry: &ObjectRegistry, bytes: &[u8], mask: AttributeClass) -> RecordOutcome {
    let record = match SnapshotRecord::from_bytes(bytes) {
        Ok(record) => record,
        Err(e) => {
            debug!("Skipping snapshot record: {}", e);
            return RecordOutcome::Skipped;
        }
    };

    let Some(entity) = registry.get(&record.type_name, &record.name) else {
        debug!(
            "Skipping snapshot record for unknown {} '{}'",
            record.type_name, record.name
        );
        return RecordOutcome::Skipped;
    };

    if let Err(e) = entity.deserialize(&record.update, mask) {
        debug!(
            "Skipping snapshot record for {} '{}': {}",
            record.type_name, record.name, e
        );
        return RecordOutcome::Skipped;
    }

    entity.set_state_loaded(true);
    RecordOutcome::Restored
}
