use crate::bus::{ChangeBus, EntityChange};
use crate::entity::{Entity, ObjectLookup};
use crate::error::{ModelError, ModelResult};
use crate::mutation::Mutation;
use crate::schema::{self, types, TypeDescriptor};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};
use vigil_types::Origin;

struct TypeEntry {
    descriptor: Arc<TypeDescriptor>,
    objects: BTreeMap<String, Arc<Entity>>,
}

/// Lookup and enumeration of live objects by type and name.
///
/// Returned objects are shared handles; the registry lock is never held
/// while calling into an object.
#[derive(Default)]
pub struct ObjectRegistry {
    types: RwLock<BTreeMap<String, TypeEntry>>,
    bus: ChangeBus,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in type registered.
    pub fn with_builtin_types() -> Self {
        let registry = Self::new();
        for descriptor in schema::builtin() {
            registry.register_type(descriptor);
        }
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, TypeEntry>> {
        self.types.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, TypeEntry>> {
        self.types.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a type. An existing registration with the same name is
    /// kept and returned.
    pub fn register_type(&self, descriptor: TypeDescriptor) -> Arc<TypeDescriptor> {
        let mut types = self.write();
        let entry = types
            .entry(descriptor.name().to_string())
            .or_insert_with(|| TypeEntry {
                descriptor: Arc::new(descriptor),
                objects: BTreeMap::new(),
            });
        Arc::clone(&entry.descriptor)
    }

    pub fn descriptor(&self, type_name: &str) -> Option<Arc<TypeDescriptor>> {
        self.read().get(type_name).map(|e| Arc::clone(&e.descriptor))
    }

    /// Every registered type, ordered by name.
    pub fn types(&self) -> Vec<Arc<TypeDescriptor>> {
        self.read().values().map(|e| Arc::clone(&e.descriptor)).collect()
    }

    /// Builds an object from config attributes and registers it.
    pub fn create(&self, type_name: &str, name: &str, attrs: &Map<String, Value>) -> ModelResult<Arc<Entity>> {
        let descriptor = self
            .descriptor(type_name)
            .ok_or_else(|| ModelError::UnknownType(type_name.to_string()))?;
        let entity = Arc::new(Entity::from_config(descriptor, name, attrs)?);
        self.register(Arc::clone(&entity))?;
        Ok(entity)
    }

    pub fn register(&self, entity: Arc<Entity>) -> ModelResult<()> {
        let mut types = self.write();
        let entry = types
            .get_mut(entity.type_name())
            .ok_or_else(|| ModelError::UnknownType(entity.type_name().to_string()))?;
        if entry.objects.contains_key(entity.name()) {
            return Err(ModelError::DuplicateObject {
                type_name: entity.type_name().to_string(),
                name: entity.name().to_string(),
            });
        }
        debug!("Registered {} '{}'", entity.type_name(), entity.name());
        entry.objects.insert(entity.name().to_string(), entity);
        Ok(())
    }

    pub fn unregister(&self, type_name: &str, name: &str) -> Option<Arc<Entity>> {
        self.write().get_mut(type_name)?.objects.remove(name)
    }

    pub fn get(&self, type_name: &str, name: &str) -> Option<Arc<Entity>> {
        self.read().get(type_name)?.objects.get(name).cloned()
    }

    /// Every object of a type, ordered by name.
    pub fn objects_of(&self, type_name: &str) -> Vec<Arc<Entity>> {
        self.read()
            .get(type_name)
            .map(|e| e.objects.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every object of every type.
    pub fn all_objects(&self) -> Vec<Arc<Entity>> {
        self.read()
            .values()
            .flat_map(|e| e.objects.values().cloned())
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.read().values().map(|e| e.objects.len()).sum()
    }

    // ── Checkables ───────────────────────────────────────────────

    pub fn host(&self, name: &str) -> Option<Arc<Entity>> {
        self.get(types::HOST, name)
    }

    /// Resolves a service by its host and short name.
    pub fn service(&self, host: &str, short_name: &str) -> Option<Arc<Entity>> {
        self.get(types::SERVICE, &service_name(host, short_name))
    }

    /// Every service attached to `host`.
    pub fn services_of(&self, host: &str) -> Vec<Arc<Entity>> {
        self.objects_of(types::SERVICE)
            .into_iter()
            .filter(|s| s.get_str("host_name").as_deref() == Some(host))
            .collect()
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Applies `mutation` to `entity` and publishes the change.
    ///
    /// `origin` is forwarded to subscribers so they can suppress relaying
    /// the change back toward where it came from.
    pub fn apply(&self, entity: &Arc<Entity>, mutation: Mutation, origin: Option<Origin>) -> ModelResult<bool> {
        let changed = mutation.apply(entity, self)?;
        if changed {
            self.bus.publish(EntityChange {
                entity: Arc::clone(entity),
                mutation,
                origin,
            });
        }
        Ok(changed)
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<EntityChange> {
        self.bus.subscribe()
    }

    /// Invokes `visitor(entity, path, current value)` for every modified
    /// attribute of every object.
    pub fn dump_modified_attributes<F>(&self, mut visitor: F)
    where
        F: FnMut(&Arc<Entity>, &str, &Value),
    {
        for entity in self.all_objects() {
            for (path, value) in entity.modified_attributes() {
                visitor(&entity, &path, &value);
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Fires the state-loaded transition for every object that did not get
    /// one from a snapshot record. Returns how many objects that was.
    pub fn complete_state_load(&self) -> usize {
        self.all_objects()
            .iter()
            .filter(|entity| entity.set_state_loaded(false))
            .count()
    }

    pub fn activate_objects(&self) {
        let objects = self.all_objects();
        for entity in &objects {
            entity.activate();
        }
        info!("Activated {} objects", objects.len());
    }

    /// Deactivates every object.
    pub fn stop_objects(&self) {
        let objects = self.all_objects();
        for entity in &objects {
            entity.deactivate();
        }
        info!("Deactivated {} objects", objects.len());
    }
}

impl ObjectLookup for ObjectRegistry {
    fn object_exists(&self, type_name: &str, name: &str) -> bool {
        self.read()
            .get(type_name)
            .is_some_and(|e| e.objects.contains_key(name))
    }
}

/// Full object name of a service.
pub fn service_name(host: &str, short_name: &str) -> String {
    format!("{host}!{short_name}")
}
