use crate::error::{ModelError, ModelResult};
use crate::schema::{FieldDescriptor, FieldKind, TypeDescriptor};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use vigil_types::{AttributeClass, AttributePath};

/// Pseudo-field carrying the version counter in serialized state.
pub const VERSION_KEY: &str = "version";

/// Resolves object names for reference-typed fields.
pub trait ObjectLookup {
    fn object_exists(&self, type_name: &str, name: &str) -> bool;
}

/// Whether an object currently holds authority to act for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Authority {
    Active,
    #[default]
    Paused,
}

#[derive(Debug)]
struct EntityState {
    fields: Vec<Value>,
    /// Attribute path -> value before the first runtime modification.
    overlay: BTreeMap<String, Value>,
    version: u64,
    extensions: Map<String, Value>,
    active: bool,
    start_called: bool,
    stop_called: bool,
    state_loaded: bool,
    authority: Authority,
}

/// A live monitored object.
///
/// Identity is `(type, name)`. All attribute state sits behind one guard per
/// object, so concurrent deliveries targeting the same object serialize while
/// different objects proceed independently. Lifecycle hooks are invoked only
/// after the guard has been released.
pub struct Entity {
    descriptor: Arc<TypeDescriptor>,
    name: String,
    state: Mutex<EntityState>,
}

impl Entity {
    /// Creates an object with every field at its declared default.
    pub fn new(descriptor: Arc<TypeDescriptor>, name: impl Into<String>) -> Self {
        let fields = descriptor.fields().iter().map(|f| f.default.clone()).collect();
        Self {
            descriptor,
            name: name.into(),
            state: Mutex::new(EntityState {
                fields,
                overlay: BTreeMap::new(),
                version: 0,
                extensions: Map::new(),
                active: false,
                start_called: false,
                stop_called: false,
                state_loaded: false,
                authority: Authority::Paused,
            }),
        }
    }

    /// Creates an object from configuration attributes.
    ///
    /// Values are checked against the declared kinds but references are not
    /// resolved, since config items may load in any order.
    pub fn from_config(
        descriptor: Arc<TypeDescriptor>,
        name: impl Into<String>,
        attrs: &Map<String, Value>,
    ) -> ModelResult<Self> {
        let entity = Self::new(descriptor, name);
        for (key, value) in attrs {
            entity.set_field(key, value.clone())?;
        }
        Ok(entity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    fn lock(&self) -> MutexGuard<'_, EntityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn field_index(&self, field: &str) -> ModelResult<usize> {
        self.descriptor
            .field_index(field)
            .ok_or_else(|| ModelError::FieldNotFound {
                type_name: self.descriptor.name().to_string(),
                field: field.to_string(),
            })
    }

    // ── Plain field access ───────────────────────────────────────

    /// Sets a field directly, bypassing the overlay and the version counter.
    pub fn set_field(&self, field: &str, value: Value) -> ModelResult<()> {
        let idx = self.field_index(field)?;
        check_kind(&self.descriptor.fields()[idx], field, &value)?;
        self.lock().fields[idx] = value;
        Ok(())
    }

    pub fn get_field(&self, field: &str) -> ModelResult<Value> {
        let idx = self.field_index(field)?;
        Ok(self.lock().fields[idx].clone())
    }

    /// Value at `path`, or `None` when a nested key is absent.
    pub fn get(&self, path: &AttributePath) -> ModelResult<Option<Value>> {
        let idx = self.field_index(path.root())?;
        let state = self.lock();
        Ok(lookup_nested(&state.fields[idx], path).cloned())
    }

    /// Non-empty string value of a field. Unknown fields yield `None`.
    pub fn get_str(&self, field: &str) -> Option<String> {
        let idx = self.descriptor.field_index(field)?;
        match &self.lock().fields[idx] {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        let idx = self.descriptor.field_index(field)?;
        self.lock().fields[idx].as_bool()
    }

    pub fn get_number(&self, field: &str) -> Option<f64> {
        let idx = self.descriptor.field_index(field)?;
        self.lock().fields[idx].as_f64()
    }

    /// The zone this object belongs to; empty means the local zone.
    pub fn zone(&self) -> Option<String> {
        self.get_str("zone")
    }

    // ── Overlay ──────────────────────────────────────────────────

    /// Runs `f` with exclusive access to this object's attributes.
    ///
    /// Every modification made through the editor is applied under the same
    /// guard, so multi-attribute updates are not interleaved with other
    /// deliveries targeting this object.
    pub fn edit<R>(
        &self,
        lookup: &dyn ObjectLookup,
        f: impl FnOnce(&mut AttributeEditor<'_>) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let mut state = self.lock();
        let mut editor = AttributeEditor {
            descriptor: &self.descriptor,
            state: &mut state,
            lookup,
        };
        f(&mut editor)
    }

    /// Changes the value at `path`, recording the config-defined original on
    /// first divergence and bumping the version.
    pub fn modify_attribute(
        &self,
        path: &AttributePath,
        value: Value,
        lookup: &dyn ObjectLookup,
    ) -> ModelResult<()> {
        self.edit(lookup, |editor| editor.modify(path, value))
    }

    /// Puts the captured original back. Returns `false` if `path` was not
    /// modified.
    pub fn restore_attribute(&self, path: &AttributePath) -> ModelResult<bool> {
        let mut state = self.lock();
        restore(&self.descriptor, &mut state, path)
    }

    pub fn is_attribute_modified(&self, path: &str) -> bool {
        self.lock().overlay.contains_key(path)
    }

    /// Captured originals keyed by attribute path.
    pub fn original_attributes(&self) -> BTreeMap<String, Value> {
        self.lock().overlay.clone()
    }

    /// Current values of every modified attribute path.
    pub fn modified_attributes(&self) -> Vec<(String, Value)> {
        let state = self.lock();
        state
            .overlay
            .keys()
            .map(|key| {
                let current = AttributePath::parse(key)
                    .ok()
                    .and_then(|path| {
                        let idx = self.descriptor.field_index(path.root())?;
                        lookup_nested(&state.fields[idx], &path).cloned()
                    })
                    .unwrap_or(Value::Null);
                (key.clone(), current)
            })
            .collect()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    // ── Serialization ────────────────────────────────────────────

    /// Non-null values of every field whose class intersects `mask`.
    ///
    /// The version counter is included as a pseudo-field when `mask`
    /// selects runtime state.
    pub fn serialize(&self, mask: AttributeClass) -> Map<String, Value> {
        let state = self.lock();
        let mut update = Map::new();
        for (field, value) in self.descriptor.fields().iter().zip(&state.fields) {
            if field.class.intersects(mask) && !value.is_null() {
                update.insert(field.name.to_string(), value.clone());
            }
        }
        if mask.contains(AttributeClass::STATE) && state.version > 0 {
            update.insert(VERSION_KEY.to_string(), Value::from(state.version));
        }
        update
    }

    /// Applies a serialized attribute subset.
    ///
    /// Unknown fields and fields outside `mask` are ignored. A value of the
    /// wrong kind rejects the whole update before anything is written. The
    /// version is never lowered. Returns the number of fields written.
    pub fn deserialize(&self, update: &Map<String, Value>, mask: AttributeClass) -> ModelResult<usize> {
        let mut pending = Vec::with_capacity(update.len());
        let mut version = None;

        for (key, value) in update {
            if key == VERSION_KEY {
                if mask.contains(AttributeClass::STATE) {
                    version = Some(value.as_u64().ok_or_else(|| ModelError::Validation {
                        path: key.clone(),
                        reason: "version must be a non-negative integer".to_string(),
                    })?);
                }
                continue;
            }

            let Some(idx) = self.descriptor.field_index(key) else {
                debug!("Ignoring unknown field '{}' for {} '{}'", key, self.type_name(), self.name);
                continue;
            };
            let field = &self.descriptor.fields()[idx];
            if !field.class.intersects(mask) {
                continue;
            }
            check_kind(field, key, value)?;
            pending.push((idx, value.clone()));
        }

        let mut state = self.lock();
        let applied = pending.len();
        for (idx, value) in pending {
            state.fields[idx] = value;
        }
        if let Some(version) = version {
            state.version = state.version.max(version);
        }
        Ok(applied)
    }

    // ── Extensions ───────────────────────────────────────────────

    /// Attaches a non-persistent value to this object.
    pub fn set_extension(&self, key: &str, value: Value) {
        self.lock().extensions.insert(key.to_string(), value);
    }

    pub fn get_extension(&self, key: &str) -> Option<Value> {
        self.lock().extensions.get(key).cloned()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    pub fn start(&self) {
        self.lock().start_called = true;
    }

    pub fn stop(&self) {
        self.lock().stop_called = true;
    }

    /// Starts the object, marks it active and grants it authority.
    pub fn activate(&self) {
        {
            let mut state = self.lock();
            if state.active {
                return;
            }
            state.start_called = true;
            state.active = true;
        }
        self.set_authority(true);
        self.descriptor.hooks().on_active_changed(self, true);
    }

    /// Revokes authority, marks the object inactive and stops it.
    /// Authority is revoked even when the object was never activated.
    pub fn deactivate(&self) {
        self.set_authority(false);
        if !self.is_active() {
            return;
        }
        self.lock().active = false;
        self.descriptor.hooks().on_active_changed(self, false);
        self.stop();
    }

    /// Moves between `Active` and `Paused`. Entering the current state is a
    /// no-op; returns whether a transition happened.
    pub fn set_authority(&self, authority: bool) -> bool {
        let target = if authority {
            Authority::Active
        } else {
            Authority::Paused
        };
        {
            let mut state = self.lock();
            if state.authority == target {
                return false;
            }
            state.authority = target;
        }
        match target {
            Authority::Active => self.descriptor.hooks().on_resume(self),
            Authority::Paused => self.descriptor.hooks().on_pause(self),
        }
        true
    }

    /// Marks the object's state as loaded and fires `on_state_loaded` the
    /// first time only. Returns whether this call made the transition.
    pub fn set_state_loaded(&self, restored: bool) -> bool {
        {
            let mut state = self.lock();
            if state.state_loaded {
                return false;
            }
            state.state_loaded = true;
        }
        self.descriptor.hooks().on_state_loaded(self, restored);
        true
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn authority(&self) -> Authority {
        self.lock().authority
    }

    pub fn is_paused(&self) -> bool {
        self.authority() == Authority::Paused
    }

    pub fn start_called(&self) -> bool {
        self.lock().start_called
    }

    pub fn stop_called(&self) -> bool {
        self.lock().stop_called
    }

    pub fn is_state_loaded(&self) -> bool {
        self.lock().state_loaded
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.type_name())
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Exclusive view of one object's attributes, handed out by [`Entity::edit`].
pub struct AttributeEditor<'a> {
    descriptor: &'a TypeDescriptor,
    state: &'a mut EntityState,
    lookup: &'a dyn ObjectLookup,
}

impl AttributeEditor<'_> {
    pub fn get(&self, path: &AttributePath) -> ModelResult<Option<Value>> {
        let idx = field_index(self.descriptor, path.root())?;
        Ok(lookup_nested(&self.state.fields[idx], path).cloned())
    }

    pub fn modify(&mut self, path: &AttributePath, value: Value) -> ModelResult<()> {
        let descriptor = self.descriptor;
        let idx = field_index(descriptor, path.root())?;
        let field = &descriptor.fields()[idx];
        let current = self.state.fields[idx].clone();

        let (new_value, previous) = if path.is_nested() {
            let mut root = if current.is_null() {
                Value::Object(Map::new())
            } else {
                current
            };
            let previous = set_nested(&mut root, path, value)?;
            (root, previous)
        } else {
            (value, current)
        };

        check_kind(field, &path.to_string(), &new_value)?;
        if let (FieldKind::Reference(type_name), Value::String(target)) = (field.kind, &new_value) {
            if !target.is_empty() && !self.lookup.object_exists(type_name, target) {
                return Err(ModelError::Validation {
                    path: path.to_string(),
                    reason: format!("object '{target}' of type '{type_name}' does not exist"),
                });
            }
        }

        if field.is_config() {
            self.state.overlay.entry(path.to_string()).or_insert(previous);
        }
        self.state.fields[idx] = new_value;
        self.state.version += 1;
        Ok(())
    }

    pub fn restore(&mut self, path: &AttributePath) -> ModelResult<bool> {
        restore(self.descriptor, self.state, path)
    }
}

fn field_index(descriptor: &TypeDescriptor, field: &str) -> ModelResult<usize> {
    descriptor
        .field_index(field)
        .ok_or_else(|| ModelError::FieldNotFound {
            type_name: descriptor.name().to_string(),
            field: field.to_string(),
        })
}

fn check_kind(field: &FieldDescriptor, path: &str, value: &Value) -> ModelResult<()> {
    if field.kind.accepts(value) {
        Ok(())
    } else {
        Err(ModelError::Validation {
            path: path.to_string(),
            reason: format!("expected {}", field.kind),
        })
    }
}

fn restore(descriptor: &TypeDescriptor, state: &mut EntityState, path: &AttributePath) -> ModelResult<bool> {
    let key = path.to_string();
    let Some(original) = state.overlay.get(&key).cloned() else {
        return Ok(false);
    };
    let idx = field_index(descriptor, path.root())?;

    if path.is_nested() {
        let mut root = state.fields[idx].clone();
        if original.is_null() {
            remove_nested(&mut root, path);
        } else {
            if root.is_null() {
                root = Value::Object(Map::new());
            }
            set_nested(&mut root, path, original)?;
        }
        state.fields[idx] = root;
    } else {
        state.fields[idx] = original;
    }

    let prefix = format!("{key}.");
    state
        .overlay
        .retain(|k, _| k != &key && !k.starts_with(&prefix));
    Ok(true)
}

fn lookup_nested<'v>(root: &'v Value, path: &AttributePath) -> Option<&'v Value> {
    let mut current = root;
    for key in path.nested() {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Sets the leaf at `path` below `root`, creating intermediate mappings.
/// Returns the previous leaf value (`Null` if absent).
fn set_nested(root: &mut Value, path: &AttributePath, value: Value) -> ModelResult<Value> {
    let structural = || ModelError::StructuralType {
        path: path.to_string(),
    };
    let Some((leaf, parents)) = path.nested().split_last() else {
        return Ok(std::mem::replace(root, value));
    };

    let mut current = root;
    for key in parents {
        let Value::Object(map) = current else {
            return Err(structural());
        };
        current = map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let Value::Object(map) = current else {
        return Err(structural());
    };
    Ok(map.insert(leaf.clone(), value).unwrap_or(Value::Null))
}

fn remove_nested(root: &mut Value, path: &AttributePath) {
    let Some((leaf, parents)) = path.nested().split_last() else {
        return;
    };
    let mut current = root;
    for key in parents {
        match current.as_object_mut().and_then(|map| map.get_mut(key)) {
            Some(next) => current = next,
            None => return,
        }
    }
    if let Some(map) = current.as_object_mut() {
        map.remove(leaf);
    }
}
