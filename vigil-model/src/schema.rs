use crate::hooks::{LifecycleHooks, NoHooks};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use vigil_types::AttributeClass;

/// Built-in type names.
pub mod types {
    pub const HOST: &str = "Host";
    pub const SERVICE: &str = "Service";
    pub const NOTIFICATION: &str = "Notification";
    pub const USER: &str = "User";
    pub const CHECK_COMMAND: &str = "CheckCommand";
    pub const EVENT_COMMAND: &str = "EventCommand";
    pub const NOTIFICATION_COMMAND: &str = "NotificationCommand";
    pub const TIME_PERIOD: &str = "TimePeriod";
}

/// The declared value kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Number,
    String,
    Dictionary,
    Array,
    Any,
    /// Name of an object of the given type.
    Reference(&'static str),
}

impl FieldKind {
    /// Whether `value` has the right shape for this kind. `null` is always
    /// accepted and means "unset".
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (Self::Any, _) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Reference(_), Value::String(_)) => true,
            (Self::Dictionary, Value::Object(_)) => true,
            (Self::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "boolean"),
            Self::Number => write!(f, "number"),
            Self::String => write!(f, "string"),
            Self::Dictionary => write!(f, "dictionary"),
            Self::Array => write!(f, "array"),
            Self::Any => write!(f, "any"),
            Self::Reference(ty) => write!(f, "name of {ty}"),
        }
    }
}

/// One declared attribute of an entity type.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub class: AttributeClass,
    pub default: Value,
}

impl FieldDescriptor {
    fn new(name: &'static str, kind: FieldKind, class: AttributeClass) -> Self {
        Self {
            name,
            kind,
            class,
            default: Value::Null,
        }
    }

    /// Shorthand for a config-defined field.
    pub fn config(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, kind, AttributeClass::CONFIG)
    }

    /// Shorthand for a runtime-state field.
    pub fn state(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, kind, AttributeClass::STATE)
    }

    /// Sets the value a fresh object starts with.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }

    /// Whether runtime changes to this field are tracked in the overlay.
    pub fn is_config(&self) -> bool {
        self.class.contains(AttributeClass::CONFIG)
    }
}

/// Field table and lifecycle hooks for one entity kind.
///
/// Built once per kind; attribute access by name goes through the index
/// instead of scanning the field list.
pub struct TypeDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
    index: HashMap<&'static str, usize>,
    hooks: Arc<dyn LifecycleHooks>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name, i))
            .collect();
        Self {
            name: name.into(),
            fields,
            index,
            hooks: Arc::new(NoHooks),
        }
    }

    /// Attaches lifecycle hooks.
    pub fn with_hooks(mut self, hooks: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Position of the named field in the field table.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    pub fn hooks(&self) -> &dyn LifecycleHooks {
        self.hooks.as_ref()
    }

    /// Whether this kind carries the checkable field set (hosts and services).
    pub fn is_checkable(&self) -> bool {
        self.name == types::HOST || self.name == types::SERVICE
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields.len())
            .finish()
    }
}

// ── Built-in kinds ───────────────────────────────────────────────

fn checkable_fields() -> Vec<FieldDescriptor> {
    use FieldDescriptor as F;
    use FieldKind as K;

    vec![
        F::config("display_name", K::String),
        F::config("zone", K::String),
        F::config("command_endpoint", K::String),
        F::config("vars", K::Dictionary),
        F::config("check_command", K::Reference(types::CHECK_COMMAND)),
        F::config("event_command", K::Reference(types::EVENT_COMMAND)),
        F::config("check_period", K::Reference(types::TIME_PERIOD)),
        F::config("check_interval", K::Number).with_default(json!(300)),
        F::config("retry_interval", K::Number).with_default(json!(60)),
        F::config("max_check_attempts", K::Number).with_default(json!(3)),
        F::config("enable_active_checks", K::Bool).with_default(json!(true)),
        F::config("enable_passive_checks", K::Bool).with_default(json!(true)),
        F::config("enable_notifications", K::Bool).with_default(json!(true)),
        F::config("enable_flapping", K::Bool).with_default(json!(false)),
        F::config("enable_event_handler", K::Bool).with_default(json!(true)),
        F::config("enable_perfdata", K::Bool).with_default(json!(true)),
        F::state("next_check", K::Number),
        F::state("force_next_check", K::Bool).with_default(json!(false)),
        F::state("force_next_notification", K::Bool).with_default(json!(false)),
        F::state("last_check_result", K::Dictionary),
        F::state("state", K::Number).with_default(json!(0)),
        F::state("acknowledgement", K::Number).with_default(json!(0)),
        F::state("acknowledgement_expiry", K::Number).with_default(json!(0)),
        F::state("acknowledgement_author", K::String),
        F::state("acknowledgement_comment", K::String),
        F::state("comments", K::Dictionary).with_default(json!({})),
        F::state("downtimes", K::Dictionary).with_default(json!({})),
    ]
}

/// `Host` descriptor.
pub fn host() -> TypeDescriptor {
    let mut fields = checkable_fields();
    fields.push(FieldDescriptor::config("address", FieldKind::String));
    TypeDescriptor::new(types::HOST, fields)
}

/// `Service` descriptor. Service objects are named `host!short_name`.
pub fn service() -> TypeDescriptor {
    let mut fields = checkable_fields();
    fields.push(FieldDescriptor::config("host_name", FieldKind::Reference(types::HOST)));
    fields.push(FieldDescriptor::config("short_name", FieldKind::String));
    TypeDescriptor::new(types::SERVICE, fields)
}

/// `Notification` descriptor.
pub fn notification() -> TypeDescriptor {
    use FieldDescriptor as F;
    use FieldKind as K;

    TypeDescriptor::new(
        types::NOTIFICATION,
        vec![
            F::config("host_name", K::Reference(types::HOST)),
            F::config("service_name", K::String),
            F::config("zone", K::String),
            F::config("command", K::Reference(types::NOTIFICATION_COMMAND)),
            F::config("users", K::Array),
            F::config("interval", K::Number).with_default(json!(1800)),
            F::config("vars", K::Dictionary),
            F::state("next_notification", K::Number),
            F::state("notification_number", K::Number).with_default(json!(0)),
        ],
    )
}

/// `User` descriptor.
pub fn user() -> TypeDescriptor {
    use FieldDescriptor as F;
    use FieldKind as K;

    TypeDescriptor::new(
        types::USER,
        vec![
            F::config("display_name", K::String),
            F::config("email", K::String),
            F::config("zone", K::String),
            F::config("enable_notifications", K::Bool).with_default(json!(true)),
            F::config("vars", K::Dictionary),
        ],
    )
}

fn command(name: &'static str) -> TypeDescriptor {
    use FieldDescriptor as F;
    use FieldKind as K;

    TypeDescriptor::new(
        name,
        vec![
            F::config("command", K::Any),
            F::config("arguments", K::Dictionary),
            F::config("zone", K::String),
            F::config("timeout", K::Number).with_default(json!(60)),
            F::config("vars", K::Dictionary),
        ],
    )
}

/// `CheckCommand` descriptor.
pub fn check_command() -> TypeDescriptor {
    command(types::CHECK_COMMAND)
}

/// `EventCommand` descriptor.
pub fn event_command() -> TypeDescriptor {
    command(types::EVENT_COMMAND)
}

/// `NotificationCommand` descriptor.
pub fn notification_command() -> TypeDescriptor {
    command(types::NOTIFICATION_COMMAND)
}

/// `TimePeriod` descriptor.
pub fn time_period() -> TypeDescriptor {
    use FieldDescriptor as F;
    use FieldKind as K;

    TypeDescriptor::new(
        types::TIME_PERIOD,
        vec![
            F::config("display_name", K::String),
            F::config("ranges", K::Dictionary),
            F::config("zone", K::String),
            F::config("vars", K::Dictionary),
        ],
    )
}

/// Every built-in descriptor, in registration order.
pub fn builtin() -> Vec<TypeDescriptor> {
    vec![
        check_command(),
        event_command(),
        notification_command(),
        time_period(),
        user(),
        host(),
        service(),
        notification(),
    ]
}
