//! Wire envelopes and the event catalogue.
//!
//! Every replicated change travels as a JSON-RPC notification:
//!
//! ```text
//! {"jsonrpc":"2.0","method":"event::SetEnableActiveChecks","params":{"host":"h1","enabled":false}}
//! ```
//!
//! `params` always identifies the target first (`host` plus optional
//! `service` short name, `notification`, or `object` + `object_type`) and
//! then carries the changed value(s) under per-event keys.

use crate::error::{SyncError, SyncResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use vigil_model::{types, Acknowledgement, CheckResult, Entity, Feature, Mutation};

/// Protocol tag carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Extension naming the service an ephemeral agent host reports for.
pub const AGENT_SERVICE_NAME: &str = "agent_service_name";

/// Extension marking an ephemeral agent host.
pub const AGENT_CHECK: &str = "agent_check";

/// The unit relayed between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Envelope {
    pub fn new(method: EventMethod, params: Map<String, Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.as_str().to_string(),
            params,
        }
    }

    /// The catalogue entry named by `method`.
    pub fn event_method(&self) -> SyncResult<EventMethod> {
        self.method.parse()
    }

    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_slice(bytes: &[u8]) -> SyncResult<Self> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.jsonrpc != JSONRPC_VERSION {
            return Err(SyncError::Protocol(format!(
                "unsupported protocol tag '{}'",
                envelope.jsonrpc
            )));
        }
        Ok(envelope)
    }
}

// ── Event catalogue ──────────────────────────────────────────────

/// Every event kind exchanged between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventMethod {
    CheckResult,
    SetNextCheck,
    SetNextNotification,
    SetForceNextCheck,
    SetForceNextNotification,
    SetEnableActiveChecks,
    SetEnablePassiveChecks,
    SetEnableNotifications,
    SetEnableFlapping,
    SetEnableEventHandler,
    SetEnablePerfdata,
    SetCheckInterval,
    SetRetryInterval,
    SetMaxCheckAttempts,
    SetEventCommand,
    SetCheckCommand,
    SetCheckPeriod,
    SetVars,
    AddComment,
    RemoveComment,
    AddDowntime,
    RemoveDowntime,
    SetAcknowledgement,
    ClearAcknowledgement,
    UpdateRepository,
    ExecuteCommand,
}

impl EventMethod {
    pub const ALL: [EventMethod; 26] = [
        Self::CheckResult,
        Self::SetNextCheck,
        Self::SetNextNotification,
        Self::SetForceNextCheck,
        Self::SetForceNextNotification,
        Self::SetEnableActiveChecks,
        Self::SetEnablePassiveChecks,
        Self::SetEnableNotifications,
        Self::SetEnableFlapping,
        Self::SetEnableEventHandler,
        Self::SetEnablePerfdata,
        Self::SetCheckInterval,
        Self::SetRetryInterval,
        Self::SetMaxCheckAttempts,
        Self::SetEventCommand,
        Self::SetCheckCommand,
        Self::SetCheckPeriod,
        Self::SetVars,
        Self::AddComment,
        Self::RemoveComment,
        Self::AddDowntime,
        Self::RemoveDowntime,
        Self::SetAcknowledgement,
        Self::ClearAcknowledgement,
        Self::UpdateRepository,
        Self::ExecuteCommand,
    ];

    /// Wire name, e.g. `event::CheckResult`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CheckResult => "event::CheckResult",
            Self::SetNextCheck => "event::SetNextCheck",
            Self::SetNextNotification => "event::SetNextNotification",
            Self::SetForceNextCheck => "event::SetForceNextCheck",
            Self::SetForceNextNotification => "event::SetForceNextNotification",
            Self::SetEnableActiveChecks => "event::SetEnableActiveChecks",
            Self::SetEnablePassiveChecks => "event::SetEnablePassiveChecks",
            Self::SetEnableNotifications => "event::SetEnableNotifications",
            Self::SetEnableFlapping => "event::SetEnableFlapping",
            Self::SetEnableEventHandler => "event::SetEnableEventHandler",
            Self::SetEnablePerfdata => "event::SetEnablePerfdata",
            Self::SetCheckInterval => "event::SetCheckInterval",
            Self::SetRetryInterval => "event::SetRetryInterval",
            Self::SetMaxCheckAttempts => "event::SetMaxCheckAttempts",
            Self::SetEventCommand => "event::SetEventCommand",
            Self::SetCheckCommand => "event::SetCheckCommand",
            Self::SetCheckPeriod => "event::SetCheckPeriod",
            Self::SetVars => "event::SetVars",
            Self::AddComment => "event::AddComment",
            Self::RemoveComment => "event::RemoveComment",
            Self::AddDowntime => "event::AddDowntime",
            Self::RemoveDowntime => "event::RemoveDowntime",
            Self::SetAcknowledgement => "event::SetAcknowledgement",
            Self::ClearAcknowledgement => "event::ClearAcknowledgement",
            Self::UpdateRepository => "event::UpdateRepository",
            Self::ExecuteCommand => "event::ExecuteCommand",
        }
    }

    /// Label used in discard notices.
    pub fn label(self) -> &'static str {
        match self {
            Self::CheckResult => "check result",
            Self::SetNextCheck => "next check changed",
            Self::SetNextNotification => "next notification changed",
            Self::SetForceNextCheck => "force next check changed",
            Self::SetForceNextNotification => "force next notification changed",
            Self::SetEnableActiveChecks => "enable active checks changed",
            Self::SetEnablePassiveChecks => "enable passive checks changed",
            Self::SetEnableNotifications => "enable notifications changed",
            Self::SetEnableFlapping => "enable flapping changed",
            Self::SetEnableEventHandler => "enable event handler changed",
            Self::SetEnablePerfdata => "enable perfdata changed",
            Self::SetCheckInterval => "check interval changed",
            Self::SetRetryInterval => "retry interval changed",
            Self::SetMaxCheckAttempts => "max check attempts changed",
            Self::SetEventCommand => "event command changed",
            Self::SetCheckCommand => "check command changed",
            Self::SetCheckPeriod => "check period changed",
            Self::SetVars => "vars changed",
            Self::AddComment => "comment added",
            Self::RemoveComment => "comment removed",
            Self::AddDowntime => "downtime added",
            Self::RemoveDowntime => "downtime removed",
            Self::SetAcknowledgement => "acknowledgement set",
            Self::ClearAcknowledgement => "acknowledgement cleared",
            Self::UpdateRepository => "update repository",
            Self::ExecuteCommand => "execute command",
        }
    }

    /// The feature toggled by a `SetEnable*` event.
    pub fn feature(self) -> Option<Feature> {
        match self {
            Self::SetEnableActiveChecks => Some(Feature::ActiveChecks),
            Self::SetEnablePassiveChecks => Some(Feature::PassiveChecks),
            Self::SetEnableNotifications => Some(Feature::Notifications),
            Self::SetEnableFlapping => Some(Feature::Flapping),
            Self::SetEnableEventHandler => Some(Feature::EventHandler),
            Self::SetEnablePerfdata => Some(Feature::Perfdata),
            _ => None,
        }
    }

    pub fn from_feature(feature: Feature) -> Self {
        match feature {
            Feature::ActiveChecks => Self::SetEnableActiveChecks,
            Feature::PassiveChecks => Self::SetEnablePassiveChecks,
            Feature::Notifications => Self::SetEnableNotifications,
            Feature::Flapping => Self::SetEnableFlapping,
            Feature::EventHandler => Self::SetEnableEventHandler,
            Feature::Perfdata => Self::SetEnablePerfdata,
        }
    }

    /// The event that replicates `mutation`.
    pub fn for_mutation(mutation: &Mutation) -> Self {
        match mutation {
            Mutation::CheckResult(_) => Self::CheckResult,
            Mutation::NextCheck(_) => Self::SetNextCheck,
            Mutation::ForceNextCheck(_) => Self::SetForceNextCheck,
            Mutation::ForceNextNotification(_) => Self::SetForceNextNotification,
            Mutation::Feature { feature, .. } => Self::from_feature(*feature),
            Mutation::CheckInterval(_) => Self::SetCheckInterval,
            Mutation::RetryInterval(_) => Self::SetRetryInterval,
            Mutation::MaxCheckAttempts(_) => Self::SetMaxCheckAttempts,
            Mutation::CheckCommand(_) => Self::SetCheckCommand,
            Mutation::EventCommand(_) => Self::SetEventCommand,
            Mutation::CheckPeriod(_) => Self::SetCheckPeriod,
            Mutation::Vars(_) => Self::SetVars,
            Mutation::AddComment(_) => Self::AddComment,
            Mutation::RemoveComment(_) => Self::RemoveComment,
            Mutation::AddDowntime(_) => Self::AddDowntime,
            Mutation::RemoveDowntime(_) => Self::RemoveDowntime,
            Mutation::Acknowledge(_) => Self::SetAcknowledgement,
            Mutation::ClearAcknowledgement => Self::ClearAcknowledgement,
            Mutation::NextNotification(_) => Self::SetNextNotification,
        }
    }

    /// How the event addresses its target.
    pub fn target_kind(self) -> TargetKind {
        match self {
            Self::SetNextNotification => TargetKind::Notification,
            Self::SetVars => TargetKind::Object,
            Self::UpdateRepository | Self::ExecuteCommand => TargetKind::None,
            _ => TargetKind::Checkable,
        }
    }

    /// Type of the object a command/period event must reference.
    pub fn reference_type(self) -> Option<&'static str> {
        match self {
            Self::SetCheckCommand => Some(types::CHECK_COMMAND),
            Self::SetEventCommand => Some(types::EVENT_COMMAND),
            Self::SetCheckPeriod => Some(types::TIME_PERIOD),
            _ => None,
        }
    }
}

impl fmt::Display for EventMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventMethod {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SyncError::UnknownMethod(s.to_string()))
    }
}

/// How an event's params identify the target object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// `host` plus optional `service` short name.
    Checkable,
    /// `notification` names a Notification object.
    Notification,
    /// `object` plus optional `object_type`.
    Object,
    /// No target object.
    None,
}

// ── Targets ──────────────────────────────────────────────────────

/// A host, or a service addressed by host and short name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckableTarget {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
}

impl CheckableTarget {
    pub fn host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service: None,
        }
    }

    pub fn service(host: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service: Some(short_name.into()),
        }
    }

    /// Target identity of a host or service object.
    ///
    /// An ephemeral agent host reports for the service named by its
    /// `agent_service_name` extension.
    pub fn for_entity(entity: &Entity) -> Option<Self> {
        match entity.type_name() {
            types::HOST => {
                let service = entity
                    .get_extension(AGENT_SERVICE_NAME)
                    .and_then(|v| v.as_str().map(str::to_string));
                Some(Self {
                    host: entity.name().to_string(),
                    service,
                })
            }
            types::SERVICE => {
                let (host, short) = match (entity.get_str("host_name"), entity.get_str("short_name")) {
                    (Some(host), Some(short)) => (host, short),
                    _ => {
                        let (host, short) = entity.name().split_once('!')?;
                        (host.to_string(), short.to_string())
                    }
                };
                Some(Self::service(host, short))
            }
            _ => None,
        }
    }

    pub fn from_params(params: &Map<String, Value>) -> SyncResult<Self> {
        let host = param::<String>(params, "host")?;
        let service = match params.get("service") {
            None | Some(Value::Null) => None,
            Some(_) => Some(param::<String>(params, "service")?),
        };
        Ok(Self { host, service })
    }

    pub fn write_into(&self, params: &mut Map<String, Value>) {
        params.insert("host".into(), Value::from(self.host.as_str()));
        if let Some(service) = &self.service {
            params.insert("service".into(), Value::from(service.as_str()));
        }
    }
}

impl fmt::Display for CheckableTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.service {
            Some(service) => write!(f, "{}!{}", self.host, service),
            None => f.write_str(&self.host),
        }
    }
}

// ── Encoding ─────────────────────────────────────────────────────

/// Builds the envelope replicating `mutation` applied to `entity`.
pub fn encode_change(entity: &Entity, mutation: &Mutation) -> SyncResult<Envelope> {
    let method = EventMethod::for_mutation(mutation);
    let mut params = Map::new();

    match method.target_kind() {
        TargetKind::Notification => {
            params.insert("notification".into(), Value::from(entity.name()));
        }
        TargetKind::Object => {
            params.insert("object".into(), Value::from(entity.name()));
            params.insert("object_type".into(), Value::from(entity.type_name()));
        }
        TargetKind::Checkable | TargetKind::None => {
            let target = CheckableTarget::for_entity(entity).ok_or_else(|| {
                SyncError::Protocol(format!(
                    "'{}' cannot be sent for {} '{}'",
                    method,
                    entity.type_name(),
                    entity.name()
                ))
            })?;
            target.write_into(&mut params);
        }
    }

    encode_value(mutation, &mut params)?;
    Ok(Envelope::new(method, params))
}

fn encode_value(mutation: &Mutation, params: &mut Map<String, Value>) -> SyncResult<()> {
    let mut put = |key: &str, value: Value| {
        params.insert(key.to_string(), value);
    };

    match mutation {
        Mutation::CheckResult(cr) => put("cr", serde_json::to_value(cr)?),
        Mutation::NextCheck(at) => put("next_check", Value::from(*at)),
        Mutation::ForceNextCheck(forced) | Mutation::ForceNextNotification(forced) => {
            put("forced", Value::from(*forced))
        }
        Mutation::Feature { enabled, .. } => put("enabled", Value::from(*enabled)),
        Mutation::CheckInterval(interval) | Mutation::RetryInterval(interval) => {
            put("interval", Value::from(*interval))
        }
        Mutation::MaxCheckAttempts(attempts) => put("attempts", Value::from(*attempts)),
        Mutation::CheckCommand(name) | Mutation::EventCommand(name) => {
            put("command", Value::from(name.as_str()))
        }
        Mutation::CheckPeriod(name) => put("timeperiod", Value::from(name.as_str())),
        Mutation::Vars(vars) => put("vars", vars.clone()),
        Mutation::AddComment(comment) => put("comment", serde_json::to_value(comment)?),
        Mutation::RemoveComment(id) | Mutation::RemoveDowntime(id) => put("id", Value::from(id.as_str())),
        Mutation::AddDowntime(downtime) => put("downtime", serde_json::to_value(downtime)?),
        Mutation::Acknowledge(ack) => {
            if let Value::Object(fields) = serde_json::to_value(ack)? {
                for (key, value) in fields {
                    put(&key, value);
                }
            }
        }
        Mutation::ClearAcknowledgement => {}
        Mutation::NextNotification(at) => put("next_notification", Value::from(*at)),
    }
    Ok(())
}

/// Builds a check-result envelope for `target`.
pub fn check_result_envelope(target: &CheckableTarget, cr: &CheckResult) -> SyncResult<Envelope> {
    let mut params = Map::new();
    target.write_into(&mut params);
    params.insert("cr".into(), serde_json::to_value(cr)?);
    Ok(Envelope::new(EventMethod::CheckResult, params))
}

// ── Decoding ─────────────────────────────────────────────────────

/// Reads the changed value(s) of a mutation event.
///
/// The target keys are ignored here; resolving them is the router's job.
pub fn decode_mutation(method: EventMethod, params: &Map<String, Value>) -> SyncResult<Mutation> {
    if let Some(feature) = method.feature() {
        return Ok(Mutation::Feature {
            feature,
            enabled: param(params, "enabled")?,
        });
    }

    let mutation = match method {
        EventMethod::CheckResult => Mutation::CheckResult(param(params, "cr")?),
        EventMethod::SetNextCheck => Mutation::NextCheck(param(params, "next_check")?),
        EventMethod::SetNextNotification => {
            Mutation::NextNotification(param(params, "next_notification")?)
        }
        EventMethod::SetForceNextCheck => Mutation::ForceNextCheck(param(params, "forced")?),
        EventMethod::SetForceNextNotification => {
            Mutation::ForceNextNotification(param(params, "forced")?)
        }
        EventMethod::SetCheckInterval => Mutation::CheckInterval(param(params, "interval")?),
        EventMethod::SetRetryInterval => Mutation::RetryInterval(param(params, "interval")?),
        EventMethod::SetMaxCheckAttempts => Mutation::MaxCheckAttempts(param(params, "attempts")?),
        EventMethod::SetEventCommand => Mutation::EventCommand(param(params, "command")?),
        EventMethod::SetCheckCommand => Mutation::CheckCommand(param(params, "command")?),
        EventMethod::SetCheckPeriod => Mutation::CheckPeriod(param(params, "timeperiod")?),
        EventMethod::SetVars => match param::<Value>(params, "vars")? {
            vars @ Value::Object(_) => Mutation::Vars(vars),
            _ => {
                return Err(SyncError::Protocol(
                    "parameter 'vars' must be a dictionary".into(),
                ))
            }
        },
        EventMethod::AddComment => Mutation::AddComment(param(params, "comment")?),
        EventMethod::RemoveComment => Mutation::RemoveComment(param(params, "id")?),
        EventMethod::AddDowntime => Mutation::AddDowntime(param(params, "downtime")?),
        EventMethod::RemoveDowntime => Mutation::RemoveDowntime(param(params, "id")?),
        EventMethod::SetAcknowledgement => {
            let ack: Acknowledgement = serde_json::from_value(Value::Object(params.clone()))
                .map_err(|e| SyncError::Protocol(format!("invalid acknowledgement: {e}")))?;
            Mutation::Acknowledge(ack)
        }
        EventMethod::ClearAcknowledgement => Mutation::ClearAcknowledgement,
        other => {
            return Err(SyncError::Protocol(format!("'{other}' does not carry a mutation")));
        }
    };
    Ok(mutation)
}

/// Reads and converts one parameter.
pub fn param<T: DeserializeOwned>(params: &Map<String, Value>, key: &str) -> SyncResult<T> {
    let value = params
        .get(key)
        .ok_or_else(|| SyncError::Protocol(format!("missing parameter '{key}'")))?;
    T::deserialize(value).map_err(|e| SyncError::Protocol(format!("invalid parameter '{key}': {e}")))
}

// ── Command and topology payloads ────────────────────────────────

/// Kind of command a remote execution request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    CheckCommand,
    EventCommand,
    #[serde(other)]
    Unsupported,
}

impl CommandType {
    /// Host field the command name is stored in.
    pub fn field(self) -> Option<&'static str> {
        match self {
            Self::CheckCommand => Some("check_command"),
            Self::EventCommand => Some("event_command"),
            Self::Unsupported => None,
        }
    }

    /// Registry type of the command definition.
    pub fn type_name(self) -> Option<&'static str> {
        match self {
            Self::CheckCommand => Some(types::CHECK_COMMAND),
            Self::EventCommand => Some(types::EVENT_COMMAND),
            Self::Unsupported => None,
        }
    }
}

/// Params of `event::ExecuteCommand`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCommandParams {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub command: String,
    pub command_type: CommandType,
    #[serde(default)]
    pub macros: Map<String, Value>,
}

impl ExecuteCommandParams {
    pub fn into_envelope(self) -> SyncResult<Envelope> {
        match serde_json::to_value(self)? {
            Value::Object(params) => Ok(Envelope::new(EventMethod::ExecuteCommand, params)),
            _ => Err(SyncError::Protocol("command params must be a dictionary".into())),
        }
    }
}

/// Params of `event::UpdateRepository`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryParams {
    pub seen: f64,
    pub endpoint: String,
    pub zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_zone: Option<String>,
    /// Host name to the short names of its services.
    pub repository: BTreeMap<String, Vec<String>>,
}

impl RepositoryParams {
    pub fn into_envelope(self) -> SyncResult<Envelope> {
        match serde_json::to_value(self)? {
            Value::Object(params) => Ok(Envelope::new(EventMethod::UpdateRepository, params)),
            _ => Err(SyncError::Protocol("repository params must be a dictionary".into())),
        }
    }
}
