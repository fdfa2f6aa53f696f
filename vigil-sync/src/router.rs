//! Event router: translates between entity changes and wire envelopes.
//!
//! Outbound, every change published on the registry's bus becomes one
//! envelope relayed to the zones entitled to the object. Inbound, every
//! envelope passes the same gate before it may touch anything:
//!
//! 1. the sender must be a known endpoint; its zone is taken from the zone
//!    configuration, and a claimed zone that disagrees is refused
//! 2. the target object must resolve
//! 3. the sender's zone must have access to the object, or the sender must
//!    be the object's command endpoint
//! 4. the mutation is applied with the sender as origin, so the relay that
//!    follows never sends it back the way it came
//!
//! Malformed or unauthorized envelopes never raise; they are logged and
//! reported as [`ApplyOutcome::Discarded`].

use crate::command::{CommandExecutor, ProcessExecutor};
use crate::error::{SyncError, SyncResult};
use crate::hub::{Delivery, RelayScope, ReplicationHub};
use crate::protocol::{
    self, CheckableTarget, CommandType, Envelope, EventMethod, ExecuteCommandParams, TargetKind,
    AGENT_CHECK, AGENT_SERVICE_NAME,
};
use crate::topology;
use crate::trust::TrustModel;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};
use vigil_model::{
    schema, types, CheckResult, Entity, EntityChange, Mutation, ObjectLookup, ObjectRegistry,
};
use vigil_storage::RepositoryStore;
use vigil_types::Origin;

/// Types tried, in order, when `event::SetVars` carries no object type.
pub const LEGACY_VARS_TYPES: [&str; 6] = [
    types::HOST,
    types::SERVICE,
    types::USER,
    types::EVENT_COMMAND,
    types::CHECK_COMMAND,
    types::NOTIFICATION_COMMAND,
];

/// Default number of remote commands running at once.
pub const DEFAULT_COMMAND_CONCURRENCY: usize = 16;

/// Configuration for the event router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Whether remote command execution requests are honoured.
    pub accept_commands: bool,
    /// Remote commands running at once; further requests wait for a slot.
    pub command_concurrency: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            accept_commands: false,
            command_concurrency: DEFAULT_COMMAND_CONCURRENCY,
        }
    }
}

/// Why an inbound envelope was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownMethod,
    /// Sender is not a configured endpoint.
    UnknownEndpoint,
    /// Sender claimed a zone other than its configured one.
    ZoneMismatch,
    /// Sender may not ask this node to run commands.
    InvalidOrigin,
    MalformedParams,
    UnknownTarget,
    Unauthorized,
    /// The new value names a command or period that does not exist.
    DanglingReference,
    /// The model refused the mutation.
    Rejected,
    Unsupported,
}

/// What handling an inbound envelope did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Accepted, but the object already matched.
    Unchanged,
    RepositoryUpdated,
    /// A remote command ran, or a negative result was sent back.
    CommandHandled,
    Discarded(DiscardReason),
}

/// Routes changes between the local registry and the replication hub.
pub struct EventRouter {
    registry: Arc<ObjectRegistry>,
    trust: Arc<dyn TrustModel>,
    hub: Arc<dyn ReplicationHub>,
    executor: Arc<dyn CommandExecutor>,
    repository: Option<RepositoryStore>,
    config: RouterConfig,
}

impl EventRouter {
    pub fn new(
        registry: Arc<ObjectRegistry>,
        trust: Arc<dyn TrustModel>,
        hub: Arc<dyn ReplicationHub>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            trust,
            hub,
            executor: Arc::new(ProcessExecutor::new()),
            repository: None,
            config,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Enables persisting `event::UpdateRepository` payloads.
    pub fn with_repository(mut self, store: RepositoryStore) -> Self {
        self.repository = Some(store);
        self
    }

    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    // ── Local → remote ───────────────────────────────────────────

    /// Relays one applied change to every zone entitled to the object.
    pub async fn relay_change(&self, change: &EntityChange) -> SyncResult<usize> {
        let envelope = protocol::encode_change(&change.entity, &change.mutation)?;
        self.hub
            .relay_message(
                change.origin.clone(),
                RelayScope::Object(Arc::clone(&change.entity)),
                envelope,
                true,
            )
            .await
    }

    /// Relays changes until the bus closes.
    ///
    /// Scheduler-driven changes on paused objects are not emitted; another
    /// node holds the authority for them.
    pub async fn run(self: Arc<Self>, mut changes: mpsc::UnboundedReceiver<EntityChange>) {
        while let Some(change) = changes.recv().await {
            if change.origin.is_none()
                && change.entity.is_paused()
                && is_scheduler_driven(&change.mutation)
            {
                debug!(
                    "Not relaying '{}' for paused {} '{}'",
                    change.mutation.name(),
                    change.entity.type_name(),
                    change.entity.name()
                );
                continue;
            }
            if let Err(e) = self.relay_change(&change).await {
                warn!(
                    "Failed to relay '{}' for {} '{}': {}",
                    change.mutation.name(),
                    change.entity.type_name(),
                    change.entity.name(),
                    e
                );
            }
        }
        debug!("Change stream closed");
    }

    // ── Remote → local ───────────────────────────────────────────

    /// Handles deliveries in arrival order until the inbox closes.
    ///
    /// Command requests run on their own tasks, at most
    /// `command_concurrency` at a time, so a slow plugin never holds up
    /// replication.
    pub async fn serve(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Delivery>) {
        let slots = Arc::new(Semaphore::new(self.config.command_concurrency.max(1)));
        while let Some(delivery) = inbox.recv().await {
            if matches!(delivery.envelope.event_method(), Ok(EventMethod::ExecuteCommand)) {
                let router = Arc::clone(&self);
                let slots = Arc::clone(&slots);
                tokio::spawn(async move {
                    let Ok(_slot) = slots.acquire_owned().await else {
                        return;
                    };
                    router.handle_message(&delivery.origin, &delivery.envelope).await;
                });
                continue;
            }
            self.handle_message(&delivery.origin, &delivery.envelope).await;
        }
        debug!("Inbox closed");
    }

    /// Validates and applies one inbound envelope.
    pub async fn handle_message(&self, origin: &Origin, envelope: &Envelope) -> ApplyOutcome {
        let method = match envelope.event_method() {
            Ok(method) => method,
            Err(_) => {
                debug!(
                    "Ignoring unknown method '{}' from '{}'",
                    envelope.method, origin.client_identity
                );
                return ApplyOutcome::Discarded(DiscardReason::UnknownMethod);
            }
        };

        if !self.trust.endpoint_exists(&origin.client_identity) {
            info!(
                "Discarding '{}' message from '{}': Invalid endpoint origin (client not allowed).",
                method.label(),
                origin.client_identity
            );
            return ApplyOutcome::Discarded(DiscardReason::UnknownEndpoint);
        }

        let Some(origin) = self.bind_origin(origin) else {
            info!(
                "Discarding '{}' message from '{}': Zone does not match the endpoint configuration.",
                method.label(),
                origin
            );
            return ApplyOutcome::Discarded(DiscardReason::ZoneMismatch);
        };

        match method {
            EventMethod::UpdateRepository => self.update_repository(&origin, &envelope.params).await,
            EventMethod::ExecuteCommand => self.execute_command(&origin, &envelope.params).await,
            _ => self.apply_remote(method, &origin, &envelope.params),
        }
    }

    /// Replaces the sender's claimed zone with its configured one. Only the
    /// local endpoint is left without a zone. Returns `None` when a claimed
    /// zone disagrees with the configuration.
    fn bind_origin(&self, origin: &Origin) -> Option<Origin> {
        let sender = origin.client_identity.as_str();
        if sender == self.trust.local_endpoint() {
            return Some(Origin::new(sender));
        }
        let zone = self.trust.endpoint_zone(sender)?;
        if origin.from_zone.as_deref().is_some_and(|claimed| claimed != zone) {
            return None;
        }
        Some(Origin::from_zone(sender, zone))
    }

    fn apply_remote(&self, method: EventMethod, origin: &Origin, params: &Map<String, Value>) -> ApplyOutcome {
        let Some(entity) = self.resolve_target(method, params) else {
            debug!(
                "Ignoring '{}' message from '{}': target does not exist",
                method.label(),
                origin.client_identity
            );
            return ApplyOutcome::Discarded(DiscardReason::UnknownTarget);
        };

        if !self.authorize(origin, &entity) {
            info!(
                "Discarding '{}' message from '{}': Unauthorized access.",
                method.label(),
                origin.client_identity
            );
            return ApplyOutcome::Discarded(DiscardReason::Unauthorized);
        }

        let mutation = match protocol::decode_mutation(method, params) {
            Ok(mutation) => mutation,
            Err(e) => {
                info!(
                    "Discarding '{}' message from '{}': {}",
                    method.label(),
                    origin.client_identity,
                    e
                );
                return ApplyOutcome::Discarded(DiscardReason::MalformedParams);
            }
        };

        if let (Some(type_name), Some(name)) = (method.reference_type(), referenced_name(&mutation)) {
            if !self.registry.object_exists(type_name, name) {
                debug!(
                    "Ignoring '{}' message from '{}': {} '{}' does not exist",
                    method.label(),
                    origin.client_identity,
                    type_name,
                    name
                );
                return ApplyOutcome::Discarded(DiscardReason::DanglingReference);
            }
        }

        match self.registry.apply(&entity, mutation, Some(origin.clone())) {
            Ok(true) => {
                debug!(
                    "Applied '{}' to {} '{}' from '{}'",
                    method.label(),
                    entity.type_name(),
                    entity.name(),
                    origin.client_identity
                );
                ApplyOutcome::Applied
            }
            Ok(false) => ApplyOutcome::Unchanged,
            Err(e) => {
                warn!(
                    "Rejected '{}' message from '{}' for {} '{}': {}",
                    method.label(),
                    origin.client_identity,
                    entity.type_name(),
                    entity.name(),
                    e
                );
                ApplyOutcome::Discarded(DiscardReason::Rejected)
            }
        }
    }

    fn resolve_target(&self, method: EventMethod, params: &Map<String, Value>) -> Option<Arc<Entity>> {
        match method.target_kind() {
            TargetKind::Checkable => {
                let target = CheckableTarget::from_params(params).ok()?;
                match &target.service {
                    Some(short_name) => self.registry.service(&target.host, short_name),
                    None => self.registry.host(&target.host),
                }
            }
            TargetKind::Notification => {
                let name = params.get("notification")?.as_str()?;
                self.registry.get(types::NOTIFICATION, name)
            }
            TargetKind::Object => {
                let name = params.get("object")?.as_str()?;
                match params
                    .get("object_type")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                {
                    Some(type_name) => self.registry.get(type_name, name),
                    None => LEGACY_VARS_TYPES
                        .iter()
                        .find_map(|type_name| self.registry.get(type_name, name)),
                }
            }
            TargetKind::None => None,
        }
    }

    /// Zone access check with the command-endpoint exemption. Only the
    /// local endpoint arrives here without a zone.
    fn authorize(&self, origin: &Origin, entity: &Entity) -> bool {
        let Some(zone) = origin.from_zone.as_deref() else {
            return true;
        };
        if self.trust.can_access_object(zone, entity) {
            return true;
        }
        entity.get_str("command_endpoint").as_deref() == Some(origin.client_identity.as_str())
    }

    // ── Topology ─────────────────────────────────────────────────

    async fn update_repository(&self, origin: &Origin, params: &Map<String, Value>) -> ApplyOutcome {
        let label = EventMethod::UpdateRepository.label();
        let Some(store) = &self.repository else {
            debug!(
                "Ignoring '{}' message from '{}': no repository directory",
                label, origin.client_identity
            );
            return ApplyOutcome::Discarded(DiscardReason::Unsupported);
        };

        match topology::receive_repository(store, self.hub.as_ref(), self.trust.local_zone(), origin, params)
            .await
        {
            Ok(()) => ApplyOutcome::RepositoryUpdated,
            Err(SyncError::Protocol(reason)) => {
                info!(
                    "Discarding '{}' message from '{}': {}",
                    label, origin.client_identity, reason
                );
                ApplyOutcome::Discarded(DiscardReason::MalformedParams)
            }
            Err(e) => {
                warn!(
                    "Failed to store repository from '{}': {}",
                    origin.client_identity, e
                );
                ApplyOutcome::Discarded(DiscardReason::Rejected)
            }
        }
    }

    // ── Remote command execution ─────────────────────────────────

    async fn execute_command(&self, origin: &Origin, params: &Map<String, Value>) -> ApplyOutcome {
        let label = EventMethod::ExecuteCommand.label();
        let sender = origin.client_identity.as_str();

        if let Some(zone) = origin.from_zone.as_deref() {
            if !self.trust.is_child_of(self.trust.local_zone(), zone) {
                info!(
                    "Discarding '{}' message from '{}': Invalid endpoint origin (client not allowed).",
                    label, sender
                );
                return ApplyOutcome::Discarded(DiscardReason::InvalidOrigin);
            }
        }

        let request: ExecuteCommandParams = match serde_json::from_value(Value::Object(params.clone())) {
            Ok(request) => request,
            Err(e) => {
                info!("Discarding '{}' message from '{}': {}", label, sender, e);
                return ApplyOutcome::Discarded(DiscardReason::MalformedParams);
            }
        };

        let host = self.virtual_host(&request);

        if !self.config.accept_commands {
            let local = self.trust.local_endpoint();
            warn!("Ignoring command. '{}' does not accept commands.", local);
            let cr = CheckResult::unknown(format!("Endpoint '{local}' does not accept commands."));
            self.send_result(sender, &host, &cr).await;
            return ApplyOutcome::CommandHandled;
        }

        let (Some(field), Some(type_name)) = (request.command_type.field(), request.command_type.type_name())
        else {
            debug!("Ignoring unsupported command type from '{}'", sender);
            return ApplyOutcome::Discarded(DiscardReason::Unsupported);
        };

        let Some(command) = self.registry.get(type_name, &request.command) else {
            if request.command_type == CommandType::CheckCommand {
                let cr = CheckResult::unknown(format!("Check command '{}' does not exist.", request.command));
                self.send_result(sender, &host, &cr).await;
                return ApplyOutcome::CommandHandled;
            }
            warn!("Event command '{}' does not exist.", request.command);
            return ApplyOutcome::Discarded(DiscardReason::DanglingReference);
        };

        let configured = host
            .set_field(field, Value::from(request.command.as_str()))
            .and_then(|()| host.set_field("command_endpoint", Value::from(sender)));
        if let Err(e) = configured {
            warn!("Cannot prepare host '{}' for '{}': {}", host.name(), sender, e);
            return ApplyOutcome::Discarded(DiscardReason::Rejected);
        }
        host.set_extension(AGENT_CHECK, Value::Bool(true));

        match request.command_type {
            CommandType::CheckCommand => {
                let cr = match self.executor.execute(&command, &host, &request.macros).await {
                    Ok(cr) => cr,
                    Err(e) => {
                        let output = format!("Exception occurred while checking '{}': {}", host.name(), e);
                        error!("{}", output);
                        CheckResult::unknown(output)
                    }
                };
                self.send_result(sender, &host, &cr).await;
            }
            _ => {
                if let Err(e) = self.executor.execute(&command, &host, &request.macros).await {
                    warn!(
                        "Event command '{}' for '{}' failed: {}",
                        request.command,
                        host.name(),
                        e
                    );
                }
            }
        }
        ApplyOutcome::CommandHandled
    }

    /// Ephemeral host standing in for the requester's object.
    fn virtual_host(&self, request: &ExecuteCommandParams) -> Entity {
        let descriptor = self
            .registry
            .descriptor(types::HOST)
            .unwrap_or_else(|| Arc::new(schema::host()));
        let host = Entity::new(descriptor, request.host.as_str());
        if let Some(service) = &request.service {
            host.set_extension(AGENT_SERVICE_NAME, Value::from(service.as_str()));
        }
        host
    }

    /// Sends a check result for `host` back to `endpoint` only.
    async fn send_result(&self, endpoint: &str, host: &Entity, cr: &CheckResult) {
        let target = CheckableTarget::for_entity(host).unwrap_or_else(|| CheckableTarget::host(host.name()));
        let sent = match protocol::check_result_envelope(&target, cr) {
            Ok(envelope) => self.hub.sync_send_message(endpoint, envelope).await,
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("Failed to send check result for '{}' to '{}': {}", target, endpoint, e);
        }
    }
}

/// Changes produced by the local scheduler rather than an operator.
fn is_scheduler_driven(mutation: &Mutation) -> bool {
    matches!(
        mutation,
        Mutation::NextCheck(_) | Mutation::NextNotification(_)
    )
}

/// Object name a command/period mutation points at.
fn referenced_name(mutation: &Mutation) -> Option<&str> {
    match mutation {
        Mutation::CheckCommand(name) | Mutation::EventCommand(name) | Mutation::CheckPeriod(name) => {
            Some(name.as_str())
        }
        _ => None,
    }
}
