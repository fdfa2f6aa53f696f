//! Runtime mutations that replicate between nodes.
//!
//! Each variant names one replicated property change and knows which
//! attribute paths it touches. Applying a mutation runs under the target
//! object's guard, so multi-attribute variants are never interleaved with
//! other deliveries.

use crate::checkable::{
    Acknowledgement, AcknowledgementType, CheckResult, Comment, Downtime, ACKNOWLEDGEMENT_COMMENT_ID,
};
use crate::entity::{AttributeEditor, Entity, ObjectLookup};
use crate::error::{ModelError, ModelResult};
use serde_json::{Map, Value};
use vigil_types::AttributePath;

/// Boolean feature flags on hosts and services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    ActiveChecks,
    PassiveChecks,
    Notifications,
    Flapping,
    EventHandler,
    Perfdata,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::ActiveChecks,
        Feature::PassiveChecks,
        Feature::Notifications,
        Feature::Flapping,
        Feature::EventHandler,
        Feature::Perfdata,
    ];

    /// The attribute holding this flag.
    pub fn field(self) -> &'static str {
        match self {
            Self::ActiveChecks => "enable_active_checks",
            Self::PassiveChecks => "enable_passive_checks",
            Self::Notifications => "enable_notifications",
            Self::Flapping => "enable_flapping",
            Self::EventHandler => "enable_event_handler",
            Self::Perfdata => "enable_perfdata",
        }
    }
}

/// A replicated runtime change.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CheckResult(CheckResult),
    NextCheck(f64),
    ForceNextCheck(bool),
    ForceNextNotification(bool),
    Feature { feature: Feature, enabled: bool },
    CheckInterval(f64),
    RetryInterval(f64),
    MaxCheckAttempts(i64),
    CheckCommand(String),
    EventCommand(String),
    CheckPeriod(String),
    Vars(Value),
    AddComment(Comment),
    RemoveComment(String),
    AddDowntime(Downtime),
    RemoveDowntime(String),
    Acknowledge(Acknowledgement),
    ClearAcknowledgement,
    NextNotification(f64),
}

impl Mutation {
    /// Short label for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckResult(_) => "check result",
            Self::NextCheck(_) => "next check",
            Self::ForceNextCheck(_) => "force next check",
            Self::ForceNextNotification(_) => "force next notification",
            Self::Feature { .. } => "feature toggle",
            Self::CheckInterval(_) => "check interval",
            Self::RetryInterval(_) => "retry interval",
            Self::MaxCheckAttempts(_) => "max check attempts",
            Self::CheckCommand(_) => "check command",
            Self::EventCommand(_) => "event command",
            Self::CheckPeriod(_) => "check period",
            Self::Vars(_) => "vars",
            Self::AddComment(_) => "add comment",
            Self::RemoveComment(_) => "remove comment",
            Self::AddDowntime(_) => "add downtime",
            Self::RemoveDowntime(_) => "remove downtime",
            Self::Acknowledge(_) => "acknowledgement",
            Self::ClearAcknowledgement => "clear acknowledgement",
            Self::NextNotification(_) => "next notification",
        }
    }

    /// Applies the change to `entity`. Returns `false` when there was
    /// nothing to do (removing an absent comment or downtime).
    pub fn apply(&self, entity: &Entity, lookup: &dyn ObjectLookup) -> ModelResult<bool> {
        entity.edit(lookup, |editor| self.apply_with(editor))
    }

    fn apply_with(&self, editor: &mut AttributeEditor<'_>) -> ModelResult<bool> {
        match self {
            Self::CheckResult(cr) => {
                set(editor, "last_check_result", serde_json::to_value(cr)?)?;
                set(editor, "state", Value::from(u8::from(cr.state)))?;
            }
            Self::NextCheck(at) => set(editor, "next_check", Value::from(*at))?,
            Self::ForceNextCheck(forced) => set(editor, "force_next_check", Value::from(*forced))?,
            Self::ForceNextNotification(forced) => {
                set(editor, "force_next_notification", Value::from(*forced))?
            }
            Self::Feature { feature, enabled } => set(editor, feature.field(), Value::from(*enabled))?,
            Self::CheckInterval(interval) => set(editor, "check_interval", Value::from(*interval))?,
            Self::RetryInterval(interval) => set(editor, "retry_interval", Value::from(*interval))?,
            Self::MaxCheckAttempts(attempts) => {
                set(editor, "max_check_attempts", Value::from(*attempts))?
            }
            Self::CheckCommand(name) => set(editor, "check_command", Value::from(name.as_str()))?,
            Self::EventCommand(name) => set(editor, "event_command", Value::from(name.as_str()))?,
            Self::CheckPeriod(name) => set(editor, "check_period", Value::from(name.as_str()))?,
            Self::Vars(vars) => set(editor, "vars", vars.clone())?,
            Self::AddComment(comment) => {
                let path = AttributePath::from_segments(["comments", comment.id.as_str()])?;
                editor.modify(&path, serde_json::to_value(comment)?)?;
            }
            Self::RemoveComment(id) => return remove_entry(editor, "comments", id),
            Self::AddDowntime(downtime) => {
                let path = AttributePath::from_segments(["downtimes", downtime.id.as_str()])?;
                editor.modify(&path, serde_json::to_value(downtime)?)?;
            }
            Self::RemoveDowntime(id) => return remove_entry(editor, "downtimes", id),
            Self::Acknowledge(ack) => {
                set(editor, "acknowledgement", Value::from(u8::from(ack.kind)))?;
                set(editor, "acknowledgement_expiry", Value::from(ack.expiry))?;
                set(editor, "acknowledgement_author", Value::from(ack.author.as_str()))?;
                set(editor, "acknowledgement_comment", Value::from(ack.comment.as_str()))?;
                let path = AttributePath::from_segments(["comments", ACKNOWLEDGEMENT_COMMENT_ID])?;
                editor.modify(&path, serde_json::to_value(ack.to_comment())?)?;
            }
            Self::ClearAcknowledgement => {
                set(editor, "acknowledgement", Value::from(u8::from(AcknowledgementType::None)))?;
                set(editor, "acknowledgement_expiry", Value::from(0))?;
                set(editor, "acknowledgement_author", Value::from(""))?;
                set(editor, "acknowledgement_comment", Value::from(""))?;
                remove_entry(editor, "comments", ACKNOWLEDGEMENT_COMMENT_ID)?;
            }
            Self::NextNotification(at) => set(editor, "next_notification", Value::from(*at))?,
        }
        Ok(true)
    }
}

fn set(editor: &mut AttributeEditor<'_>, field: &str, value: Value) -> ModelResult<()> {
    let path = AttributePath::parse(field)?;
    editor.modify(&path, value)
}

/// Removes `id` from the mapping held in `field`.
fn remove_entry(editor: &mut AttributeEditor<'_>, field: &str, id: &str) -> ModelResult<bool> {
    let path = AttributePath::parse(field)?;
    let mut entries = match editor.get(&path)? {
        Some(Value::Object(map)) => map,
        Some(Value::Null) | None => Map::new(),
        Some(_) => {
            return Err(ModelError::StructuralType {
                path: path.to_string(),
            })
        }
    };
    if entries.remove(id).is_none() {
        return Ok(false);
    }
    editor.modify(&path, Value::Object(entries))?;
    Ok(true)
}
