//! Runtime payloads attached to hosts and services.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;
use vigil_types::timestamp;

/// Check state as reported by a plugin exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ServiceState {
    #[default]
    Ok = 0,
    Warning = 1,
    Critical = 2,
    Unknown = 3,
}

impl ServiceState {
    /// Maps a plugin exit status; anything outside 0..=3 is `Unknown`.
    pub fn from_exit_status(status: i64) -> Self {
        match status {
            0 => Self::Ok,
            1 => Self::Warning,
            2 => Self::Critical,
            _ => Self::Unknown,
        }
    }
}

impl TryFrom<u8> for ServiceState {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Warning),
            2 => Ok(Self::Critical),
            3 => Ok(Self::Unknown),
            other => Err(format!("invalid state: {other}")),
        }
    }
}

impl From<ServiceState> for u8 {
    fn from(state: ServiceState) -> Self {
        state as u8
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

/// One typed performance data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfdataValue {
    pub label: String,
    pub value: f64,
    #[serde(default)]
    pub counter: bool,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warn: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// A performance data entry: typed when it has the structured shape,
/// otherwise passed through as-is (usually a raw `label=value` string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PerfdataEntry {
    Value(PerfdataValue),
    Raw(Value),
}

/// Result of one check execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    #[serde(default)]
    pub state: ServiceState,
    #[serde(default)]
    pub exit_status: i64,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub performance_data: Vec<PerfdataEntry>,
    #[serde(default)]
    pub schedule_start: f64,
    #[serde(default)]
    pub schedule_end: f64,
    #[serde(default)]
    pub execution_start: f64,
    #[serde(default)]
    pub execution_end: f64,
    #[serde(default)]
    pub command: Value,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub check_source: String,
}

fn default_true() -> bool {
    true
}

impl CheckResult {
    /// A result with all four timestamps set to now.
    pub fn new(state: ServiceState, output: impl Into<String>) -> Self {
        let now = timestamp::now();
        Self {
            state,
            exit_status: state as i64,
            output: output.into(),
            performance_data: Vec::new(),
            schedule_start: now,
            schedule_end: now,
            execution_start: now,
            execution_end: now,
            command: Value::Null,
            active: true,
            check_source: String::new(),
        }
    }

    /// A synthetic `Unknown` result carrying a diagnostic message.
    pub fn unknown(output: impl Into<String>) -> Self {
        Self::new(ServiceState::Unknown, output)
    }

    /// Typed perfdata points, skipping raw entries.
    pub fn perfdata_values(&self) -> impl Iterator<Item = &PerfdataValue> {
        self.performance_data.iter().filter_map(|entry| match entry {
            PerfdataEntry::Value(v) => Some(v),
            PerfdataEntry::Raw(_) => None,
        })
    }
}

/// Who or what produced a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CommentType {
    #[default]
    User = 1,
    Downtime = 2,
    Flapping = 3,
    Acknowledgement = 4,
}

impl TryFrom<u8> for CommentType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::User),
            2 => Ok(Self::Downtime),
            3 => Ok(Self::Flapping),
            4 => Ok(Self::Acknowledgement),
            other => Err(format!("invalid comment type: {other}")),
        }
    }
}

impl From<CommentType> for u8 {
    fn from(kind: CommentType) -> Self {
        kind as u8
    }
}

/// A comment attached to a host or service, stored under `comments.<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub text: String,
    #[serde(default)]
    pub entry_type: CommentType,
    #[serde(default)]
    pub entry_time: f64,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default)]
    pub expire_time: f64,
}

impl Comment {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            author: author.into(),
            text: text.into(),
            entry_type: CommentType::User,
            entry_time: timestamp::now(),
            persistent: false,
            expire_time: 0.0,
        }
    }
}

/// A scheduled downtime, stored under `downtimes.<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Downtime {
    pub id: String,
    pub author: String,
    pub comment: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default = "default_true")]
    pub fixed: bool,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub triggered_by: String,
    #[serde(default)]
    pub scheduled_by: String,
    #[serde(default)]
    pub entry_time: f64,
}

impl Downtime {
    pub fn new(author: impl Into<String>, comment: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            author: author.into(),
            comment: comment.into(),
            start_time,
            end_time,
            fixed: true,
            duration: end_time - start_time,
            triggered_by: String::new(),
            scheduled_by: String::new(),
            entry_time: timestamp::now(),
        }
    }
}

/// Acknowledgement state of a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AcknowledgementType {
    #[default]
    None = 0,
    Normal = 1,
    Sticky = 2,
}

impl TryFrom<u8> for AcknowledgementType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Normal),
            2 => Ok(Self::Sticky),
            other => Err(format!("invalid acknowledgement type: {other}")),
        }
    }
}

impl From<AcknowledgementType> for u8 {
    fn from(kind: AcknowledgementType) -> Self {
        kind as u8
    }
}

/// Key under `comments` of the comment recording the current
/// acknowledgement. An object has at most one acknowledgement.
pub const ACKNOWLEDGEMENT_COMMENT_ID: &str = "acknowledgement";

/// An operator acknowledging a problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub author: String,
    pub comment: String,
    #[serde(rename = "acktype")]
    pub kind: AcknowledgementType,
    #[serde(default)]
    pub notify: bool,
    /// Unix seconds after which the acknowledgement lapses; 0 means never.
    #[serde(default)]
    pub expiry: f64,
}

impl Acknowledgement {
    /// The acknowledgement comment shown alongside the problem. It lapses
    /// together with the acknowledgement.
    pub fn to_comment(&self) -> Comment {
        Comment {
            id: ACKNOWLEDGEMENT_COMMENT_ID.to_string(),
            author: self.author.clone(),
            text: self.comment.clone(),
            entry_type: CommentType::Acknowledgement,
            entry_time: timestamp::now(),
            persistent: false,
            expire_time: self.expiry,
        }
    }
}
