//! Command execution for remote check and event-handler requests.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use vigil_model::{CheckResult, Entity, PerfdataEntry, ServiceState};
use vigil_types::timestamp;

/// Default command timeout in seconds when the definition has none.
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;

const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Runs a command definition on behalf of a (possibly ephemeral) host.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Executes `command` for `target` with the caller-supplied `macros`.
    ///
    /// An `Err` means the command could not be run at all; a command that
    /// ran and failed is reported through the result's state.
    async fn execute(
        &self,
        command: &Entity,
        target: &Entity,
        macros: &Map<String, Value>,
    ) -> SyncResult<CheckResult>;
}

/// Executes commands as local processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Builds the argv for `command`. A string command line runs through
    /// `sh -c` with every macro value shell-quoted; array arguments are
    /// passed verbatim.
    pub fn command_line(
        command: &Entity,
        target: &Entity,
        macros: &Map<String, Value>,
    ) -> SyncResult<Vec<String>> {
        let resolver = MacroResolver {
            macros,
            command_vars: command.get_field("vars").ok(),
            target,
        };
        match command.get_field("command")? {
            Value::String(line) => Ok(vec![
                "sh".to_string(),
                "-c".to_string(),
                resolver.expand(&line, shell_quote),
            ]),
            Value::Array(args) if !args.is_empty() => Ok(args
                .iter()
                .map(|arg| resolver.expand(&value_text(arg), str::to_string))
                .collect()),
            _ => Err(SyncError::Command(format!(
                "{} '{}' has no command line",
                command.type_name(),
                command.name()
            ))),
        }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(
        &self,
        command: &Entity,
        target: &Entity,
        macros: &Map<String, Value>,
    ) -> SyncResult<CheckResult> {
        let argv = Self::command_line(command, target, macros)?;
        let timeout = command
            .get_number("timeout")
            .filter(|t| *t > 0.0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        debug!("Running '{}' for '{}'", argv.join(" "), target.name());

        let start = timestamp::now();
        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SyncError::Command(format!("failed to launch '{}': {e}", argv[0])))?;

        let waited = tokio::time::timeout(Duration::from_secs_f64(timeout), child.wait_with_output()).await;
        let end = timestamp::now();

        let mut cr = match waited {
            Ok(Ok(output)) => {
                let status = output.status.code().map(i64::from).unwrap_or(3);
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                if text.trim().is_empty() {
                    text = String::from_utf8_lossy(&output.stderr).into_owned();
                }
                let (text, perfdata) = split_perfdata(text.trim_end());
                let mut cr = CheckResult::new(ServiceState::from_exit_status(status), text);
                cr.exit_status = status;
                cr.performance_data = perfdata;
                cr
            }
            Ok(Err(e)) => {
                return Err(SyncError::Command(format!("failed to wait for '{}': {e}", argv[0])));
            }
            Err(_) => {
                warn!("Command '{}' for '{}' timed out after {}s", argv[0], target.name(), timeout);
                CheckResult::unknown("<Timeout exceeded.>")
            }
        };

        cr.command = Value::from(argv);
        cr.schedule_start = start;
        cr.execution_start = start;
        cr.schedule_end = end;
        cr.execution_end = end;
        Ok(cr)
    }
}

/// Splits plugin output at the first `|` into text and perfdata tokens.
pub fn split_perfdata(output: &str) -> (String, Vec<PerfdataEntry>) {
    match output.split_once('|') {
        Some((text, perf)) => {
            let entries = perf
                .split_whitespace()
                .map(|token| PerfdataEntry::Raw(Value::from(token)))
                .collect();
            (text.trim_end().to_string(), entries)
        }
        None => (output.to_string(), Vec::new()),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

struct MacroResolver<'a> {
    macros: &'a Map<String, Value>,
    command_vars: Option<Value>,
    target: &'a Entity,
}

impl MacroResolver<'_> {
    /// Looks `name` up in the request macros, then the command's vars, then
    /// the target's attributes (`host.name`, `host.<field>`, `host.vars.<key>`).
    /// The `host.` prefix is optional for attributes.
    fn resolve(&self, name: &str) -> Option<String> {
        if let Some(value) = self.macros.get(name) {
            return Some(value_text(value));
        }
        if let Some(value) = self.command_vars.as_ref().and_then(|vars| vars.get(name)) {
            return Some(value_text(value));
        }
        let field = name.strip_prefix("host.").unwrap_or(name);
        if field == "name" {
            return Some(self.target.name().to_string());
        }
        match field.split_once('.') {
            Some(("vars", key)) => {
                let vars = self.target.get_field("vars").ok()?;
                vars.get(key).map(value_text)
            }
            _ => self.target.get_field(field).ok().map(|v| value_text(&v)),
        }
    }

    /// Replaces `$name$` tokens with `escape(value)`; `$$` is a literal
    /// dollar sign. Unknown macros expand to nothing.
    fn expand(&self, input: &str, escape: fn(&str) -> String) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(start) = rest.find('$') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('$') else {
                out.push_str(&rest[start..]);
                return out;
            };
            let name = &after[..end];
            if name.is_empty() {
                out.push('$');
            } else {
                match self.resolve(name) {
                    Some(value) => out.push_str(&escape(&value)),
                    None => warn!("Macro '{}' is not defined", name),
                }
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Wraps `value` in single quotes so `sh` reads it as one literal word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
