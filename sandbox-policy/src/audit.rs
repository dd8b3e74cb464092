//! Structured audit stream
//!
//! One JSON object per line, always carrying a UTC `ts` and a `type`. Info
//! records (configuration, verification results) are always written.
//! Per-request decision records are dropped at [`Verbosity::Quiet`].

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    #[default]
    Normal,
    Quiet,
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Verbosity::Normal),
            "quiet" => Ok(Verbosity::Quiet),
            other => Err(format!("Unknown log level '{}'. Use 'normal' or 'quiet'.", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allowed,
    Blocked,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    Info {
        msg: String,
    },
    Decision {
        #[serde(skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        host: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        action: Action,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AuditEvent {
    pub fn blocked(method: Option<&str>, host: &str, path: Option<&str>) -> Self {
        AuditEvent::Decision {
            method: method.map(str::to_string),
            host: host.to_string(),
            path: path.map(str::to_string),
            status: None,
            action: Action::Blocked,
            error: None,
        }
    }

    pub fn allowed(method: &str, host: &str, path: &str, status: u16) -> Self {
        AuditEvent::Decision {
            method: Some(method.to_string()),
            host: host.to_string(),
            path: Some(path.to_string()),
            status: Some(status),
            action: Action::Allowed,
            error: None,
        }
    }

    pub fn error(host: &str, path: &str, error: &str) -> Self {
        AuditEvent::Decision {
            method: None,
            host: host.to_string(),
            path: Some(path.to_string()),
            status: None,
            action: Action::Error,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Serialize)]
struct Record<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Append-only audit sink, safe to share across connection tasks
pub struct AuditLog {
    verbosity: Verbosity,
    sink: Mutex<Box<dyn Write + Send>>,
}

impl AuditLog {
    /// Audit log on standard output
    pub fn stdout(verbosity: Verbosity) -> Self {
        Self::with_writer(verbosity, io::stdout())
    }

    pub fn with_writer<W: Write + Send + 'static>(verbosity: Verbosity, writer: W) -> Self {
        Self {
            verbosity,
            sink: Mutex::new(Box::new(writer)),
        }
    }

    /// Write an info record regardless of verbosity
    pub fn info(&self, msg: impl Into<String>) {
        self.emit(&AuditEvent::Info { msg: msg.into() });
    }

    /// Write a per-request decision record unless running quiet
    pub fn decision(&self, event: AuditEvent) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }
        self.emit(&event);
    }

    fn emit(&self, event: &AuditEvent) {
        let record = Record {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            event,
        };

        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to serialize audit record: {}", e);
                return;
            }
        };
        line.push(b'\n');

        // A poisoned lock still guards a usable writer
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = sink.write_all(&line).and_then(|_| sink.flush()) {
            tracing::warn!("Failed to write audit record: {}", e);
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}
