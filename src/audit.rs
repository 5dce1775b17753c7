// ABOUTME: Audit sink abstraction for reporting notable sync events
// ABOUTME: TracingSink forwards to tracing; MemorySink records entries for inspection

use std::fmt;
use std::sync::{Arc, Mutex};

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Information,
    Warning,
    Error,
    SuccessAudit,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Information => "information",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::SuccessAudit => "success_audit",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives one entry per notable event (ping result, login result, fetch
/// count, send result, caught error).
pub trait AuditSink: Send + Sync {
    fn report(&self, severity: Severity, message: &str);

    fn info(&self, message: &str) {
        self.report(Severity::Information, message);
    }

    fn error(&self, message: &str) {
        self.report(Severity::Error, message);
    }
}

/// Production sink: every entry becomes a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn report(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Information | Severity::SuccessAudit => {
                tracing::info!(audit = %severity, "{}", message)
            }
            Severity::Warning => tracing::warn!(audit = %severity, "{}", message),
            Severity::Error => tracing::error!(audit = %severity, "{}", message),
        }
    }
}

/// A single recorded audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub severity: Severity,
    pub message: String,
}

/// Sink that keeps every entry in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries with the given severity whose message contains `needle`.
    pub fn matching(&self, severity: Severity, needle: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.severity == severity && entry.message.contains(needle))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl AuditSink for MemorySink {
    fn report(&self, severity: Severity, message: &str) {
        tracing::debug!(audit = %severity, "{}", message);
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(AuditEntry {
                severity,
                message: message.to_string(),
            });
        }
    }
}
