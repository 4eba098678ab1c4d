//! Audit log of alarm transitions and operator actions

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entries retained before the oldest is dropped
pub const DEFAULT_AUDIT_CAPACITY: usize = 100;

/// Category of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    /// An alarm was raised
    Alarm,
    /// A condition returned to normal
    Normal,
    /// Configuration or operator action
    Audit,
}

/// A single audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    /// Unit display name, or "System"
    pub source: String,
    pub message: String,
}

/// Bounded audit log, newest entry first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    capacity: usize,
    entries: VecDeque<AuditEntry>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Record an entry at the front of the log
    pub fn record(
        &mut self,
        kind: AuditKind,
        source: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) {
        self.entries.push_front(AuditEntry {
            timestamp,
            kind,
            source: source.into(),
            message: message.into(),
        });
        self.entries.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest entry, if any
    pub fn latest(&self) -> Option<&AuditEntry> {
        self.entries.front()
    }

    /// Copy of all entries, newest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.iter().cloned().collect()
    }
}
