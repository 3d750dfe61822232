// src/models/history.rs

//! Sync history log and the pending-export handoff buffer.
//!
//! Both live in the local store scope and are owned exclusively by the
//! background coordinator; retention rules take an explicit `now` so the
//! clock stays controllable in tests.

use serde::{Deserialize, Serialize};

use crate::models::BibliographicItem;

/// Direction of a recorded sync operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Import,
    Export,
}

impl SyncAction {
    fn verb(&self) -> &'static str {
        match self {
            Self::Import => "Imported",
            Self::Export => "Exported",
        }
    }
}

/// One entry of the sync history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncHistoryEntry {
    pub action: SyncAction,

    /// What was synced ("selected items", "full library", "results", ...)
    #[serde(rename = "type")]
    pub kind: String,

    pub count: usize,

    pub timestamp_ms: i64,

    /// Derived human-readable summary
    pub description: String,
}

impl SyncHistoryEntry {
    /// Create an entry, deriving the description from the other fields.
    pub fn new(action: SyncAction, kind: impl Into<String>, count: usize, now_ms: i64) -> Self {
        let kind = kind.into();
        let description = format!("{} {} {}", action.verb(), count, kind);
        Self {
            action,
            kind,
            count,
            timestamp_ms: now_ms,
            description,
        }
    }
}

/// Append-only sync history, capped at the most recent entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncHistory {
    entries: Vec<SyncHistoryEntry>,
}

impl SyncHistory {
    /// Maximum retained entries; appending past this evicts the oldest.
    pub const MAX_ENTRIES: usize = 50;

    /// Retention window for the periodic prune pass.
    pub const RETENTION_MS: i64 = 30 * 24 * 60 * 60 * 1000;

    /// Append an entry, evicting the oldest when over capacity.
    pub fn push(&mut self, entry: SyncHistoryEntry) {
        self.entries.push(entry);
        while self.entries.len() > Self::MAX_ENTRIES {
            self.entries.remove(0);
        }
    }

    /// Drop entries older than the retention window. Returns how many
    /// were removed.
    pub fn prune_older_than(&mut self, now_ms: i64) -> usize {
        let cutoff = now_ms - Self::RETENTION_MS;
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp_ms >= cutoff);
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[SyncHistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Transient handoff buffer written by the extractor flow and read once
/// by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingExport {
    pub items: Vec<BibliographicItem>,
    pub timestamp_ms: i64,
}

impl PendingExport {
    /// Lifetime before the cleanup pass garbage-collects the buffer.
    pub const EXPIRY_MS: i64 = 60 * 60 * 1000;

    pub fn new(items: Vec<BibliographicItem>, now_ms: i64) -> Self {
        Self {
            items,
            timestamp_ms: now_ms,
        }
    }

    /// True once the buffer is older than its expiry window.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp_ms > Self::EXPIRY_MS
    }
}
