/// Append-only anchor status ledger with rolling retention.
///
/// One entry per anchor attempt, retained newest-last in a single JSON
/// file. Only the batcher appends (single-writer discipline); readers take
/// snapshot copies, so health checks never block an in-flight run. Entries
/// are never mutated — retention prunes oldest-first on every append.
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AttestError, Result};

/// Number of entries kept in the rolling window.
pub const RETAINED_ENTRIES: usize = 90;

/// A run is considered recent enough for health if it happened within this
/// many days.
pub const HEALTHY_WINDOW_DAYS: i64 = 2;

/// Outcome of one anchor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorStatus {
    Success,
    /// Day had zero claims; nothing was submitted. Not an error.
    Skipped,
    Error,
}

/// One anchor attempt, recorded regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorStatusEntry {
    /// Target day, `YYYYMMDD`.
    pub day: String,
    pub status: AnchorStatus,
    pub claim_count: usize,
    /// Hex-encoded Merkle root; absent on skipped days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    /// Transaction hash of the anchoring submission, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Error detail, on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Durable ledger of anchor attempts.
pub struct StatusLedger {
    path: PathBuf,
    entries: RwLock<Vec<AnchorStatusEntry>>,
}

impl StatusLedger {
    /// Open (or create) the ledger file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)
                .map_err(|e| AttestError::Serialization(format!("{}: {e}", path.display())))?
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Append an entry, prune to the retention window, persist.
    pub fn append(&self, entry: AnchorStatusEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
        let excess = entries.len().saturating_sub(RETAINED_ENTRIES);
        if excess > 0 {
            entries.drain(..excess);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&*entries)
            .map_err(|e| AttestError::Serialization(e.to_string()))?;
        fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// Snapshot copy of the full history, oldest first.
    pub fn snapshot(&self) -> Vec<AnchorStatusEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The most recent entry.
    pub fn latest(&self) -> Option<AnchorStatusEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// The most recent entry for a specific day.
    pub fn entry_for_day(&self, day_key: &str) -> Option<AnchorStatusEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|entry| entry.day == day_key)
            .cloned()
    }

    /// Whether a day already has a terminal (success or skipped) entry.
    pub fn day_completed(&self, day_key: &str) -> bool {
        self.entry_for_day(day_key)
            .is_some_and(|entry| entry.status != AnchorStatus::Error)
    }

    /// Healthy iff the most recent entry is within the health window and
    /// did not fail.
    pub fn healthy(&self, now: DateTime<Utc>) -> bool {
        match self.latest() {
            Some(entry) => {
                now - entry.attempted_at <= Duration::days(HEALTHY_WINDOW_DAYS)
                    && entry.status != AnchorStatus::Error
            }
            None => false,
        }
    }
}
