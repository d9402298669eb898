/// Per-day claim archive feeding the anchor batcher.
///
/// The request path appends one line per attested claim to a JSONL file
/// keyed by UTC day (`<root>/YYYYMMDD.jsonl`). The batcher later reads back
/// only the content hashes — never raw payloads — so anchoring cannot drift
/// from the canonicalization that produced the hashes.
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AttestError, Result};

/// One archived claim record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Hex-encoded content hash of the claim's canonical bytes.
    pub content_hash: String,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only day-keyed archive of claim content hashes.
pub struct ClaimArchive {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl ClaimArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Day key in `YYYYMMDD` form.
    pub fn day_key(day: NaiveDate) -> String {
        day.format("%Y%m%d").to_string()
    }

    fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.root.join(format!("{}.jsonl", Self::day_key(day)))
    }

    /// Record a claim content hash under the given UTC day.
    pub fn record(&self, day: NaiveDate, content_hash: &[u8; 32]) -> Result<()> {
        let record = ClaimRecord {
            content_hash: hex::encode(content_hash),
            recorded_at: Utc::now(),
        };
        let line = serde_json::to_string(&record)
            .map_err(|e| AttestError::Serialization(e.to_string()))?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        fs::create_dir_all(&self.root)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.day_path(day))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// All claim content hashes recorded for a day, in archive order.
    /// A day with no archive file yields an empty list.
    pub fn hashes_for_day(&self, day: NaiveDate) -> Result<Vec<[u8; 32]>> {
        let path = self.day_path(day);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&path)?;
        let mut hashes = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: ClaimRecord = serde_json::from_str(line)
                .map_err(|e| AttestError::Serialization(format!("{}: {e}", path.display())))?;
            let bytes = hex::decode(&record.content_hash)
                .map_err(|e| AttestError::Serialization(format!("{}: {e}", path.display())))?;
            let hash: [u8; 32] = bytes.try_into().map_err(|_| {
                AttestError::Serialization(format!("{}: hash is not 32 bytes", path.display()))
            })?;
            hashes.push(hash);
        }
        Ok(hashes)
    }
}
