/// Daily blockchain anchoring for tamper-proof timestamping.
///
/// Once per UTC day the batcher collects the day's claim content hashes,
/// builds a Merkle root over them, and submits `(day, root)` to an
/// anchoring contract. The chain provides independent, immutable proof that
/// the day's claims existed by that point in time.
///
/// Anchoring is always out-of-band: no request path ever waits on a chain
/// call. Outcomes are visible only through the status ledger.
pub mod batch;
pub mod ethereum;
pub mod ledger;
pub mod scheduler;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Receipt returned after a successful anchor submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorReceipt {
    /// Which blockchain (e.g., "ethereum").
    pub chain: String,
    /// Transaction hash on the blockchain.
    pub tx_hash: String,
    /// The 32-byte Merkle root that was anchored, hex-encoded.
    pub anchored_root: String,
}

/// Trait for pluggable anchoring backends.
#[async_trait]
pub trait AnchorClient: Send + Sync {
    /// Name of the blockchain (e.g., "ethereum").
    fn chain_name(&self) -> &str;

    /// Submit `(day, root)` to the anchoring contract. A single call; the
    /// batcher owns retries and backoff.
    async fn submit(&self, day: NaiveDate, root: &[u8; 32]) -> Result<AnchorReceipt>;
}
