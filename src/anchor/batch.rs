/// Daily anchor batcher: Scan → BuildTree → Submit → Record.
///
/// Scan reads the day's claim content hashes from the archive; BuildTree
/// computes the Merkle root; Submit sends `(day, root)` to the anchoring
/// contract with bounded retries; Record appends a status entry regardless
/// of outcome.
///
/// - A day with zero claims records `skipped` and submits nothing.
/// - Transient submission failures retry up to `MAX_SUBMIT_RETRIES` times
///   with a fixed backoff before the run is marked `error`.
/// - A run cancelled by shutdown records `error` with an "interrupted"
///   reason so the next run retries instead of skipping.
/// - Runs are idempotent per day: an existing success/skipped entry makes
///   the run a no-op, so catch-up and manual triggers never double-submit.
/// - The run lock keeps at most one batch run in flight at a time.
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::ledger::{AnchorStatus, AnchorStatusEntry, StatusLedger};
use super::AnchorClient;
use crate::archive::ClaimArchive;
use crate::error::{AttestError, Result};
use crate::merkle;

/// Retries after the initial submission attempt.
pub const MAX_SUBMIT_RETRIES: u32 = 3;
/// Fixed delay between submission attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Orchestrates anchor runs over the claim archive.
pub struct AnchorBatcher {
    archive: Arc<ClaimArchive>,
    ledger: Arc<StatusLedger>,
    client: Arc<dyn AnchorClient>,
    run_lock: tokio::sync::Mutex<()>,
}

impl AnchorBatcher {
    pub fn new(
        archive: Arc<ClaimArchive>,
        ledger: Arc<StatusLedger>,
        client: Arc<dyn AnchorClient>,
    ) -> Self {
        Self {
            archive,
            ledger,
            client,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn ledger(&self) -> &Arc<StatusLedger> {
        &self.ledger
    }

    /// Run the full state machine for one UTC day.
    ///
    /// Returns the ledger entry describing the run — freshly recorded, or
    /// the existing one when the day was already anchored.
    pub async fn run_for_day(
        &self,
        day: NaiveDate,
        shutdown: watch::Receiver<bool>,
    ) -> Result<AnchorStatusEntry> {
        let _guard = self.run_lock.lock().await;

        let day_key = ClaimArchive::day_key(day);
        if let Some(existing) = self.ledger.entry_for_day(&day_key) {
            if existing.status != AnchorStatus::Error {
                info!(day = %day_key, status = ?existing.status, "day already anchored, run is a no-op");
                return Ok(existing);
            }
        }

        // Scan
        let leaves = self.archive.hashes_for_day(day)?;
        info!(day = %day_key, claims = leaves.len(), "anchor run starting");

        let entry = if leaves.is_empty() {
            AnchorStatusEntry {
                day: day_key.clone(),
                status: AnchorStatus::Skipped,
                claim_count: 0,
                merkle_root: None,
                tx_hash: None,
                error: None,
                attempted_at: Utc::now(),
            }
        } else {
            // BuildTree
            let root = merkle::merkle_root(&leaves)?;

            // Submit
            match self.submit_with_retry(day, &root, shutdown).await {
                Ok(receipt) => {
                    info!(
                        day = %day_key,
                        tx_hash = %receipt.tx_hash,
                        "anchor submission confirmed"
                    );
                    AnchorStatusEntry {
                        day: day_key.clone(),
                        status: AnchorStatus::Success,
                        claim_count: leaves.len(),
                        merkle_root: Some(hex::encode(root)),
                        tx_hash: Some(receipt.tx_hash),
                        error: None,
                        attempted_at: Utc::now(),
                    }
                }
                Err(e) => {
                    error!(day = %day_key, error = %e, "anchor run failed");
                    AnchorStatusEntry {
                        day: day_key.clone(),
                        status: AnchorStatus::Error,
                        claim_count: leaves.len(),
                        merkle_root: Some(hex::encode(root)),
                        tx_hash: None,
                        error: Some(e.to_string()),
                        attempted_at: Utc::now(),
                    }
                }
            }
        };

        // Record, regardless of outcome
        self.ledger.append(entry.clone())?;
        Ok(entry)
    }

    async fn submit_with_retry(
        &self,
        day: NaiveDate,
        root: &[u8; 32],
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<super::AnchorReceipt> {
        let mut failures = 0u32;
        loop {
            let outcome = tokio::select! {
                result = self.client.submit(day, root) => result,
                _ = shutdown.changed() => return Err(AttestError::Interrupted),
            };

            match outcome {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    failures += 1;
                    if failures > MAX_SUBMIT_RETRIES {
                        return Err(e);
                    }
                    warn!(
                        chain = self.client.chain_name(),
                        attempt = failures,
                        error = %e,
                        "anchor submission failed, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                        _ = shutdown.changed() => return Err(AttestError::Interrupted),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorReceipt;
    use crate::crypto::hash;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mock anchor client failing the first `fail_times` submissions.
    struct MockAnchor {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl MockAnchor {
        fn failing(fail_times: u32) -> Self {
            Self {
                fail_times,
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AnchorClient for MockAnchor {
        fn chain_name(&self) -> &str {
            "mock"
        }

        async fn submit(&self, _day: NaiveDate, root: &[u8; 32]) -> Result<AnchorReceipt> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(AttestError::AnchorSubmission("rpc unreachable".into()));
            }
            Ok(AnchorReceipt {
                chain: "mock".into(),
                tx_hash: format!("0xtx{call}"),
                anchored_root: hex::encode(root),
            })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        archive: Arc<ClaimArchive>,
        ledger: Arc<StatusLedger>,
        client: Arc<MockAnchor>,
        batcher: AnchorBatcher,
    }

    fn fixture(fail_times: u32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(ClaimArchive::new(dir.path().join("archive")));
        let ledger = Arc::new(StatusLedger::open(dir.path().join("status.json")).unwrap());
        let client = Arc::new(MockAnchor::failing(fail_times));
        let batcher = AnchorBatcher::new(
            archive.clone(),
            ledger.clone(),
            client.clone() as Arc<dyn AnchorClient>,
        );
        Fixture {
            _dir: dir,
            archive,
            ledger,
            client,
            batcher,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn shutdown_handle() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[tokio::test]
    async fn test_empty_day_is_skipped_without_submission() {
        let fx = fixture(0);
        let (_tx, rx) = shutdown_handle();

        let entry = fx.batcher.run_for_day(day(), rx).await.unwrap();
        assert_eq!(entry.status, AnchorStatus::Skipped);
        assert_eq!(entry.claim_count, 0);
        assert!(entry.merkle_root.is_none());
        assert_eq!(fx.client.call_count(), 0);
        assert_eq!(fx.ledger.snapshot().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_twice_then_success() {
        let fx = fixture(2);
        fx.archive.record(day(), &hash::hash(b"claim a")).unwrap();
        fx.archive.record(day(), &hash::hash(b"claim b")).unwrap();
        let (_tx, rx) = shutdown_handle();

        let started = tokio::time::Instant::now();
        let entry = fx.batcher.run_for_day(day(), rx).await.unwrap();

        assert_eq!(entry.status, AnchorStatus::Success);
        assert_eq!(entry.claim_count, 2);
        assert_eq!(fx.client.call_count(), 3, "initial attempt plus 2 retries");
        assert!(
            started.elapsed() >= RETRY_BACKOFF * 2,
            "two backoff sleeps must elapse"
        );

        let expected_root = merkle::merkle_root(&fx.archive.hashes_for_day(day()).unwrap()).unwrap();
        assert_eq!(entry.merkle_root.as_deref(), Some(hex::encode(expected_root).as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_record_error() {
        let fx = fixture(u32::MAX);
        fx.archive.record(day(), &hash::hash(b"claim")).unwrap();
        let (_tx, rx) = shutdown_handle();

        let entry = fx.batcher.run_for_day(day(), rx).await.unwrap();
        assert_eq!(entry.status, AnchorStatus::Error);
        assert_eq!(fx.client.call_count(), 1 + MAX_SUBMIT_RETRIES);
        assert!(entry.error.as_deref().unwrap().contains("rpc unreachable"));
    }

    #[tokio::test]
    async fn test_completed_day_is_idempotent() {
        let fx = fixture(0);
        fx.archive.record(day(), &hash::hash(b"claim")).unwrap();
        let (_tx, rx) = shutdown_handle();

        let first = fx.batcher.run_for_day(day(), rx.clone()).await.unwrap();
        assert_eq!(first.status, AnchorStatus::Success);
        assert_eq!(fx.client.call_count(), 1);

        let second = fx.batcher.run_for_day(day(), rx).await.unwrap();
        assert_eq!(second.status, AnchorStatus::Success);
        assert_eq!(fx.client.call_count(), 1, "no second submission");
        assert_eq!(fx.ledger.snapshot().len(), 1, "no duplicate entry");
    }

    #[tokio::test]
    async fn test_errored_day_is_retried_on_next_run() {
        let fx = fixture(1 + MAX_SUBMIT_RETRIES);
        fx.archive.record(day(), &hash::hash(b"claim")).unwrap();
        let (_tx, rx) = shutdown_handle();

        tokio::time::pause();
        let first = fx.batcher.run_for_day(day(), rx.clone()).await.unwrap();
        assert_eq!(first.status, AnchorStatus::Error);

        let second = fx.batcher.run_for_day(day(), rx).await.unwrap();
        assert_eq!(second.status, AnchorStatus::Success);
        assert_eq!(fx.ledger.snapshot().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_backoff_records_interrupted_error() {
        let fx = fixture(u32::MAX);
        fx.archive.record(day(), &hash::hash(b"claim")).unwrap();
        let (tx, rx) = shutdown_handle();

        // Signal shutdown after the first failure puts the run into backoff
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            let _ = tx.send(true);
        });

        let entry = fx.batcher.run_for_day(day(), rx).await.unwrap();
        trigger.await.unwrap();

        assert_eq!(entry.status, AnchorStatus::Error);
        assert!(entry.error.as_deref().unwrap().contains("interrupted"));
        assert!(!fx.ledger.day_completed(&ClaimArchive::day_key(day())));
    }
}
