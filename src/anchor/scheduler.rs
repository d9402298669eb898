/// Daily anchor scheduler with catch-up after downtime.
///
/// Fires the batcher once per UTC day at a fixed time, targeting the
/// previous complete day (the current day is still accumulating claims).
/// The last completed day is persisted, not held in a timer: on start the
/// scheduler checks that state and runs a missed anchor immediately instead
/// of silently dropping it. The invariant is at most one run per calendar
/// day — never zero barring unrecoverable errors, never two (the batcher's
/// per-day ledger check backstops the persisted state).
///
/// A day that ends in `error` is deliberately not marked completed, so the
/// next wakeup retries it.
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info};

use super::batch::AnchorBatcher;
use super::ledger::{AnchorStatus, AnchorStatusEntry};
use crate::archive::ClaimArchive;
use crate::error::{AttestError, Result};

/// Durable scheduler state.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SchedulerState {
    /// `YYYYMMDD` of the last day anchored with a terminal success/skipped
    /// outcome.
    last_completed_day: Option<String>,
}

/// Drives the batcher on a daily cadence.
pub struct AnchorScheduler {
    batcher: Arc<AnchorBatcher>,
    state_path: PathBuf,
    fire_time_utc: NaiveTime,
}

impl AnchorScheduler {
    pub fn new(batcher: Arc<AnchorBatcher>, state_path: impl Into<PathBuf>, fire_time_utc: NaiveTime) -> Self {
        Self {
            batcher,
            state_path: state_path.into(),
            fire_time_utc,
        }
    }

    /// The day a run at `now` should anchor: the previous complete UTC day.
    pub fn target_day(now: DateTime<Utc>) -> NaiveDate {
        now.date_naive().pred_opt().unwrap_or(now.date_naive())
    }

    /// Run the scheduling loop until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(fire_time = %self.fire_time_utc, "anchor scheduler started");

        loop {
            if *shutdown.borrow() {
                return;
            }

            match self.tick(Utc::now(), shutdown.clone()).await {
                Ok(Some(entry)) => {
                    info!(day = %entry.day, status = ?entry.status, "scheduled anchor run recorded");
                }
                Ok(None) => {}
                Err(e) => error!(error = %e, "anchor scheduler tick failed"),
            }

            let wait = self.until_next_fire(Utc::now());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.changed() => {
                    info!("anchor scheduler stopping");
                    return;
                }
            }
        }
    }

    /// One scheduling decision: anchor the target day if it has not been
    /// completed yet. Returns the run's ledger entry, or None when the day
    /// is already done.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Option<AnchorStatusEntry>> {
        let target = Self::target_day(now);
        let target_key = ClaimArchive::day_key(target);

        let state = self.load_state()?;
        if state.last_completed_day.as_deref() >= Some(target_key.as_str()) {
            return Ok(None);
        }

        let entry = self.batcher.run_for_day(target, shutdown).await?;
        if entry.status != AnchorStatus::Error {
            self.store_state(&SchedulerState {
                last_completed_day: Some(target_key),
            })?;
        }
        Ok(Some(entry))
    }

    /// Duration until the next fire instant after `now`.
    fn until_next_fire(&self, now: DateTime<Utc>) -> Duration {
        let today_fire = now.date_naive().and_time(self.fire_time_utc).and_utc();
        let next_fire = if now < today_fire {
            today_fire
        } else {
            (now.date_naive() + chrono::Duration::days(1))
                .and_time(self.fire_time_utc)
                .and_utc()
        };
        (next_fire - now).to_std().unwrap_or(Duration::ZERO)
    }

    fn load_state(&self) -> Result<SchedulerState> {
        if !self.state_path.exists() {
            return Ok(SchedulerState::default());
        }
        let bytes = fs::read(&self.state_path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            AttestError::Serialization(format!("{}: {e}", self.state_path.display()))
        })
    }

    fn store_state(&self, state: &SchedulerState) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| AttestError::Serialization(e.to_string()))?;
        fs::write(&self.state_path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::ledger::StatusLedger;
    use crate::anchor::{AnchorClient, AnchorReceipt};
    use crate::crypto::hash;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingAnchor {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AnchorClient for CountingAnchor {
        fn chain_name(&self) -> &str {
            "mock"
        }

        async fn submit(&self, _day: NaiveDate, root: &[u8; 32]) -> Result<AnchorReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AnchorReceipt {
                chain: "mock".into(),
                tx_hash: "0xtx".into(),
                anchored_root: hex::encode(root),
            })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        archive: Arc<ClaimArchive>,
        client: Arc<CountingAnchor>,
        scheduler: AnchorScheduler,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(ClaimArchive::new(dir.path().join("archive")));
        let ledger = Arc::new(StatusLedger::open(dir.path().join("status.json")).unwrap());
        let client = Arc::new(CountingAnchor {
            calls: AtomicU32::new(0),
        });
        let batcher = Arc::new(AnchorBatcher::new(
            archive.clone(),
            ledger,
            client.clone() as Arc<dyn AnchorClient>,
        ));
        let scheduler = AnchorScheduler::new(
            batcher,
            dir.path().join("scheduler.json"),
            NaiveTime::from_hms_opt(0, 5, 0).unwrap(),
        );
        Fixture {
            _dir: dir,
            archive,
            client,
            scheduler,
        }
    }

    fn now() -> DateTime<Utc> {
        "2024-06-02T08:00:00Z".parse().unwrap()
    }

    fn yesterday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn test_missed_run_catches_up_exactly_once() {
        let fx = fixture();
        fx.archive.record(yesterday(), &hash::hash(b"claim")).unwrap();
        let (_tx, rx) = watch::channel(false);

        // Simulated resume after the fire time was missed
        let first = fx.scheduler.tick(now(), rx.clone()).await.unwrap();
        assert_eq!(first.unwrap().status, AnchorStatus::Success);
        assert_eq!(fx.client.calls.load(Ordering::SeqCst), 1);

        // Same day again: no second run
        let second = fx.scheduler.tick(now(), rx).await.unwrap();
        assert!(second.is_none());
        assert_eq!(fx.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_catch_up_state_survives_restart() {
        let fx = fixture();
        fx.archive.record(yesterday(), &hash::hash(b"claim")).unwrap();
        let (_tx, rx) = watch::channel(false);

        fx.scheduler.tick(now(), rx.clone()).await.unwrap();

        // A rebuilt scheduler over the same state file stays caught up
        let reopened = AnchorScheduler::new(
            Arc::new(AnchorBatcher::new(
                fx.archive.clone(),
                fx.scheduler.batcher.ledger().clone(),
                fx.client.clone() as Arc<dyn AnchorClient>,
            )),
            fx.scheduler.state_path.clone(),
            fx.scheduler.fire_time_utc,
        );
        let result = reopened.tick(now(), rx).await.unwrap();
        assert!(result.is_none());
        assert_eq!(fx.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_day_marks_completed() {
        let fx = fixture();
        let (_tx, rx) = watch::channel(false);

        let entry = fx.scheduler.tick(now(), rx.clone()).await.unwrap().unwrap();
        assert_eq!(entry.status, AnchorStatus::Skipped);
        assert_eq!(fx.client.calls.load(Ordering::SeqCst), 0);

        assert!(fx.scheduler.tick(now(), rx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_day_advances_target() {
        let fx = fixture();
        let (_tx, rx) = watch::channel(false);

        fx.scheduler.tick(now(), rx.clone()).await.unwrap();
        let next_day: DateTime<Utc> = "2024-06-03T00:06:00Z".parse().unwrap();
        let entry = fx.scheduler.tick(next_day, rx).await.unwrap();
        assert_eq!(entry.unwrap().day, "20240602");
    }

    #[test]
    fn test_until_next_fire() {
        let fx = fixture();

        let before: DateTime<Utc> = "2024-06-02T00:00:00Z".parse().unwrap();
        assert_eq!(
            fx.scheduler.until_next_fire(before),
            Duration::from_secs(5 * 60)
        );

        let after: DateTime<Utc> = "2024-06-02T00:06:00Z".parse().unwrap();
        assert_eq!(
            fx.scheduler.until_next_fire(after),
            Duration::from_secs(24 * 60 * 60 - 60)
        );
    }

    #[test]
    fn test_target_day_is_previous_utc_day() {
        assert_eq!(AnchorScheduler::target_day(now()), yesterday());
    }
}
