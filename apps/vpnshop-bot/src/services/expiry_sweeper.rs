use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{error, info, warn};
use vpnshop_db::repositories::EntitlementLedger;

use crate::services::notification_service::{Notice, Notifier};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub delivered: usize,
    pub failed_deliveries: usize,
    pub marked: usize,
}

/// Sends the one-time "subscription expired" notice.
pub struct ExpirySweeper {
    ledger: Arc<dyn EntitlementLedger>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    batch_size: i64,
    pace: Duration,
}

impl ExpirySweeper {
    pub fn new(
        ledger: Arc<dyn EntitlementLedger>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            notifier,
            interval,
            batch_size: 500,
            pace: Duration::from_millis(50),
        }
    }

    pub fn with_batching(mut self, batch_size: i64, pace: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.pace = pace;
        self
    }

    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting expiry sweeper (every {:?})", self.interval);
        let mut ticker = interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if report.scanned > 0 => info!(
                            "Expiry sweep: {} expired, {} notified, {} undeliverable",
                            report.scanned, report.delivered, report.failed_deliveries
                        ),
                        Ok(_) => {}
                        Err(e) => error!("Expiry sweep failed: {:#}", e),
                    }
                }
                _ = shutdown.recv() => {
                    info!("Expiry sweeper stopping");
                    break;
                }
            }
        }
    }

    /// One pass over every expired, unnotified row. A row whose mark failed
    /// comes back in the next page and is skipped rather than notified twice.
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let as_of = Utc::now();
        let mut report = SweepReport::default();
        let mut handled = HashSet::new();

        loop {
            let batch = self.ledger.expired_unnotified(as_of, self.batch_size).await?;
            let full_batch = batch.len() as i64 >= self.batch_size;
            let mut fresh = 0;

            for user in batch {
                if !handled.insert(user.user_id) {
                    continue;
                }
                fresh += 1;
                report.scanned += 1;

                match self.notifier.notify(user.user_id, Notice::SubscriptionExpired).await {
                    Ok(()) => report.delivered += 1,
                    Err(e) => {
                        report.failed_deliveries += 1;
                        warn!(user_id = user.user_id, "Expiry notice not delivered: {:#}", e);
                    }
                }

                // Marked either way so a blocked chat is not retried forever.
                match self.ledger.mark_expiry_notified(user.user_id, as_of).await {
                    Ok(true) => report.marked += 1,
                    Ok(false) => {}
                    Err(e) => error!(user_id = user.user_id, "Failed to mark expiry notice: {:#}", e),
                }

                if !self.pace.is_zero() {
                    tokio::time::sleep(self.pace).await;
                }
            }

            if !full_batch || fresh == 0 {
                break;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{MemoryLedger, RecordingNotifier, user};
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    fn expired(user_id: i64, ago: ChronoDuration) -> vpnshop_db::models::user::UserEntitlement {
        let mut row = user(user_id);
        row.credential_id = Some(Uuid::new_v4());
        row.expiry_at = Some(Utc::now() - ago);
        row
    }

    fn sweeper(ledger: Arc<MemoryLedger>, notifier: Arc<RecordingNotifier>) -> ExpirySweeper {
        ExpirySweeper::new(ledger, notifier, Duration::from_secs(300))
            .with_batching(2, Duration::ZERO)
    }

    #[tokio::test]
    async fn notices_each_expired_user_once() {
        let ledger = Arc::new(MemoryLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        for id in 1..=5 {
            ledger.seed(expired(id, ChronoDuration::minutes(id)));
        }
        let sweeper = sweeper(ledger.clone(), notifier.clone());

        let first = sweeper.sweep_once().await.unwrap();
        let second = sweeper.sweep_once().await.unwrap();

        assert_eq!(first.scanned, 5);
        assert_eq!(first.delivered, 5);
        assert_eq!(second, SweepReport::default());
        assert_eq!(notifier.sent().len(), 5);
        assert!((1..=5).all(|id| ledger.get(id).expiry_notified));
    }

    #[tokio::test]
    async fn failed_delivery_still_marks_and_batch_continues() {
        let ledger = Arc::new(MemoryLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        ledger.seed(expired(1, ChronoDuration::hours(2)));
        ledger.seed(expired(2, ChronoDuration::hours(1)));
        notifier.block(1);

        let report = sweeper(ledger.clone(), notifier.clone())
            .sweep_once()
            .await
            .unwrap();

        assert_eq!(report.failed_deliveries, 1);
        assert_eq!(report.delivered, 1);
        assert!(ledger.get(1).expiry_notified);
        assert!(ledger.get(2).expiry_notified);
        assert_eq!(notifier.sent(), vec![(2, Notice::SubscriptionExpired)]);
    }

    #[tokio::test]
    async fn unmarked_row_is_not_notified_twice_in_one_pass() {
        let ledger = Arc::new(MemoryLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        for id in 1..=3 {
            ledger.seed(expired(id, ChronoDuration::hours(10 - id)));
        }
        ledger.fail_marks.lock().unwrap().insert(1);

        let report = sweeper(ledger.clone(), notifier.clone())
            .sweep_once()
            .await
            .unwrap();

        let mut notified: Vec<i64> = notifier.sent().iter().map(|(id, _)| *id).collect();
        notified.sort();
        assert_eq!(notified, vec![1, 2, 3]);
        assert_eq!(report.scanned, 3);
        assert_eq!(report.marked, 2);
        assert!(!ledger.get(1).expiry_notified);
    }

    #[tokio::test]
    async fn skips_active_and_never_entitled_users() {
        let ledger = Arc::new(MemoryLedger::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut active = user(1);
        active.credential_id = Some(Uuid::new_v4());
        active.expiry_at = Some(Utc::now() + ChronoDuration::days(1));
        ledger.seed(active);
        let mut never = user(2);
        never.expiry_at = Some(Utc::now() - ChronoDuration::days(1));
        ledger.seed(never);
        ledger.seed(user(3));

        let report = sweeper(ledger, notifier.clone()).sweep_once().await.unwrap();

        assert_eq!(report.scanned, 0);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn scan_errors_are_returned_not_panicked() {
        let ledger = Arc::new(MemoryLedger::default());
        ledger.fail_scans.store(true, Ordering::SeqCst);

        let result = sweeper(ledger, Arc::new(RecordingNotifier::default()))
            .sweep_once()
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn stops_on_shutdown_signal() {
        let ledger = Arc::new(MemoryLedger::default());
        let sweeper = sweeper(ledger, Arc::new(RecordingNotifier::default()));
        let (tx, rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move { sweeper.start(rx).await });
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
