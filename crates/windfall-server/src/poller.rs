//! Background inbox poller
//!
//! One long-lived task runs scan cycles on the operator-configured interval.
//! Settings are re-read from the store at the top of every cycle, so flipping
//! the enabled flag (or dropping out of realtime mode) idles the loop without
//! restarting the process. A failed or timed-out cycle logs, backs off, and
//! the loop carries on - it never dies from a single cycle's failure.
//!
//! Cancellation is cooperative: the shutdown signal is observed between
//! cycles, so `stop()` waits at most one scan, and each scan is bounded by
//! `CYCLE_TIMEOUT`.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use windfall_core::db::Database;
use windfall_core::mailbox::MailboxClient;
use windfall_core::pipeline::IngestPipeline;

/// Hard bound on one scan cycle, which also bounds shutdown latency
pub const CYCLE_TIMEOUT: Duration = Duration::from_secs(120);

/// How often an idle (disabled) poller re-checks its settings
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Extra sleep after a failed cycle
const FAILURE_BACKOFF: Duration = Duration::from_secs(300);

/// Handle to the running poller task
pub struct Poller {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Spawn the poller loop
    pub fn start(db: Database, pipeline: IngestPipeline, mailbox: MailboxClient) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            info!("Poller started");

            loop {
                let settings = match db.get_poller_settings() {
                    Ok(settings) => settings,
                    Err(e) => {
                        error!("Failed to read poller settings: {}", e);
                        if sleep_or_shutdown(&mut shutdown_rx, IDLE_CHECK_INTERVAL).await {
                            break;
                        }
                        continue;
                    }
                };

                if !settings.automated() {
                    if sleep_or_shutdown(&mut shutdown_rx, IDLE_CHECK_INTERVAL).await {
                        break;
                    }
                    continue;
                }

                let interval =
                    Duration::from_secs(settings.polling_interval_minutes.max(1) as u64 * 60);

                let sleep_for = match tokio::time::timeout(
                    CYCLE_TIMEOUT,
                    pipeline.run_scan(&mailbox, settings.fetch_count),
                )
                .await
                {
                    Ok(Ok(summary)) => {
                        info!(
                            created = summary.created,
                            fetched = summary.fetched,
                            "Automated scan complete"
                        );
                        interval
                    }
                    Ok(Err(e)) => {
                        error!("Scan cycle failed, backing off: {}", e);
                        interval.max(FAILURE_BACKOFF)
                    }
                    Err(_) => {
                        error!("Scan cycle timed out, backing off");
                        interval.max(FAILURE_BACKOFF)
                    }
                };

                if sleep_or_shutdown(&mut shutdown_rx, sleep_for).await {
                    break;
                }
            }

            info!("Poller stopped");
        });

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal shutdown and await clean loop termination
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Sleep for `duration` unless shutdown is signalled first.
/// Returns true when the loop should exit.
async fn sleep_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        result = shutdown_rx.changed() => result.is_err() || *shutdown_rx.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windfall_core::ai::ExtractorClient;
    use windfall_core::models::{EmailMessage, PollerSettings, PollingMode};
    use windfall_core::mailbox::MockMailbox;
    use windfall_core::pipeline::PipelineConfig;

    fn test_pipeline(db: &Database) -> IngestPipeline {
        IngestPipeline::new(
            db.clone(),
            ExtractorClient::mock(),
            None,
            None,
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_disabled_poller_idles_and_stops_cleanly() {
        let db = Database::in_memory().unwrap();
        let poller = Poller::start(db.clone(), test_pipeline(&db), MailboxClient::mock());

        // Default settings are disabled; the loop is idling on its check interval
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), poller.stop())
            .await
            .expect("poller should stop promptly while idle");
    }

    #[tokio::test]
    async fn test_enabled_poller_runs_a_cycle_then_stops() {
        let db = Database::in_memory().unwrap();
        db.update_poller_settings(&PollerSettings {
            enabled: true,
            polling_mode: PollingMode::Realtime,
            polling_interval_minutes: 60,
            fetch_count: 10,
            ..Default::default()
        })
        .unwrap();

        let mailbox = MockMailbox::new();
        mailbox.push(EmailMessage {
            id: "msg-1".to_string(),
            subject: "You received money".to_string(),
            from: "alerts@bank.example".to_string(),
            body: "You received $75.00 from Jane Doe, ref TX998.".to_string(),
            received_at: None,
        });

        let poller = Poller::start(
            db.clone(),
            test_pipeline(&db),
            MailboxClient::Mock(mailbox),
        );

        // Wait for the first cycle to land
        let mut created = 0;
        for _ in 0..100 {
            created = db.count_topups_for_email("msg-1").unwrap();
            if created > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(created, 1);

        // The loop is now in its interval sleep; stop must interrupt it
        tokio::time::timeout(Duration::from_secs(5), poller.stop())
            .await
            .expect("poller should stop promptly between cycles");

        let settings = db.get_poller_settings().unwrap();
        assert!(settings.last_auto_scan.is_some());
        assert_eq!(settings.last_scan_created, 1);
    }

    #[tokio::test]
    async fn test_manual_mode_is_not_automated() {
        let db = Database::in_memory().unwrap();
        db.update_poller_settings(&PollerSettings {
            enabled: true,
            polling_mode: PollingMode::Manual,
            polling_interval_minutes: 1,
            fetch_count: 10,
            ..Default::default()
        })
        .unwrap();

        let mailbox = MockMailbox::new();
        mailbox.push(EmailMessage {
            id: "msg-1".to_string(),
            subject: "s".to_string(),
            from: "f".to_string(),
            body: "You received $10 from A".to_string(),
            received_at: None,
        });

        let poller = Poller::start(
            db.clone(),
            test_pipeline(&db),
            MailboxClient::Mock(mailbox),
        );

        // Manual mode: no automated cycle should run
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(db.count_topups_for_email("msg-1").unwrap(), 0);

        poller.stop().await;
    }
}
