use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::config::{SchedulerConfig, SyncMode};
use super::manager::LayoutManager;

/// Messages to control the sync scheduler
#[derive(Debug)]
pub enum SyncSchedulerMessage {
    /// Run a pass now, regardless of mode
    SyncNow,
    /// App closing
    Shutdown,
}

/// Handle for the background sync scheduler
pub struct SyncScheduler {
    sender: mpsc::Sender<SyncSchedulerMessage>,
    shutdown: CancellationToken,
}

impl SyncScheduler {
    /// Request an immediate sync
    pub fn sync_now(&self) {
        let _ = self.sender.try_send(SyncSchedulerMessage::SyncNow);
    }

    /// Stop the scheduler, cancelling a pass it started
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let _ = self.sender.try_send(SyncSchedulerMessage::Shutdown);
    }
}

/// Minimum sync interval in seconds (prevents runaway syncing)
const MIN_INTERVAL_SECS: u64 = 60;

const DEFAULT_INTERVAL_SECS: u64 = 300;

/// Interval between passes, `None` for manual mode
fn effective_interval(config: &SchedulerConfig) -> Option<Duration> {
    match config.mode {
        SyncMode::Manual => None,
        SyncMode::Periodic => {
            let secs = config
                .interval_secs
                .unwrap_or(DEFAULT_INTERVAL_SECS)
                .max(MIN_INTERVAL_SECS);
            Some(Duration::from_secs(secs))
        }
    }
}

/// Start the sync scheduler.
///
/// In periodic mode a pass runs every interval while the manager is online. In
/// either mode [`SyncScheduler::sync_now`] triggers a pass. Must be called from
/// within a tokio runtime.
pub fn start_sync_scheduler(manager: LayoutManager, config: &SchedulerConfig) -> SyncScheduler {
    spawn_scheduler(manager, effective_interval(config))
}

fn spawn_scheduler(manager: LayoutManager, interval: Option<Duration>) -> SyncScheduler {
    let (tx, rx) = mpsc::channel(32);
    let shutdown = CancellationToken::new();

    tokio::spawn(sync_scheduler_loop(manager, interval, rx, shutdown.clone()));

    SyncScheduler {
        sender: tx,
        shutdown,
    }
}

async fn run_pass(manager: &LayoutManager, shutdown: &CancellationToken, trigger: &str) {
    if !manager.is_online() {
        log::debug!("Sync scheduler: offline, skipping {} sync", trigger);
        return;
    }

    log::info!("Sync scheduler: running {} sync", trigger);
    match manager.sync_with_remote(shutdown.child_token()).await {
        Ok(result) if result.cancelled => {
            log::info!("Sync scheduler: {} sync cancelled", trigger);
        }
        Ok(result) => {
            log::info!(
                "Sync scheduler: {} sync complete, added={}, updated={}, purged={}, conflicts={}",
                trigger,
                result.layouts_added,
                result.layouts_updated,
                result.layouts_purged,
                result.conflicts,
            );
        }
        Err(e) => {
            log::error!("Sync scheduler: {} sync failed: {}", trigger, e);
        }
    }
}

/// Main scheduler loop
async fn sync_scheduler_loop(
    manager: LayoutManager,
    interval: Option<Duration>,
    mut receiver: mpsc::Receiver<SyncSchedulerMessage>,
    shutdown: CancellationToken,
) {
    match interval {
        Some(interval) => log::info!(
            "Sync scheduler started, interval {:.0}s",
            interval.as_secs_f64()
        ),
        None => log::info!("Sync scheduler started in manual mode"),
    }

    loop {
        let wait = async {
            match interval {
                Some(interval) => tokio::time::sleep(interval).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = wait => {
                run_pass(&manager, &shutdown, "periodic").await;
            }
            msg = receiver.recv() => {
                match msg {
                    Some(SyncSchedulerMessage::SyncNow) => {
                        run_pass(&manager, &shutdown, "requested").await;
                    }
                    Some(SyncSchedulerMessage::Shutdown) | None => break,
                }
            }
        }
    }

    log::info!("Sync scheduler: shutting down");
}
