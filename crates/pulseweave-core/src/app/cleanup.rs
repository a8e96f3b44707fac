//! CleanupScheduler - 古いタスクの定期削除
//!
//! 一定周期で task table 全体を走査し、retention を超えた record を削除する。
//! sweep は一度始まったら最後まで走る（停止シグナルは sweep の合間にだけ見る）。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::manager::TaskManager;
use crate::config::CleanupConfig;
use crate::queue::EvictionPolicy;

pub struct CleanupScheduler {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CleanupScheduler {
    pub fn spawn(manager: Arc<TaskManager>, config: &CleanupConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            manager,
            config.interval(),
            config.retention(),
            config.policy,
            shutdown_rx,
        ));
        Self { shutdown_tx, handle }
    }

    pub async fn shutdown_and_join(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "cleanup loop ended abnormally");
        }
    }
}

async fn run(
    manager: Arc<TaskManager>,
    period: Duration,
    retention: chrono::Duration,
    policy: EvictionPolicy,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // First sweep one full period after start.
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(?period, retention_secs = retention.num_seconds(), ?policy, "cleanup scheduler started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let removed = manager.cleanup_old_tasks(retention, policy).await;
                if removed > 0 {
                    tracing::info!(removed, "cleaned up old tasks");
                } else {
                    tracing::debug!("cleanup sweep found nothing to evict");
                }
            }
        }
    }
    tracing::info!("cleanup scheduler stopped");
}
