//! TaskProcessor - worker pool と cleanup scheduler の起動・停止

use std::sync::Arc;

use super::cleanup::CleanupScheduler;
use super::manager::TaskManager;
use super::worker_pool::WorkerPool;
use crate::config::PulseConfig;
use crate::ports::Predictor;

/// Owns the background units (N workers + 1 cleanup loop) for one manager.
pub struct TaskProcessor {
    pool: WorkerPool,
    cleanup: CleanupScheduler,
}

impl TaskProcessor {
    pub fn start(
        manager: Arc<TaskManager>,
        predictor: Arc<dyn Predictor>,
        config: &PulseConfig,
    ) -> Self {
        let pool = WorkerPool::spawn(Arc::clone(&manager), predictor, &config.workers);
        let cleanup = CleanupScheduler::spawn(manager, &config.cleanup);
        tracing::info!(workers = pool.size(), "task processor started");
        Self { pool, cleanup }
    }

    pub fn worker_count(&self) -> usize {
        self.pool.size()
    }

    pub async fn stop(self) {
        tracing::info!("stopping task processor");
        self.pool.request_shutdown();
        self.cleanup.shutdown_and_join().await;
        self.pool.shutdown_and_join().await;
        tracing::info!("task processor stopped");
    }
}
