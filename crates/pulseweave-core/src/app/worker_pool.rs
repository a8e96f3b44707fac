//! WorkerPool - タスク実行ループ
//!
//! # フロー（worker ごと）
//! 1. bounded wait で dequeue（停止フラグはここで確認する）
//! 2. update_status(Processing)
//! 3. Predictor 実行（別 task で spawn し、panic も Failed として記録）
//! 4. event があれば結果を拡張
//! 5. update_status(Completed | Failed)
//! 6. ack
//!
//! worker loop 自体が panic した場合は supervisor が backoff 後に再起動する。
//! pool が黙って縮むことはない。処理中だった task は Failed にし、
//! queue item は drop 時に ack される。

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use super::enhance;
use super::manager::TaskManager;
use crate::config::WorkerConfig;
use crate::domain::{
    InferResult, PredictError, Prediction, StatusUpdate, TaskId, TaskRecord, TaskStatus,
};
use crate::ports::Predictor;
use crate::queue::QueueItem;

#[derive(Debug, Clone, Copy)]
struct WorkerSettings {
    poll_interval: Duration,
    predict_timeout: Option<Duration>,
    failure_backoff: Duration,
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            predict_timeout: config.predict_timeout(),
            failure_backoff: config.failure_backoff(),
        }
    }
}

pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    shutdown_grace: Duration,
}

impl WorkerPool {
    pub fn spawn(
        manager: Arc<TaskManager>,
        predictor: Arc<dyn Predictor>,
        config: &WorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = WorkerSettings::from(config);

        let handles = (0..config.worker_count())
            .map(|index| {
                let worker = Worker {
                    index,
                    manager: Arc::clone(&manager),
                    predictor: Arc::clone(&predictor),
                    settings,
                    current: Mutex::new(None),
                };
                tokio::spawn(supervise(worker, shutdown_rx.clone()))
            })
            .collect::<Vec<_>>();

        tracing::info!(workers = handles.len(), "worker pool started");
        Self {
            shutdown_tx,
            handles,
            shutdown_grace: config.shutdown_grace(),
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Flip the running flag. Workers notice it at their next dequeue wait.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Stop, wait up to the grace period, then abort whatever is left.
    ///
    /// A task abandoned mid-predict stays in Processing.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();

        let deadline = tokio::time::Instant::now() + self.shutdown_grace;
        let mut aborted = 0usize;
        for mut handle in self.handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            tracing::warn!(aborted, "workers did not stop within grace period");
        }
        tracing::info!("worker pool stopped");
    }
}

/// Aborts the wrapped task when dropped, so aborting the supervisor also
/// stops the loop it is watching.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Keep one worker loop alive until shutdown.
async fn supervise(worker: Worker, shutdown_rx: watch::Receiver<bool>) {
    let worker = Arc::new(worker);
    loop {
        let mut running = AbortOnDrop(tokio::spawn({
            let worker = Arc::clone(&worker);
            let shutdown_rx = shutdown_rx.clone();
            async move { worker.run(shutdown_rx).await }
        }));

        match (&mut running.0).await {
            Ok(()) => return,
            Err(e) if e.is_panic() => {
                let reason = panic_message(e.into_panic());
                tracing::error!(worker = worker.index, panic = %reason, "worker loop crashed, restarting");
                let abandoned = worker.current.lock().await.take();
                if let Some(task_id) = abandoned {
                    worker.fail_abandoned(task_id, &reason).await;
                }
            }
            Err(_) => return,
        }

        if *shutdown_rx.borrow() {
            return;
        }
        tokio::time::sleep(worker.settings.failure_backoff).await;
    }
}

struct Worker {
    index: usize,
    manager: Arc<TaskManager>,
    predictor: Arc<dyn Predictor>,
    settings: WorkerSettings,
    /// Task between dequeue and its final status update.
    current: Mutex<Option<TaskId>>,
}

impl Worker {
    async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::debug!(worker = self.index, "worker started");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let item = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                item = self.manager.dequeue(self.settings.poll_interval) => item,
            };

            if let Some(item) = item {
                self.process(item).await;
            }
        }
        tracing::debug!(worker = self.index, "worker stopped");
    }

    async fn process(&self, item: QueueItem) {
        let task_id = item.task_id();
        *self.current.lock().await = Some(task_id);
        self.handle(item).await;
        *self.current.lock().await = None;
    }

    async fn handle(&self, item: QueueItem) {
        let task_id = item.task_id();

        // Cancelled or evicted while waiting in the queue.
        let Some(record) = self.manager.update_status(task_id, StatusUpdate::Processing).await
        else {
            tracing::debug!(worker = self.index, task_id = %task_id, "skipping task");
            item.ack();
            return;
        };

        let update = match self.run_prediction(&record).await {
            Ok(prediction) => {
                let insights = record
                    .request
                    .event
                    .as_ref()
                    .map(|event| enhance::analyze(&prediction, event));
                completion(InferResult { prediction, insights }.into_value())
            }
            Err(e) => {
                tracing::warn!(worker = self.index, task_id = %task_id, error = %e, "task failed");
                StatusUpdate::Failed { error: e.to_string() }
            }
        };

        self.manager.update_status(task_id, update).await;
        item.ack();
    }

    /// Finish a task whose worker loop died under it.
    async fn fail_abandoned(&self, task_id: TaskId, reason: &str) {
        let Some(record) = self.manager.get_status(task_id).await else {
            return;
        };
        if record.status.is_terminal() {
            return;
        }
        // Failed is only reachable from Processing.
        if record.status == TaskStatus::Pending {
            self.manager.update_status(task_id, StatusUpdate::Processing).await;
        }
        let error = format!("worker crashed: {reason}");
        if self
            .manager
            .update_status(task_id, StatusUpdate::Failed { error })
            .await
            .is_some()
        {
            tracing::warn!(worker = self.index, task_id = %task_id, "abandoned task marked failed");
        }
    }

    async fn run_prediction(&self, record: &TaskRecord) -> Result<Prediction, PredictError> {
        let text = record
            .request
            .input_text()
            .unwrap_or_default()
            .to_string();
        let event = record.request.event.clone();
        let predictor = Arc::clone(&self.predictor);

        let mut handle =
            tokio::spawn(async move { predictor.predict(&text, event.as_ref()).await });

        let joined = match self.settings.predict_timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(PredictError::TimedOut(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(PredictError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(PredictError::failed(e.to_string())),
        }
    }
}

fn completion(encoded: Result<serde_json::Value, serde_json::Error>) -> StatusUpdate {
    match encoded {
        Ok(result) => StatusUpdate::Completed { result },
        Err(e) => StatusUpdate::Failed {
            error: format!("failed to encode result: {e}"),
        },
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionId, DeliveryError, EventData, InferRequest, ServerMessage};
    use crate::impls::{ChannelSink, KeywordPredictor};
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn config(count: usize) -> WorkerConfig {
        WorkerConfig {
            count,
            poll_interval_ms: 50,
            predict_timeout_ms: 0,
            failure_backoff_ms: 10,
            shutdown_grace_ms: 500,
        }
    }

    async fn connect(manager: &TaskManager) -> (ConnectionId, UnboundedReceiver<ServerMessage>) {
        let (sink, rx) = ChannelSink::new();
        (manager.connect(Arc::new(sink)).await, rx)
    }

    async fn wait_terminal(manager: &TaskManager, task_id: TaskId) -> TaskRecord {
        for _ in 0..200 {
            if let Some(record) = manager.get_status(task_id).await
                && record.status.is_terminal()
            {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} never finished");
    }

    struct PanickingPredictor;

    #[async_trait]
    impl Predictor for PanickingPredictor {
        async fn predict(&self, text: &str, _event: Option<&EventData>) -> Result<Prediction, PredictError> {
            if text.contains("panic") {
                panic!("model exploded");
            }
            KeywordPredictor::new().predict(text, None).await
        }
    }

    /// Forwards to a channel; blows up when asked to deliver a Processing notice.
    struct ExplodingSink(ChannelSink);

    #[async_trait]
    impl crate::ports::DeliverySink for ExplodingSink {
        async fn deliver(&self, message: &ServerMessage) -> Result<(), DeliveryError> {
            if matches!(message, ServerMessage::TaskStatusUpdate { status: TaskStatus::Processing, .. }) {
                panic!("transport exploded");
            }
            self.0.deliver(message).await
        }
    }

    struct SlowPredictor;

    #[async_trait]
    impl Predictor for SlowPredictor {
        async fn predict(&self, _text: &str, _event: Option<&EventData>) -> Result<Prediction, PredictError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(PredictError::failed("unreachable"))
        }
    }

    #[tokio::test]
    async fn completes_tasks_with_keyword_predictor() {
        let manager = Arc::new(TaskManager::new());
        let (conn, _rx) = connect(&manager).await;
        let pool = WorkerPool::spawn(manager.clone(), Arc::new(KeywordPredictor::new()), &config(2));
        assert_eq!(pool.size(), 2);

        let task_id = manager
            .submit(conn, InferRequest::text("订明天去机场的车票"))
            .await
            .unwrap();
        let record = wait_terminal(&manager, task_id).await;

        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result.unwrap()["task_type"], "trip");
        assert!(record.started_at.is_some());
        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn event_requests_get_insights() {
        let manager = Arc::new(TaskManager::new());
        let (conn, _rx) = connect(&manager).await;
        let pool = WorkerPool::spawn(manager.clone(), Arc::new(KeywordPredictor::new()), &config(1));

        let task_id = manager
            .submit_value(
                conn,
                serde_json::json!({ "event": { "transcript": "下午开会", "tags": ["work"] } }),
            )
            .await
            .unwrap();
        let result = wait_terminal(&manager, task_id).await.result.unwrap();

        assert_eq!(result["task_type"], "meeting");
        assert_eq!(result["suggested_tags"], serde_json::json!(["work", "meeting"]));
        assert_eq!(result["priority_level"], "medium");
        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn predictor_panic_fails_only_that_task() {
        let manager = Arc::new(TaskManager::new());
        let (conn, _rx) = connect(&manager).await;
        let pool = WorkerPool::spawn(manager.clone(), Arc::new(PanickingPredictor), &config(1));

        let bad = manager.submit(conn, InferRequest::text("panic now")).await.unwrap();
        let good = manager.submit(conn, InferRequest::text("开会")).await.unwrap();

        let bad = wait_terminal(&manager, bad).await;
        assert_eq!(bad.status, TaskStatus::Failed);
        assert!(bad.error.unwrap().contains("model exploded"));

        assert_eq!(wait_terminal(&manager, good).await.status, TaskStatus::Completed);
        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn crashed_loop_fails_its_task_and_releases_the_item() {
        let manager = Arc::new(TaskManager::new());
        let (sink, _rx) = ChannelSink::new();
        let conn = manager.connect(Arc::new(ExplodingSink(sink))).await;
        let pool = WorkerPool::spawn(manager.clone(), Arc::new(KeywordPredictor::new()), &config(1));

        let task_id = manager.submit(conn, InferRequest::text("开会")).await.unwrap();
        let record = wait_terminal(&manager, task_id).await;

        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.unwrap().contains("transport exploded"));
        assert_eq!(manager.unfinished(), 0);
        assert_eq!(manager.get_stats().await.active, 0);
        pool.shutdown_and_join().await;
    }

    #[test]
    fn unencodable_result_fails_the_task() {
        let encoded = serde_json::from_str::<serde_json::Value>("{");
        match completion(encoded) {
            StatusUpdate::Failed { error } => assert!(error.starts_with("failed to encode result")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            completion(Ok(serde_json::json!({"task_type": "meeting"}))),
            StatusUpdate::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn predict_timeout_marks_task_failed() {
        let manager = Arc::new(TaskManager::new());
        let (conn, _rx) = connect(&manager).await;
        let mut cfg = config(1);
        cfg.predict_timeout_ms = 50;
        let pool = WorkerPool::spawn(manager.clone(), Arc::new(SlowPredictor), &cfg);

        let task_id = manager.submit(conn, InferRequest::text("开会")).await.unwrap();
        let record = wait_terminal(&manager, task_id).await;

        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.unwrap().contains("timed out"));
        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn cancelled_task_is_skipped() {
        let manager = Arc::new(TaskManager::new());
        let (conn, _rx) = connect(&manager).await;

        let task_id = manager.submit(conn, InferRequest::text("开会")).await.unwrap();
        manager.cancel(task_id).await.unwrap();

        let pool = WorkerPool::spawn(manager.clone(), Arc::new(KeywordPredictor::new()), &config(1));
        for _ in 0..100 {
            if manager.unfinished() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let record = manager.get_status(task_id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert!(record.started_at.is_none());
        assert_eq!(manager.unfinished(), 0);
        pool.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn idle_pool_stops_quickly() {
        let manager = Arc::new(TaskManager::new());
        let pool = WorkerPool::spawn(manager, Arc::new(KeywordPredictor::new()), &config(3));

        let started = tokio::time::Instant::now();
        pool.shutdown_and_join().await;
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[tokio::test]
    async fn busy_worker_is_aborted_after_grace() {
        let manager = Arc::new(TaskManager::new());
        let (conn, _rx) = connect(&manager).await;
        let mut cfg = config(1);
        cfg.shutdown_grace_ms = 100;
        let pool = WorkerPool::spawn(manager.clone(), Arc::new(SlowPredictor), &cfg);

        let task_id = manager.submit(conn, InferRequest::text("开会")).await.unwrap();
        for _ in 0..100 {
            if manager.get_status(task_id).await.unwrap().status == TaskStatus::Processing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let started = tokio::time::Instant::now();
        pool.shutdown_and_join().await;
        assert!(started.elapsed() < Duration::from_secs(2));

        // Abandoned mid-predict
        assert_eq!(manager.get_status(task_id).await.unwrap().status, TaskStatus::Processing);
    }

    #[test]
    fn panic_payloads_are_readable() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
