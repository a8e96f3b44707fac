//! TaskManager - タスク管理の中心
//!
//! task table / queue / connection registry / dispatcher を一つにまとめた、
//! 明示的に所有される状態オブジェクト。transport・worker・cleanup はすべて
//! `Arc<TaskManager>` 経由でここを触る。

use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::Dispatcher;
use crate::domain::{
    ConnectionId, InferRequest, ServerMessage, StatusUpdate, SubmitError, TaskId, TaskRecord,
};
use crate::observability::TaskStats;
use crate::ports::{Clock, DeliverySink, IdGenerator, SystemClock, UlidGenerator};
use crate::queue::{ApplyError, EvictionPolicy, QueueItem, TaskQueue, TaskTable};
use crate::registry::ConnectionRegistry;

pub struct TaskManager {
    table: TaskTable,
    queue: TaskQueue,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self::with_parts(clock, ids)
    }

    pub fn with_parts(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            table: TaskTable::new(),
            queue: TaskQueue::new(),
            dispatcher: Dispatcher::new(Arc::clone(&registry), Arc::clone(&clock)),
            registry,
            ids,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // ── Connections ──────────────────────────────────────────────────────────

    /// Register a new connection and greet it with `connection_established`.
    pub async fn connect(&self, sink: Arc<dyn DeliverySink>) -> ConnectionId {
        let connection_id = self.ids.generate_connection_id();
        self.registry.register(connection_id, sink).await;
        self.dispatcher.connection_established(connection_id).await;
        connection_id
    }

    /// Idempotent. Tasks submitted on the connection stay in the table.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        self.registry.disconnect(connection_id).await;
    }

    pub async fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.registry.is_connected(connection_id).await
    }

    pub async fn broadcast(&self, message: &ServerMessage) {
        self.dispatcher.broadcast(message).await;
    }

    // ── Submission ───────────────────────────────────────────────────────────

    /// Validate, record, notify, then enqueue.
    ///
    /// Once this returns the task is visible to `get_status`. The Pending
    /// notice is sent before the id reaches the queue, so no worker can
    /// report Processing ahead of it.
    pub async fn submit(
        &self,
        connection_id: ConnectionId,
        request: InferRequest,
    ) -> Result<TaskId, SubmitError> {
        request.validate()?;

        let task_id = self.ids.generate_task_id();
        if !self.registry.subscribe(connection_id, task_id).await {
            return Err(SubmitError::UnknownConnection(connection_id));
        }

        let record = TaskRecord::new(task_id, connection_id, request, self.clock.now());
        let turn = self.table.insert_held(record.clone()).await;
        tracing::info!(task_id = %task_id, connection_id = %connection_id, "task submitted");

        self.dispatcher.task_submitted(&record).await;
        drop(turn);
        self.queue.push(task_id).await;
        Ok(task_id)
    }

    /// Decode a raw `data` object and submit it.
    pub async fn submit_value(
        &self,
        connection_id: ConnectionId,
        data: serde_json::Value,
    ) -> Result<TaskId, SubmitError> {
        let request = InferRequest::from_value(data)?;
        self.submit(connection_id, request).await
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// Apply a transition and notify the owner.
    ///
    /// Unknown ids (e.g. evicted by cleanup) and illegal transitions are
    /// logged and ignored; `None` tells the caller nothing changed.
    pub async fn update_status(&self, task_id: TaskId, update: StatusUpdate) -> Option<TaskRecord> {
        let target = update.status();
        match self.apply(task_id, update).await {
            Ok(record) => Some(record),
            Err(ApplyError::UnknownTask(_)) => {
                tracing::warn!(task_id = %task_id, status = %target, "status update for unknown task");
                None
            }
            Err(ApplyError::Transition(e)) => {
                tracing::warn!(task_id = %task_id, error = %e, "rejected status update");
                None
            }
        }
    }

    /// Move a Pending or Processing task to Cancelled.
    pub async fn cancel(&self, task_id: TaskId) -> Result<TaskRecord, ApplyError> {
        let record = self.apply(task_id, StatusUpdate::Cancelled).await?;
        tracing::info!(task_id = %task_id, "task cancelled");
        Ok(record)
    }

    /// Transition and notification run under the task's turn lock, so the
    /// owner sees notices in the order the table accepted them.
    async fn apply(&self, task_id: TaskId, update: StatusUpdate) -> Result<TaskRecord, ApplyError> {
        let turn = self
            .table
            .turn(task_id)
            .await
            .ok_or(ApplyError::UnknownTask(task_id))?;
        let _turn = turn.lock().await;

        let record = self.table.apply(task_id, update, self.clock.now()).await?;
        tracing::debug!(task_id = %task_id, status = %record.status, "status changed");
        self.dispatcher.status_changed(&record).await;
        Ok(record)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub async fn get_status(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.table.get(task_id).await
    }

    /// Tasks submitted on this connection, in submission order.
    pub async fn get_tasks_for(&self, connection_id: ConnectionId) -> Vec<TaskRecord> {
        let ids = self.registry.subscriptions(connection_id).await;
        self.table.get_many(&ids).await
    }

    pub async fn get_stats(&self) -> TaskStats {
        let counts = self.table.counts().await;
        TaskStats {
            submitted: counts.submitted,
            completed: counts.completed,
            failed: counts.failed,
            cancelled: counts.cancelled,
            active: counts.active,
            queue_depth: self.queue.len().await,
            live_connections: self.registry.live_count().await,
            total_connections: self.registry.total_connections().await,
        }
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// Evict records older than `retention` and drop them from their owner's
    /// subscription list. Returns the number evicted.
    pub async fn cleanup_old_tasks(&self, retention: chrono::Duration, policy: EvictionPolicy) -> usize {
        let evicted = self
            .table
            .evict_older_than(self.clock.now(), retention, policy)
            .await;

        for task in &evicted {
            if !task.status.is_terminal() {
                tracing::warn!(task_id = %task.task_id, status = %task.status, "evicting unfinished task");
            }
            self.registry.unsubscribe(task.client_id, task.task_id).await;
        }
        evicted.len()
    }

    pub(crate) async fn dequeue(&self, wait: Duration) -> Option<QueueItem> {
        self.queue.pop(wait).await
    }

    /// Pushed but not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        self.queue.unfinished()
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new()
    }
}
