//! Task table: records + aggregate counters behind one lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{ConnectionId, StatusUpdate, TaskId, TaskRecord, TaskStatus, TransitionError};

/// Which records a cleanup sweep may evict once they are old enough.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Evict purely by age, including Pending / Processing records.
    #[default]
    AnyStatus,

    /// Only evict records already in a terminal state.
    TerminalOnly,
}

impl EvictionPolicy {
    fn allows(self, status: TaskStatus) -> bool {
        match self {
            EvictionPolicy::AnyStatus => true,
            EvictionPolicy::TerminalOnly => status.is_terminal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("task {0} not found")]
    UnknownTask(TaskId),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Counters kept alongside the records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub active: usize,
}

/// A record removed by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evicted {
    pub task_id: TaskId,
    pub client_id: ConnectionId,
    pub status: TaskStatus,
}

#[derive(Default)]
struct TableState {
    records: HashMap<TaskId, TaskRecord>,
    /// Per-task turn lock: held from a transition until its notification is out.
    turns: HashMap<TaskId, Arc<Mutex<()>>>,
    submitted: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
}

/// Authoritative store of task records.
///
/// Design:
/// - Every read-modify-write happens inside one lock acquisition.
/// - Callers only ever receive cloned snapshots, never a handle into the map.
/// - The lock is never held across an `.await` on anything else.
/// - Each task also has its own turn lock (`turn`), so a caller can keep
///   "apply, then notify" for one task in order without blocking the table.
#[derive(Default)]
pub struct TaskTable {
    state: Mutex<TableState>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: TaskRecord) {
        drop(self.insert_held(record).await);
    }

    /// Insert `record` with its turn lock already taken by the caller.
    ///
    /// Nobody else can run a turn for the task until the guard is dropped.
    pub async fn insert_held(&self, record: TaskRecord) -> OwnedMutexGuard<()> {
        let turn = Arc::new(Mutex::new(()));
        let held = Arc::clone(&turn).lock_owned().await;

        let mut state = self.state.lock().await;
        state.submitted += 1;
        state.turns.insert(record.task_id, turn);
        state.records.insert(record.task_id, record);
        held
    }

    /// The turn lock for `task_id`, if the task is still in the table.
    pub async fn turn(&self, task_id: TaskId) -> Option<Arc<Mutex<()>>> {
        let state = self.state.lock().await;
        state.turns.get(&task_id).cloned()
    }

    /// Apply one status transition atomically and return the new snapshot.
    pub async fn apply(
        &self,
        task_id: TaskId,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, ApplyError> {
        let mut state = self.state.lock().await;
        let record = state
            .records
            .get_mut(&task_id)
            .ok_or(ApplyError::UnknownTask(task_id))?;

        record.apply(update, now)?;
        let snapshot = record.clone();

        match snapshot.status {
            TaskStatus::Completed => state.completed += 1,
            TaskStatus::Failed => state.failed += 1,
            TaskStatus::Cancelled => state.cancelled += 1,
            TaskStatus::Pending | TaskStatus::Processing => {}
        }
        Ok(snapshot)
    }

    pub async fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        let state = self.state.lock().await;
        state.records.get(&task_id).cloned()
    }

    /// Snapshots for `ids` in the given order; ids no longer present are skipped.
    pub async fn get_many(&self, ids: &[TaskId]) -> Vec<TaskRecord> {
        let state = self.state.lock().await;
        ids.iter()
            .filter_map(|id| state.records.get(id).cloned())
            .collect()
    }

    /// Remove every record with `now - created_at > max_age` that `policy` allows.
    ///
    /// Records exactly `max_age` old are kept.
    pub async fn evict_older_than(
        &self,
        now: DateTime<Utc>,
        max_age: chrono::Duration,
        policy: EvictionPolicy,
    ) -> Vec<Evicted> {
        let mut state = self.state.lock().await;
        let stale: Vec<TaskId> = state
            .records
            .values()
            .filter(|r| r.age(now) > max_age && policy.allows(r.status))
            .map(|r| r.task_id)
            .collect();

        for id in &stale {
            state.turns.remove(id);
        }
        stale
            .into_iter()
            .filter_map(|id| state.records.remove(&id))
            .map(|r| Evicted {
                task_id: r.task_id,
                client_id: r.client_id,
                status: r.status,
            })
            .collect()
    }

    pub async fn counts(&self) -> TableCounts {
        let state = self.state.lock().await;
        TableCounts {
            submitted: state.submitted,
            completed: state.completed,
            failed: state.failed,
            cancelled: state.cancelled,
            active: state
                .records
                .values()
                .filter(|r| r.status.is_active())
                .count(),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
