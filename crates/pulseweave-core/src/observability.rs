use serde::{Deserialize, Serialize};

/// Aggregate counters over the task table, queue and connection registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Tasks ever submitted.
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,

    /// Pending + Processing records currently in the table.
    pub active: usize,

    /// Ids waiting in the queue.
    pub queue_depth: usize,

    pub live_connections: usize,
    pub total_connections: u64,
}
