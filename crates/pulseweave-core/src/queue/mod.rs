//! Queue module: task table (source of truth) and the FIFO id queue.

mod memory;
mod table;

pub use memory::{QueueItem, TaskQueue};
pub use table::{ApplyError, EvictionPolicy, Evicted, TableCounts, TaskTable};
