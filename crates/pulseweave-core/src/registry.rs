//! Connection registry: live delivery sinks and per-connection subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::domain::{ConnectionId, ServerMessage, TaskId};
use crate::ports::DeliverySink;

struct ConnectionEntry {
    sink: Arc<dyn DeliverySink>,
    /// Task ids submitted on this connection, in submission order.
    subscriptions: Vec<TaskId>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    total_connections: u64,
}

/// Tracks which connections currently have a live sink.
///
/// Design:
/// - Sinks are cloned out of the lock before delivery, so a slow client never
///   blocks other connections' bookkeeping.
/// - Any failed delivery removes the connection; the caller never sees the error.
/// - Removing a connection never touches the task table.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` with an empty subscription list.
    pub async fn register(&self, connection_id: ConnectionId, sink: Arc<dyn DeliverySink>) {
        let mut state = self.state.lock().await;
        state.total_connections += 1;
        state.connections.insert(
            connection_id,
            ConnectionEntry {
                sink,
                subscriptions: Vec::new(),
            },
        );
        tracing::info!(connection_id = %connection_id, "client connected");
    }

    /// Idempotent; returns whether an entry was removed.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> bool {
        let removed = self.state.lock().await.connections.remove(&connection_id);
        if removed.is_some() {
            tracing::info!(connection_id = %connection_id, "client disconnected");
        }
        removed.is_some()
    }

    pub async fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.state.lock().await.connections.contains_key(&connection_id)
    }

    /// Best-effort delivery. Unknown connection: dropped. Failed delivery: disconnected.
    pub async fn send(&self, connection_id: ConnectionId, message: &ServerMessage) {
        let sink = {
            let state = self.state.lock().await;
            match state.connections.get(&connection_id) {
                Some(entry) => Arc::clone(&entry.sink),
                None => {
                    tracing::debug!(connection_id = %connection_id, kind = message.kind(), "dropping message for absent connection");
                    return;
                }
            }
        };

        if let Err(e) = sink.deliver(message).await {
            tracing::warn!(connection_id = %connection_id, error = %e, "delivery failed, dropping connection");
            self.disconnect(connection_id).await;
        }
    }

    /// Deliver to every registered connection; failures are disconnected after the sweep.
    pub async fn broadcast(&self, message: &ServerMessage) {
        let targets: Vec<(ConnectionId, Arc<dyn DeliverySink>)> = {
            let state = self.state.lock().await;
            state
                .connections
                .iter()
                .map(|(id, entry)| (*id, Arc::clone(&entry.sink)))
                .collect()
        };

        let mut failed = Vec::new();
        for (connection_id, sink) in targets {
            if let Err(e) = sink.deliver(message).await {
                tracing::warn!(connection_id = %connection_id, error = %e, "broadcast delivery failed");
                failed.push(connection_id);
            }
        }

        for connection_id in failed {
            self.disconnect(connection_id).await;
        }
    }

    /// Append `task_id` to the connection's subscription list.
    ///
    /// Returns false when the connection is not registered.
    pub async fn subscribe(&self, connection_id: ConnectionId, task_id: TaskId) -> bool {
        let mut state = self.state.lock().await;
        match state.connections.get_mut(&connection_id) {
            Some(entry) => {
                entry.subscriptions.push(task_id);
                true
            }
            None => false,
        }
    }

    /// Remove `task_id` from the connection's list, if both still exist.
    pub async fn unsubscribe(&self, connection_id: ConnectionId, task_id: TaskId) {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.connections.get_mut(&connection_id) {
            entry.subscriptions.retain(|id| *id != task_id);
        }
    }

    /// Subscriptions in submission order; empty for unknown connections.
    pub async fn subscriptions(&self, connection_id: ConnectionId) -> Vec<TaskId> {
        let state = self.state.lock().await;
        state
            .connections
            .get(&connection_id)
            .map(|entry| entry.subscriptions.clone())
            .unwrap_or_default()
    }

    pub async fn live_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    pub async fn total_connections(&self) -> u64 {
        self.state.lock().await.total_connections
    }
}
