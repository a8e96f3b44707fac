//! Notification dispatcher: turns lifecycle events into outbound messages.

use std::sync::Arc;

use crate::domain::{ConnectionId, ServerMessage, TaskRecord, TaskStatus};
use crate::ports::Clock;
use crate::registry::ConnectionRegistry;

/// Pushes exactly one message per lifecycle event to the owning connection.
///
/// Delivery is at-most-once: if the connection is gone the message is dropped,
/// there is no replay buffer.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    pub async fn connection_established(&self, connection_id: ConnectionId) {
        let message = ServerMessage::ConnectionEstablished {
            connection_id,
            timestamp: self.clock.now(),
        };
        self.registry.send(connection_id, &message).await;
    }

    pub async fn task_submitted(&self, record: &TaskRecord) {
        let message = ServerMessage::TaskSubmitted {
            task_id: record.task_id,
            status: TaskStatus::Pending,
            timestamp: self.clock.now(),
        };
        self.registry.send(record.client_id, &message).await;
    }

    pub async fn status_changed(&self, record: &TaskRecord) {
        let message = ServerMessage::status_update(record, self.clock.now());
        self.registry.send(record.client_id, &message).await;
    }

    pub async fn broadcast(&self, message: &ServerMessage) {
        self.registry.broadcast(message).await;
    }
}
