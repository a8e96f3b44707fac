//! Protocol - クライアント要求の処理
//!
//! transport から受け取った 1 フレームを解釈し、manager を呼び、直接返す応答を作る。
//! lifecycle 通知（task_submitted など）は dispatcher 経由で別に届くので、
//! ここでの戻り値は「要求への即答」だけ。

use crate::domain::{ClientRequest, ConnectionId, ProtocolError, ServerMessage, TaskId};

use super::manager::TaskManager;

/// Handle one raw text frame. `None` means no direct reply is needed.
pub async fn handle_message(
    manager: &TaskManager,
    connection_id: ConnectionId,
    raw: &str,
) -> Option<ServerMessage> {
    match ClientRequest::parse(raw) {
        Ok(request) => handle_request(manager, connection_id, request).await,
        Err(e) => {
            tracing::debug!(connection_id = %connection_id, error = %e, "rejected client message");
            Some(reply_for(&e))
        }
    }
}

pub async fn handle_request(
    manager: &TaskManager,
    connection_id: ConnectionId,
    request: ClientRequest,
) -> Option<ServerMessage> {
    match request {
        ClientRequest::SubmitTask { data } => match manager.submit_value(connection_id, data).await {
            // Acknowledged through the dispatcher.
            Ok(_) => None,
            Err(e) => Some(ServerMessage::error(e.to_string())),
        },

        ClientRequest::GetTaskStatus { task_id } => match parse_task_id(&task_id) {
            Ok(task_id) => Some(ServerMessage::TaskStatus {
                task_id,
                task: manager.get_status(task_id).await,
            }),
            Err(e) => Some(reply_for(&e)),
        },

        ClientRequest::GetMyTasks => Some(ServerMessage::MyTasks {
            tasks: manager.get_tasks_for(connection_id).await,
        }),

        ClientRequest::GetStats => Some(ServerMessage::Stats {
            data: manager.get_stats().await,
        }),

        ClientRequest::CancelTask { task_id } => {
            let task_id = match parse_task_id(&task_id) {
                Ok(id) => id,
                Err(e) => return Some(reply_for(&e)),
            };
            // Only the submitting connection may cancel.
            match manager.get_status(task_id).await {
                None => return Some(ServerMessage::error(format!("task {task_id} not found"))),
                Some(record) if record.client_id != connection_id => {
                    tracing::debug!(connection_id = %connection_id, task_id = %task_id, "cancel by non-owner rejected");
                    return Some(ServerMessage::error(format!("task {task_id} belongs to another connection")));
                }
                Some(_) => {}
            }
            match manager.cancel(task_id).await {
                // The owner already got a task_status_update.
                Ok(_) => None,
                Err(e) => Some(ServerMessage::error(e.to_string())),
            }
        }

        ClientRequest::Ping => Some(ServerMessage::Pong {
            timestamp: manager.clock().now(),
        }),
    }
}

fn parse_task_id(raw: &str) -> Result<TaskId, ProtocolError> {
    raw.parse()
        .map_err(|_| ProtocolError::InvalidTaskId(raw.to_string()))
}

fn reply_for(error: &ProtocolError) -> ServerMessage {
    ServerMessage::error(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskStatus;
    use crate::impls::ChannelSink;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn setup() -> (TaskManager, ConnectionId, UnboundedReceiver<ServerMessage>) {
        let manager = TaskManager::new();
        let (sink, mut rx) = ChannelSink::new();
        let conn = manager.connect(Arc::new(sink)).await;
        let _established = rx.recv().await;
        (manager, conn, rx)
    }

    fn error_text(reply: Option<ServerMessage>) -> String {
        match reply {
            Some(ServerMessage::Error { message }) => message,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submit_is_acknowledged_via_dispatcher() {
        let (manager, conn, mut rx) = setup().await;

        let reply = handle_message(
            &manager,
            conn,
            r#"{"type":"submit_task","data":{"text":"订明天去机场的车票"}}"#,
        )
        .await;

        assert!(reply.is_none());
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::TaskSubmitted { status: TaskStatus::Pending, .. })
        ));
    }

    #[tokio::test]
    async fn invalid_submit_yields_error_and_no_task() {
        let (manager, conn, _rx) = setup().await;

        let message = error_text(
            handle_message(&manager, conn, r#"{"type":"submit_task","data":{"text":""}}"#).await,
        );
        assert!(message.contains("text"));
        assert_eq!(manager.get_stats().await.submitted, 0);
    }

    #[tokio::test]
    async fn unknown_type_and_bad_json_change_nothing() {
        let (manager, conn, _rx) = setup().await;

        let message = error_text(handle_message(&manager, conn, r#"{"type":"reboot"}"#).await);
        assert!(message.contains("reboot"));

        error_text(handle_message(&manager, conn, "{not json").await);
        error_text(handle_message(&manager, conn, r#"{"data":1}"#).await);

        assert_eq!(manager.get_stats().await, crate::observability::TaskStats {
            live_connections: 1,
            total_connections: 1,
            ..Default::default()
        });
    }

    #[tokio::test]
    async fn status_queries() {
        let (manager, conn, _rx) = setup().await;
        let task_id = manager
            .submit(conn, crate::domain::InferRequest::text("开会"))
            .await
            .unwrap();

        let raw = format!(r#"{{"type":"get_task_status","task_id":"{task_id}"}}"#);
        match handle_message(&manager, conn, &raw).await {
            Some(ServerMessage::TaskStatus { task_id: id, task }) => {
                assert_eq!(id, task_id);
                assert_eq!(task.unwrap().status, TaskStatus::Pending);
            }
            other => panic!("unexpected {other:?}"),
        }

        let ghost = TaskId::from(ulid::Ulid::new());
        let raw = format!(r#"{{"type":"get_task_status","task_id":"{ghost}"}}"#);
        assert!(matches!(
            handle_message(&manager, conn, &raw).await,
            Some(ServerMessage::TaskStatus { task: None, .. })
        ));

        let message = error_text(
            handle_message(&manager, conn, r#"{"type":"get_task_status","task_id":"nope"}"#).await,
        );
        assert!(message.contains("nope"));

        match handle_message(&manager, conn, r#"{"type":"get_my_tasks"}"#).await {
            Some(ServerMessage::MyTasks { tasks }) => assert_eq!(tasks.len(), 1),
            other => panic!("unexpected {other:?}"),
        }

        match handle_message(&manager, conn, r#"{"type":"get_stats"}"#).await {
            Some(ServerMessage::Stats { data }) => assert_eq!(data.submitted, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_pongs() {
        let (manager, conn, _rx) = setup().await;
        assert!(matches!(
            handle_message(&manager, conn, r#"{"type":"ping"}"#).await,
            Some(ServerMessage::Pong { .. })
        ));
    }

    #[tokio::test]
    async fn only_the_owner_can_cancel() {
        let (manager, conn, mut rx) = setup().await;
        let mine = manager
            .submit(conn, crate::domain::InferRequest::text("开会"))
            .await
            .unwrap();
        let _submitted = rx.recv().await;

        let raw = format!(r#"{{"type":"cancel_task","task_id":"{mine}"}}"#);
        assert!(handle_message(&manager, conn, &raw).await.is_none());
        assert!(matches!(
            rx.recv().await,
            Some(ServerMessage::TaskStatusUpdate { status: TaskStatus::Cancelled, .. })
        ));

        // Second cancel: already terminal.
        error_text(handle_message(&manager, conn, &raw).await);

        let theirs = manager
            .submit(conn, crate::domain::InferRequest::text("买牛奶"))
            .await
            .unwrap();
        let (sink, _other_rx) = ChannelSink::new();
        let other = manager.connect(Arc::new(sink)).await;
        let raw = format!(r#"{{"type":"cancel_task","task_id":"{theirs}"}}"#);
        let message = error_text(handle_message(&manager, other, &raw).await);
        assert!(message.contains("another connection"));
        assert_eq!(manager.get_status(theirs).await.unwrap().status, TaskStatus::Pending);
        assert_eq!(manager.get_stats().await.cancelled, 1);

        let ghost = TaskId::from(ulid::Ulid::new());
        let raw = format!(r#"{{"type":"cancel_task","task_id":"{ghost}"}}"#);
        assert!(error_text(handle_message(&manager, conn, &raw).await).contains("not found"));
    }
}
