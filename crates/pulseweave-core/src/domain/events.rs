//! Events - クライアントとやり取りするメッセージ
//!
//! - `ServerMessage`: core → transport（type タグ付き JSON）
//! - `ClientRequest`: transport → core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ProtocolError;
use super::ids::{ConnectionId, TaskId};
use super::state::TaskStatus;
use super::task::TaskRecord;
use crate::observability::TaskStats;

/// Outbound message, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionEstablished {
        connection_id: ConnectionId,
        timestamp: DateTime<Utc>,
    },

    TaskSubmitted {
        task_id: TaskId,
        status: TaskStatus,
        timestamp: DateTime<Utc>,
    },

    TaskStatusUpdate {
        task_id: TaskId,
        status: TaskStatus,
        timestamp: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Reply to `get_task_status`. `task` is null for unknown ids.
    TaskStatus {
        task_id: TaskId,
        task: Option<TaskRecord>,
    },

    MyTasks {
        tasks: Vec<TaskRecord>,
    },

    Stats {
        data: TaskStats,
    },

    Error {
        message: String,
    },

    Pong {
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Lifecycle notification for a record's current status.
    ///
    /// Result / error are only attached on terminal states.
    pub fn status_update(record: &TaskRecord, timestamp: DateTime<Utc>) -> Self {
        let terminal = record.status.is_terminal();
        Self::TaskStatusUpdate {
            task_id: record.task_id,
            status: record.status,
            timestamp,
            result: record.result.clone().filter(|_| terminal),
            error: record.error.clone().filter(|_| terminal),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionEstablished { .. } => "connection_established",
            ServerMessage::TaskSubmitted { .. } => "task_submitted",
            ServerMessage::TaskStatusUpdate { .. } => "task_status_update",
            ServerMessage::TaskStatus { .. } => "task_status",
            ServerMessage::MyTasks { .. } => "my_tasks",
            ServerMessage::Stats { .. } => "stats",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Pong { .. } => "pong",
        }
    }
}

/// Inbound request vocabulary.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    SubmitTask {
        #[serde(default)]
        data: serde_json::Value,
    },
    GetTaskStatus {
        task_id: String,
    },
    GetMyTasks,
    GetStats,
    CancelTask {
        task_id: String,
    },
    Ping,
}

impl ClientRequest {
    const KNOWN_TYPES: [&'static str; 6] = [
        "submit_task",
        "get_task_status",
        "get_my_tasks",
        "get_stats",
        "cancel_task",
        "ping",
    ];

    /// Parse one raw text frame.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        if !Self::KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
            kind,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    #[test]
    fn parses_every_known_type() {
        assert!(matches!(
            ClientRequest::parse(r#"{"type":"submit_task","data":{"text":"hi"}}"#).unwrap(),
            ClientRequest::SubmitTask { .. }
        ));
        assert_eq!(
            ClientRequest::parse(r#"{"type":"get_task_status","task_id":"task-x"}"#).unwrap(),
            ClientRequest::GetTaskStatus {
                task_id: "task-x".into()
            }
        );
        assert_eq!(
            ClientRequest::parse(r#"{"type":"get_my_tasks"}"#).unwrap(),
            ClientRequest::GetMyTasks
        );
        assert_eq!(
            ClientRequest::parse(r#"{"type":"get_stats"}"#).unwrap(),
            ClientRequest::GetStats
        );
        assert_eq!(
            ClientRequest::parse(r#"{"type":"ping"}"#).unwrap(),
            ClientRequest::Ping
        );
    }

    #[test]
    fn unknown_type_is_reported_by_name() {
        let err = ClientRequest::parse(r#"{"type":"launch_rocket"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("launch_rocket".into()));
    }

    #[test]
    fn missing_type_and_bad_json() {
        assert_eq!(
            ClientRequest::parse(r#"{"data":{}}"#).unwrap_err(),
            ProtocolError::MissingType
        );
        assert!(matches!(
            ClientRequest::parse("{not json").unwrap_err(),
            ProtocolError::InvalidJson(_)
        ));
    }

    #[test]
    fn known_type_with_missing_field_is_malformed() {
        let err = ClientRequest::parse(r#"{"type":"get_task_status"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { kind, .. } if kind == "get_task_status"));
    }

    #[test]
    fn status_update_omits_absent_payloads() {
        let msg = ServerMessage::TaskStatusUpdate {
            task_id: TaskId::from_ulid(Ulid::new()),
            status: TaskStatus::Processing,
            timestamp: Utc::now(),
            result: None,
            error: None,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "task_status_update");
        assert_eq!(value["status"], "processing");
        assert!(value.get("result").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn error_message_shape() {
        let value = serde_json::to_value(ServerMessage::error("nope")).unwrap();
        assert_eq!(value, json!({ "type": "error", "message": "nope" }));
    }
}
