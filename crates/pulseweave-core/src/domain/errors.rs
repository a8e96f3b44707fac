//! Errors - エラー型と分類
//!
//! # 分類
//! - ValidationError: リクエスト payload の不備（enqueue 前に即時拒否、Task は作られない）
//! - PredictError: Predictor の失敗（タスク単位で Failed として記録、worker の外には出ない）
//! - DeliveryError: 通知の配送失敗（接続を黙って切断するだけ、リトライしない）
//! - ProtocolError: 未知 / 不正なクライアントメッセージ（error メッセージで応答、状態は変えない）

use std::time::Duration;

use thiserror::Error;

use super::ids::ConnectionId;
use super::state::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request data must be a JSON object")]
    NotAnObject,

    #[error("request data could not be decoded: {0}")]
    Decode(String),

    #[error("either `text` or `event.transcript` must be provided")]
    MissingInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

/// Failure raised while producing a prediction.
///
/// The `Display` output is what ends up in the task's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictError {
    #[error("{0}")]
    Failed(String),

    #[error("prediction timed out after {0:?}")]
    TimedOut(Duration),

    #[error("predictor panicked: {0}")]
    Panicked(String),
}

impl PredictError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("delivery sink is closed")]
    Closed,

    #[error("delivery failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal transition {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("message has no `type` field")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: String, reason: String },

    #[error("invalid task id: {0}")]
    InvalidTaskId(String),
}
