//! Task record: the single source of truth for one inference request.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::TransitionError;
use super::ids::{ConnectionId, TaskId};
use super::request::InferRequest;
use super::state::TaskStatus;

/// A status change requested by a worker or by cancellation.
///
/// `result` only exists on `Completed` and `error` only on `Failed`, so the
/// "result iff completed, error iff failed" rule is carried by the type.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Processing,
    Completed { result: serde_json::Value },
    Failed { error: String },
    Cancelled,
}

impl StatusUpdate {
    pub fn status(&self) -> TaskStatus {
        match self {
            StatusUpdate::Processing => TaskStatus::Processing,
            StatusUpdate::Completed { .. } => TaskStatus::Completed,
            StatusUpdate::Failed { .. } => TaskStatus::Failed,
            StatusUpdate::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// Metadata + payload for one task.
///
/// Design:
/// - Only the task table holds these; the queue holds `TaskId` only.
/// - All state transitions go through [`TaskRecord::apply`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub task_id: TaskId,

    /// Connection that submitted the task.
    pub client_id: ConnectionId,

    #[serde(skip)]
    pub request: InferRequest,

    pub status: TaskStatus,

    pub result: Option<serde_json::Value>,

    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Set once, when entering Processing.
    pub started_at: Option<DateTime<Utc>>,

    /// Set once, when entering any terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(
        task_id: TaskId,
        client_id: ConnectionId,
        request: InferRequest,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            client_id,
            request,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply one transition and stamp the matching timestamp.
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> Result<(), TransitionError> {
        let next = update.status();
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }

        match update {
            StatusUpdate::Processing => {
                self.started_at = Some(now);
            }
            StatusUpdate::Completed { result } => {
                self.result = Some(result);
                self.completed_at = Some(now);
            }
            StatusUpdate::Failed { error } => {
                self.error = Some(error);
                self.completed_at = Some(now);
            }
            StatusUpdate::Cancelled => {
                self.completed_at = Some(now);
            }
        }
        self.status = next;
        Ok(())
    }

    /// Age of the record relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use ulid::Ulid;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn record() -> TaskRecord {
        TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            ConnectionId::from_ulid(Ulid::new()),
            InferRequest::text("hello"),
            t(0),
        )
    }

    #[test]
    fn happy_path_stamps_each_timestamp_once() {
        let mut r = record();
        assert_eq!(r.status, TaskStatus::Pending);
        assert!(r.started_at.is_none() && r.completed_at.is_none());

        r.apply(StatusUpdate::Processing, t(1)).unwrap();
        assert_eq!(r.started_at, Some(t(1)));
        assert!(r.result.is_none() && r.error.is_none());

        r.apply(StatusUpdate::Completed { result: json!({ "ok": true }) }, t(2))
            .unwrap();
        assert_eq!(r.status, TaskStatus::Completed);
        assert_eq!(r.completed_at, Some(t(2)));
        assert_eq!(r.started_at, Some(t(1)));
        assert!(r.result.is_some());
        assert!(r.error.is_none());
    }

    #[test]
    fn failure_records_error_only() {
        let mut r = record();
        r.apply(StatusUpdate::Processing, t(1)).unwrap();
        r.apply(StatusUpdate::Failed { error: "boom".into() }, t(2)).unwrap();
        assert_eq!(r.error.as_deref(), Some("boom"));
        assert!(r.result.is_none());
    }

    #[test]
    fn terminal_state_rejects_further_updates() {
        let mut r = record();
        r.apply(StatusUpdate::Processing, t(1)).unwrap();
        r.apply(StatusUpdate::Failed { error: "boom".into() }, t(2)).unwrap();

        let err = r
            .apply(StatusUpdate::Completed { result: json!({}) }, t(3))
            .unwrap_err();
        assert_eq!(err.from, TaskStatus::Failed);
        assert_eq!(err.to, TaskStatus::Completed);
        assert!(r.result.is_none());
        assert_eq!(r.completed_at, Some(t(2)));
    }

    #[test]
    fn completed_requires_processing_first() {
        let mut r = record();
        assert!(r.apply(StatusUpdate::Completed { result: json!({}) }, t(1)).is_err());
        assert_eq!(r.status, TaskStatus::Pending);
    }

    #[test]
    fn cancel_from_pending_stamps_completed_at() {
        let mut r = record();
        r.apply(StatusUpdate::Cancelled, t(5)).unwrap();
        assert_eq!(r.status, TaskStatus::Cancelled);
        assert!(r.started_at.is_none());
        assert_eq!(r.completed_at, Some(t(5)));
        assert!(r.apply(StatusUpdate::Processing, t(6)).is_err());
    }

    #[test]
    fn snapshot_omits_request_payload() {
        let value = serde_json::to_value(record()).unwrap();
        assert!(value.get("request").is_none());
        assert_eq!(value["status"], "pending");
        assert!(value["task_id"].as_str().unwrap().starts_with("task-"));
    }
}
