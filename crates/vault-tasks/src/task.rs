//! Task identifiers and records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = crate::TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(TaskId)
            .map_err(|_| crate::TaskError::NotFound(s.to_string()))
    }
}

/// Coarse task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Task state with its outcome payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Completed { result: serde_json::Value },
    Failed { error: String },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending => TaskStatus::Pending,
            TaskState::Completed { .. } => TaskStatus::Completed,
            TaskState::Failed { .. } => TaskStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// One inference request tracked from submission to its terminal outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub model_name: String,
    pub input: serde_json::Value,
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// New pending record
    pub fn pending(model_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: TaskId::new(),
            model_name: model_name.into(),
            input,
            state: TaskState::Pending,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        assert_eq!(id.to_string().parse::<TaskId>().unwrap(), id);
        assert!("not-a-task".parse::<TaskId>().is_err());
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_value(TaskState::Pending).unwrap(),
            json!({"status": "pending"})
        );
        assert_eq!(
            serde_json::to_value(TaskState::Failed {
                error: "boom".to_string()
            })
            .unwrap(),
            json!({"status": "failed", "error": "boom"})
        );
    }

    #[test]
    fn test_pending_record() {
        let record = TaskRecord::pending("yolov5s", json!({"image": "a.jpg"}));
        assert_eq!(record.status(), TaskStatus::Pending);
        assert!(!record.state.is_terminal());
        assert!(record.finished_at.is_none());
    }
}
