//! Job records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Advisory execution status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Done,
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One machine action with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    /// Registered machine name
    pub machine: String,
    /// Action name, e.g. "goto" or "speedUp"
    pub action: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Failure message of the last run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        id: u64,
        machine: impl Into<String>,
        action: impl Into<String>,
        params: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            machine: machine.into(),
            action: action.into(),
            params,
            status: JobStatus::Pending,
            description: String::new(),
            created_at: now,
            updated_at: now,
            error: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Record a status change
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// The job every `add_job` starts from: a 5 mm relative Y step
    pub fn template(id: u64) -> Self {
        let params = serde_json::json!({"x": 0, "y": 5, "z": 0, "a": 0, "speed": 3000});
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, "gantry", "step", params)
    }
}
