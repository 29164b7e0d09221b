// Job entity
// One backend scan job, owned by a single session for its lifetime

use serde::{Deserialize, Serialize};

use crate::value_objects::{JobStatus, Priority};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub capability: String,
    pub target: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    pub created_at: i64,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub completed_at: Option<i64>,
    /// Present only when status is failed.
    #[serde(default)]
    pub error: Option<String>,
}

/// Request body for job creation. Config is forwarded opaquely to the
/// backend; semantic validation of the target happens server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub capability: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl CreateJobRequest {
    pub fn new(capability: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            target: target.into(),
            config: None,
            priority: None,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_deserializes_with_optional_fields_absent() {
        let job: Job = serde_json::from_str(
            r#"{"id":"job1","capability":"dark_web","target":"example.com","status":"queued","created_at":1700000000000}"#,
        )
        .expect("job");
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);
        assert!(job.started_at.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn create_request_omits_absent_options() {
        let body = serde_json::to_string(&CreateJobRequest::new("exposure", "example.com"))
            .expect("serialize");
        assert!(!body.contains("config"));
        assert!(!body.contains("priority"));
    }
}
