use async_trait::async_trait;

use crate::entities::{CreateJobRequest, Finding, Job};

/// Backend job service contract. One implementation talks HTTP; tests
/// substitute mocks.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn create_job(&self, request: CreateJobRequest) -> anyhow::Result<Job>;
    async fn job_status(&self, job_id: &str) -> anyhow::Result<Job>;
    async fn job_findings(&self, job_id: &str) -> anyhow::Result<Vec<Finding>>;
    /// Best-effort cancellation; callers treat failure as non-fatal.
    async fn cancel_job(&self, job_id: &str) -> anyhow::Result<()>;
}
