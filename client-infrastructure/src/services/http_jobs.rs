use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder};

use client_domain::{CreateJobRequest, Finding, Job, JobService};

/// Job service adapter over the backend's HTTP API.
pub struct HttpJobService {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpJobService {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.api_token.as_deref().filter(|raw| !raw.trim().is_empty()) {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn expect_success(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let body = body.trim();
        if body.is_empty() {
            anyhow::bail!("{} rejected: {}", action, status);
        }
        anyhow::bail!("{} rejected: {} {}", action, status, body);
    }
}

#[async_trait]
impl JobService for HttpJobService {
    async fn create_job(&self, request: CreateJobRequest) -> Result<Job> {
        let response = self
            .authorize(self.client.post(self.url("/v2/scan/jobs")))
            .json(&request)
            .send()
            .await?;
        let response = Self::expect_success(response, "job creation").await?;
        Ok(response.json().await?)
    }

    async fn job_status(&self, job_id: &str) -> Result<Job> {
        let response = self
            .authorize(self.client.get(self.url(&format!("/v2/scan/jobs/{}", job_id))))
            .send()
            .await?;
        let response = Self::expect_success(response, "status fetch").await?;
        Ok(response.json().await?)
    }

    async fn job_findings(&self, job_id: &str) -> Result<Vec<Finding>> {
        let response = self
            .authorize(
                self.client
                    .get(self.url(&format!("/v2/scan/jobs/{}/findings", job_id))),
            )
            .send()
            .await?;
        let response = Self::expect_success(response, "findings fetch").await?;
        Ok(response.json().await?)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<()> {
        let response = self
            .authorize(
                self.client
                    .delete(self.url(&format!("/v2/scan/jobs/{}", job_id))),
            )
            .send()
            .await?;
        Self::expect_success(response, "job cancel").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let service = HttpJobService::new(
            "https://api.argus.example/",
            None,
            Duration::from_secs(15),
        )
        .expect("client");
        assert_eq!(
            service.url("/v2/scan/jobs/job1"),
            "https://api.argus.example/v2/scan/jobs/job1"
        );
    }
}
