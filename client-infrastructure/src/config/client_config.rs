use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub stream_base_url: String,
    pub api_token: Option<String>,
    pub request_timeout_seconds: u64,
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub stream_timeout_ms: u64,
    /// Early best-effort status read right after job creation; used by the
    /// investigation flow.
    pub probe_on_start: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".to_string(),
            stream_base_url: "ws://127.0.0.1:8080".to_string(),
            api_token: None,
            request_timeout_seconds: 15,
            poll_interval_ms: 5_000,
            poll_timeout_ms: 300_000,
            stream_timeout_ms: 600_000,
            probe_on_start: false,
        }
    }
}

impl ClientConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var("ARGUS_CONFIG").unwrap_or_else(|_| "./client.toml".to_string());
        let file_path = Path::new(&path);
        if !file_path.exists() {
            warn!("client.toml not found, using defaults");
            let mut config = ClientConfig::default();
            config.apply_env_overrides();
            config.normalize();
            config.validate()?;
            return Ok(config);
        }
        let content = fs::read_to_string(file_path).await?;
        let mut config: ClientConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("ARGUS_API_URL") {
            self.api_base_url = value;
        }
        if let Ok(value) = env::var("ARGUS_STREAM_URL") {
            self.stream_base_url = value;
        }
        if let Ok(value) = env::var("ARGUS_API_TOKEN") {
            self.api_token = Some(value);
        }
    }

    pub fn normalize(&mut self) {
        if let Some(token) = &self.api_token {
            if token.trim().is_empty() {
                self.api_token = None;
            }
        }
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        self.stream_base_url = self.stream_base_url.trim().trim_end_matches('/').to_string();
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            anyhow::bail!("api_base_url must be an http(s) url: {}", self.api_base_url);
        }
        if !self.stream_base_url.starts_with("ws://")
            && !self.stream_base_url.starts_with("wss://")
        {
            anyhow::bail!(
                "stream_base_url must be a ws(s) url: {}",
                self.stream_base_url
            );
        }
        if self.request_timeout_seconds == 0 {
            anyhow::bail!("request_timeout_seconds must be positive");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }
        if self.poll_timeout_ms <= self.poll_interval_ms {
            anyhow::bail!("poll_timeout_ms must exceed poll_interval_ms");
        }
        if self.stream_timeout_ms == 0 {
            anyhow::bail!("stream_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }
}
