use std::sync::Arc;

use anyhow::Result;

use client_application::{PollTransport, ScanSession, ScanTransport};
use client_infrastructure::{ClientConfig, HttpJobService, WsScanTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stream,
    Poll,
}

impl TransportMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_lowercase().as_str() {
            "stream" => Ok(TransportMode::Stream),
            "poll" => Ok(TransportMode::Poll),
            other => anyhow::bail!("unknown transport mode: {} (expected stream or poll)", other),
        }
    }
}

pub struct ClientContext {
    pub config: ClientConfig,
    pub session: ScanSession,
}

impl ClientContext {
    pub async fn new(capability: &str, mode: TransportMode) -> Result<Self> {
        let config = ClientConfig::load().await?;

        let jobs = Arc::new(HttpJobService::new(
            &config.api_base_url,
            config.api_token.clone(),
            config.request_timeout(),
        )?);

        let transport: Arc<dyn ScanTransport> = match mode {
            TransportMode::Stream => Arc::new(
                WsScanTransport::new(&config.stream_base_url, config.api_token.clone())
                    .with_timeout(config.stream_timeout()),
            ),
            TransportMode::Poll => Arc::new(
                PollTransport::new(jobs.clone())
                    .with_interval(config.poll_interval())
                    .with_timeout(config.poll_timeout())
                    .with_probe(config.probe_on_start),
            ),
        };

        let session = ScanSession::new(capability, jobs, transport);
        Ok(Self { config, session })
    }
}
