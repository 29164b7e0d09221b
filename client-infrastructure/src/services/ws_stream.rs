// Push-mode transport over the backend's streaming channel.
// Connection fallback order mirrors the backend's accepted auth styles:
// bearer header, access_token query parameter, then plain.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use client_application::{ScanTransport, TransportEvent};
use client_domain::{Job, ScanEvent, StreamMessage};

const CHANNEL_BUFFER: usize = 64;
const DEFAULT_STREAM_TIMEOUT_MS: u64 = 600_000;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WsScanTransport {
    stream_base_url: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl WsScanTransport {
    pub fn new(stream_base_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            stream_base_url: stream_base_url.into().trim_end_matches('/').to_string(),
            api_token,
            timeout: Duration::from_millis(DEFAULT_STREAM_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn stream_url(&self, job_id: &str) -> String {
        format!("{}/v2/scan/jobs/{}/stream", self.stream_base_url, job_id)
    }
}

#[async_trait]
impl ScanTransport for WsScanTransport {
    fn deadline(&self) -> Duration {
        self.timeout
    }

    async fn open(&self, job: &Job) -> Result<mpsc::Receiver<TransportEvent>> {
        let url = self.stream_url(&job.id);
        let (mut socket, mode) = connect_ws(&url, self.api_token.as_deref()).await?;
        debug!("scan stream connected: job_id={}, mode={}", job.id, mode);

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let job_id = job.id.clone();
        tokio::spawn(async move {
            // A failed send means the session dropped the receiver; close the
            // socket and stop reading instead of outliving the session.
            if tx
                .send(TransportEvent::Event(ScanEvent::Connected))
                .await
                .is_err()
            {
                let _ = socket.close(None).await;
                return;
            }
            loop {
                let next = tokio::select! {
                    next = socket.next() => match next {
                        Some(next) => next,
                        None => break,
                    },
                    _ = tx.closed() => {
                        let _ = socket.close(None).await;
                        break;
                    }
                };
                match next {
                    Ok(Message::Text(text)) => {
                        let frame: StreamMessage = match serde_json::from_str(text.as_ref()) {
                            Ok(frame) => frame,
                            Err(err) => {
                                warn!(
                                    "unparseable stream frame: job_id={}, err={}",
                                    job_id, err
                                );
                                continue;
                            }
                        };
                        let terminal =
                            matches!(frame, StreamMessage::Complete | StreamMessage::Error { .. });
                        let sent = tx.send(TransportEvent::Event(ScanEvent::from(frame))).await;
                        if terminal || sent.is_err() {
                            let _ = socket.close(None).await;
                            break;
                        }
                    }
                    Ok(Message::Ping(bytes)) => {
                        let _ = socket.send(Message::Pong(bytes)).await;
                    }
                    Ok(Message::Close(_)) => {
                        let _ = tx.send(TransportEvent::Event(ScanEvent::Disconnected)).await;
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let _ = tx
                            .send(TransportEvent::Event(ScanEvent::Error {
                                message: format!("stream error: {}", err),
                            }))
                            .await;
                        break;
                    }
                }
            }
            // Dropping the sender here lets a close without a terminal frame
            // surface as a transport failure in the session driver.
        });

        Ok(rx)
    }
}

async fn connect_ws(url: &str, token: Option<&str>) -> Result<(WsStream, &'static str)> {
    if let Some(value) = token.filter(|raw| !raw.trim().is_empty()) {
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, format!("Bearer {}", value).parse()?);
        if let Ok((socket, _)) = tokio_tungstenite::connect_async(request).await {
            return Ok((socket, "header"));
        }

        let with_query = with_access_token(url, token);
        let query_request = with_query.into_client_request()?;
        if let Ok((socket, _)) = tokio_tungstenite::connect_async(query_request).await {
            return Ok((socket, "query"));
        }
    }

    let plain_request = url.into_client_request()?;
    let (socket, _) = tokio_tungstenite::connect_async(plain_request).await?;
    Ok((socket, "plain"))
}

fn with_access_token(url: &str, token: Option<&str>) -> String {
    let token = match token.map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(token) => token,
        None => return url.to_string(),
    };
    if url.contains("access_token=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}access_token={}", url, separator, token)
}
