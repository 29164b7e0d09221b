use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use client_application::{SessionPhase, SessionSnapshot};
use client_domain::{Priority, ScanEvent};

use crate::context::{ClientContext, TransportMode};

pub struct ScanArgs {
    pub capability: String,
    pub target: String,
    pub mode: TransportMode,
    pub priority: Option<Priority>,
    pub config: Option<serde_json::Value>,
}

/// Run one scan to a terminal phase, printing findings as they arrive.
/// Ctrl-C detaches locally (and tells the backend on a best-effort basis).
pub async fn run_scan(args: ScanArgs) -> Result<SessionSnapshot> {
    let context = ClientContext::new(&args.capability, args.mode).await?;
    let session = &context.session;
    let mut events = session.subscribe();

    let job = session
        .start(&args.target, args.config, args.priority)
        .await?;
    info!("job created: id={}, status={}", job.id, job.status.as_str());

    loop {
        tokio::select! {
            event = events.recv() => {
                if !handle_stream_event(event) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                session.cancel().await;
                break;
            }
        }
    }

    let snapshot = session.snapshot().await;
    print_summary(&snapshot);
    Ok(snapshot)
}

/// One pass over the event stream. Returns false once the scan is done.
/// A lagged receiver skipped events but stays usable, so the loop goes on;
/// the final snapshot still carries every deduplicated finding.
fn handle_stream_event(event: Result<ScanEvent, RecvError>) -> bool {
    match event {
        Ok(ScanEvent::Finding(finding)) => {
            println!(
                "[{}] {} (risk {:.1}) {}",
                finding.severity.as_str(),
                finding.id,
                finding.risk_score,
                finding.title
            );
            true
        }
        Ok(ScanEvent::Progress { percent, message }) => {
            info!(
                "progress: {}%{}",
                percent,
                message.map(|m| format!(" ({})", m)).unwrap_or_default()
            );
            true
        }
        Ok(ScanEvent::Complete) | Ok(ScanEvent::Error { .. }) => false,
        Ok(ScanEvent::Connected) => {
            info!("stream connected");
            true
        }
        Ok(ScanEvent::Disconnected) => {
            info!("stream disconnected");
            true
        }
        Err(RecvError::Lagged(skipped)) => {
            warn!("event stream lagged: skipped={}", skipped);
            true
        }
        Err(RecvError::Closed) => false,
    }
}

fn print_summary(snapshot: &SessionSnapshot) {
    println!(
        "scan {}: {} findings, progress {}%{}",
        match snapshot.phase {
            SessionPhase::Completed => "completed",
            SessionPhase::TimedOut => "timed out",
            SessionPhase::Cancelled => "cancelled",
            SessionPhase::Failed => "failed",
            _ => "stopped",
        },
        snapshot.findings.len(),
        snapshot.progress,
        snapshot
            .error
            .as_deref()
            .map(|message| format!(" ({})", message))
            .unwrap_or_default()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_does_not_end_the_event_loop() {
        assert!(handle_stream_event(Err(RecvError::Lagged(7))));
        assert!(!handle_stream_event(Err(RecvError::Closed)));
    }

    #[test]
    fn terminal_events_end_the_event_loop() {
        assert!(!handle_stream_event(Ok(ScanEvent::Complete)));
        assert!(!handle_stream_event(Ok(ScanEvent::Error {
            message: "boom".to_string(),
        })));
        assert!(handle_stream_event(Ok(ScanEvent::Progress {
            percent: 10,
            message: None,
        })));
        assert!(handle_stream_event(Ok(ScanEvent::Connected)));
    }
}
