// Scan session lifecycle
// Drives one capability scan from creation to a terminal state over either
// transport strategy and maintains the de-duplicated findings view.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use client_domain::{
    CreateJobRequest, Finding, Job, JobService, JobStatus, Priority, ScanEvent,
};

use crate::error::SessionError;
use crate::transport::{ScanTransport, TransportEvent};

const EVENT_CHANNEL_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Starting,
    Scanning,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::Idle
    }
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionPhase::Completed
                | SessionPhase::Failed
                | SessionPhase::Cancelled
                | SessionPhase::TimedOut
        )
    }

    pub fn is_scanning(&self) -> bool {
        matches!(self, SessionPhase::Starting | SessionPhase::Scanning)
    }
}

/// Read-only view handed to consumers for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub job: Option<Job>,
    pub findings: Vec<Finding>,
    pub progress: u8,
    pub error: Option<String>,
    pub is_scanning: bool,
}

#[derive(Default)]
struct SessionState {
    // Bumped on every start/cancel; events carrying an older epoch are
    // dropped, so a superseded driver or stale timer can never corrupt the
    // current session.
    epoch: u64,
    phase: SessionPhase,
    job: Option<Job>,
    findings: Vec<Finding>,
    seen: HashSet<String>,
    progress: u8,
    error: Option<String>,
}

pub struct ScanSession {
    capability: String,
    jobs: Arc<dyn JobService>,
    transport: Arc<dyn ScanTransport>,
    state: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<ScanEvent>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ScanSession {
    pub fn new(
        capability: impl Into<String>,
        jobs: Arc<dyn JobService>,
        transport: Arc<dyn ScanTransport>,
    ) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CHANNEL_BUFFER);
        Self {
            capability: capability.into(),
            jobs,
            transport,
            state: Arc::new(RwLock::new(SessionState::default())),
            events,
            driver: Mutex::new(None),
        }
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            phase: state.phase,
            job: state.job.clone(),
            findings: state.findings.clone(),
            progress: state.progress,
            error: state.error.clone(),
            is_scanning: state.phase.is_scanning(),
        }
    }

    /// Start a new scan, superseding any scan this session is running.
    /// The previous driver (channel, interval and timeout guard) is torn
    /// down before the new job is requested.
    pub async fn start(
        &self,
        target: &str,
        config: Option<serde_json::Value>,
        priority: Option<Priority>,
    ) -> Result<Job, SessionError> {
        let target = target.trim().to_string();
        if target.is_empty() {
            return Err(SessionError::EmptyTarget);
        }

        self.abort_driver().await;
        let epoch = {
            let mut state = self.state.write().await;
            state.epoch += 1;
            state.phase = SessionPhase::Starting;
            state.job = None;
            state.findings.clear();
            state.seen.clear();
            state.progress = 0;
            state.error = None;
            state.epoch
        };

        let mut request = CreateJobRequest::new(self.capability.clone(), target);
        if let Some(config) = config {
            request = request.with_config(config);
        }
        if let Some(priority) = priority {
            request = request.with_priority(priority);
        }

        let job = match self.jobs.create_job(request).await {
            Ok(job) => job,
            Err(err) => {
                let message = err.to_string();
                let mut state = self.state.write().await;
                if state.epoch == epoch {
                    state.phase = SessionPhase::Idle;
                    state.error = Some(message.clone());
                    let _ = self.events.send(ScanEvent::Error {
                        message: message.clone(),
                    });
                }
                return Err(SessionError::JobCreation(message));
            }
        };

        {
            let mut state = self.state.write().await;
            if state.epoch != epoch {
                drop(state);
                // The job was created for a start that has since been
                // superseded; tell the backend to stop it, best effort.
                let jobs = self.jobs.clone();
                let job_id = job.id;
                tokio::spawn(async move {
                    if let Err(err) = jobs.cancel_job(&job_id).await {
                        warn!("backend cancel failed: job_id={}, err={}", job_id, err);
                    }
                });
                return Err(SessionError::Superseded);
            }
            state.job = Some(job.clone());
            state.phase = SessionPhase::Scanning;
        }
        info!(
            "scan started: capability={}, job_id={}, target={}",
            self.capability, job.id, job.target
        );

        let handle = tokio::spawn(drive(
            self.transport.clone(),
            self.state.clone(),
            self.events.clone(),
            epoch,
            job.clone(),
        ));
        *self.driver.lock().await = Some(handle);

        Ok(job)
    }

    /// Detach from the running scan. Local timers and the channel stop
    /// immediately and the last job/findings stay in place; the backend is
    /// told to stop on a best-effort basis and its answer is not awaited.
    pub async fn cancel(&self) {
        self.abort_driver().await;
        let cancelled_job = {
            let mut state = self.state.write().await;
            state.epoch += 1;
            if state.phase.is_scanning() {
                state.phase = SessionPhase::Cancelled;
                state.job.as_ref().map(|job| job.id.clone())
            } else {
                None
            }
        };

        let Some(job_id) = cancelled_job else {
            return;
        };
        let _ = self.events.send(ScanEvent::Disconnected);
        info!("scan cancelled locally: job_id={}", job_id);

        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            if let Err(err) = jobs.cancel_job(&job_id).await {
                warn!("backend cancel failed: job_id={}, err={}", job_id, err);
            }
        });
    }

    async fn abort_driver(&self) {
        if let Some(handle) = self.driver.lock().await.take() {
            handle.abort();
        }
    }
}

async fn drive(
    transport: Arc<dyn ScanTransport>,
    state: Arc<RwLock<SessionState>>,
    events: broadcast::Sender<ScanEvent>,
    epoch: u64,
    job: Job,
) {
    let deadline = tokio::time::Instant::now() + transport.deadline();
    let mut rx = match transport.open(&job).await {
        Ok(rx) => rx,
        Err(err) => {
            fail(&state, &events, epoch, format!("scan stream unavailable: {}", err)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if apply_event(&state, &events, epoch, event).await {
                        break;
                    }
                }
                None => {
                    fail(
                        &state,
                        &events,
                        epoch,
                        "scan stream closed before completion".to_string(),
                    )
                    .await;
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                time_out(&state, &events, epoch).await;
                break;
            }
        }
    }
}

/// Fold one transport event into the session state. Returns true when the
/// session reached a terminal phase and the driver should stop.
async fn apply_event(
    state: &Arc<RwLock<SessionState>>,
    events: &broadcast::Sender<ScanEvent>,
    epoch: u64,
    event: TransportEvent,
) -> bool {
    let mut state = state.write().await;
    if state.epoch != epoch || state.phase.is_terminal() {
        return true;
    }

    match event {
        TransportEvent::Event(ScanEvent::Finding(finding)) => {
            // Idempotent merge: duplicate delivery never creates a second row.
            if state.seen.insert(finding.id.clone()) {
                state.findings.push(finding.clone());
                let _ = events.send(ScanEvent::Finding(finding));
            }
            false
        }
        TransportEvent::Event(ScanEvent::Progress { percent, message }) => {
            // Last-write-wins; findings and progress may arrive out of order.
            state.progress = percent.min(100);
            let progress = state.progress;
            if let Some(job) = state.job.as_mut() {
                job.progress = progress;
            }
            let _ = events.send(ScanEvent::Progress { percent: progress, message });
            false
        }
        TransportEvent::Event(ScanEvent::Complete) => {
            state.progress = 100;
            state.phase = SessionPhase::Completed;
            if let Some(job) = state.job.as_mut() {
                job.status = JobStatus::Completed;
                job.progress = 100;
                if job.completed_at.is_none() {
                    job.completed_at = Some(chrono::Utc::now().timestamp_millis());
                }
            }
            let _ = events.send(ScanEvent::Complete);
            true
        }
        TransportEvent::Event(ScanEvent::Error { message }) => {
            state.phase = SessionPhase::Failed;
            state.error = Some(message.clone());
            if let Some(job) = state.job.as_mut() {
                job.status = JobStatus::Failed;
                job.error = Some(message.clone());
            }
            let _ = events.send(ScanEvent::Error { message });
            true
        }
        TransportEvent::Event(event @ (ScanEvent::Connected | ScanEvent::Disconnected)) => {
            let _ = events.send(event);
            false
        }
        TransportEvent::FindingsSnapshot(findings) => {
            // Pull mode: the list fetched at completion replaces whatever
            // accumulated locally.
            state.findings.clear();
            state.seen.clear();
            for finding in findings {
                if state.seen.insert(finding.id.clone()) {
                    state.findings.push(finding.clone());
                    let _ = events.send(ScanEvent::Finding(finding));
                }
            }
            false
        }
    }
}

async fn fail(
    state: &Arc<RwLock<SessionState>>,
    events: &broadcast::Sender<ScanEvent>,
    epoch: u64,
    message: String,
) {
    let mut state = state.write().await;
    if state.epoch != epoch || state.phase.is_terminal() {
        return;
    }
    state.phase = SessionPhase::Failed;
    state.error = Some(message.clone());
    if let Some(job) = state.job.as_mut() {
        job.status = JobStatus::Failed;
        job.error = Some(message.clone());
    }
    let _ = events.send(ScanEvent::Error { message });
}

async fn time_out(
    state: &Arc<RwLock<SessionState>>,
    events: &broadcast::Sender<ScanEvent>,
    epoch: u64,
) {
    let mut state = state.write().await;
    // Checked against current state at fire time: a session that already
    // completed must not retroactively report a timeout.
    if state.epoch != epoch || !state.phase.is_scanning() {
        return;
    }
    let message = "scan timed out".to_string();
    state.phase = SessionPhase::TimedOut;
    state.error = Some(message.clone());
    if let Some(job) = state.job.as_mut() {
        job.status = JobStatus::Failed;
        job.error = Some(message.clone());
    }
    warn!("scan timed out: job_id={:?}", state.job.as_ref().map(|job| job.id.clone()));
    let _ = events.send(ScanEvent::Error { message });
}
