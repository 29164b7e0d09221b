use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use client_domain::{Job, JobService, JobStatus, ScanEvent};

use crate::transport::{ScanTransport, TransportEvent};

const CHANNEL_BUFFER: usize = 64;
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_POLL_TIMEOUT_MS: u64 = 300_000;

/// Pull-mode transport: drives a job to a terminal state by polling the job
/// service. Status requests run sequentially, so at most one is ever in
/// flight; ticks that land while a request is pending are skipped, not
/// queued.
pub struct PollTransport {
    jobs: Arc<dyn JobService>,
    interval: Duration,
    timeout: Duration,
    probe_on_open: bool,
}

impl PollTransport {
    pub fn new(jobs: Arc<dyn JobService>) -> Self {
        Self {
            jobs,
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            probe_on_open: false,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Early status read right after the job is created, used by the
    /// investigation flow. Best-effort: failure is logged and the interval
    /// polling proceeds unchanged.
    pub fn with_probe(mut self, probe_on_open: bool) -> Self {
        self.probe_on_open = probe_on_open;
        self
    }
}

#[async_trait]
impl ScanTransport for PollTransport {
    fn deadline(&self) -> Duration {
        self.timeout
    }

    async fn open(&self, job: &Job) -> anyhow::Result<mpsc::Receiver<TransportEvent>> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let jobs = self.jobs.clone();
        let job_id = job.id.clone();
        let interval = self.interval;
        let probe_on_open = self.probe_on_open;

        tokio::spawn(async move {
            // A failed send means the session dropped the receiver; the loop
            // must stop polling, not outlive its session.
            if tx
                .send(TransportEvent::Event(ScanEvent::Connected))
                .await
                .is_err()
            {
                return;
            }

            if probe_on_open {
                match jobs.job_status(&job_id).await {
                    Ok(probed) => {
                        let sent = tx
                            .send(TransportEvent::Event(ScanEvent::Progress {
                                percent: probed.progress.min(100),
                                message: None,
                            }))
                            .await;
                        if sent.is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        debug!("probe status read failed: job_id={}, err={}", job_id, err);
                    }
                }
            }

            // First tick lands one full interval after open; the probe above
            // never substitutes for interval-driven polling.
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tx.closed() => break,
                }
                let polled = match jobs.job_status(&job_id).await {
                    Ok(polled) => polled,
                    Err(err) => {
                        let _ = tx
                            .send(TransportEvent::Event(ScanEvent::Error {
                                message: format!("status fetch failed: {}", err),
                            }))
                            .await;
                        break;
                    }
                };

                match polled.status {
                    JobStatus::Completed => {
                        match jobs.job_findings(&job_id).await {
                            Ok(findings) => {
                                let _ = tx.send(TransportEvent::FindingsSnapshot(findings)).await;
                                let _ = tx.send(TransportEvent::Event(ScanEvent::Complete)).await;
                            }
                            Err(err) => {
                                let _ = tx
                                    .send(TransportEvent::Event(ScanEvent::Error {
                                        message: format!("findings fetch failed: {}", err),
                                    }))
                                    .await;
                            }
                        }
                        break;
                    }
                    JobStatus::Failed => {
                        let message = polled
                            .error
                            .unwrap_or_else(|| "scan failed".to_string());
                        let _ = tx
                            .send(TransportEvent::Event(ScanEvent::Error { message }))
                            .await;
                        break;
                    }
                    JobStatus::Cancelled => {
                        let _ = tx
                            .send(TransportEvent::Event(ScanEvent::Error {
                                message: "scan cancelled by backend".to_string(),
                            }))
                            .await;
                        break;
                    }
                    _ => {
                        let sent = tx
                            .send(TransportEvent::Event(ScanEvent::Progress {
                                percent: polled.progress.min(100),
                                message: None,
                            }))
                            .await;
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Mutex;

    use client_domain::{CreateJobRequest, Finding, Severity};

    fn job(id: &str, status: JobStatus, progress: u8) -> Job {
        Job {
            id: id.to_string(),
            capability: "investigation".to_string(),
            target: "example.com".to_string(),
            status,
            progress,
            created_at: 1_700_000_000_000,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    fn finding(id: &str) -> Finding {
        Finding {
            id: id.to_string(),
            capability: "investigation".to_string(),
            severity: Severity::Medium,
            title: format!("finding {}", id),
            description: String::new(),
            evidence: Default::default(),
            affected_assets: Vec::new(),
            recommendations: Vec::new(),
            discovered_at: 1_700_000_000_000,
            risk_score: 4.2,
        }
    }

    /// Scripted job service: pops one status per poll, counts concurrent
    /// in-flight status requests, and can delay each response.
    struct ScriptedJobs {
        statuses: Mutex<VecDeque<anyhow::Result<Job>>>,
        findings: Mutex<Vec<Finding>>,
        status_delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        status_calls: AtomicUsize,
    }

    impl ScriptedJobs {
        fn new(statuses: Vec<anyhow::Result<Job>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                findings: Mutex::new(Vec::new()),
                status_delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
            }
        }

        fn with_findings(self, findings: Vec<Finding>) -> Self {
            *self.findings.try_lock().expect("unlocked") = findings;
            self
        }

        fn with_status_delay(mut self, delay: Duration) -> Self {
            self.status_delay = delay;
            self
        }
    }

    #[async_trait]
    impl JobService for ScriptedJobs {
        async fn create_job(&self, _request: CreateJobRequest) -> anyhow::Result<Job> {
            anyhow::bail!("not scripted")
        }

        async fn job_status(&self, _job_id: &str) -> anyhow::Result<Job> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.status_delay.is_zero() {
                tokio::time::sleep(self.status_delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| anyhow::bail!("status script exhausted"))
        }

        async fn job_findings(&self, _job_id: &str) -> anyhow::Result<Vec<Finding>> {
            Ok(self.findings.lock().await.clone())
        }

        async fn cancel_job(&self, _job_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn collect_until_closed(mut rx: mpsc::Receiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn completed_job_yields_snapshot_then_complete() {
        let jobs = Arc::new(
            ScriptedJobs::new(vec![
                Ok(job("job1", JobStatus::Running, 40)),
                Ok(job("job1", JobStatus::Completed, 100)),
            ])
            .with_findings(vec![finding("f1"), finding("f2")]),
        );
        let transport = PollTransport::new(jobs);
        let rx = transport
            .open(&job("job1", JobStatus::Queued, 0))
            .await
            .expect("open");

        let events = collect_until_closed(rx).await;
        assert!(matches!(
            events[0],
            TransportEvent::Event(ScanEvent::Connected)
        ));
        assert!(matches!(
            events[1],
            TransportEvent::Event(ScanEvent::Progress { percent: 40, .. })
        ));
        match &events[2] {
            TransportEvent::FindingsSnapshot(findings) => assert_eq!(findings.len(), 2),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            events[3],
            TransportEvent::Event(ScanEvent::Complete)
        ));
        assert_eq!(events.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_surfaces_backend_error_verbatim() {
        let mut failed = job("job1", JobStatus::Failed, 30);
        failed.error = Some("crawler blocked by target".to_string());
        let jobs = Arc::new(ScriptedJobs::new(vec![Ok(failed)]));
        let transport = PollTransport::new(jobs);
        let rx = transport
            .open(&job("job1", JobStatus::Queued, 0))
            .await
            .expect("open");

        let events = collect_until_closed(rx).await;
        match events.last() {
            Some(TransportEvent::Event(ScanEvent::Error { message })) => {
                assert_eq!(message, "crawler blocked by target");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_status_responses_never_overlap() {
        // Each response takes 12s against a 5s interval; skipped ticks must
        // not queue a second concurrent request.
        let jobs = Arc::new(
            ScriptedJobs::new(vec![
                Ok(job("job1", JobStatus::Running, 10)),
                Ok(job("job1", JobStatus::Running, 50)),
                Ok(job("job1", JobStatus::Completed, 100)),
            ])
            .with_status_delay(Duration::from_secs(12)),
        );
        let transport = PollTransport::new(jobs.clone());
        let rx = transport
            .open(&job("job1", JobStatus::Queued, 0))
            .await
            .expect("open");

        let _ = collect_until_closed(rx).await;
        assert_eq!(jobs.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(jobs.status_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_is_swallowed_and_polling_continues() {
        let jobs = Arc::new(ScriptedJobs::new(vec![
            Err(anyhow::anyhow!("probe rejected")),
            Ok(job("job1", JobStatus::Completed, 100)),
        ]));
        let transport = PollTransport::new(jobs).with_probe(true);
        let rx = transport
            .open(&job("job1", JobStatus::Queued, 0))
            .await
            .expect("open");

        let events = collect_until_closed(rx).await;
        // No error event from the probe; the scan still completes.
        assert!(matches!(
            events.last(),
            Some(TransportEvent::Event(ScanEvent::Complete))
        ));
        assert!(!events.iter().any(|event| matches!(
            event,
            TransportEvent::Event(ScanEvent::Error { .. })
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_receiver_stops_the_poll_loop() {
        let jobs = Arc::new(ScriptedJobs::new(vec![
            Ok(job("job1", JobStatus::Running, 10)),
            Ok(job("job1", JobStatus::Running, 20)),
            Ok(job("job1", JobStatus::Running, 30)),
        ]));
        let transport = PollTransport::new(jobs.clone());
        let rx = transport
            .open(&job("job1", JobStatus::Queued, 0))
            .await
            .expect("open");
        drop(rx);

        // Well past the poll deadline; a leaked loop would keep hitting
        // the backend every interval.
        tokio::time::sleep(Duration::from_millis(400_000)).await;
        assert_eq!(jobs.status_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_fetch_failure_is_terminal() {
        let jobs = Arc::new(ScriptedJobs::new(vec![Err(anyhow::anyhow!(
            "service unavailable"
        ))]));
        let transport = PollTransport::new(jobs.clone());
        let rx = transport
            .open(&job("job1", JobStatus::Queued, 0))
            .await
            .expect("open");

        let events = collect_until_closed(rx).await;
        match events.last() {
            Some(TransportEvent::Event(ScanEvent::Error { message })) => {
                assert!(message.contains("service unavailable"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(jobs.status_calls.load(Ordering::SeqCst), 1);
    }
}
