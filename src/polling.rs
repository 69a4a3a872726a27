//! Job status polling.
//!
//! A [`JobPoller`] runs at most one polling loop at a time. Starting a new
//! run bumps an epoch counter and wakes the previous run out of its wait;
//! any status that arrives for an older epoch is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::api::JobStatusClient;
use crate::config::PollingConfig;
use crate::error::PollingError;
use crate::types::{JobHandle, PollAttemptState};

/// Lifecycle of a polling run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { attempt: u32 },
    Succeeded { link: String },
    Failed { message: String },
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PollState::Succeeded { .. } | PollState::Failed { .. } | PollState::TimedOut
        )
    }
}

#[derive(Debug)]
struct PollerInner {
    state: PollState,
    attempts: PollAttemptState,
}

pub struct JobPoller {
    client: Arc<dyn JobStatusClient>,
    interval: Duration,
    max_attempts: u32,
    completed_statuses: Vec<String>,
    placeholder_link: String,
    epoch: AtomicU64,
    wake: Notify,
    inner: RwLock<PollerInner>,
}

impl JobPoller {
    pub fn new(client: Arc<dyn JobStatusClient>, config: &PollingConfig) -> Self {
        Self {
            client,
            interval: config.interval(),
            max_attempts: config.max_attempts,
            completed_statuses: config.completed_statuses.clone(),
            placeholder_link: config.placeholder_link.clone(),
            epoch: AtomicU64::new(0),
            wake: Notify::new(),
            inner: RwLock::new(PollerInner {
                state: PollState::Idle,
                attempts: PollAttemptState::default(),
            }),
        }
    }

    /// Override the wait between checks
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn state(&self) -> PollState {
        self.inner.read().await.state.clone()
    }

    pub async fn attempts(&self) -> PollAttemptState {
        self.inner.read().await.attempts.clone()
    }

    /// Poll `job` until it resolves.
    ///
    /// The first check runs immediately. Returns the result link on success.
    /// A run replaced by a newer [`poll`](Self::poll) or by
    /// [`cancel`](Self::cancel) returns [`PollingError::Superseded`] and
    /// leaves the state alone.
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    pub async fn poll(&self, job: JobHandle) -> Result<String, PollingError> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.wake.notify_waiters();

        {
            let mut inner = self.inner.write().await;
            if self.is_current(epoch) {
                inner.state = PollState::Polling { attempt: 0 };
                inner.attempts = PollAttemptState::default();
            }
        }
        info!(max_attempts = self.max_attempts, "Started job polling");

        loop {
            let attempt = {
                let mut inner = self.inner.write().await;
                if !self.is_current(epoch) {
                    return Err(PollingError::Superseded);
                }
                if inner.attempts.attempt_count >= self.max_attempts {
                    let attempts = inner.attempts.attempt_count;
                    inner.state = PollState::TimedOut;
                    warn!(attempts, "Job polling budget exhausted");
                    return Err(PollingError::BudgetExceeded { attempts });
                }
                let attempt = inner.attempts.attempt_count + 1;
                inner.attempts.attempt_count = attempt;
                inner.state = PollState::Polling { attempt };
                attempt
            };

            let result = self.client.fetch_status(&job).await;

            {
                let mut inner = self.inner.write().await;
                if !self.is_current(epoch) {
                    debug!(attempt, "Discarding status from a superseded run");
                    return Err(PollingError::Superseded);
                }

                match result {
                    Err(err) => {
                        warn!(attempt, error = %err, "Job status check failed");
                        inner.state = PollState::Failed {
                            message: err.to_string(),
                        };
                        return Err(err);
                    }
                    Ok(status) => {
                        let link = status
                            .completed_link(&self.completed_statuses, &self.placeholder_link)
                            .map(str::to_string);
                        debug!(attempt, item_status = ?status.item_status, "Job status");
                        inner.attempts.last_status = Some(status);

                        if let Some(link) = link {
                            info!(attempt, "Job completed");
                            inner.state = PollState::Succeeded { link: link.clone() };
                            return Ok(link);
                        }
                    }
                }
            }

            let woken = self.wake.notified();
            tokio::pin!(woken);
            woken.as_mut().enable();
            if !self.is_current(epoch) {
                return Err(PollingError::Superseded);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut woken => {
                    debug!("Polling wait interrupted");
                }
            }
        }
    }

    /// Stop the active run, if any, and return to `Idle`.
    pub async fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.wake.notify_waiters();
        let mut inner = self.inner.write().await;
        inner.state = PollState::Idle;
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobStatus;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    const PENDING: &str = "ITEM_PROCESSING";

    /// Serves scripted statuses per job id; pending once the script runs out
    #[derive(Default)]
    struct ScriptedStatus {
        scripts: Mutex<HashMap<String, Vec<Result<JobStatus, PollingError>>>>,
        delays: HashMap<String, Duration>,
        calls: AtomicU32,
    }

    impl ScriptedStatus {
        fn script(self, job_id: &str, script: Vec<Result<JobStatus, PollingError>>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(job_id.to_string(), script.into_iter().rev().collect());
            self
        }

        fn delay(mut self, job_id: &str, delay: Duration) -> Self {
            self.delays.insert(job_id.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl JobStatusClient for ScriptedStatus {
        async fn fetch_status(&self, job: &JobHandle) -> Result<JobStatus, PollingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delays.get(&job.job_id) {
                tokio::time::sleep(*delay).await;
            }
            let next = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&job.job_id)
                .and_then(Vec::pop);
            next.unwrap_or_else(|| Ok(status(PENDING, None)))
        }
    }

    fn status(item_status: &str, link: Option<&str>) -> JobStatus {
        JobStatus {
            item_status: Some(item_status.to_string()),
            item_link: link.map(str::to_string),
        }
    }

    fn job(id: &str) -> JobHandle {
        JobHandle {
            job_id: id.to_string(),
            user_id: "mem_1".to_string(),
        }
    }

    fn poller(client: ScriptedStatus) -> (Arc<JobPoller>, Arc<ScriptedStatus>) {
        let client = Arc::new(client);
        let poller = JobPoller::new(client.clone(), &PollingConfig::default());
        (Arc::new(poller), client)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_final_allowed_attempt() {
        let mut script: Vec<_> = (0..99).map(|_| Ok(status(PENDING, None))).collect();
        script.push(Ok(status("ITEM_PUBLISHED", Some("doc-42"))));
        let (poller, client) = poller(ScriptedStatus::default().script("a", script));

        let link = poller.poll(job("a")).await.unwrap();

        assert_eq!(link, "doc-42");
        assert_eq!(client.calls.load(Ordering::SeqCst), 100);
        assert_eq!(
            poller.state().await,
            PollState::Succeeded {
                link: "doc-42".into()
            }
        );
        assert_eq!(poller.attempts().await.attempt_count, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_after_budget() {
        let (poller, client) = poller(ScriptedStatus::default());

        let err = poller.poll(job("a")).await.unwrap_err();

        assert_eq!(err, PollingError::BudgetExceeded { attempts: 100 });
        assert_eq!(client.calls.load(Ordering::SeqCst), 100);
        assert_eq!(poller.state().await, PollState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_placeholder_link_keeps_polling() {
        let script = vec![
            Ok(status("ITEM_PUBLISHED_POLL", Some("testeLink"))),
            Ok(status("ITEM_PUBLISHED_POLL", Some("testeLink"))),
            Ok(status("ITEM_PUBLISHED_POLL", Some("real-link"))),
        ];
        let (poller, client) = poller(ScriptedStatus::default().script("a", script));

        let started = tokio::time::Instant::now();
        let link = poller.poll(job("a")).await.unwrap();

        assert_eq!(link, "real-link");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        // Immediate first check, then two waits
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_fails_without_retry() {
        let script = vec![
            Ok(status(PENDING, None)),
            Err(PollingError::StatusFetch("500 Internal Server Error".into())),
        ];
        let (poller, client) = poller(ScriptedStatus::default().script("a", script));

        let err = poller.poll(job("a")).await.unwrap_err();

        assert_eq!(
            err,
            PollingError::StatusFetch("500 Internal Server Error".into())
        );
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            poller.state().await,
            PollState::Failed {
                message: "Polling failed: 500 Internal Server Error".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_supersedes_waiting_run() {
        let client = ScriptedStatus::default()
            .script("b", vec![Ok(status("ITEM_PUBLISHED", Some("b-link")))]);
        let (poller, _client) = poller(client);

        let first = tokio::spawn({
            let poller = poller.clone();
            async move { poller.poll(job("a")).await }
        });
        tokio::task::yield_now().await;
        assert_eq!(poller.state().await, PollState::Polling { attempt: 1 });

        let link = poller.poll(job("b")).await.unwrap();
        assert_eq!(link, "b-link");

        assert_eq!(first.await.unwrap(), Err(PollingError::Superseded));
        assert_eq!(
            poller.state().await,
            PollState::Succeeded {
                link: "b-link".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_discarded() {
        let client = ScriptedStatus::default()
            .script("slow", vec![Ok(status("ITEM_PUBLISHED", Some("stale")))])
            .script("fast", vec![Ok(status("ITEM_PUBLISHED", Some("fresh")))])
            .delay("slow", Duration::from_secs(20));
        let (poller, _client) = poller(client);

        let slow = tokio::spawn({
            let poller = poller.clone();
            async move { poller.poll(job("slow")).await }
        });
        tokio::task::yield_now().await;

        assert_eq!(poller.poll(job("fast")).await.unwrap(), "fresh");
        assert_eq!(slow.await.unwrap(), Err(PollingError::Superseded));
        assert_eq!(
            poller.state().await,
            PollState::Succeeded {
                link: "fresh".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_to_idle() {
        let (poller, _client) = poller(ScriptedStatus::default());

        let run = tokio::spawn({
            let poller = poller.clone();
            async move { poller.poll(job("a")).await }
        });
        tokio::task::yield_now().await;

        poller.cancel().await;
        assert_eq!(run.await.unwrap(), Err(PollingError::Superseded));
        assert_eq!(poller.state().await, PollState::Idle);
    }
}
