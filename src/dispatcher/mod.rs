//! Dispatcher for submitting request jobs through a bounded worker pool.
//!
//! Jobs are pulled lazily from an iterator. Job *i* is launched no earlier than its
//! `scheduled_offset` after the run starts, and only once one of `concurrency`
//! permits is free. Launch times never wait on earlier completions; the permit
//! bound is the only back-pressure. Results are delivered in completion order.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::classify::{Classification, FailureSignature};
use crate::domain::job::{Credential, JobIndex, RequestJob};
use crate::domain::result::{FailureReason, RequestResult};
use crate::error::error_serialization::SerializedError;
use crate::error::{Result, StomperError};
use crate::http::{HttpClient, HttpResponse};

pub mod retry;
pub mod stats;

pub use retry::RetryConfig;
pub use stats::{DispatchCounters, DispatchStats};

/// Predicate function to determine if a response should be retried.
///
/// Takes an HTTP response and returns true if the job should be resubmitted.
pub type ShouldRetryFn = Arc<dyn Fn(&HttpResponse) -> bool + Send + Sync>;

/// Default retry predicate: retry on rate limiting (429) and unavailability (503).
///
/// Other statuses are left alone; a 500 from a login form is often the interesting
/// result rather than a transient one.
pub fn default_should_retry(response: &HttpResponse) -> bool {
    response.status == 429 || response.status == 503
}

fn default_should_retry_fn() -> ShouldRetryFn {
    Arc::new(default_should_retry)
}

/// Configuration for the dispatcher.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum number of jobs in flight at once
    pub concurrency: usize,

    /// Timeout for each individual submission attempt in milliseconds
    pub timeout_ms: u64,

    /// Resubmission policy for failed attempts
    pub retry: RetryConfig,

    /// Interval for logging dispatcher status (jobs in flight) in milliseconds.
    /// Set to None to disable periodic status logging
    pub status_log_interval_ms: Option<u64>,

    /// Predicate function to determine if a response should be retried.
    /// Defaults to retrying 429 and 503 status codes.
    #[serde(skip, default = "default_should_retry_fn")]
    pub should_retry: ShouldRetryFn,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            timeout_ms: 10000,
            retry: RetryConfig::default(),
            status_log_interval_ms: Some(5000),
            should_retry: default_should_retry_fn(),
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(StomperError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(StomperError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.status_log_interval_ms == Some(0) {
            return Err(StomperError::InvalidConfig(
                "status log interval must be greater than zero; omit it to disable".to_string(),
            ));
        }
        Ok(())
    }
}

/// A finished job and how it was classified.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub result: RequestResult,
    pub classification: Classification,
}

impl JobOutcome {
    pub fn is_notable(&self) -> bool {
        self.classification == Classification::Notable
    }
}

/// Dispatcher that submits jobs and classifies their results.
pub struct Dispatcher<H>
where
    H: HttpClient,
{
    http_client: Arc<H>,
    config: DispatcherConfig,
    signature: FailureSignature,
    counters: Arc<DispatchCounters>,
    shutdown_token: CancellationToken,
}

impl<H> Dispatcher<H>
where
    H: HttpClient + 'static,
{
    /// Create a new dispatcher.
    ///
    /// Cancelling `shutdown_token` stops further launches and aborts in-flight jobs.
    pub fn new(
        http_client: Arc<H>,
        config: DispatcherConfig,
        signature: FailureSignature,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            http_client,
            config,
            signature,
            counters: Arc::new(DispatchCounters::new()),
            shutdown_token,
        }
    }

    /// Live counters for this dispatcher.
    pub fn counters(&self) -> Arc<DispatchCounters> {
        self.counters.clone()
    }

    /// Dispatch every job, calling `on_outcome` as each one finishes.
    ///
    /// `on_outcome` runs on the caller's task, one outcome at a time. Transport
    /// failures are reported as outcomes and never end the run early. Returns once
    /// all launched jobs have finished, or after cancellation.
    #[tracing::instrument(skip_all, fields(concurrency = self.config.concurrency))]
    pub async fn run<I, F>(&self, jobs: I, mut on_outcome: F) -> Result<DispatchStats>
    where
        I: IntoIterator<Item = RequestJob>,
        F: FnMut(JobOutcome),
    {
        self.config.validate()?;
        tracing::info!("Dispatcher starting");

        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut join_set: JoinSet<RequestResult> = JoinSet::new();
        // Identity of each running task, needed to report one that panics
        let mut running: HashMap<tokio::task::Id, (JobIndex, Credential)> = HashMap::new();

        // Stops the status logger when this run returns
        let status_token = self.shutdown_token.child_token();
        let _status_guard = status_token.clone().drop_guard();
        if let Some(interval_ms) = self.config.status_log_interval_ms {
            let counters = self.counters.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let stats = counters.snapshot(start.elapsed());
                            tracing::info!(
                                launched = stats.launched,
                                completed = stats.completed,
                                in_flight = stats.in_flight,
                                notable = stats.notable,
                                "Dispatcher status"
                            );
                        }
                        _ = status_token.cancelled() => break,
                    }
                }
            });
        }

        let mut cancelled = false;
        for job in jobs {
            let launch_at = start
                .checked_add(job.scheduled_offset)
                .unwrap_or_else(|| far_future(start));

            // Wait for the job's launch time and a free worker, reporting any
            // completions in the meantime
            let permit = loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown_token.cancelled() => break None,
                    Some(joined) = join_set.join_next_with_id() => {
                        self.finish(joined, &mut running, &mut on_outcome);
                    }
                    permit = acquire_at(semaphore.clone(), launch_at) => break Some(permit?),
                }
            };
            let Some(permit) = permit else {
                cancelled = true;
                break;
            };

            let index = job.index;
            let credential = job.credential.clone();
            counter!("stomper_requests_launched_total").increment(1);
            let handle = join_set.spawn(run_job(
                self.http_client.clone(),
                job,
                permit,
                self.config.clone(),
                self.counters.clone(),
            ));
            running.insert(handle.id(), (index, credential));
        }

        if cancelled {
            tracing::warn!("Shutdown requested, aborting in-flight jobs");
            join_set.abort_all();
        }

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown_token.cancelled(), if !cancelled => {
                    tracing::warn!("Shutdown requested, aborting in-flight jobs");
                    cancelled = true;
                    join_set.abort_all();
                }
                joined = join_set.join_next_with_id() => match joined {
                    Some(joined) => self.finish(joined, &mut running, &mut on_outcome),
                    None => break,
                },
            }
        }

        if cancelled {
            self.counters.mark_cancelled();
        }
        let stats = self.counters.snapshot(start.elapsed());
        tracing::info!(
            launched = stats.launched,
            completed = stats.completed,
            notable = stats.notable,
            transport_errors = stats.transport_errors,
            cancelled = stats.cancelled,
            "Dispatcher finished"
        );
        Ok(stats)
    }

    /// Turn a joined task into an outcome and hand it to the caller.
    fn finish<F>(
        &self,
        joined: std::result::Result<(tokio::task::Id, RequestResult), JoinError>,
        running: &mut HashMap<tokio::task::Id, (JobIndex, Credential)>,
        on_outcome: &mut F,
    ) where
        F: FnMut(JobOutcome),
    {
        let result = match joined {
            Ok((id, result)) => {
                running.remove(&id);
                result
            }
            Err(e) if e.is_cancelled() => {
                running.remove(&e.id());
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Job task panicked");
                let Some((index, credential)) = running.remove(&e.id()) else {
                    return;
                };
                RequestResult::from_failure(
                    index,
                    credential,
                    FailureReason::TaskTerminated,
                    1,
                    Duration::ZERO,
                )
            }
        };

        let classification = self.signature.classify(&result);
        self.counters.record_result(&result, classification);
        counter!(
            "stomper_results_total",
            "classification" => classification.as_str()
        )
        .increment(1);

        on_outcome(JobOutcome {
            result,
            classification,
        });
    }
}

/// Build a job task: it holds its worker permit until the job has a result.
///
/// The in-flight guard is created before the task is first polled, so a task
/// aborted before it ever runs is still accounted for.
fn run_job<H: HttpClient + 'static>(
    http_client: Arc<H>,
    job: RequestJob,
    permit: OwnedSemaphorePermit,
    config: DispatcherConfig,
    counters: Arc<DispatchCounters>,
) -> impl std::future::Future<Output = RequestResult> + Send + 'static {
    counters.record_launch();
    let guard = scopeguard::guard(counters.clone(), |counters| {
        counters.record_finished_task();
    });

    async move {
        let _guard = guard;
        let _permit = permit;
        submit_with_retry(http_client.as_ref(), &job, &config, &counters).await
    }
}

/// Submit one job, resubmitting it unchanged while the policy allows.
async fn submit_with_retry<H: HttpClient>(
    http_client: &H,
    job: &RequestJob,
    config: &DispatcherConfig,
    counters: &DispatchCounters,
) -> RequestResult {
    let timeout_ms = config.timeout_ms;
    let retry = &config.retry;
    let started = Instant::now();
    let mut retry_attempt: u32 = 0;

    loop {
        let outcome = submit_once(http_client, job, timeout_ms).await;

        let retry_cause = match &outcome {
            Ok(response) if (config.should_retry)(response) => {
                Some(format!("status {}", response.status))
            }
            Ok(_) => None,
            Err(reason) if reason.is_retriable() => Some(reason.to_error_message()),
            Err(_) => None,
        };

        if let Some(cause) = retry_cause
            && retry.allows(retry_attempt)
        {
            let backoff = retry.backoff(retry_attempt);
            counters.record_retry();
            counter!("stomper_retries_total").increment(1);
            tracing::warn!(
                job = %job.index,
                username = %job.credential.username,
                retry_attempt = retry_attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                cause = %cause,
                "Resubmitting job"
            );
            tokio::time::sleep(backoff).await;
            retry_attempt += 1;
            continue;
        }

        let attempts = retry_attempt + 1;
        let elapsed = started.elapsed();
        return match outcome {
            Ok(response) => RequestResult::from_response(
                job.index,
                job.credential.clone(),
                response,
                attempts,
                elapsed,
            ),
            Err(reason) => {
                tracing::debug!(
                    job = %job.index,
                    error = %reason.to_error_message(),
                    "Job failed at transport level"
                );
                RequestResult::from_failure(
                    job.index,
                    job.credential.clone(),
                    reason,
                    attempts,
                    elapsed,
                )
            }
        };
    }
}

/// One submission, bounded by `timeout_ms` whatever the client does.
async fn submit_once<H: HttpClient>(
    http_client: &H,
    job: &RequestJob,
    timeout_ms: u64,
) -> std::result::Result<HttpResponse, FailureReason> {
    let deadline = Duration::from_millis(timeout_ms);
    match tokio::time::timeout(deadline, http_client.execute(job, timeout_ms)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(failure_reason(&e, timeout_ms)),
        Err(_elapsed) => Err(FailureReason::Timeout { timeout_ms }),
    }
}

/// Map a transport error to the reason recorded on the result.
pub fn failure_reason(error: &StomperError, timeout_ms: u64) -> FailureReason {
    match error {
        StomperError::HttpClient(e) if e.is_timeout() => FailureReason::Timeout { timeout_ms },
        StomperError::HttpClient(e) if e.is_builder() => FailureReason::RequestBuilderError {
            error: e.to_string(),
        },
        _ => FailureReason::NetworkError {
            error: SerializedError::capture(error).render(),
        },
    }
}

async fn acquire_at(semaphore: Arc<Semaphore>, launch_at: Instant) -> Result<OwnedSemaphorePermit> {
    tokio::time::sleep_until(launch_at).await;
    semaphore
        .acquire_owned()
        .await
        .map_err(|_| StomperError::Shutdown)
}

// Roughly 30 years out, which tokio treats as "never"
fn far_future(start: Instant) -> Instant {
    start + Duration::from_secs(86400 * 365 * 30)
}
