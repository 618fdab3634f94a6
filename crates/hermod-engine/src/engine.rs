//! The dispatch engine: polling loop, per-job execution, failure policy.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use hermod_core::{
    AttachmentFetcher, Clock, CoreError, CustomerDirectory, EmailMessenger, InsertOutcome, Job,
    JobStatus, JobStore, JobType, NewJob, Result, SmsMessenger, TenantConfigSource,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    handlers::{self, HandlerContext, HandlerOutcome},
    quiet_hours,
    retry::RetryPolicy,
};

/// Configuration for the dispatch engine.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How often the loop polls for claimable jobs.
    pub poll_interval: Duration,

    /// Bound on concurrently executing handlers.
    pub max_concurrent_jobs: usize,

    /// Attempt bound; `attempts < max_retries` reschedules, otherwise the
    /// job goes terminal.
    pub max_retries: i32,

    /// Delay policy between attempts.
    pub retry: RetryPolicy,

    /// Maximum time to wait for in-flight handlers during shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(crate::DEFAULT_POLL_INTERVAL_MS),
            max_concurrent_jobs: crate::DEFAULT_MAX_CONCURRENT_JOBS,
            max_retries: crate::DEFAULT_MAX_RETRIES,
            retry: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Counters exposed for monitoring and tests.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Jobs that reached a handler or the quiet-hour gate.
    pub jobs_processed: u64,
    /// Jobs marked complete after delivery.
    pub completed: u64,
    /// Jobs completed with a skip reason (e.g. opt-out).
    pub skipped: u64,
    /// Jobs rescheduled by the retry policy.
    pub retried: u64,
    /// Jobs deferred by the quiet-hour gate.
    pub deferred: u64,
    /// Jobs that went terminal.
    pub failed: u64,
    /// Companion email jobs created by the SMS fallback.
    pub fallback_emails: u64,
    /// Handlers currently executing.
    pub in_flight: u64,
}

struct EngineShared {
    store: Arc<dyn JobStore>,
    configs: Arc<dyn TenantConfigSource>,
    directory: Arc<dyn CustomerDirectory>,
    email: Arc<dyn EmailMessenger>,
    sms: Arc<dyn SmsMessenger>,
    attachments: Arc<dyn AttachmentFetcher>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
    stats: RwLock<EngineStats>,
    in_flight: AtomicUsize,
}

/// Decrements the in-flight counter exactly once, whatever the task did.
struct InFlightGuard(Arc<EngineShared>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The job queue engine.
///
/// `start` launches the polling loop; `shutdown` stops claiming and waits
/// for in-flight handlers. [`DispatchEngine::poll_once`] runs a single
/// deterministic poll inline, which is what the tests drive.
pub struct DispatchEngine {
    shared: Arc<EngineShared>,
    cancel: CancellationToken,
    loop_handle: Option<JoinHandle<()>>,
}

impl DispatchEngine {
    /// Creates an engine over the given ports.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        configs: Arc<dyn TenantConfigSource>,
        directory: Arc<dyn CustomerDirectory>,
        email: Arc<dyn EmailMessenger>,
        sms: Arc<dyn SmsMessenger>,
        attachments: Arc<dyn AttachmentFetcher>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                store,
                configs,
                directory,
                email,
                sms,
                attachments,
                clock,
                config,
                stats: RwLock::new(EngineStats::default()),
                in_flight: AtomicUsize::new(0),
            }),
            cancel: CancellationToken::new(),
            loop_handle: None,
        }
    }

    /// Launches the polling loop. Returns immediately.
    pub fn start(&mut self) {
        if self.loop_handle.is_some() {
            return;
        }

        info!(
            poll_interval_ms = self.shared.config.poll_interval.as_millis() as u64,
            max_concurrent_jobs = self.shared.config.max_concurrent_jobs,
            "starting job engine"
        );

        let shared = self.shared.clone();
        let cancel = self.cancel.clone();
        self.loop_handle = Some(tokio::spawn(Self::run(shared, cancel)));
    }

    /// Requests shutdown: no new work is claimed and in-flight handlers
    /// run to completion, bounded by the configured shutdown timeout.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("shutting down job engine");
        self.cancel.cancel();

        let Some(handle) = self.loop_handle.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.shared.config.shutdown_timeout, handle).await {
            Ok(Ok(())) => {
                info!("job engine stopped");
                Ok(())
            },
            Ok(Err(join_error)) => {
                error!(error = %join_error, "engine loop panicked during shutdown");
                Err(CoreError::database(format!("engine loop panicked: {join_error}")))
            },
            Err(_) => {
                error!(
                    timeout_s = self.shared.config.shutdown_timeout.as_secs(),
                    "engine shutdown timed out with handlers still in flight"
                );
                Err(CoreError::database("engine shutdown timed out".to_string()))
            },
        }
    }

    /// Current counters.
    pub async fn stats(&self) -> EngineStats {
        let mut stats = self.shared.stats.read().await.clone();
        stats.in_flight = self.shared.in_flight.load(Ordering::Acquire) as u64;
        stats
    }

    /// Claims up to the available slots and processes each job inline.
    ///
    /// Returns the number of jobs claimed. This path is deterministic and
    /// is what the end-to-end tests drive; the background loop spawns
    /// instead.
    pub async fn poll_once(&self) -> Result<usize> {
        let available = self.available_slots();
        let jobs = self.shared.store.claim_pending(available).await?;
        let claimed = jobs.len();

        for job in jobs {
            self.shared.clone().process_job(job).await;
        }

        Ok(claimed)
    }

    fn available_slots(&self) -> usize {
        let in_flight = self.shared.in_flight.load(Ordering::Acquire);
        self.shared.config.max_concurrent_jobs.saturating_sub(in_flight)
    }

    async fn run(shared: Arc<EngineShared>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(error) = Self::tick(&shared).await {
                error!(error = %error, "job polling tick failed");
            }

            tokio::select! {
                () = shared.clock.sleep(shared.config.poll_interval) => {},
                () = cancel.cancelled() => break,
            }
        }

        // Let in-flight handlers finish before the loop task resolves;
        // shutdown() bounds the overall wait.
        while shared.in_flight.load(Ordering::Acquire) > 0 {
            shared.clock.sleep(Duration::from_millis(25)).await;
        }
    }

    async fn tick(shared: &Arc<EngineShared>) -> Result<()> {
        let in_flight = shared.in_flight.load(Ordering::Acquire);
        let available = shared.config.max_concurrent_jobs.saturating_sub(in_flight);
        if available == 0 {
            return Ok(());
        }

        let jobs = shared.store.claim_pending(available).await?;
        if jobs.is_empty() {
            return Ok(());
        }

        debug!(claimed = jobs.len(), in_flight, "claimed job batch");

        for job in jobs {
            shared.in_flight.fetch_add(1, Ordering::AcqRel);
            let shared = shared.clone();
            tokio::spawn(async move {
                let _guard = InFlightGuard(shared.clone());
                shared.process_job(job).await;
            });
        }

        Ok(())
    }
}

impl EngineShared {
    async fn process_job(self: Arc<Self>, job: Job) {
        let span = info_span!(
            "job",
            job_id = %job.id,
            tenant_id = %job.tenant_id,
            job_type = %job.job_type
        );

        async move {
            self.stats.write().await.jobs_processed += 1;

            let tenant_config = match self.configs.config(&job.tenant_id).await {
                Ok(config) => config,
                Err(error) => {
                    self.handle_failure(&job, &error.to_string()).await;
                    return;
                },
            };

            if !job.is_urgent() {
                let deferred = quiet_hours::defer_until(
                    self.clock.now(),
                    tenant_config.quiet_hours_start.as_deref(),
                    tenant_config.quiet_hours_end.as_deref(),
                );

                if let Some(process_after) = deferred {
                    let result = self
                        .store
                        .reschedule(
                            job.id,
                            job.retry_count,
                            process_after,
                            "Deferred for quiet hours",
                            JobStatus::Pending,
                        )
                        .await;

                    match result {
                        Ok(()) => {
                            self.stats.write().await.deferred += 1;
                            info!(process_after = %process_after, "deferred job for quiet hours");
                        },
                        Err(error) => error!(error = %error, "failed to defer job"),
                    }
                    return;
                }
            }

            let ctx = HandlerContext {
                tenant_config: &tenant_config,
                directory: self.directory.as_ref(),
                email: self.email.as_ref(),
                sms: self.sms.as_ref(),
                attachments: self.attachments.as_ref(),
            };

            match handlers::dispatch(&job, &ctx).await {
                Ok(HandlerOutcome::Delivered { message_id }) => {
                    if let Err(error) = self.store.mark_complete(job.id, None).await {
                        error!(error = %error, "failed to mark job complete");
                        return;
                    }
                    self.stats.write().await.completed += 1;
                    info!(message_id = message_id.as_deref(), "job processed successfully");
                },
                Ok(HandlerOutcome::Skipped { reason }) => {
                    if let Err(error) = self.store.mark_complete(job.id, Some(&reason)).await {
                        error!(error = %error, "failed to mark job complete");
                        return;
                    }
                    self.stats.write().await.skipped += 1;
                    info!(reason = %reason, "job skipped");
                },
                Err(error) => self.handle_failure(&job, &error.to_string()).await,
            }
        }
        .instrument(span)
        .await;
    }

    async fn handle_failure(&self, job: &Job, message: &str) {
        error!(error = %message, retry_count = job.retry_count, "job processing failed");

        let attempts = job.retry_count + 1;

        if attempts < self.config.max_retries {
            let delay = self.config.retry.delay_for(attempts);
            let process_after = self.clock.now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

            let result = self
                .store
                .reschedule(job.id, attempts, process_after, message, JobStatus::Pending)
                .await;

            match result {
                Ok(()) => {
                    self.stats.write().await.retried += 1;
                    warn!(
                        attempt = attempts,
                        next_attempt_at = %process_after,
                        "job failed, retry scheduled"
                    );
                },
                Err(error) => error!(error = %error, "failed to reschedule job"),
            }
            return;
        }

        if job.job_type == JobType::SendSms {
            self.try_email_fallback(job, message).await;
            return;
        }

        self.fail_job(job, message, JobStatus::Failed).await;
    }

    /// Creates a companion email job for an SMS that exhausted its retries.
    ///
    /// The companion carries a `sms_fallback_{id}` reference so re-entering
    /// this path can never fan out twice.
    async fn try_email_fallback(&self, job: &Job, message: &str) {
        let Some(customer_id) = job.payload_customer_id() else {
            self.fail_job(job, &format!("SMS failed after retries: {message}"), JobStatus::Failed)
                .await;
            return;
        };

        let fallback_email = match self.directory.fallback_email(&job.tenant_id, customer_id).await
        {
            Ok(email) => email,
            Err(error) => {
                error!(error = %error, customer_id, "fallback email lookup failed");
                None
            },
        };

        let Some(fallback_email) = fallback_email else {
            self.fail_job(
                job,
                &format!("SMS failed, no fallback email for customer {customer_id}"),
                JobStatus::Failed,
            )
            .await;
            return;
        };

        let reference = format!("sms_fallback_{}", job.id);
        let payload = serde_json::json!({
            "to": fallback_email,
            "subject": job
                .payload()
                .get("subject")
                .and_then(|v| v.as_str())
                .unwrap_or("SMS Fallback Notification"),
            "body": job.payload().get("body").cloned().unwrap_or_default(),
            "source_job_id": job.id.0,
            "source_reference": reference,
        });

        let inserted = self
            .store
            .insert_job(
                NewJob::new(job.tenant_id.clone(), JobType::SendEmail, payload)
                    .with_reference(reference),
            )
            .await;

        match inserted {
            Ok(InsertOutcome::Inserted(_)) => {
                self.stats.write().await.fallback_emails += 1;
                warn!(customer_id, "created fallback email job");
            },
            Ok(InsertOutcome::Skipped) => {
                debug!(customer_id, "fallback email job already exists");
            },
            Err(error) => {
                error!(error = %error, "failed to insert fallback email job");
                self.fail_job(job, message, JobStatus::Failed).await;
                return;
            },
        }

        self.fail_job(
            job,
            &format!("SMS failed but fallback email scheduled for {fallback_email}"),
            JobStatus::FailedFallbackEmail,
        )
        .await;
    }

    async fn fail_job(&self, job: &Job, message: &str, status: JobStatus) {
        match self.store.mark_failed(job.id, message, status).await {
            Ok(()) => {
                self.stats.write().await.failed += 1;
                error!(status = %status, "job failed permanently");
            },
            Err(error) => error!(error = %error, "failed to mark job failed"),
        }
    }
}
