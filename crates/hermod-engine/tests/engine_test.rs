//! End-to-end engine scenarios over the in-memory ports.

use std::{sync::Arc, time::Duration};

use chrono::{Datelike, Timelike};
use hermod_core::{Clock, CustomerContact, InsertOutcome, JobStatus, JobStore, JobType, NewJob};
use hermod_engine::{DispatchConfig, DispatchEngine, RetryPolicy};
use hermod_testing::{
    tenant_config, tenant_config_with_quiet_hours, MemoryJobStore, NullAttachmentFetcher,
    ScriptedEmailMessenger, ScriptedSmsMessenger, StaticDirectory, StaticTenants, TestClock,
};

struct TestRig {
    clock: TestClock,
    store: Arc<MemoryJobStore>,
    tenants: Arc<StaticTenants>,
    directory: Arc<StaticDirectory>,
    email: Arc<ScriptedEmailMessenger>,
    sms: Arc<ScriptedSmsMessenger>,
    engine: DispatchEngine,
}

impl TestRig {
    fn new(clock: TestClock, config: DispatchConfig) -> Self {
        let store = Arc::new(MemoryJobStore::new(Arc::new(clock.clone())));
        let tenants = Arc::new(StaticTenants::new());
        let directory = Arc::new(StaticDirectory::new());
        let email = Arc::new(ScriptedEmailMessenger::new());
        let sms = Arc::new(ScriptedSmsMessenger::new());

        let engine = DispatchEngine::new(
            store.clone(),
            tenants.clone(),
            directory.clone(),
            email.clone(),
            sms.clone(),
            Arc::new(NullAttachmentFetcher),
            Arc::new(clock.clone()),
            config,
        );

        Self { clock, store, tenants, directory, email, sms, engine }
    }

    fn config() -> DispatchConfig {
        DispatchConfig {
            poll_interval: Duration::from_millis(10),
            max_concurrent_jobs: 5,
            max_retries: 3,
            retry: RetryPolicy::fixed(Duration::from_secs(60)),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    fn assert_retry_counts_bounded(&self) {
        for job in self.store.jobs() {
            assert!(
                job.retry_count <= job.max_retries,
                "job {} exceeded its retry bound: {} > {}",
                job.id,
                job.retry_count,
                job.max_retries
            );
        }
    }
}

#[tokio::test]
async fn happy_path_email_completes_after_one_tick() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    rig.tenants.insert(tenant_config("t1"));

    let outcome = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        ))
        .await
        .unwrap();
    let id = outcome.job_id().expect("job inserted");

    assert_eq!(rig.engine.poll_once().await.unwrap(), 1);

    let job = rig.store.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert!(job.completed_at.is_some());
    assert_eq!(rig.email.sent().len(), 1);
    rig.assert_retry_counts_bounded();
}

#[tokio::test]
async fn transient_failures_retry_then_succeed() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    rig.tenants.insert(tenant_config("t1"));
    rig.email.push_failure("connection reset");
    rig.email.push_failure("connection reset");

    let id = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    // First attempt fails and reschedules.
    rig.engine.poll_once().await.unwrap();
    let job = rig.store.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 1);
    assert!(job.last_error.as_deref().unwrap().contains("connection reset"));
    let first_retry_at = job.process_after.unwrap();
    assert_eq!(first_retry_at, rig.clock.now() + chrono::Duration::seconds(60));

    // Not yet visible to the claim primitive.
    assert_eq!(rig.engine.poll_once().await.unwrap(), 0);

    rig.clock.advance(Duration::from_secs(61));
    rig.engine.poll_once().await.unwrap();
    let job = rig.store.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 2);

    rig.clock.advance(Duration::from_secs(61));
    rig.engine.poll_once().await.unwrap();
    let job = rig.store.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.retry_count, 2, "successful attempt does not advance the count");
    assert_eq!(rig.email.sent().len(), 3);
    rig.assert_retry_counts_bounded();
}

#[tokio::test]
async fn quiet_hours_defer_without_consuming_a_retry() {
    let rig = TestRig::new(TestClock::at_time(22, 0), TestRig::config());
    rig.tenants.insert(tenant_config_with_quiet_hours("t1", "21:00", "08:00"));

    let id = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    rig.engine.poll_once().await.unwrap();

    let job = rig.store.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.last_error.as_deref(), Some("Deferred for quiet hours"));

    let deferred_to = job.process_after.unwrap();
    let now = rig.clock.now();
    assert_eq!(deferred_to.hour(), 8);
    assert_eq!(deferred_to.minute(), 0);
    assert_eq!(deferred_to.day(), (now + chrono::Duration::days(1)).day());
    assert!(rig.email.sent().is_empty());
}

#[tokio::test]
async fn urgent_jobs_bypass_quiet_hours() {
    let rig = TestRig::new(TestClock::at_time(22, 0), TestRig::config());
    rig.tenants.insert(tenant_config_with_quiet_hours("t1", "21:00", "08:00"));

    let id = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x", "urgent": true}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    rig.engine.poll_once().await.unwrap();

    assert_eq!(rig.store.job(id).unwrap().status, JobStatus::Complete);
    assert_eq!(rig.email.sent().len(), 1);
}

#[tokio::test]
async fn exhausted_sms_falls_back_to_email_companion_job() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    rig.tenants.insert(tenant_config("t1"));
    rig.sms.fail_always("carrier rejected");
    rig.directory.insert(
        "t1",
        CustomerContact {
            customer_id: 42,
            email: Some("fallback@customer.example".to_string()),
            phone: Some("+15550123".to_string()),
            ..CustomerContact::default()
        },
    );

    let id = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendSms,
            serde_json::json!({"to": "+15550123", "body": "your appointment", "customer_id": 42}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    for _ in 0..3 {
        rig.engine.poll_once().await.unwrap();
        rig.clock.advance(Duration::from_secs(61));
    }

    let original = rig.store.job(id).unwrap();
    assert_eq!(original.status, JobStatus::FailedFallbackEmail);
    assert!(original
        .last_error
        .as_deref()
        .unwrap()
        .contains("fallback email scheduled for fallback@customer.example"));

    let companions = rig.store.jobs_with_status(JobStatus::Pending);
    assert_eq!(companions.len(), 1);
    let companion = &companions[0];
    assert_eq!(companion.job_type, JobType::SendEmail);
    assert_eq!(companion.source_reference.as_deref(), Some(format!("sms_fallback_{id}").as_str()));
    assert_eq!(companion.payload().get("to").and_then(|v| v.as_str()), Some("fallback@customer.example"));
    assert_eq!(
        companion.payload().get("subject").and_then(|v| v.as_str()),
        Some("SMS Fallback Notification")
    );
    assert_eq!(
        companion.payload().get("body").and_then(|v| v.as_str()),
        Some("your appointment")
    );
    rig.assert_retry_counts_bounded();
}

#[tokio::test]
async fn exhausted_sms_without_email_fails_terminally() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    rig.tenants.insert(tenant_config("t1"));
    rig.sms.fail_always("carrier rejected");
    rig.directory.insert(
        "t1",
        CustomerContact {
            customer_id: 42,
            phone: Some("+15550123".to_string()),
            ..CustomerContact::default()
        },
    );

    let id = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendSms,
            serde_json::json!({"to": "+15550123", "body": "x", "customer_id": 42}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    for _ in 0..3 {
        rig.engine.poll_once().await.unwrap();
        rig.clock.advance(Duration::from_secs(61));
    }

    let job = rig.store.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.last_error.as_deref(),
        Some("SMS failed, no fallback email for customer 42")
    );
    assert_eq!(rig.store.jobs().len(), 1, "no companion job without an email");
}

#[tokio::test]
async fn zero_max_retries_goes_terminal_on_first_failure() {
    let config = DispatchConfig { max_retries: 0, ..TestRig::config() };
    let rig = TestRig::new(TestClock::at_time(12, 0), config);
    rig.tenants.insert(tenant_config("t1"));
    rig.email.push_failure("bad address");

    let id = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    rig.engine.poll_once().await.unwrap();

    assert_eq!(rig.store.job(id).unwrap().status, JobStatus::Failed);
}

#[tokio::test]
async fn opt_out_skip_completes_with_reason() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    rig.tenants.insert(tenant_config("t1"));
    rig.directory.insert(
        "t1",
        CustomerContact {
            customer_id: 7,
            email: Some("c@d".to_string()),
            contact_preference: Some(hermod_core::ContactPreference::DoNotContact),
            ..CustomerContact::default()
        },
    );

    let id = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::NotifyCustomer,
            serde_json::json!({"customer_id": 7, "body": "hello"}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    rig.engine.poll_once().await.unwrap();

    let job = rig.store.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Complete);
    assert_eq!(job.last_error.as_deref(), Some("Customer opted out of communications"));
    assert!(rig.email.sent().is_empty());
    assert!(rig.sms.sent().is_empty());
}

#[tokio::test]
async fn unknown_tenant_exhausts_retries_and_fails() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    // No tenant config registered.

    let id = rig
        .store
        .insert_job(NewJob::new(
            "ghost",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    for _ in 0..3 {
        rig.engine.poll_once().await.unwrap();
        rig.clock.advance(Duration::from_secs(61));
    }

    let job = rig.store.job(id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.last_error.as_deref().unwrap().contains("missing tenant config"));
}

#[tokio::test]
async fn duplicate_references_produce_one_active_row() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());

    let job = || {
        NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        )
        .with_reference("service_reminder_t1_42")
    };

    assert!(matches!(
        rig.store.insert_job(job()).await.unwrap(),
        InsertOutcome::Inserted(_)
    ));
    assert_eq!(rig.store.insert_job(job()).await.unwrap(), InsertOutcome::Skipped);
    assert_eq!(rig.store.jobs().len(), 1);
}

#[tokio::test]
async fn failed_rows_do_not_block_reenqueue() {
    let config = DispatchConfig { max_retries: 0, ..TestRig::config() };
    let rig = TestRig::new(TestClock::at_time(12, 0), config);
    rig.tenants.insert(tenant_config("t1"));
    rig.email.push_failure("boom");

    let job = || {
        NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        )
        .with_reference("invoice_t1_9")
    };

    rig.store.insert_job(job()).await.unwrap();
    rig.engine.poll_once().await.unwrap();
    assert_eq!(rig.store.jobs_with_status(JobStatus::Failed).len(), 1);

    // The failed row no longer holds the reference.
    assert!(matches!(
        rig.store.insert_job(job()).await.unwrap(),
        InsertOutcome::Inserted(_)
    ));
}

#[tokio::test]
async fn claim_zero_returns_empty() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    rig.store
        .insert_job(NewJob::new("t1", JobType::SendEmail, serde_json::json!({})))
        .await
        .unwrap();

    assert!(rig.store.claim_pending(0).await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_claims_never_share_a_job() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    for i in 0..6 {
        rig.store
            .insert_job(NewJob::new(
                "t1",
                JobType::SendEmail,
                serde_json::json!({"to": format!("a{i}@b"), "subject": "Hi", "body": "x"}),
            ))
            .await
            .unwrap();
    }

    let (first, second) =
        tokio::join!(rig.store.claim_pending(3), rig.store.claim_pending(3));
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(first.len() + second.len(), 6);
    for claimed in &first {
        assert!(!second.iter().any(|j| j.id == claimed.id), "job claimed twice");
    }
}

#[tokio::test]
async fn restart_does_not_redeliver_completed_jobs() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    rig.tenants.insert(tenant_config("t1"));

    rig.store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        ))
        .await
        .unwrap();
    rig.engine.poll_once().await.unwrap();
    assert_eq!(rig.email.sent().len(), 1);

    // A fresh engine over the same store sees nothing claimable.
    let second = DispatchEngine::new(
        rig.store.clone(),
        rig.tenants.clone(),
        rig.directory.clone(),
        rig.email.clone(),
        rig.sms.clone(),
        Arc::new(NullAttachmentFetcher),
        Arc::new(rig.clock.clone()),
        TestRig::config(),
    );
    assert_eq!(second.poll_once().await.unwrap(), 0);
    assert_eq!(rig.email.sent().len(), 1);
}

#[tokio::test]
async fn engine_loop_starts_and_drains_gracefully() {
    let clock = TestClock::at_time(12, 0);
    let mut rig = TestRig::new(clock, TestRig::config());
    rig.tenants.insert(tenant_config("t1"));

    let id = rig
        .store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        ))
        .await
        .unwrap()
        .job_id()
        .unwrap();

    rig.engine.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    rig.engine.shutdown().await.unwrap();

    assert_eq!(rig.store.job(id).unwrap().status, JobStatus::Complete);
}

#[tokio::test]
async fn stats_track_outcomes() {
    let rig = TestRig::new(TestClock::at_time(12, 0), TestRig::config());
    rig.tenants.insert(tenant_config("t1"));
    rig.email.push_failure("flaky");

    rig.store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        ))
        .await
        .unwrap();
    rig.store
        .insert_job(NewJob::new(
            "t1",
            JobType::SendEmail,
            serde_json::json!({"to": "c@d", "subject": "Yo", "body": "y"}),
        ))
        .await
        .unwrap();

    rig.engine.poll_once().await.unwrap();

    let stats = rig.engine.stats().await;
    assert_eq!(stats.jobs_processed, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.in_flight, 0);
}
