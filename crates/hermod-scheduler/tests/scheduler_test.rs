//! Sweep behaviour over the in-memory ports.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use hermod_core::{
    AppointmentCandidate, Clock, JobStatus, JobType, PastDueInvoice, ServiceReminderCandidate,
};
use hermod_providers::DefaultTemplateRenderer;
use hermod_scheduler::{Scheduler, SweepIntervals, SweepReport};
use hermod_testing::{tenant_config, MemoryJobStore, StaticCandidates, StaticTenants, TestClock};

struct TestRig {
    clock: TestClock,
    store: Arc<MemoryJobStore>,
    tenants: Arc<StaticTenants>,
    candidates: Arc<StaticCandidates>,
    scheduler: Scheduler,
}

impl TestRig {
    fn new() -> Self {
        let clock = TestClock::at(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).single().unwrap());
        let store = Arc::new(MemoryJobStore::new(Arc::new(clock.clone())));
        let tenants = Arc::new(StaticTenants::new());
        let candidates = Arc::new(StaticCandidates::new());

        let scheduler = Scheduler::new(
            store.clone(),
            tenants.clone(),
            candidates.clone(),
            Arc::new(DefaultTemplateRenderer::new()),
            Arc::new(clock.clone()),
            SweepIntervals::default(),
        );

        Self { clock, store, tenants, candidates, scheduler }
    }
}

fn service_candidate(customer_id: i64, email: Option<&str>) -> ServiceReminderCandidate {
    ServiceReminderCandidate {
        customer_id,
        email: email.map(str::to_string),
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        model: Some("X300".to_string()),
        serial_number: Some("SN-1".to_string()),
    }
}

#[tokio::test]
async fn service_reminder_sweep_enqueues_email_jobs() {
    let rig = TestRig::new();
    rig.tenants.insert(tenant_config("t1"));
    rig.candidates.set_service_reminders(
        "t1",
        vec![service_candidate(42, Some("ada@customer.example")), service_candidate(43, None)],
    );

    let report = rig.scheduler.run_service_reminders().await.unwrap();
    assert_eq!(report, SweepReport { enqueued: 1, deduplicated: 0 });

    let jobs = rig.store.jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.job_type, JobType::SendEmail);
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.source_reference.as_deref(), Some("service_reminder_t1_42"));
    assert_eq!(job.payload().get("to").and_then(|v| v.as_str()), Some("ada@customer.example"));
    assert_eq!(
        job.payload().get("subject").and_then(|v| v.as_str()),
        Some("2-Year Tune-Up Special")
    );
    let body = job.payload().get("body").and_then(|v| v.as_str()).unwrap();
    assert!(body.starts_with("Hi Ada Lovelace,"));
    assert!(body.contains("your X300 purchase"));
}

#[tokio::test]
async fn consecutive_sweeps_deduplicate_by_reference() {
    let rig = TestRig::new();
    rig.tenants.insert(tenant_config("t1"));
    rig.candidates
        .set_service_reminders("t1", vec![service_candidate(42, Some("ada@customer.example"))]);

    let first = rig.scheduler.run_service_reminders().await.unwrap();
    let second = rig.scheduler.run_service_reminders().await.unwrap();

    assert_eq!(first, SweepReport { enqueued: 1, deduplicated: 0 });
    assert_eq!(second, SweepReport { enqueued: 0, deduplicated: 1 });
    assert_eq!(rig.store.jobs().len(), 1);
}

#[tokio::test]
async fn appointment_sweep_enqueues_sms_with_schedule_time() {
    let rig = TestRig::new();
    rig.tenants.insert(tenant_config("t1"));
    rig.candidates.set_appointments(
        "t1",
        vec![
            AppointmentCandidate {
                appointment_id: 9,
                customer_id: 42,
                scheduled_start: Some(rig.clock.now() + Duration::hours(24)),
                phone: Some("+15550123".to_string()),
                first_name: Some("Ada".to_string()),
            },
            AppointmentCandidate {
                appointment_id: 10,
                customer_id: 43,
                scheduled_start: Some(rig.clock.now() + Duration::hours(24)),
                phone: None,
                first_name: None,
            },
        ],
    );

    let report = rig.scheduler.run_appointment_confirmations().await.unwrap();
    assert_eq!(report.enqueued, 1);

    let jobs = rig.store.jobs();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.job_type, JobType::SendSms);
    assert_eq!(job.source_reference.as_deref(), Some("appointment_t1_9"));
    let body = job.payload().get("body").and_then(|v| v.as_str()).unwrap();
    assert!(body.contains("2025-03-11 12:00"));
    assert!(body.contains("Reply YES to confirm"));
}

#[tokio::test]
async fn invoice_sweep_computes_days_past_due() {
    let rig = TestRig::new();
    rig.tenants.insert(tenant_config("t1"));
    rig.candidates.set_past_due_invoices(
        "t1",
        vec![PastDueInvoice {
            invoice_id: 1001,
            customer_id: 42,
            due_date: Some(rig.clock.now() - Duration::days(45)),
            balance: 249.5,
            email: Some("ada@customer.example".to_string()),
            first_name: Some("Ada".to_string()),
        }],
    );

    let report = rig.scheduler.run_invoice_reminders().await.unwrap();
    assert_eq!(report.enqueued, 1);

    let jobs = rig.store.jobs();
    let body = jobs[0].payload().get("body").and_then(|v| v.as_str()).unwrap();
    assert!(body.contains("invoice #1001 is now 45 days past due"));
    assert!(body.contains("$249.50"));
    assert_eq!(jobs[0].source_reference.as_deref(), Some("invoice_t1_1001"));
}

#[tokio::test]
async fn sweeps_cover_every_tenant() {
    let rig = TestRig::new();
    rig.tenants.insert(tenant_config("t1"));
    rig.tenants.insert(tenant_config("t2"));
    rig.candidates
        .set_service_reminders("t1", vec![service_candidate(1, Some("one@customer.example"))]);
    rig.candidates
        .set_service_reminders("t2", vec![service_candidate(2, Some("two@customer.example"))]);

    let report = rig.scheduler.run_service_reminders().await.unwrap();

    assert_eq!(report.enqueued, 2);
    let references: Vec<_> =
        rig.store.jobs().into_iter().filter_map(|j| j.source_reference).collect();
    assert!(references.contains(&"service_reminder_t1_1".to_string()));
    assert!(references.contains(&"service_reminder_t2_2".to_string()));
}

#[tokio::test]
async fn started_scheduler_runs_sweeps_immediately_and_shuts_down() {
    let mut rig = TestRig::new();
    rig.tenants.insert(tenant_config("t1"));
    rig.candidates
        .set_service_reminders("t1", vec![service_candidate(42, Some("ada@customer.example"))]);

    rig.scheduler.start();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    rig.scheduler.shutdown().await;

    // The initial run happened; dedup kept it to a single row no matter
    // how many intervals elapsed on the virtual clock.
    assert_eq!(rig.store.jobs().len(), 1);
}
