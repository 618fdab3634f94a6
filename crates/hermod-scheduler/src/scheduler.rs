//! Recurring task plumbing for the sweep loops.

use std::{sync::Arc, time::Duration};

use hermod_core::{
    CandidateSource, Clock, JobStore, Result, TemplateRenderer, TenantDirectory,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::sweeps::{SweepContext, SweepKind, SweepReport};

/// Intervals for the three core sweeps.
#[derive(Debug, Clone)]
pub struct SweepIntervals {
    /// Service reminder sweep interval.
    pub service_reminders: Duration,
    /// Appointment confirmation sweep interval.
    pub appointment_confirmations: Duration,
    /// Invoice reminder sweep interval.
    pub invoice_reminders: Duration,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            service_reminders: Duration::from_secs(24 * 60 * 60),
            appointment_confirmations: Duration::from_secs(60 * 60),
            invoice_reminders: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// The proactive scheduler.
///
/// On `start` each sweep runs immediately, then on its interval. `shutdown`
/// cancels the loops and waits for them to finish their current run.
pub struct Scheduler {
    ctx: Arc<SweepContext>,
    intervals: SweepIntervals,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a scheduler over the given ports.
    pub fn new(
        store: Arc<dyn JobStore>,
        tenants: Arc<dyn TenantDirectory>,
        candidates: Arc<dyn CandidateSource>,
        renderer: Arc<dyn TemplateRenderer>,
        clock: Arc<dyn Clock>,
        intervals: SweepIntervals,
    ) -> Self {
        Self {
            ctx: Arc::new(SweepContext { store, tenants, candidates, renderer, clock }),
            intervals,
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Launches all sweep loops. Returns immediately.
    pub fn start(&mut self) {
        if !self.handles.is_empty() {
            return;
        }

        info!("starting proactive scheduler");

        let tasks = [
            (SweepKind::ServiceReminders, self.intervals.service_reminders),
            (SweepKind::AppointmentConfirmations, self.intervals.appointment_confirmations),
            (SweepKind::InvoiceReminders, self.intervals.invoice_reminders),
        ];

        for (kind, interval) in tasks {
            let ctx = self.ctx.clone();
            let cancel = self.cancel.clone();
            self.handles.push(tokio::spawn(Self::run_recurring(ctx, cancel, kind, interval)));
        }
    }

    /// Stops the sweep loops and waits for in-progress runs to finish.
    pub async fn shutdown(mut self) {
        info!("shutting down proactive scheduler");
        self.cancel.cancel();

        for handle in self.handles.drain(..) {
            if let Err(join_error) = handle.await {
                error!(error = %join_error, "sweep task panicked during shutdown");
            }
        }
    }

    /// Runs the service reminder sweep once.
    pub async fn run_service_reminders(&self) -> Result<SweepReport> {
        self.ctx.run_sweep(SweepKind::ServiceReminders).await
    }

    /// Runs the appointment confirmation sweep once.
    pub async fn run_appointment_confirmations(&self) -> Result<SweepReport> {
        self.ctx.run_sweep(SweepKind::AppointmentConfirmations).await
    }

    /// Runs the invoice reminder sweep once.
    pub async fn run_invoice_reminders(&self) -> Result<SweepReport> {
        self.ctx.run_sweep(SweepKind::InvoiceReminders).await
    }

    async fn run_recurring(
        ctx: Arc<SweepContext>,
        cancel: CancellationToken,
        kind: SweepKind,
        interval: Duration,
    ) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            // A failing sweep is logged and does not affect the interval.
            if let Err(error) = ctx.run_sweep(kind).await {
                error!(task = kind.name(), error = %error, "scheduled sweep failed");
            }

            tokio::select! {
                () = ctx.clock.sleep(interval) => {},
                () = cancel.cancelled() => break,
            }
        }
    }
}
