//! Static fixtures for the tenant-facing read ports.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use hermod_core::{
    AppointmentCandidate, CandidateSource, CoreError, CustomerContact, CustomerDirectory,
    PastDueInvoice, Result, ServiceReminderCandidate, TenantConfig, TenantConfigSource,
    TenantDirectory, TenantId,
};

/// Customer directory backed by a fixed map.
#[derive(Default)]
pub struct StaticDirectory {
    customers: Mutex<HashMap<(TenantId, i64), CustomerContact>>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a customer contact row.
    pub fn insert(&self, tenant: &str, contact: CustomerContact) {
        self.customers
            .lock()
            .expect("customers lock")
            .insert((TenantId::new(tenant), contact.customer_id), contact);
    }
}

#[async_trait]
impl CustomerDirectory for StaticDirectory {
    async fn customer_contact(
        &self,
        tenant: &TenantId,
        customer_id: i64,
    ) -> Result<Option<CustomerContact>> {
        Ok(self
            .customers
            .lock()
            .expect("customers lock")
            .get(&(tenant.clone(), customer_id))
            .cloned())
    }
}

/// Tenant config source and directory backed by a fixed map.
#[derive(Default)]
pub struct StaticTenants {
    configs: Mutex<HashMap<TenantId, Arc<TenantConfig>>>,
}

impl StaticTenants {
    /// Creates an empty set of tenants.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tenant configuration.
    pub fn insert(&self, config: TenantConfig) {
        self.configs
            .lock()
            .expect("configs lock")
            .insert(config.tenant_id.clone(), Arc::new(config));
    }
}

#[async_trait]
impl TenantConfigSource for StaticTenants {
    async fn config(&self, tenant: &TenantId) -> Result<Arc<TenantConfig>> {
        self.configs
            .lock()
            .expect("configs lock")
            .get(tenant)
            .cloned()
            .ok_or_else(|| CoreError::configuration(format!("missing tenant config for tenant {tenant}")))
    }
}

#[async_trait]
impl TenantDirectory for StaticTenants {
    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        let mut ids: Vec<TenantId> =
            self.configs.lock().expect("configs lock").keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Candidate source backed by fixed per-tenant lists.
#[derive(Default)]
pub struct StaticCandidates {
    service: Mutex<HashMap<TenantId, Vec<ServiceReminderCandidate>>>,
    appointments: Mutex<HashMap<TenantId, Vec<AppointmentCandidate>>>,
    invoices: Mutex<HashMap<TenantId, Vec<PastDueInvoice>>>,
}

impl StaticCandidates {
    /// Creates an empty candidate source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers service reminder candidates for a tenant.
    pub fn set_service_reminders(&self, tenant: &str, rows: Vec<ServiceReminderCandidate>) {
        self.service.lock().expect("service lock").insert(TenantId::new(tenant), rows);
    }

    /// Registers appointment candidates for a tenant.
    pub fn set_appointments(&self, tenant: &str, rows: Vec<AppointmentCandidate>) {
        self.appointments.lock().expect("appointments lock").insert(TenantId::new(tenant), rows);
    }

    /// Registers past-due invoices for a tenant.
    pub fn set_past_due_invoices(&self, tenant: &str, rows: Vec<PastDueInvoice>) {
        self.invoices.lock().expect("invoices lock").insert(TenantId::new(tenant), rows);
    }
}

#[async_trait]
impl CandidateSource for StaticCandidates {
    async fn service_reminder_candidates(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<ServiceReminderCandidate>> {
        Ok(self.service.lock().expect("service lock").get(tenant).cloned().unwrap_or_default())
    }

    async fn appointments_in_confirmation_window(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<AppointmentCandidate>> {
        Ok(self
            .appointments
            .lock()
            .expect("appointments lock")
            .get(tenant)
            .cloned()
            .unwrap_or_default())
    }

    async fn past_due_invoices(&self, tenant: &TenantId) -> Result<Vec<PastDueInvoice>> {
        Ok(self.invoices.lock().expect("invoices lock").get(tenant).cloned().unwrap_or_default())
    }
}
