//! Test support for Hermod.
//!
//! Provides a deterministic clock, an in-memory job store that honours the
//! full claim/dedup contract, scripted messengers, and static fixtures for
//! the tenant-facing ports. Engine and scheduler tests run entirely against
//! these implementations; no database or network is required.

pub mod directory;
pub mod memory;
pub mod messengers;
pub mod time;

pub use directory::{StaticCandidates, StaticDirectory, StaticTenants};
pub use memory::MemoryJobStore;
pub use messengers::{
    NullAttachmentFetcher, ScriptedEmailMessenger, ScriptedSmsMessenger, StaticAttachmentFetcher,
};
pub use time::TestClock;

use hermod_core::{TenantConfig, TenantId};

/// A tenant config fixture with no credentials and no quiet hours.
pub fn tenant_config(tenant: &str) -> TenantConfig {
    TenantConfig {
        tenant_id: TenantId::new(tenant),
        sendgrid_from: Some("service@dealer.example".to_string()),
        twilio_from_number: Some("+15550100".to_string()),
        ..TenantConfig::default()
    }
}

/// A tenant config fixture with a quiet-hour window.
pub fn tenant_config_with_quiet_hours(tenant: &str, start: &str, end: &str) -> TenantConfig {
    TenantConfig {
        quiet_hours_start: Some(start.to_string()),
        quiet_hours_end: Some(end.to_string()),
        ..tenant_config(tenant)
    }
}
