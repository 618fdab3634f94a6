//! Tenant gateway: hides the central-vs-tenant database split.
//!
//! The gateway caches tenant configuration on first use, lazily opens one
//! bounded connection pool per tenant DMS, and exposes the read surfaces
//! the engine and scheduler consume: contact lookups and the candidate
//! finder queries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod candidates;
mod contacts;
mod gateway;

pub use gateway::TenantGateway;
