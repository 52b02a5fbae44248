// crates/signet-core/src/runtime/mod.rs
// ============================================================================
// Module: Runtime Engines
// Description: Service engines implementing the issuer semantics.
// Purpose: Compose domain records, storage, and crypto into behavior.
// Dependencies: crate::core, crate::store, crate::crypto
// ============================================================================

//! ## Overview
//! Runtime engines own every state transition: tenant lifecycle and
//! resolution, client registration with breaker-protected storage, session
//! and prompt handling, RBAC evaluation, token issuance with refresh
//! families, user accounts, and the audit pipeline. Engines are created at
//! startup and injected; none holds hidden global state.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod breaker;
pub mod cache;
pub mod clients;
pub mod rbac;
pub mod sessions;
pub mod tenants;
pub mod tokens;
pub mod users;
