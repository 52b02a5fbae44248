// crates/signet-server/src/lib.rs
// ============================================================================
// Module: Signet Server
// Description: HTTP surface of the Signet identity issuer.
// Purpose: Serve the OAuth/OIDC, session, and admin APIs over axum.
// Dependencies: axum, tokio, signet-core, signet-providers, signet-store-sqlite
// ============================================================================

//! ## Overview
//! The server crate assembles the issuer: configuration, engine wiring,
//! cookie plumbing, the OAuth endpoints, provider login flows, session and
//! admin APIs, and the middleware guard rails. Everything observable over
//! HTTP lives here; the semantics live in `signet-core` and
//! `signet-providers`.
//!
//! Security posture: every request is untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod admin;
pub mod audit;
pub mod config;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod oauth;
pub mod providers_http;
pub mod ratelimit;
pub mod server;
pub mod session_routes;
pub mod state;
pub mod tenancy;

// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use audit::FileAuditStore;
pub use config::ConfigError;
pub use config::SignetConfig;
pub use error::ApiError;
pub use middleware::AuthContext;
pub use middleware::TokenVerifier;
pub use ratelimit::SlidingWindowLimiter;
pub use server::ServeError;
pub use server::build_router;
pub use server::serve;
pub use state::AppState;
pub use state::StartupError;
