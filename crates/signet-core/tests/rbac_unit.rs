// crates/signet-core/tests/rbac_unit.rs
// ============================================================================
// Module: RBAC Engine Unit Tests
// Description: Role/permission resolution, assignment, and enrichment tests.
// Purpose: Validate the permission closure, caching, and guard rails.
// ============================================================================

//! Unit tests for the RBAC engine: check/enrich closure, duplicate
//! assignment rejection, system-role protection, expiry-at-read, client
//! filtering, and token claim truncation.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use signet_core::ClientId;
use signet_core::MemoryStore;
use signet_core::RbacConfig;
use signet_core::RbacEngine;
use signet_core::RbacError;
use signet_core::TenantId;
use signet_core::TenantScopedStore;
use signet_core::Timestamp;
use signet_core::UserId;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn scoped_store() -> TenantScopedStore {
    TenantScopedStore::new(Arc::new(MemoryStore::new()), TenantId::new("acme"))
}

fn engine() -> RbacEngine {
    RbacEngine::new(RbacConfig {
        cache_ttl: Duration::from_millis(50),
        ..RbacConfig::default()
    })
}

fn admin() -> UserId {
    UserId::new("usr_admin")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// check(u, p) holds exactly when p is in the user's enriched permissions.
#[test]
fn check_matches_enrichment_closure() {
    let store = scoped_store();
    let engine = engine();
    let client = ClientId::new("api");
    let user = UserId::new("usr_1");

    let role = engine.create_role(&store, "editor", None, false).unwrap();
    let read = engine.create_permission(&store, &client, "docs:read", "docs", "read", None).unwrap();
    let write =
        engine.create_permission(&store, &client, "docs:write", "docs", "write", None).unwrap();
    engine.grant_permission(&store, &role.id, &read.id, &admin()).unwrap();
    engine.grant_permission(&store, &role.id, &write.id, &admin()).unwrap();
    engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap();

    let enrichment = engine.enrich(&store, &user, &client).unwrap();
    assert_eq!(enrichment.roles, vec!["editor"]);
    for permission in &enrichment.permissions {
        assert!(engine.check(&store, &user, &client, permission).unwrap());
    }
    assert!(!engine.check(&store, &user, &client, "docs:delete").unwrap());
}

/// Permissions of other clients never leak into a check.
#[test]
fn check_filters_by_client() {
    let store = scoped_store();
    let engine = engine();
    let user = UserId::new("usr_1");
    let api = ClientId::new("api");
    let other = ClientId::new("other");

    let role = engine.create_role(&store, "viewer", None, false).unwrap();
    let perm =
        engine.create_permission(&store, &other, "docs:read", "docs", "read", None).unwrap();
    engine.grant_permission(&store, &role.id, &perm.id, &admin()).unwrap();
    engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap();

    assert!(!engine.check(&store, &user, &api, "docs:read").unwrap());
    assert!(engine.check(&store, &user, &other, "docs:read").unwrap());
}

/// Double assignment is rejected with `role_already_assigned`.
#[test]
fn duplicate_assignment_is_rejected() {
    let store = scoped_store();
    let engine = engine();
    let user = UserId::new("usr_1");
    let role = engine.create_role(&store, "viewer", None, false).unwrap();
    engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap();
    let err = engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap_err();
    assert!(matches!(err, RbacError::RoleAlreadyAssigned(_)));
}

/// Expired assignments are invisible to reads without being pruned.
#[test]
fn expired_assignment_is_ignored() {
    let store = scoped_store();
    let engine = engine();
    let user = UserId::new("usr_1");
    let client = ClientId::new("api");
    let role = engine.create_role(&store, "temp", None, false).unwrap();
    let perm = engine.create_permission(&store, &client, "x:do", "x", "do", None).unwrap();
    engine.grant_permission(&store, &role.id, &perm.id, &admin()).unwrap();
    engine
        .assign_role(&store, &user, &role.id, &admin(), Some(Timestamp::now().minus_secs(10)))
        .unwrap();
    assert!(engine.list_user_roles(&store, &user).unwrap().is_empty());
    assert!(!engine.check(&store, &user, &client, "x:do").unwrap());
    let err = engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap_err();
    assert!(matches!(err, RbacError::RoleAlreadyAssigned(_)));
}

/// System roles cannot be deleted.
#[test]
fn system_role_is_undeletable() {
    let store = scoped_store();
    let engine = engine();
    let role = engine.create_role(&store, "tenant-admin", None, true).unwrap();
    let err = engine.delete_role(&store, &role.id).unwrap_err();
    assert!(matches!(err, RbacError::CannotDeleteSystemRole(_)));
}

/// Role deletion cascades to assignments and grants.
#[test]
fn role_deletion_cascades() {
    let store = scoped_store();
    let engine = engine();
    let user = UserId::new("usr_1");
    let client = ClientId::new("api");
    let role = engine.create_role(&store, "ephemeral", None, false).unwrap();
    let perm = engine.create_permission(&store, &client, "x:do", "x", "do", None).unwrap();
    engine.grant_permission(&store, &role.id, &perm.id, &admin()).unwrap();
    engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap();
    engine.delete_role(&store, &role.id).unwrap();
    assert!(engine.list_user_roles(&store, &user).unwrap().is_empty());
    assert!(!engine.check(&store, &user, &client, "x:do").unwrap());
    // The name becomes reusable.
    engine.create_role(&store, "ephemeral", None, false).unwrap();
}

/// Revocation invalidates the cached snapshot immediately.
#[test]
fn revocation_invalidates_cache() {
    let store = scoped_store();
    let engine = engine();
    let user = UserId::new("usr_1");
    let client = ClientId::new("api");
    let role = engine.create_role(&store, "viewer", None, false).unwrap();
    let perm = engine.create_permission(&store, &client, "x:do", "x", "do", None).unwrap();
    engine.grant_permission(&store, &role.id, &perm.id, &admin()).unwrap();
    engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap();
    assert!(engine.check(&store, &user, &client, "x:do").unwrap());
    engine.revoke_role(&store, &user, &role.id).unwrap();
    assert!(!engine.check(&store, &user, &client, "x:do").unwrap());
}

/// Enrichment truncates to the token budget and flags the truncation.
#[test]
fn enrichment_truncates_to_budget() {
    let store = scoped_store();
    let engine = RbacEngine::new(RbacConfig {
        max_permissions_in_token: 5,
        ..RbacConfig::default()
    });
    let user = UserId::new("usr_1");
    let client = ClientId::new("api");
    let role = engine.create_role(&store, "omnivore", None, false).unwrap();
    for index in 0..8 {
        let name = format!("res{index}:read");
        let perm =
            engine.create_permission(&store, &client, &name, "res", "read", None).unwrap();
        engine.grant_permission(&store, &role.id, &perm.id, &admin()).unwrap();
    }
    engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap();
    let enrichment = engine.enrich(&store, &user, &client).unwrap();
    assert_eq!(enrichment.permissions.len(), 5);
    assert!(enrichment.truncated);
}

/// Batch checks return one verdict per requested permission.
#[test]
fn batch_check_returns_map() {
    let store = scoped_store();
    let engine = engine();
    let user = UserId::new("usr_1");
    let client = ClientId::new("api");
    let role = engine.create_role(&store, "viewer", None, false).unwrap();
    let perm = engine.create_permission(&store, &client, "x:do", "x", "do", None).unwrap();
    engine.grant_permission(&store, &role.id, &perm.id, &admin()).unwrap();
    engine.assign_role(&store, &user, &role.id, &admin(), None).unwrap();
    let verdicts = engine
        .check_batch(&store, &user, &client, &["x:do".to_string(), "y:do".to_string()])
        .unwrap();
    assert_eq!(verdicts.get("x:do"), Some(&true));
    assert_eq!(verdicts.get("y:do"), Some(&false));
}
