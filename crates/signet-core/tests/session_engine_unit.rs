// crates/signet-core/tests/session_engine_unit.rs
// ============================================================================
// Module: Session Engine Unit Tests
// Description: Multi-account session lifecycle and prompt semantics tests.
// Purpose: Validate the account cap, eviction order, switching, and prompts.
// ============================================================================

//! Unit tests for the session engine: capacity with LRA eviction, active
//! account exclusivity, removal fallback, prompt handling, and revocation.

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

use serde_json::json;
use signet_core::AddAccount;
use signet_core::AuthorizeSessionParams;
use signet_core::ClientId;
use signet_core::MemoryStore;
use signet_core::Prompt;
use signet_core::PromptOutcome;
use signet_core::SessionConfig;
use signet_core::SessionEngine;
use signet_core::SessionError;
use signet_core::SubjectType;
use signet_core::TenantId;
use signet_core::TenantScopedStore;
use signet_core::UserId;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn scoped_store() -> TenantScopedStore {
    TenantScopedStore::new(Arc::new(MemoryStore::new()), TenantId::new("acme"))
}

fn engine() -> SessionEngine {
    SessionEngine::new(SessionConfig::default())
}

fn account_input(user: &str, email: &str) -> AddAccount {
    AddAccount {
        user_id: UserId::new(user),
        subject_type: SubjectType::User,
        subject_properties: json!({ "id": user, "email": email }),
        refresh_token: None,
        client_id: ClientId::new("test-client"),
        ttl_secs: 3600,
    }
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// A new session has no accounts and no active user.
#[test]
fn new_session_is_empty() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    assert_eq!(session.version, 1);
    assert!(session.account_user_ids.is_empty());
    assert!(session.active_user_id.is_none());
}

/// Adding an account makes it active and bumps the version.
#[test]
fn add_account_sets_active() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    let account =
        engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    assert!(account.is_active);
    let session = engine.get_browser_session(&store, &session.id).unwrap();
    assert_eq!(session.active_user_id, Some(UserId::new("u1")));
    assert_eq!(session.version, 2);
}

/// Beyond the cap the least-recently-authenticated account is evicted.
#[test]
fn account_cap_evicts_least_recent() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    for (user, email) in [
        ("u1", "u1@example.com"),
        ("u2", "u2@example.com"),
        ("u3", "u3@example.com"),
        ("u4", "u4@example.com"),
        ("u5", "u5@example.com"),
    ] {
        engine.add_account(&store, &session.id, account_input(user, email)).unwrap();
    }
    let session = engine.get_browser_session(&store, &session.id).unwrap();
    assert_eq!(session.account_user_ids.len(), 3);
    assert_eq!(
        session.account_user_ids,
        vec![UserId::new("u3"), UserId::new("u4"), UserId::new("u5")]
    );
    assert_eq!(session.active_user_id, Some(UserId::new("u5")));
    let accounts = engine.list_accounts(&store, &session.id).unwrap();
    assert_eq!(accounts.len(), 3);
}

/// Re-adding an existing user moves it to the most-recent slot, no eviction.
#[test]
fn reauthentication_reorders_without_eviction() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    engine.add_account(&store, &session.id, account_input("u2", "u2@example.com")).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    let session = engine.get_browser_session(&store, &session.id).unwrap();
    assert_eq!(session.account_user_ids, vec![UserId::new("u2"), UserId::new("u1")]);
}

/// Strict capping rejects additions instead of evicting.
#[test]
fn strict_cap_rejects_overflow() {
    let store = scoped_store();
    let engine = SessionEngine::new(SessionConfig {
        max_accounts: 1,
        strict_account_cap: true,
        ..SessionConfig::default()
    });
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    let err = engine
        .add_account(&store, &session.id, account_input("u2", "u2@example.com"))
        .unwrap_err();
    assert!(matches!(err, SessionError::MaxAccountsExceeded));
}

/// Switching changes the active account exclusively.
#[test]
fn switch_active_is_exclusive() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    engine.add_account(&store, &session.id, account_input("u2", "u2@example.com")).unwrap();
    engine.switch_active(&store, &session.id, &UserId::new("u1")).unwrap();
    let accounts = engine.list_accounts(&store, &session.id).unwrap();
    let active: Vec<_> = accounts.iter().filter(|account| account.is_active).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].user_id, UserId::new("u1"));
}

/// Switching to an unknown user fails with `account_not_found`.
#[test]
fn switch_to_unknown_account_fails() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    let err = engine.switch_active(&store, &session.id, &UserId::new("ghost")).unwrap_err();
    assert!(matches!(err, SessionError::AccountNotFound(_)));
}

/// Removing the active account promotes the first remaining one.
#[test]
fn remove_active_promotes_first_remaining() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    engine.add_account(&store, &session.id, account_input("u2", "u2@example.com")).unwrap();
    let session = engine.remove_account(&store, &session.id, &UserId::new("u2")).unwrap();
    assert_eq!(session.active_user_id, Some(UserId::new("u1")));
    assert_eq!(session.account_user_ids, vec![UserId::new("u1")]);
}

/// Removing the last account leaves the session empty with no active user.
#[test]
fn remove_last_account_clears_active() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    let session = engine.remove_account(&store, &session.id, &UserId::new("u1")).unwrap();
    assert!(session.active_user_id.is_none());
    assert!(session.account_user_ids.is_empty());
}

/// Admin revocation removes every account session of the user.
#[test]
fn revoke_user_sessions_counts_removals() {
    let store = scoped_store();
    let engine = engine();
    let first = engine.create_browser_session(&store, None, None).unwrap();
    let second = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &first.id, account_input("u1", "u1@example.com")).unwrap();
    engine.add_account(&store, &second.id, account_input("u1", "u1@example.com")).unwrap();
    engine.add_account(&store, &second.id, account_input("u2", "u2@example.com")).unwrap();
    let revoked = engine.revoke_user_sessions(&store, &UserId::new("u1")).unwrap();
    assert_eq!(revoked, 2);
    assert!(engine.list_accounts(&store, &second.id).unwrap().iter().all(|a| a.user_id
        != UserId::new("u1")));
}

// ============================================================================
// SECTION: Prompt Semantics
// ============================================================================

/// `prompt=none` without a session yields `login_required`.
#[test]
fn prompt_none_without_session_requires_login() {
    let store = scoped_store();
    let engine = engine();
    let params = AuthorizeSessionParams {
        prompt: Some(Prompt::None),
        ..AuthorizeSessionParams::default()
    };
    let outcome = engine.evaluate_authorize(&store, None, &params).unwrap();
    assert_eq!(outcome, PromptOutcome::LoginRequired);
}

/// `prompt=none` with a valid active account proceeds silently.
#[test]
fn prompt_none_with_session_proceeds() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    let params = AuthorizeSessionParams {
        prompt: Some(Prompt::None),
        ..AuthorizeSessionParams::default()
    };
    let outcome = engine.evaluate_authorize(&store, Some(&session.id), &params).unwrap();
    assert!(matches!(outcome, PromptOutcome::Proceed { account } if account.user_id == UserId::new("u1")));
}

/// `prompt=login` forces the login UI without consuming the session.
#[test]
fn prompt_login_forces_reauthentication() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    let params = AuthorizeSessionParams {
        prompt: Some(Prompt::Login),
        ..AuthorizeSessionParams::default()
    };
    let outcome = engine.evaluate_authorize(&store, Some(&session.id), &params).unwrap();
    assert_eq!(outcome, PromptOutcome::ShowLogin);
    assert_eq!(engine.list_accounts(&store, &session.id).unwrap().len(), 1);
}

/// `prompt=select_account` returns the picker only for two or more accounts.
#[test]
fn prompt_select_account_needs_two_accounts() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    let params = AuthorizeSessionParams {
        prompt: Some(Prompt::SelectAccount),
        ..AuthorizeSessionParams::default()
    };
    let outcome = engine.evaluate_authorize(&store, Some(&session.id), &params).unwrap();
    assert!(matches!(outcome, PromptOutcome::Proceed { .. }));

    engine.add_account(&store, &session.id, account_input("u2", "u2@example.com")).unwrap();
    let outcome = engine.evaluate_authorize(&store, Some(&session.id), &params).unwrap();
    assert!(matches!(outcome, PromptOutcome::SelectAccount { accounts } if accounts.len() == 2));
}

/// `max_age=0` forces re-authentication for an aged account.
#[test]
fn max_age_zero_forces_login() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let params = AuthorizeSessionParams {
        max_age: Some(0),
        ..AuthorizeSessionParams::default()
    };
    let outcome = engine.evaluate_authorize(&store, Some(&session.id), &params).unwrap();
    assert_eq!(outcome, PromptOutcome::ShowLogin);
}

/// `login_hint` matching an account email switches the active account.
#[test]
fn login_hint_switches_matching_account() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    engine.add_account(&store, &session.id, account_input("u2", "u2@example.com")).unwrap();
    let params = AuthorizeSessionParams {
        login_hint: Some("U1@Example.COM".to_string()),
        ..AuthorizeSessionParams::default()
    };
    let outcome = engine.evaluate_authorize(&store, Some(&session.id), &params).unwrap();
    assert!(matches!(outcome, PromptOutcome::Proceed { account } if account.user_id == UserId::new("u1")));
}

/// `account_hint` matching a session account switches; unknown hints fall through.
#[test]
fn account_hint_switches_or_falls_through() {
    let store = scoped_store();
    let engine = engine();
    let session = engine.create_browser_session(&store, None, None).unwrap();
    engine.add_account(&store, &session.id, account_input("u1", "u1@example.com")).unwrap();
    engine.add_account(&store, &session.id, account_input("u2", "u2@example.com")).unwrap();
    let params = AuthorizeSessionParams {
        account_hint: Some("u1".to_string()),
        ..AuthorizeSessionParams::default()
    };
    let outcome = engine.evaluate_authorize(&store, Some(&session.id), &params).unwrap();
    assert!(matches!(outcome, PromptOutcome::Proceed { account } if account.user_id == UserId::new("u1")));

    let params = AuthorizeSessionParams {
        account_hint: Some("ghost".to_string()),
        ..AuthorizeSessionParams::default()
    };
    let outcome = engine.evaluate_authorize(&store, Some(&session.id), &params).unwrap();
    assert!(matches!(outcome, PromptOutcome::Proceed { account } if account.user_id == UserId::new("u1")));
}
