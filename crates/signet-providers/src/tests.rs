// crates/signet-providers/src/tests.rs
// ============================================================================
// Module: Provider Unit Tests
// Description: Catalog, registry, password, and code provider tests.
// Purpose: Validate secret sealing, caching, and local flow semantics.
// ============================================================================

//! Unit tests for the provider crate: endpoint interpolation, registry CRUD
//! with sealed secrets and masking, and the local password and one-time-code
//! flows with attempt limits.

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

use std::collections::BTreeMap;
use std::sync::Arc;

use signet_core::AeadKey;
use signet_core::MemoryStore;
use signet_core::ProviderKind;
use signet_core::ProviderName;
use signet_core::TenantId;
use signet_core::TenantScopedStore;
use signet_core::store::KeyValueStore;

use crate::CodeProvider;
use crate::DynamicProviderRegistry;
use crate::InterpolationVars;
use crate::MinimumLengthPolicy;
use crate::NewProvider;
use crate::PasswordProvider;
use crate::ProviderError;
use crate::ProviderUpdate;
use crate::catalog;
use crate::descriptor_for;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn scoped(tenant: &str) -> TenantScopedStore {
    TenantScopedStore::new(
        Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>,
        TenantId::new(tenant),
    )
}

fn google_input(name: &str) -> NewProvider {
    NewProvider {
        kind: ProviderKind::Google,
        name: ProviderName::new(name),
        display_name: "Google".to_string(),
        client_id: "google-client".to_string(),
        client_secret: Some("super-secret-value".to_string()),
        config: BTreeMap::new(),
        enabled: true,
        display_order: 0,
    }
}

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// The catalog covers every provider kind exactly once.
#[test]
fn catalog_covers_all_kinds() {
    let kinds: Vec<ProviderKind> = catalog().iter().map(|descriptor| descriptor.kind).collect();
    assert_eq!(kinds.len(), 8);
    assert!(kinds.contains(&ProviderKind::Password));
    assert!(kinds.contains(&ProviderKind::Oidc));
}

/// Placeholders interpolate from configuration values.
#[test]
fn endpoint_templates_interpolate() {
    let descriptor = descriptor_for(ProviderKind::Oidc);
    let vars = InterpolationVars {
        base_url: Some("https://sso.corp.example".to_string()),
        realm: Some("staff".to_string()),
        ..InterpolationVars::default()
    };
    let endpoint = vars.apply(descriptor.authorization_endpoint.unwrap());
    assert_eq!(
        endpoint,
        "https://sso.corp.example/realms/staff/protocol/openid-connect/auth"
    );
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Creation seals the secret; the stored record never holds plaintext.
#[test]
fn registry_seals_secrets_at_rest() {
    let store = scoped("acme");
    let registry = DynamicProviderRegistry::new(AeadKey::generate());
    let record = registry.create(&store, google_input("google")).unwrap();
    let sealed = record.secret.unwrap();
    assert!(!sealed.ciphertext.contains("super-secret-value"));
    assert!(!sealed.iv.is_empty());
}

/// Duplicate names per tenant are rejected; other tenants are unaffected.
#[test]
fn registry_name_uniqueness_per_tenant() {
    let registry = DynamicProviderRegistry::new(AeadKey::generate());
    let acme = scoped("acme");
    registry.create(&acme, google_input("google")).unwrap();
    assert!(matches!(
        registry.create(&acme, google_input("google")),
        Err(ProviderError::ProviderExists(_))
    ));
    let beta = scoped("beta");
    registry.create(&beta, google_input("google")).unwrap();
}

/// Secret-requiring kinds reject creation without a secret.
#[test]
fn registry_enforces_secret_requirement() {
    let store = scoped("acme");
    let registry = DynamicProviderRegistry::new(AeadKey::generate());
    let mut input = google_input("google");
    input.client_secret = None;
    assert!(matches!(
        registry.create(&store, input),
        Err(ProviderError::InvalidInput(_))
    ));
}

/// Masked secrets expose only the last four characters.
#[test]
fn registry_masks_secret() {
    let store = scoped("acme");
    let registry = DynamicProviderRegistry::new(AeadKey::generate());
    let record = registry.create(&store, google_input("google")).unwrap();
    let masked = registry.masked_secret(&store, &record).unwrap().unwrap();
    assert_eq!(masked, "****alue");
}

/// Materialization decrypts the secret and fills catalog defaults.
#[test]
fn registry_materializes_upstream_provider() {
    let store = scoped("acme");
    let registry = DynamicProviderRegistry::new(AeadKey::generate());
    registry.create(&store, google_input("google")).unwrap();
    let provider = registry
        .materialize(&store, &ProviderName::new("google"), &InterpolationVars::default())
        .unwrap();
    assert_eq!(provider.client_secret.as_deref(), Some("super-secret-value"));
    assert!(provider.pkce_required);
    assert!(provider.scopes.contains(&"openid".to_string()));
    let url = provider
        .authorize_url("https://issuer.example/google/callback", "state-1", Some("challenge"))
        .unwrap();
    assert!(url.as_str().starts_with("https://accounts.google.com/"));
    assert!(url.query_pairs().any(|(k, v)| k == "code_challenge" && v == "challenge"));
}

/// Updates reseal replaced secrets and invalidate the cache.
#[test]
fn registry_update_reseals_and_invalidates() {
    let store = scoped("acme");
    let registry = DynamicProviderRegistry::new(AeadKey::generate());
    let record = registry.create(&store, google_input("google")).unwrap();
    // Warm the cache.
    registry.get(&store, &record.name).unwrap();
    registry
        .update(
            &store,
            &record.name,
            ProviderUpdate {
                client_secret: Some(Some("rotated-secret-9999".to_string())),
                ..ProviderUpdate::default()
            },
        )
        .unwrap();
    let refreshed = registry.get(&store, &record.name).unwrap();
    let masked = registry.masked_secret(&store, &refreshed).unwrap().unwrap();
    assert_eq!(masked, "****9999");
}

/// Deleting an unknown provider yields `provider_not_found`.
#[test]
fn registry_delete_unknown_fails() {
    let store = scoped("acme");
    let registry = DynamicProviderRegistry::new(AeadKey::generate());
    assert!(matches!(
        registry.delete(&store, &ProviderName::new("ghost")),
        Err(ProviderError::ProviderNotFound(_))
    ));
}

// ============================================================================
// SECTION: Password Provider
// ============================================================================

/// Register, verify with the issued code, then log in.
#[test]
fn password_register_verify_login() {
    let store = scoped("acme");
    let provider =
        PasswordProvider::new(AeadKey::generate(), Box::new(MinimumLengthPolicy::default()));
    let code = provider
        .register(&store, "Alice@Example.com", "SecurePassword123!", "SecurePassword123!")
        .unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
    let email = provider.verify(&store, "alice@example.com", &code).unwrap();
    assert_eq!(email, "alice@example.com");
    provider.login(&store, "alice@example.com", "SecurePassword123!").unwrap();
    assert!(matches!(
        provider.login(&store, "alice@example.com", "wrong"),
        Err(ProviderError::AuthenticationFailed(_))
    ));
}

/// Mismatched repeats and short passwords are rejected before any state.
#[test]
fn password_register_validates_input() {
    let store = scoped("acme");
    let provider =
        PasswordProvider::new(AeadKey::generate(), Box::new(MinimumLengthPolicy::default()));
    assert!(matches!(
        provider.register(&store, "a@b.com", "SecurePassword123!", "different"),
        Err(ProviderError::InvalidInput(_))
    ));
    assert!(matches!(
        provider.register(&store, "a@b.com", "short", "short"),
        Err(ProviderError::InvalidInput(_))
    ));
}

/// Wrong verification codes burn attempts until exhaustion.
#[test]
fn password_verify_attempts_are_bounded() {
    let store = scoped("acme");
    let provider =
        PasswordProvider::new(AeadKey::generate(), Box::new(MinimumLengthPolicy::default()));
    provider
        .register(&store, "a@b.com", "SecurePassword123!", "SecurePassword123!")
        .unwrap();
    for _ in 0..5 {
        assert!(provider.verify(&store, "a@b.com", "000000").is_err());
    }
    // Attempts exhausted: even the right code cannot be tried any more.
    assert!(matches!(
        provider.verify(&store, "a@b.com", "000000"),
        Err(ProviderError::AuthenticationFailed(_))
    ));
}

// ============================================================================
// SECTION: Code Provider
// ============================================================================

/// Issued codes verify once and are consumed.
#[test]
fn code_provider_single_use() {
    let store = scoped("acme");
    let provider = CodeProvider::new(AeadKey::generate());
    let code = provider.issue(&store, "bob@example.com").unwrap();
    let email = provider.verify(&store, "bob@example.com", &code).unwrap();
    assert_eq!(email, "bob@example.com");
    assert!(matches!(
        provider.verify(&store, "bob@example.com", &code),
        Err(ProviderError::AuthenticationFailed(_))
    ));
}

/// Reissuing replaces the previous code.
#[test]
fn code_provider_reissue_replaces() {
    let store = scoped("acme");
    let provider = CodeProvider::new(AeadKey::generate());
    let first = provider.issue(&store, "bob@example.com").unwrap();
    let second = provider.issue(&store, "bob@example.com").unwrap();
    if first != second {
        assert!(provider.verify(&store, "bob@example.com", &first).is_err());
    }
    provider.verify(&store, "bob@example.com", &second).unwrap();
}
