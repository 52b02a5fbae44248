// crates/signet-core/tests/tenant_isolation.rs
// ============================================================================
// Module: Tenant Registry + Isolation Tests
// Description: Tenant lifecycle, resolution order, and isolation tests.
// Purpose: Validate that no tenant can observe another tenant's state.
// ============================================================================

//! Unit tests for tenant lifecycle gating, request resolution order, scoped
//! storage isolation, and branding fallback caching.

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

use signet_core::Branding;
use signet_core::ClientMetadata;
use signet_core::ClientRegistry;
use signet_core::GrantType;
use signet_core::KeyPath;
use signet_core::KeyValueStore;
use signet_core::MemoryStore;
use signet_core::NewClient;
use signet_core::ResolutionRequest;
use signet_core::TenantError;
use signet_core::TenantId;
use signet_core::TenantRegistry;
use signet_core::TenantResolver;
use signet_core::TenantScopedStore;
use signet_core::TenantSettings;
use signet_core::TenantStatus;
use signet_core::runtime::tenants::NewTenant;
use signet_core::runtime::tenants::TenantUpdate;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn new_tenant(id: &str, domain: Option<&str>) -> NewTenant {
    NewTenant {
        id: TenantId::new(id),
        name: format!("Tenant {id}"),
        domain: domain.map(ToString::to_string),
        branding: Branding::default(),
        settings: TenantSettings::default(),
        status: TenantStatus::Active,
    }
}

fn setup() -> (Arc<MemoryStore>, Arc<TenantRegistry>, TenantResolver) {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(TenantRegistry::new(
        Arc::clone(&store) as Arc<dyn KeyValueStore>
    ));
    let resolver = TenantResolver::new(
        Arc::clone(&registry),
        Arc::clone(&store) as Arc<dyn KeyValueStore>,
        Some("base.com".to_string()),
    );
    (store, registry, resolver)
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Duplicate ids and duplicate domains are rejected.
#[test]
fn tenant_creation_conflicts() {
    let (_, registry, _) = setup();
    registry.create(new_tenant("acme", Some("id.acme.com"))).unwrap();
    assert!(matches!(
        registry.create(new_tenant("acme", None)),
        Err(TenantError::Conflict(_))
    ));
    assert!(matches!(
        registry.create(new_tenant("beta", Some("id.acme.com"))),
        Err(TenantError::Conflict(_))
    ));
}

/// Soft delete flips the status and stamps the marker; deleted is terminal.
#[test]
fn soft_delete_is_terminal() {
    let (_, registry, _) = setup();
    let tenant = registry.create(new_tenant("acme", None)).unwrap();
    let deleted = registry.soft_delete(&tenant.id).unwrap();
    assert_eq!(deleted.status, TenantStatus::Deleted);
    assert!(deleted.deleted_at.is_some());
    assert!(matches!(
        registry.update(
            &tenant.id,
            TenantUpdate {
                status: Some(TenantStatus::Active),
                ..TenantUpdate::default()
            }
        ),
        Err(TenantError::InvalidTransition(_))
    ));
}

/// Suspended and deleted tenants fail resolution with their own codes.
#[test]
fn resolution_gates_status() {
    let (_, registry, resolver) = setup();
    registry.create(new_tenant("acme", None)).unwrap();
    registry
        .update(
            &TenantId::new("acme"),
            TenantUpdate {
                status: Some(TenantStatus::Suspended),
                ..TenantUpdate::default()
            },
        )
        .unwrap();
    let request = ResolutionRequest {
        tenant_header: Some("acme"),
        path: "/authorize",
        ..ResolutionRequest::default()
    };
    assert!(matches!(resolver.resolve(&request), Err(TenantError::TenantSuspended(_))));
}

// ============================================================================
// SECTION: Resolution Order
// ============================================================================

/// Custom domain beats subdomain, path, header, and query.
#[test]
fn resolution_prefers_custom_domain() {
    let (_, registry, resolver) = setup();
    registry.create(new_tenant("acme", Some("login.acme.com"))).unwrap();
    registry.create(new_tenant("beta", None)).unwrap();
    let request = ResolutionRequest {
        host: Some("login.acme.com:443"),
        path: "/tenants/beta/authorize",
        tenant_header: Some("beta"),
        tenant_query: Some("beta"),
    };
    let resolved = resolver.resolve(&request).unwrap();
    assert_eq!(resolved.tenant.id, TenantId::new("acme"));
}

/// Subdomains of the base domain resolve by slug.
#[test]
fn resolution_uses_subdomain() {
    let (_, registry, resolver) = setup();
    registry.create(new_tenant("acme", None)).unwrap();
    let request = ResolutionRequest {
        host: Some("acme.base.com"),
        path: "/authorize",
        ..ResolutionRequest::default()
    };
    assert_eq!(resolver.resolve(&request).unwrap().tenant.id, TenantId::new("acme"));
}

/// Path prefix, header, and query resolve in that order.
#[test]
fn resolution_order_path_header_query() {
    let (_, registry, resolver) = setup();
    registry.create(new_tenant("pathy", None)).unwrap();
    registry.create(new_tenant("heady", None)).unwrap();
    registry.create(new_tenant("query", None)).unwrap();

    let request = ResolutionRequest {
        path: "/tenants/pathy/authorize",
        tenant_header: Some("heady"),
        tenant_query: Some("query"),
        ..ResolutionRequest::default()
    };
    assert_eq!(resolver.resolve(&request).unwrap().tenant.id, TenantId::new("pathy"));

    let request = ResolutionRequest {
        path: "/authorize",
        tenant_header: Some("heady"),
        tenant_query: Some("query"),
        ..ResolutionRequest::default()
    };
    assert_eq!(resolver.resolve(&request).unwrap().tenant.id, TenantId::new("heady"));

    let request = ResolutionRequest {
        path: "/authorize",
        tenant_query: Some("query"),
        ..ResolutionRequest::default()
    };
    assert_eq!(resolver.resolve(&request).unwrap().tenant.id, TenantId::new("query"));
}

/// With no signal at all, the reserved default tenant is used.
#[test]
fn resolution_falls_back_to_default() {
    let (_, _, resolver) = setup();
    let request = ResolutionRequest {
        path: "/authorize",
        ..ResolutionRequest::default()
    };
    let resolved = resolver.resolve(&request).unwrap();
    assert!(resolved.tenant.id.is_default());
}

// ============================================================================
// SECTION: Isolation
// ============================================================================

/// No operation within tenant A can read, mutate, or list tenant B state.
#[test]
fn scoped_stores_are_isolated() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let a = TenantScopedStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>, TenantId::new("a"));
    let b = TenantScopedStore::new(Arc::clone(&store) as Arc<dyn KeyValueStore>, TenantId::new("b"));
    let key = KeyPath::from_segments(&["widgets", "w1"]);
    a.set(&key, b"alpha", None).unwrap();
    b.set(&key, b"beta", None).unwrap();
    assert_eq!(a.get(&key).unwrap(), Some(b"alpha".to_vec()));
    assert_eq!(b.get(&key).unwrap(), Some(b"beta".to_vec()));
    b.remove(&key).unwrap();
    assert_eq!(a.get(&key).unwrap(), Some(b"alpha".to_vec()));
    let scanned = a.scan(&KeyPath::from_segments(&["widgets"])).unwrap();
    assert_eq!(scanned.len(), 1);
}

/// Same-named clients in two tenants coexist and never cross lists.
#[test]
fn client_listing_is_tenant_isolated() {
    let registry = ClientRegistry::new(Arc::new(MemoryStore::new()));
    let input = NewClient {
        id: None,
        name: "X".to_string(),
        grant_types: vec![GrantType::AuthorizationCode],
        scopes: vec![],
        redirect_uris: vec!["https://app.example.com/cb".to_string()],
        metadata: ClientMetadata::default(),
        confidential: true,
    };
    let a = registry.create(&TenantId::new("A"), input.clone()).unwrap();
    let b = registry.create(&TenantId::new("B"), input).unwrap();
    let listed_a = registry.list(&TenantId::new("A")).unwrap();
    assert_eq!(listed_a.len(), 1);
    assert_eq!(listed_a[0].id, a.client.id);
    assert_ne!(a.client.id, b.client.id);
}

// ============================================================================
// SECTION: Branding
// ============================================================================

/// Branding resolves explicit -> default tenant -> built-in, with caching.
#[test]
fn branding_falls_back_through_default_tenant() {
    let (_, registry, _) = setup();
    let mut default_branding = Branding::default();
    default_branding.primary_color = Some("#123456".to_string());
    registry
        .create(NewTenant {
            id: TenantId::default_tenant(),
            name: "Default".to_string(),
            domain: None,
            branding: default_branding,
            settings: TenantSettings::default(),
            status: TenantStatus::Active,
        })
        .unwrap();
    let tenant = registry.create(new_tenant("acme", None)).unwrap();
    let branding = registry.branding_for(&tenant).unwrap();
    assert_eq!(branding.primary_color.as_deref(), Some("#123456"));
    // Built-in fills what neither tenant sets.
    assert!(branding.font_family.is_some());

    // Updating the default tenant invalidates the cache.
    registry
        .update(
            &TenantId::default_tenant(),
            TenantUpdate {
                branding: Some(Branding {
                    primary_color: Some("#654321".to_string()),
                    ..Branding::default()
                }),
                ..TenantUpdate::default()
            },
        )
        .unwrap();
    let branding = registry.branding_for(&tenant).unwrap();
    assert_eq!(branding.primary_color.as_deref(), Some("#654321"));
}
