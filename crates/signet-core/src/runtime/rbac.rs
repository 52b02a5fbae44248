// crates/signet-core/src/runtime/rbac.rs
// ============================================================================
// Module: RBAC Engine
// Description: Role/permission evaluation, assignments, and token enrichment.
// Purpose: Resolve authorization decisions with caching and tenant isolation.
// Dependencies: crate::core, crate::store, crate::runtime::cache, tracing
// ============================================================================

//! ## Overview
//! Checks resolve all non-expired role assignments for the user, union the
//! role permissions, filter by client, and test membership. Snapshots are
//! cached per `(tenant, user, client)` for a short TTL; admin mutations
//! invalidate the affected user entries. Token enrichment returns role and
//! permission names bounded by `max_permissions_in_token`, warning when the
//! list is truncated. System roles cannot be deleted; role deletion cascades
//! to its join rows through explicit secondary deletes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::PermissionId;
use crate::core::identifiers::RoleId;
use crate::core::identifiers::UserId;
use crate::core::rbac::Permission;
use crate::core::rbac::Role;
use crate::core::rbac::RolePermission;
use crate::core::rbac::UserRole;
use crate::core::time::Timestamp;
use crate::crypto::secrets;
use crate::runtime::cache::CacheConfig;
use crate::runtime::cache::TtlLruCache;
use crate::store::KeyPath;
use crate::store::KeyValueStore;
use crate::store::StoreError;
use crate::store::TenantScopedStore;
use crate::store::read_json;
use crate::store::write_json;

// ============================================================================
// SECTION: Config
// ============================================================================

/// RBAC engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RbacConfig {
    /// Maximum permissions embedded into a token before truncation.
    pub max_permissions_in_token: usize,
    /// Snapshot cache time-to-live.
    pub cache_ttl: Duration,
    /// Snapshot cache capacity.
    pub cache_max_size: usize,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            max_permissions_in_token: 50,
            cache_ttl: Duration::from_secs(60),
            cache_max_size: 10_000,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// RBAC engine errors.
///
/// # Invariants
/// - Variants map 1:1 to the stable domain error codes.
#[derive(Debug, Error)]
pub enum RbacError {
    /// No role exists for the identifier or name.
    #[error("role not found: {0}")]
    RoleNotFound(String),
    /// No permission exists for the identifier or name.
    #[error("permission not found: {0}")]
    PermissionNotFound(String),
    /// Role name already exists within the tenant.
    #[error("role exists: {0}")]
    RoleExists(String),
    /// Permission name already exists within the client.
    #[error("permission exists: {0}")]
    PermissionExists(String),
    /// User already holds the role.
    #[error("role already assigned: {0}")]
    RoleAlreadyAssigned(String),
    /// System roles cannot be deleted.
    #[error("cannot delete system role: {0}")]
    CannotDeleteSystemRole(String),
    /// Input failed validation.
    #[error("invalid rbac input: {0}")]
    InvalidInput(String),
    /// Storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Enrichment
// ============================================================================

/// RBAC claims embedded into an access token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenEnrichment {
    /// Role names held by the user.
    pub roles: Vec<String>,
    /// Qualified permission names, bounded by the token budget.
    pub permissions: Vec<String>,
    /// True when the permission list was truncated to the budget.
    pub truncated: bool,
}

/// Cached per-user, per-client permission snapshot.
#[derive(Debug, Clone, Default)]
struct RbacSnapshot {
    /// Role names.
    roles: Vec<String>,
    /// Full permission name set for the client.
    permissions: BTreeSet<String>,
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// RBAC engine operating on tenant-scoped storage handles.
///
/// # Invariants
/// - Every read is tenant-scoped; cache keys embed the tenant id.
/// - Mutations invalidate the affected users' cache entries before returning.
pub struct RbacEngine {
    /// Engine tuning.
    config: RbacConfig,
    /// Snapshot cache keyed `rbac:<tenant>:<user>:<client>`.
    cache: TtlLruCache<RbacSnapshot>,
}

impl RbacEngine {
    /// Creates an engine with the given tuning.
    #[must_use]
    pub fn new(config: RbacConfig) -> Self {
        Self {
            config,
            cache: TtlLruCache::new(CacheConfig {
                ttl: config.cache_ttl,
                max_size: config.cache_max_size,
            }),
        }
    }

    /// Returns the engine tuning.
    #[must_use]
    pub const fn config(&self) -> &RbacConfig {
        &self.config
    }

    /// Returns the storage key for a role record.
    fn role_key(id: &RoleId) -> KeyPath {
        KeyPath::from_segments(&["rbac", "roles", id.as_str()])
    }

    /// Returns the storage key for the role name index.
    fn role_name_key(name: &str) -> KeyPath {
        KeyPath::from_segments(&["rbac", "role_names", name])
    }

    /// Returns the storage key for a permission record.
    fn permission_key(id: &PermissionId) -> KeyPath {
        KeyPath::from_segments(&["rbac", "perms", id.as_str()])
    }

    /// Returns the storage key for the permission name index.
    fn permission_name_key(client_id: &ClientId, name: &str) -> KeyPath {
        KeyPath::from_segments(&["rbac", "perm_names", client_id.as_str(), name])
    }

    /// Returns the storage key for a role-permission grant.
    fn role_permission_key(role_id: &RoleId, permission_id: &PermissionId) -> KeyPath {
        KeyPath::from_segments(&["rbac", "role_perms", role_id.as_str(), permission_id.as_str()])
    }

    /// Returns the storage key for a user-role assignment.
    fn user_role_key(user_id: &UserId, role_id: &RoleId) -> KeyPath {
        KeyPath::from_segments(&["rbac", "user_roles", user_id.as_str(), role_id.as_str()])
    }

    /// Returns the storage key for the role-to-users index.
    fn role_user_key(role_id: &RoleId, user_id: &UserId) -> KeyPath {
        KeyPath::from_segments(&["rbac", "role_users", role_id.as_str(), user_id.as_str()])
    }

    /// Returns the snapshot cache key.
    fn cache_key(store: &TenantScopedStore, user_id: &UserId, client_id: &ClientId) -> String {
        format!("rbac:{}:{}:{}", store.tenant_id(), user_id, client_id)
    }

    /// Returns the cache prefix covering every client of one user.
    fn user_cache_prefix(store: &TenantScopedStore, user_id: &UserId) -> String {
        format!("rbac:{}:{}:", store.tenant_id(), user_id)
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Creates a role.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::RoleExists`] when the name is taken.
    pub fn create_role(
        &self,
        store: &TenantScopedStore,
        name: &str,
        description: Option<String>,
        is_system_role: bool,
    ) -> Result<Role, RbacError> {
        if name.is_empty() {
            return Err(RbacError::InvalidInput("role name must not be empty".to_string()));
        }
        let name_key = Self::role_name_key(name);
        if read_json::<RoleId>(store, &name_key)?.is_some() {
            return Err(RbacError::RoleExists(name.to_string()));
        }
        let role = Role {
            id: RoleId::new(secrets::generate_id("rol")),
            name: name.to_string(),
            tenant_id: store.tenant_id().clone(),
            description,
            is_system_role,
        };
        write_json(store, &Self::role_key(&role.id), &role, None)?;
        write_json(store, &name_key, &role.id, None)?;
        Ok(role)
    }

    /// Returns a role by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::RoleNotFound`] when absent.
    pub fn get_role(&self, store: &TenantScopedStore, id: &RoleId) -> Result<Role, RbacError> {
        read_json::<Role>(store, &Self::role_key(id))?
            .ok_or_else(|| RbacError::RoleNotFound(id.to_string()))
    }

    /// Lists all roles of the tenant ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Store`] when the scan fails.
    pub fn list_roles(&self, store: &TenantScopedStore) -> Result<Vec<Role>, RbacError> {
        let prefix = KeyPath::from_segments(&["rbac", "roles"]);
        let mut roles: Vec<Role> = store
            .scan(&prefix)?
            .into_iter()
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    /// Deletes a role, cascading to its assignments and grants.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::CannotDeleteSystemRole`] for system roles.
    pub fn delete_role(&self, store: &TenantScopedStore, id: &RoleId) -> Result<(), RbacError> {
        let role = self.get_role(store, id)?;
        if role.is_system_role {
            return Err(RbacError::CannotDeleteSystemRole(role.name));
        }
        let grants_prefix = KeyPath::from_segments(&["rbac", "role_perms", id.as_str()]);
        for (key, _) in store.scan(&grants_prefix)? {
            store.remove(&key)?;
        }
        let users_prefix = KeyPath::from_segments(&["rbac", "role_users", id.as_str()]);
        for (key, _) in store.scan(&users_prefix)? {
            if let Some(user) = key.segments().last() {
                let user_id = UserId::new(user.clone());
                store.remove(&Self::user_role_key(&user_id, id))?;
                self.cache.invalidate_prefix(&Self::user_cache_prefix(store, &user_id));
            }
            store.remove(&key)?;
        }
        store.remove(&Self::role_name_key(&role.name))?;
        store.remove(&Self::role_key(id))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Permissions
    // ------------------------------------------------------------------

    /// Creates a permission for a client.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::PermissionExists`] when the name is taken for the
    /// client.
    pub fn create_permission(
        &self,
        store: &TenantScopedStore,
        client_id: &ClientId,
        name: &str,
        resource: &str,
        action: &str,
        description: Option<String>,
    ) -> Result<Permission, RbacError> {
        if name.is_empty() || resource.is_empty() || action.is_empty() {
            return Err(RbacError::InvalidInput(
                "permission name, resource, and action are required".to_string(),
            ));
        }
        let name_key = Self::permission_name_key(client_id, name);
        if read_json::<PermissionId>(store, &name_key)?.is_some() {
            return Err(RbacError::PermissionExists(name.to_string()));
        }
        let permission = Permission {
            id: PermissionId::new(secrets::generate_id("prm")),
            name: name.to_string(),
            client_id: client_id.clone(),
            resource: resource.to_string(),
            action: action.to_string(),
            description,
        };
        write_json(store, &Self::permission_key(&permission.id), &permission, None)?;
        write_json(store, &name_key, &permission.id, None)?;
        Ok(permission)
    }

    /// Returns a permission by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::PermissionNotFound`] when absent.
    pub fn get_permission(
        &self,
        store: &TenantScopedStore,
        id: &PermissionId,
    ) -> Result<Permission, RbacError> {
        read_json::<Permission>(store, &Self::permission_key(id))?
            .ok_or_else(|| RbacError::PermissionNotFound(id.to_string()))
    }

    /// Lists permissions, optionally filtered by client.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Store`] when the scan fails.
    pub fn list_permissions(
        &self,
        store: &TenantScopedStore,
        client_id: Option<&ClientId>,
    ) -> Result<Vec<Permission>, RbacError> {
        let prefix = KeyPath::from_segments(&["rbac", "perms"]);
        let mut permissions: Vec<Permission> = store
            .scan(&prefix)?
            .into_iter()
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .filter(|permission: &Permission| {
                client_id.is_none_or(|wanted| &permission.client_id == wanted)
            })
            .collect();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    /// Deletes a permission, cascading to role grants.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::PermissionNotFound`] when absent.
    pub fn delete_permission(
        &self,
        store: &TenantScopedStore,
        id: &PermissionId,
    ) -> Result<(), RbacError> {
        let permission = self.get_permission(store, id)?;
        let grants_prefix = KeyPath::from_segments(&["rbac", "role_perms"]);
        for (key, bytes) in store.scan(&grants_prefix)? {
            if let Ok(grant) = serde_json::from_slice::<RolePermission>(&bytes)
                && grant.permission_id == *id
            {
                store.remove(&key)?;
                self.invalidate_role_users(store, &grant.role_id)?;
            }
        }
        store.remove(&Self::permission_name_key(&permission.client_id, &permission.name))?;
        store.remove(&Self::permission_key(id))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Grants + Assignments
    // ------------------------------------------------------------------

    /// Grants a permission to a role.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::RoleNotFound`] or
    /// [`RbacError::PermissionNotFound`] when either side is absent.
    pub fn grant_permission(
        &self,
        store: &TenantScopedStore,
        role_id: &RoleId,
        permission_id: &PermissionId,
        granted_by: &UserId,
    ) -> Result<RolePermission, RbacError> {
        self.get_role(store, role_id)?;
        self.get_permission(store, permission_id)?;
        let grant = RolePermission {
            role_id: role_id.clone(),
            permission_id: permission_id.clone(),
            granted_by: granted_by.clone(),
            granted_at: Timestamp::now(),
        };
        write_json(store, &Self::role_permission_key(role_id, permission_id), &grant, None)?;
        self.invalidate_role_users(store, role_id)?;
        Ok(grant)
    }

    /// Revokes a permission from a role.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::PermissionNotFound`] when the grant is absent.
    pub fn revoke_permission(
        &self,
        store: &TenantScopedStore,
        role_id: &RoleId,
        permission_id: &PermissionId,
    ) -> Result<(), RbacError> {
        let key = Self::role_permission_key(role_id, permission_id);
        if store.remove(&key)?.is_none() {
            return Err(RbacError::PermissionNotFound(permission_id.to_string()));
        }
        self.invalidate_role_users(store, role_id)?;
        Ok(())
    }

    /// Assigns a role to a user.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::RoleAlreadyAssigned`] for duplicates, including
    /// assignments that have expired but were never pruned.
    pub fn assign_role(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
        role_id: &RoleId,
        assigned_by: &UserId,
        expires_at: Option<Timestamp>,
    ) -> Result<UserRole, RbacError> {
        self.get_role(store, role_id)?;
        let key = Self::user_role_key(user_id, role_id);
        if read_json::<UserRole>(store, &key)?.is_some() {
            return Err(RbacError::RoleAlreadyAssigned(role_id.to_string()));
        }
        let assignment = UserRole {
            user_id: user_id.clone(),
            role_id: role_id.clone(),
            tenant_id: store.tenant_id().clone(),
            assigned_by: assigned_by.clone(),
            assigned_at: Timestamp::now(),
            expires_at,
        };
        write_json(store, &key, &assignment, None)?;
        write_json(store, &Self::role_user_key(role_id, user_id), &true, None)?;
        self.cache.invalidate_prefix(&Self::user_cache_prefix(store, user_id));
        Ok(assignment)
    }

    /// Revokes a role from a user.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::RoleNotFound`] when no assignment exists.
    pub fn revoke_role(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
        role_id: &RoleId,
    ) -> Result<(), RbacError> {
        if store.remove(&Self::user_role_key(user_id, role_id))?.is_none() {
            return Err(RbacError::RoleNotFound(role_id.to_string()));
        }
        store.remove(&Self::role_user_key(role_id, user_id))?;
        self.cache.invalidate_prefix(&Self::user_cache_prefix(store, user_id));
        Ok(())
    }

    /// Lists the live (non-expired) role assignments of a user.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Store`] when the scan fails.
    pub fn list_user_roles(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
    ) -> Result<Vec<UserRole>, RbacError> {
        let prefix = KeyPath::from_segments(&["rbac", "user_roles", user_id.as_str()]);
        let now = Timestamp::now();
        Ok(store
            .scan(&prefix)?
            .into_iter()
            .filter_map(|(_, bytes)| serde_json::from_slice::<UserRole>(&bytes).ok())
            .filter(|assignment| assignment.is_live(now))
            .collect())
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Checks one permission for a user against a client.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Store`] when resolution fails.
    pub fn check(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
        client_id: &ClientId,
        permission: &str,
    ) -> Result<bool, RbacError> {
        let snapshot = self.snapshot(store, user_id, client_id)?;
        Ok(snapshot.permissions.contains(permission))
    }

    /// Checks several permissions in one resolution pass.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Store`] when resolution fails.
    pub fn check_batch(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
        client_id: &ClientId,
        permissions: &[String],
    ) -> Result<BTreeMap<String, bool>, RbacError> {
        let snapshot = self.snapshot(store, user_id, client_id)?;
        Ok(permissions
            .iter()
            .map(|permission| (permission.clone(), snapshot.permissions.contains(permission)))
            .collect())
    }

    /// Returns RBAC claims for token embedding, bounded by the token budget.
    ///
    /// # Errors
    ///
    /// Returns [`RbacError::Store`] when resolution fails.
    pub fn enrich(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
        client_id: &ClientId,
    ) -> Result<TokenEnrichment, RbacError> {
        let snapshot = self.snapshot(store, user_id, client_id)?;
        let budget = self.config.max_permissions_in_token;
        let truncated = snapshot.permissions.len() > budget;
        if truncated {
            tracing::warn!(
                user = %user_id,
                client = %client_id,
                total = snapshot.permissions.len(),
                budget,
                "permission claims truncated to token budget"
            );
        }
        Ok(TokenEnrichment {
            roles: snapshot.roles.clone(),
            permissions: snapshot.permissions.iter().take(budget).cloned().collect(),
            truncated,
        })
    }

    /// Resolves (or serves from cache) the permission snapshot.
    fn snapshot(
        &self,
        store: &TenantScopedStore,
        user_id: &UserId,
        client_id: &ClientId,
    ) -> Result<RbacSnapshot, RbacError> {
        let cache_key = Self::cache_key(store, user_id, client_id);
        if let Some(snapshot) = self.cache.get(&cache_key) {
            return Ok(snapshot);
        }
        let assignments = self.list_user_roles(store, user_id)?;
        let mut roles = Vec::with_capacity(assignments.len());
        let mut permissions = BTreeSet::new();
        for assignment in &assignments {
            let Ok(role) = self.get_role(store, &assignment.role_id) else {
                continue;
            };
            roles.push(role.name);
            let grants_prefix =
                KeyPath::from_segments(&["rbac", "role_perms", assignment.role_id.as_str()]);
            for (_, bytes) in store.scan(&grants_prefix)? {
                let Ok(grant) = serde_json::from_slice::<RolePermission>(&bytes) else {
                    continue;
                };
                let Ok(permission) = self.get_permission(store, &grant.permission_id) else {
                    continue;
                };
                if &permission.client_id == client_id {
                    permissions.insert(permission.name);
                }
            }
        }
        roles.sort();
        roles.dedup();
        let snapshot = RbacSnapshot { roles, permissions };
        self.cache.insert(cache_key, snapshot.clone());
        Ok(snapshot)
    }

    /// Invalidates cache entries for every user holding `role_id`.
    fn invalidate_role_users(
        &self,
        store: &TenantScopedStore,
        role_id: &RoleId,
    ) -> Result<(), RbacError> {
        let prefix = KeyPath::from_segments(&["rbac", "role_users", role_id.as_str()]);
        for (key, _) in store.scan(&prefix)? {
            if let Some(user) = key.segments().last() {
                let user_id = UserId::new(user.clone());
                self.cache.invalidate_prefix(&Self::user_cache_prefix(store, &user_id));
            }
        }
        Ok(())
    }
}
