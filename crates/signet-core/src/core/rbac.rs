// crates/signet-core/src/core/rbac.rs
// ============================================================================
// Module: RBAC Records
// Description: Roles, permissions, and assignment join records.
// Purpose: Define the role/permission model evaluated by the RBAC engine.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Roles are tenant-scoped; permissions are client-scoped. Role deletion
//! cascades to its join rows, which is implemented as explicit secondary
//! deletes in the engine because the storage contract is key-value. Expired
//! user-role assignments are ignored at read time and never eagerly pruned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ClientId;
use crate::core::identifiers::PermissionId;
use crate::core::identifiers::RoleId;
use crate::core::identifiers::TenantId;
use crate::core::identifiers::UserId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Role
// ============================================================================

/// Role grouping permissions within a tenant.
///
/// # Invariants
/// - `(name, tenant_id)` is unique.
/// - System roles cannot be deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier.
    pub id: RoleId,
    /// Role name, unique within the tenant.
    pub name: String,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether this is an undeletable system role.
    #[serde(default)]
    pub is_system_role: bool,
}

// ============================================================================
// SECTION: Permission
// ============================================================================

/// Permission scoped to one OAuth client.
///
/// # Invariants
/// - `(name, client_id)` is unique.
/// - `name` is the qualified form embedded into token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Permission identifier.
    pub id: PermissionId,
    /// Qualified permission name (for example `documents:read`).
    pub name: String,
    /// Owning client.
    pub client_id: ClientId,
    /// Resource component.
    pub resource: String,
    /// Action component.
    pub action: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ============================================================================
// SECTION: Join Records
// ============================================================================

/// Grant of a permission to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePermission {
    /// Granting role.
    pub role_id: RoleId,
    /// Granted permission.
    pub permission_id: PermissionId,
    /// Administrator who granted the permission.
    pub granted_by: UserId,
    /// Grant time.
    pub granted_at: Timestamp,
}

/// Assignment of a role to a user.
///
/// # Invariants
/// - `(user_id, role_id)` is unique per tenant.
/// - `expires_at`, when set, makes the assignment invisible to reads after
///   that instant without being deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    /// Assigned user.
    pub user_id: UserId,
    /// Assigned role.
    pub role_id: RoleId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Administrator who made the assignment.
    pub assigned_by: UserId,
    /// Assignment time.
    pub assigned_at: Timestamp,
    /// Optional expiry evaluated at read time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl UserRole {
    /// Returns true when the assignment is live at `now`.
    #[must_use]
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.expires_at.is_none_or(|expiry| now.is_before(expiry))
    }
}
