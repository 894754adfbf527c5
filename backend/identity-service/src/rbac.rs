//! Role-based access control contract.
//!
//! Users hold roles, roles grant named permissions. Both are opaque strings;
//! there is no closed set. Adapters live in [`crate::db::roles`] (PostgreSQL)
//! and [`crate::memory`].

use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Permission required to assign roles on behalf of another user
pub const PERM_ROLES_ASSIGN: &str = "roles:assign";
/// Permission required to read another user's permissions
pub const PERM_ROLES_VIEW: &str = "roles:view";

#[async_trait]
pub trait PermissionResolver: Send + Sync {
    /// Give `role` to the user. Assigning a role the user already holds is a no-op.
    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<()>;

    /// Roles currently held by the user.
    async fn list_roles(&self, user_id: Uuid) -> Result<Vec<String>>;

    /// Union of the permissions granted by every role the user holds, without duplicates.
    async fn resolve_permissions(&self, user_id: Uuid) -> Result<Vec<String>>;

    /// Existence check that does not materialize the full permission list.
    async fn has_permission(&self, user_id: Uuid, permission: &str) -> Result<bool>;

    /// Grant `permission` to `role`. Idempotent.
    async fn grant_permission(&self, role: &str, permission: &str) -> Result<()>;
}
