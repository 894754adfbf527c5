//! In-memory adapters for every store contract.
//!
//! Used by tests and by local runs without PostgreSQL or Redis. Each adapter
//! gives the same guarantees as its production counterpart: email uniqueness
//! is atomic, role assignment is idempotent, revocations expire.

use crate::error::{IdentityError, Result};
use crate::models::{NewUser, User};
use crate::rbac::PermissionResolver;
use crate::security::token_revocation::{floor_ttl, RevocationStore};
use crate::db::UserRepository;
use async_trait::async_trait;
use chrono::Utc;
use crypto_core::hash::fingerprint;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: DashMap<Uuid, User>,
    emails: DashMap<String, Uuid>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, new_user: NewUser) -> Result<User> {
        match self.emails.entry(new_user.email.clone()) {
            Entry::Occupied(_) => Err(IdentityError::EmailAlreadyExists),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let user = User {
                    id: Uuid::new_v4(),
                    email: new_user.email,
                    password_hash: new_user.password_hash,
                    phone: None,
                    first_name: new_user.first_name,
                    last_name: new_user.last_name,
                    status: new_user.status,
                    email_verified_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.users.insert(user.id, user.clone());
                slot.insert(user.id);
                Ok(user)
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> Result<User> {
        let id = *self.emails.get(email).ok_or(IdentityError::UserNotFound)?;
        self.find_by_id(id).await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<User> {
        self.users
            .get(&user_id)
            .map(|user| user.clone())
            .ok_or(IdentityError::UserNotFound)
    }

    async fn update(&self, user: &User) -> Result<()> {
        let mut stored = self
            .users
            .get_mut(&user.id)
            .ok_or(IdentityError::UserNotFound)?;
        stored.phone = user.phone.clone();
        stored.first_name = user.first_name.clone();
        stored.last_name = user.last_name.clone();
        stored.status = user.status;
        stored.email_verified_at = user.email_verified_at;
        stored.password_hash = user.password_hash.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPermissionResolver {
    user_roles: DashMap<Uuid, BTreeSet<String>>,
    role_permissions: DashMap<String, BTreeSet<String>>,
}

impl InMemoryPermissionResolver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionResolver for InMemoryPermissionResolver {
    async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<()> {
        self.user_roles
            .entry(user_id)
            .or_default()
            .insert(role.to_string());
        Ok(())
    }

    async fn list_roles(&self, user_id: Uuid) -> Result<Vec<String>> {
        Ok(self
            .user_roles
            .get(&user_id)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn resolve_permissions(&self, user_id: Uuid) -> Result<Vec<String>> {
        let roles = self.list_roles(user_id).await?;
        let mut permissions = BTreeSet::new();
        for role in roles {
            if let Some(granted) = self.role_permissions.get(&role) {
                permissions.extend(granted.iter().cloned());
            }
        }
        Ok(permissions.into_iter().collect())
    }

    async fn has_permission(&self, user_id: Uuid, permission: &str) -> Result<bool> {
        let Some(roles) = self.user_roles.get(&user_id) else {
            return Ok(false);
        };
        Ok(roles.iter().any(|role| {
            self.role_permissions
                .get(role)
                .is_some_and(|granted| granted.contains(permission))
        }))
    }

    async fn grant_permission(&self, role: &str, permission: &str) -> Result<()> {
        self.role_permissions
            .entry(role.to_string())
            .or_default()
            .insert(permission.to_string());
        Ok(())
    }
}

/// Revocation entries keyed by token fingerprint with a monotonic deadline
#[derive(Debug, Default)]
pub struct InMemoryRevocationStore {
    entries: DashMap<String, Instant>,
}

impl InMemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left on the entry for `token`, if it is still live
    pub fn remaining(&self, token: &str) -> Option<Duration> {
        let deadline = *self.entries.get(&fingerprint(token))?;
        deadline.checked_duration_since(Instant::now())
    }
}

#[async_trait]
impl RevocationStore for InMemoryRevocationStore {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<()> {
        let deadline = Instant::now() + floor_ttl(ttl);
        self.entries.insert(fingerprint(token), deadline);
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        let key = fingerprint(token);
        let live = match self.entries.get(&key) {
            Some(deadline) => *deadline > Instant::now(),
            None => return Ok(false),
        };
        if !live {
            self.entries.remove_if(&key, |_, deadline| *deadline <= Instant::now());
        }
        Ok(live)
    }
}
