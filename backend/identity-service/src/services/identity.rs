/// Identity orchestration: registration, login, profiles, passwords, RBAC, logout
use crate::db::UserRepository;
use crate::error::{IdentityError, Result};
use crate::metrics::IdentityMetrics;
use crate::models::{
    ChangePasswordRequest, NewUser, RegisterRequest, UpdateProfileRequest, User, UserProfile,
    UserStatus,
};
use crate::rbac::{PermissionResolver, PERM_ROLES_ASSIGN, PERM_ROLES_VIEW};
use crate::security::password::{hash_password, verify_password};
use crate::security::token_revocation::{remaining_ttl, RevocationStore};
use crate::validators::{normalize_email, parse_bearer};
use chrono::Utc;
use crypto_core::jwt::{Claims, TokenIssuer, TokenKind, TokenPair};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_ROLE: &str = "customer";
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a successful registration, login or refresh
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub tokens: TokenPair,
}

/// Identity service
///
/// Every transport (HTTP, gRPC) calls into this type. It holds no mutable
/// state of its own; all of it lives behind the store contracts.
#[derive(Clone)]
pub struct IdentityService {
    users: Arc<dyn UserRepository>,
    issuer: Arc<TokenIssuer>,
    roles: Option<Arc<dyn PermissionResolver>>,
    revocations: Option<Arc<dyn RevocationStore>>,
    metrics: Option<IdentityMetrics>,
    default_role: String,
    operation_timeout: Duration,
}

impl IdentityService {
    pub fn new(users: Arc<dyn UserRepository>, issuer: Arc<TokenIssuer>) -> Self {
        Self {
            users,
            issuer,
            roles: None,
            revocations: None,
            metrics: None,
            default_role: DEFAULT_ROLE.to_string(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_roles(mut self, roles: Arc<dyn PermissionResolver>) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn with_revocations(mut self, revocations: Arc<dyn RevocationStore>) -> Self {
        self.revocations = Some(revocations);
        self
    }

    pub fn with_metrics(mut self, metrics: IdentityMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_default_role(mut self, role: impl Into<String>) -> Self {
        self.default_role = role.into();
        self
    }

    /// Upper bound applied to each individual store call
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    // ------------------------------------------------------------------------
    // Registration & login
    // ------------------------------------------------------------------------

    /// Register a new user and issue their first token pair
    ///
    /// ## Workflow
    ///
    /// 1. Normalize email, validate email shape and password length
    /// 2. Hash password (Argon2id)
    /// 3. Insert user with `pending` status; the repository enforces email uniqueness
    /// 4. Issue access + refresh tokens
    /// 5. Assign the default role (best effort)
    ///
    /// A failed default role assignment is logged and counted but never fails
    /// the registration.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthenticatedUser> {
        let request = RegisterRequest {
            email: normalize_email(&request.email),
            first_name: clean_name(request.first_name),
            last_name: clean_name(request.last_name),
            ..request
        };
        request.validate()?;

        // Refuse before writing anything so no user is left without tokens
        if !self.issuer.can_sign() {
            return Err(IdentityError::SigningUnavailable);
        }

        let password_hash = hash_blocking(request.password).await?;

        let user = self
            .bounded(
                "create_user",
                self.users.create(NewUser {
                    email: request.email,
                    password_hash,
                    first_name: request.first_name,
                    last_name: request.last_name,
                    status: UserStatus::Pending,
                }),
            )
            .await?;

        let tokens = self.issue_tokens(&user)?;
        self.assign_default_role(user.id).await;

        info!(user_id = %user.id, "User registered");

        Ok(AuthenticatedUser {
            user_id: user.id,
            tokens,
        })
    }

    /// Authenticate with email and password
    ///
    /// ## Security
    ///
    /// - Unknown email and wrong password both return `InvalidCredentials`
    /// - An unknown email still pays for one hash so response time does not reveal it
    /// - `UserDisabled` is only reported after the password matched
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<AuthenticatedUser> {
        let email = normalize_email(email);

        let user = match self
            .bounded("find_user_by_email", self.users.find_by_email(&email))
            .await
        {
            Ok(user) => user,
            Err(IdentityError::UserNotFound) => {
                let _ = hash_blocking(password.to_string()).await;
                self.record_auth_failure("unknown_email");
                return Err(IdentityError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        match verify_blocking(password.to_string(), user.password_hash.clone()).await {
            Ok(true) => {}
            Ok(false) => {
                self.record_auth_failure("wrong_password");
                return Err(IdentityError::InvalidCredentials);
            }
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Stored password hash could not be verified");
                self.record_auth_failure("unverifiable_hash");
                return Err(IdentityError::InvalidCredentials);
            }
        }

        if user.is_disabled() {
            self.record_auth_failure("user_disabled");
            return Err(IdentityError::UserDisabled);
        }

        let tokens = self.issue_tokens(&user)?;
        info!(user_id = %user.id, "User authenticated");

        Ok(AuthenticatedUser {
            user_id: user.id,
            tokens,
        })
    }

    /// Exchange a refresh token for a fresh pair
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthenticatedUser> {
        self.ensure_not_revoked(refresh_token).await?;
        let claims = self
            .issuer
            .validate_kind(refresh_token, TokenKind::Refresh)?;
        let user_id = subject_uuid(&claims)?;

        let user = match self
            .bounded("find_user_by_id", self.users.find_by_id(user_id))
            .await
        {
            Ok(user) => user,
            Err(IdentityError::UserNotFound) => return Err(IdentityError::InvalidToken),
            Err(e) => return Err(e),
        };
        if user.is_disabled() {
            return Err(IdentityError::UserDisabled);
        }

        let tokens = self.issue_tokens(&user)?;
        debug!(user_id = %user.id, "Token pair refreshed");

        Ok(AuthenticatedUser {
            user_id: user.id,
            tokens,
        })
    }

    // ------------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------------

    pub async fn get_profile(&self, user_id: Uuid) -> Result<UserProfile> {
        let user = self
            .bounded("find_user_by_id", self.users.find_by_id(user_id))
            .await?;

        let roles = match &self.roles {
            Some(roles) => self.bounded("list_roles", roles.list_roles(user_id)).await?,
            None => Vec::new(),
        };

        Ok(UserProfile::from_user(user, roles))
    }

    /// Replace first and last name; blank values clear the field
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        request: UpdateProfileRequest,
    ) -> Result<UserProfile> {
        request.validate()?;

        let mut user = self
            .bounded("find_user_by_id", self.users.find_by_id(user_id))
            .await?;
        user.first_name = clean_name(request.first_name);
        user.last_name = clean_name(request.last_name);

        self.bounded("update_user", self.users.update(&user))
            .await?;

        self.get_profile(user_id).await
    }

    /// Replace the stored password after checking the current one
    ///
    /// Tokens issued before the change stay valid until they expire or are
    /// logged out.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: ChangePasswordRequest,
    ) -> Result<()> {
        request.validate()?;

        let mut user = self
            .bounded("find_user_by_id", self.users.find_by_id(user_id))
            .await?;

        match verify_blocking(request.current_password, user.password_hash.clone()).await {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                self.record_auth_failure("wrong_password");
                return Err(IdentityError::InvalidCredentials);
            }
        }

        user.password_hash = hash_blocking(request.new_password).await?;
        self.bounded("update_user", self.users.update(&user))
            .await?;

        info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Roles & permissions
    // ------------------------------------------------------------------------

    pub async fn assign_role(&self, user_id: Uuid, role: &str) -> Result<()> {
        let roles = self.roles()?;
        let role = non_blank(role, "role")?;
        self.bounded("assign_role", roles.assign_role(user_id, role))
            .await?;
        info!(user_id = %user_id, role = %role, "Role assigned");
        Ok(())
    }

    pub async fn permissions(&self, user_id: Uuid) -> Result<Vec<String>> {
        let roles = self.roles()?;
        self.bounded("resolve_permissions", roles.resolve_permissions(user_id))
            .await
    }

    pub async fn has_permission(&self, user_id: Uuid, permission: &str) -> Result<bool> {
        let roles = self.roles()?;
        self.bounded("has_permission", roles.has_permission(user_id, permission))
            .await
    }

    pub async fn grant_permission(&self, role: &str, permission: &str) -> Result<()> {
        let roles = self.roles()?;
        let role = non_blank(role, "role")?;
        let permission = non_blank(permission, "permission")?;
        self.bounded("grant_permission", roles.grant_permission(role, permission))
            .await?;
        info!(role = %role, permission = %permission, "Permission granted");
        Ok(())
    }

    /// Assign a role on behalf of `actor`, who must hold `roles:assign`
    pub async fn assign_role_as(&self, actor: Uuid, target: Uuid, role: &str) -> Result<()> {
        self.require_permission(actor, PERM_ROLES_ASSIGN).await?;
        self.assign_role(target, role).await
    }

    /// Read `target`'s permissions on behalf of `actor`, who must hold `roles:view`
    pub async fn permissions_as(&self, actor: Uuid, target: Uuid) -> Result<Vec<String>> {
        self.require_permission(actor, PERM_ROLES_VIEW).await?;
        self.permissions(target).await
    }

    async fn require_permission(&self, actor: Uuid, permission: &str) -> Result<()> {
        if self.has_permission(actor, permission).await? {
            Ok(())
        } else {
            warn!(actor = %actor, permission = %permission, "Permission denied");
            Err(IdentityError::PermissionDenied(permission.to_string()))
        }
    }

    // ------------------------------------------------------------------------
    // Tokens
    // ------------------------------------------------------------------------

    /// Revoke `token` until it would have expired on its own
    pub async fn logout(&self, token: &str) -> Result<()> {
        let revocations = self
            .revocations
            .as_ref()
            .ok_or(IdentityError::RevocationUnavailable)?;

        let claims = self.issuer.validate(token)?;
        let ttl = remaining_ttl(claims.exp, Utc::now().timestamp());

        self.bounded("revoke_token", revocations.revoke(token, ttl))
            .await?;

        if let Some(metrics) = &self.metrics {
            metrics.tokens_revoked.inc();
        }
        info!(user_id = %claims.sub, ttl_secs = ttl.as_secs(), "Token revoked");
        Ok(())
    }

    /// Check revocation, then validate as an access token
    pub async fn verify_access_token(&self, token: &str) -> Result<Claims> {
        self.ensure_not_revoked(token).await?;
        Ok(self.issuer.validate_kind(token, TokenKind::Access)?)
    }

    /// Subject of a validated token
    pub fn subject_from_token(&self, token: &str) -> Result<String> {
        Ok(self.issuer.subject_from_token(token)?)
    }

    /// Extract the token from an `Authorization: Bearer ...` header value
    pub fn bearer_token(header: Option<&str>) -> Result<&str> {
        header.and_then(parse_bearer).ok_or(IdentityError::InvalidToken)
    }

    async fn ensure_not_revoked(&self, token: &str) -> Result<()> {
        if let Some(revocations) = &self.revocations {
            if self
                .bounded("is_token_revoked", revocations.is_revoked(token))
                .await?
            {
                return Err(IdentityError::TokenRevoked);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn issue_tokens(&self, user: &User) -> Result<TokenPair> {
        Ok(self
            .issuer
            .generate_token_pair(&user.id.to_string(), &user.email)?)
    }

    fn roles(&self) -> Result<&Arc<dyn PermissionResolver>> {
        self.roles.as_ref().ok_or(IdentityError::RbacUnavailable)
    }

    async fn assign_default_role(&self, user_id: Uuid) {
        let Some(roles) = &self.roles else {
            debug!(user_id = %user_id, "No role store configured, skipping default role");
            return;
        };

        if let Err(e) = self
            .bounded(
                "assign_default_role",
                roles.assign_role(user_id, &self.default_role),
            )
            .await
        {
            warn!(
                user_id = %user_id,
                role = %self.default_role,
                error = %e,
                "Default role assignment failed; registration continues"
            );
            if let Some(metrics) = &self.metrics {
                metrics.default_role_failures.inc();
            }
        }
    }

    fn record_auth_failure(&self, reason: &str) {
        debug!(reason = reason, "Authentication failed");
        if let Some(metrics) = &self.metrics {
            metrics.record_auth_failure(reason);
        }
    }

    /// Run one store call under the operation timeout
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = op, "Store call timed out");
                Err(IdentityError::Timeout(op))
            }
        }
    }
}

async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| IdentityError::Internal(format!("Password hashing task failed: {}", e)))?
}

async fn verify_blocking(password: String, encoded: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &encoded))
        .await
        .map_err(|e| IdentityError::Internal(format!("Password verification task failed: {}", e)))?
}

fn subject_uuid(claims: &Claims) -> Result<Uuid> {
    if claims.sub.is_empty() {
        return Err(IdentityError::MissingSubject);
    }
    Uuid::parse_str(&claims.sub).map_err(|_| IdentityError::InvalidToken)
}

fn clean_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

fn non_blank<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(IdentityError::Validation(format!("{} must not be empty", field)))
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name(Some("  Ada ".into())), Some("Ada".to_string()));
        assert_eq!(clean_name(Some("   ".into())), None);
        assert_eq!(clean_name(None), None);
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(" admin ", "role").unwrap(), "admin");
        assert!(matches!(
            non_blank(" ", "role"),
            Err(IdentityError::Validation(_))
        ));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(
            IdentityService::bearer_token(Some("Bearer abc.def.ghi")).unwrap(),
            "abc.def.ghi"
        );
        assert!(matches!(
            IdentityService::bearer_token(None),
            Err(IdentityError::InvalidToken)
        ));
        assert!(matches!(
            IdentityService::bearer_token(Some("Token abc")),
            Err(IdentityError::InvalidToken)
        ));
    }
}
