/// JWT Token Revocation Management
///
/// Handles real-time token blacklisting for logout. Entries are keyed by the
/// SHA-256 fingerprint of the raw token and expire on their own once the token
/// would have expired anyway.
///
/// ## Architecture
///
/// - **RevocationStore**: two-method contract consumed by the identity service
/// - **RedisRevocationStore**: production adapter (`SET .. EX`, `EXISTS`)
/// - **memory::InMemoryRevocationStore**: adapter for tests and local runs
use crate::error::{IdentityError, Result};
use async_trait::async_trait;
use crypto_core::hash::fingerprint;
use redis_utils::{with_timeout, SharedConnectionManager, TimedOut};
use std::time::Duration;

const KEY_PREFIX: &str = "identity:revoked:token:";

/// Shortest lifetime ever given to a revocation entry
pub const MIN_REVOCATION_TTL: Duration = Duration::from_secs(1);

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Record `token` as revoked for roughly `ttl` (never less than one second).
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<()>;

    /// Whether `token` has a live revocation entry.
    async fn is_revoked(&self, token: &str) -> Result<bool>;
}

/// Remaining lifetime of a token expiring at `exp`, floored at [`MIN_REVOCATION_TTL`]
pub fn remaining_ttl(exp: i64, now: i64) -> Duration {
    let remaining = exp.saturating_sub(now);
    if remaining <= 0 {
        MIN_REVOCATION_TTL
    } else {
        floor_ttl(Duration::from_secs(remaining as u64))
    }
}

pub fn floor_ttl(ttl: Duration) -> Duration {
    ttl.max(MIN_REVOCATION_TTL)
}

/// Store key for a raw token
pub fn revocation_key(token: &str) -> String {
    format!("{}{}", KEY_PREFIX, fingerprint(token))
}

/// Redis-backed revocation store
#[derive(Clone)]
pub struct RedisRevocationStore {
    redis: SharedConnectionManager,
    command_timeout: Duration,
}

impl RedisRevocationStore {
    pub fn new(redis: SharedConnectionManager, command_timeout: Duration) -> Self {
        Self {
            redis,
            command_timeout,
        }
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<()> {
        let key = revocation_key(token);
        // EX takes whole seconds, round up
        let ttl_secs = floor_ttl(ttl).as_secs_f64().ceil() as u64;

        let mut redis_conn = self.redis.lock().await.clone();
        with_timeout("revoke", self.command_timeout, async {
            redis::cmd("SET")
                .arg(&key)
                .arg("1")
                .arg("EX")
                .arg(ttl_secs)
                .query_async::<_, ()>(&mut redis_conn)
                .await
        })
        .await
        .map_err(redis_failure("revoke"))?;

        tracing::info!(
            ttl_secs,
            "Token revoked, blacklist entry will expire automatically"
        );
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool> {
        let key = revocation_key(token);

        let mut redis_conn = self.redis.lock().await.clone();
        let exists: bool = with_timeout("is_revoked", self.command_timeout, async {
            redis::cmd("EXISTS")
                .arg(&key)
                .query_async(&mut redis_conn)
                .await
        })
        .await
        .map_err(redis_failure("is_revoked"))?;

        Ok(exists)
    }
}

fn redis_failure(op: &'static str) -> impl Fn(TimedOut<redis::RedisError>) -> IdentityError {
    move |err| match err {
        TimedOut::Failed(e) => IdentityError::from(e),
        TimedOut::Elapsed => IdentityError::Timeout(op),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_ttl() {
        assert_eq!(remaining_ttl(1_000, 900), Duration::from_secs(100));
        assert_eq!(remaining_ttl(1_000, 1_000), MIN_REVOCATION_TTL);
        assert_eq!(remaining_ttl(1_000, 5_000), MIN_REVOCATION_TTL);
        assert_eq!(remaining_ttl(i64::MIN, i64::MAX), MIN_REVOCATION_TTL);
    }

    #[test]
    fn test_floor_ttl() {
        assert_eq!(floor_ttl(Duration::ZERO), MIN_REVOCATION_TTL);
        assert_eq!(floor_ttl(Duration::from_millis(10)), MIN_REVOCATION_TTL);
        assert_eq!(floor_ttl(Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[test]
    fn test_key_never_contains_token() {
        let token = "eyJhbGciOiJSUzI1NiJ9.eyJzdWIiOiJ1In0.sig";
        let key = revocation_key(token);
        assert!(key.starts_with("identity:revoked:token:"));
        assert!(!key.contains(token));
        assert_eq!(key.len(), KEY_PREFIX.len() + 64);
    }
}
