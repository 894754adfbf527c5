/// Security module for authentication and authorization
///
/// Provides core security primitives for identity-service:
/// - Password hashing and verification (Argon2id)
/// - JWT token generation and validation (RS256 via crypto-core)
/// - Token revocation (Redis-based blacklist)
///
/// ## Architecture
///
/// - **crypto-core::jwt**: Shared JWT implementation (RS256 only)
/// - **password**: Argon2id password hashing
/// - **token_revocation**: Real-time token blacklisting via Redis
// Re-export JWT functionality from shared crypto-core library
pub use crypto_core::jwt;
pub use crypto_core::jwt::{Claims, TokenIssuer, TokenKind, TokenPair};

pub mod password;
pub mod token_revocation;

pub use password::{hash_password, verify_password};
pub use token_revocation::{RedisRevocationStore, RevocationStore};
