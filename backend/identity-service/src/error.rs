use crypto_core::jwt::JwtError;
use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User disabled")]
    UserDisabled,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Unexpected token signing algorithm")]
    AlgorithmMismatch,

    #[error("Token has no subject")]
    MissingSubject,

    #[error("Token signing key not configured")]
    SigningUnavailable,

    #[error("Randomness source failed: {0}")]
    EntropyFailure(String),

    #[error("Malformed password hash: {0}")]
    PasswordFormat(String),

    #[error("Undecodable password hash: {0}")]
    PasswordDecode(String),

    #[error("Role store not configured")]
    RbacUnavailable,

    #[error("Revocation store not configured")]
    RevocationUnavailable,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Convert to gRPC Status for wire protocol
    pub fn to_status(&self) -> Status {
        match self {
            IdentityError::Validation(msg) => {
                Status::new(Code::InvalidArgument, format!("Validation error: {}", msg))
            }
            // Same message for every credential failure so callers cannot enumerate accounts
            IdentityError::InvalidCredentials => {
                Status::new(Code::Unauthenticated, "Invalid credentials")
            }
            IdentityError::UserDisabled => Status::new(Code::PermissionDenied, "User disabled"),
            IdentityError::UserNotFound => Status::new(Code::NotFound, "User not found"),
            IdentityError::EmailAlreadyExists => {
                Status::new(Code::AlreadyExists, "Email already exists")
            }
            IdentityError::InvalidToken
            | IdentityError::TokenRevoked
            | IdentityError::AlgorithmMismatch
            | IdentityError::MissingSubject => {
                Status::new(Code::Unauthenticated, "Invalid, expired, or revoked token")
            }
            IdentityError::PermissionDenied(_) => {
                Status::new(Code::PermissionDenied, "Permission denied")
            }
            IdentityError::RbacUnavailable
            | IdentityError::RevocationUnavailable
            | IdentityError::SigningUnavailable => {
                Status::new(Code::Unavailable, "Service dependency not configured")
            }
            IdentityError::Timeout(_) => Status::new(Code::DeadlineExceeded, "Request timed out"),
            IdentityError::EntropyFailure(_)
            | IdentityError::PasswordFormat(_)
            | IdentityError::PasswordDecode(_)
            | IdentityError::Database(_)
            | IdentityError::Redis(_)
            | IdentityError::Internal(_) => {
                // Don't leak internal details in production
                Status::new(Code::Internal, "Internal server error")
            }
        }
    }
}

impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        IdentityError::Database(err.to_string())
    }
}

impl From<redis::RedisError> for IdentityError {
    fn from(err: redis::RedisError) -> Self {
        tracing::error!("Redis error: {}", err);
        IdentityError::Redis(err.to_string())
    }
}

impl From<JwtError> for IdentityError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::SigningUnavailable => IdentityError::SigningUnavailable,
            JwtError::AlgorithmMismatch(alg) => {
                tracing::warn!(algorithm = ?alg, "Rejected token with unexpected algorithm");
                IdentityError::AlgorithmMismatch
            }
            JwtError::InvalidToken(_) => IdentityError::InvalidToken,
            JwtError::MissingSubject => IdentityError::MissingSubject,
            JwtError::KeyMaterial(msg) | JwtError::Signing(msg) => {
                tracing::error!("JWT error: {}", msg);
                IdentityError::Internal(msg)
            }
        }
    }
}

impl From<validator::ValidationErrors> for IdentityError {
    fn from(err: validator::ValidationErrors) -> Self {
        // Built from codes and messages only; the rejected value may be a password
        let mut fields: Vec<String> = err
            .field_errors()
            .into_iter()
            .map(|(field, errors)| {
                let reasons: Vec<String> = errors
                    .iter()
                    .map(|e| match &e.message {
                        Some(message) => message.to_string(),
                        None => e.code.to_string(),
                    })
                    .collect();
                format!("{}: {}", field, reasons.join(", "))
            })
            .collect();
        fields.sort();
        IdentityError::Validation(fields.join("; "))
    }
}

// gRPC Status conversion
impl From<IdentityError> for Status {
    fn from(err: IdentityError) -> Self {
        err.to_status()
    }
}
