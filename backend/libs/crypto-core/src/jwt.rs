/// RS256 token issuance and validation.
///
/// A [`TokenIssuer`] owns its key pair, lifetimes, issuer and audience. It is
/// built once by the composition root, never mutated afterwards, and is safe to
/// share across any number of concurrent readers.
///
/// ## Security Design
///
/// - **RS256 ONLY**: the header algorithm is checked before any signature work,
///   so a token claiming HS256 (or anything else) is rejected outright
/// - **Exact time window**: validation runs with zero leeway over `[nbf, exp]`
/// - **Reserved claims are fixed**: caller-supplied claims cannot replace
///   `sub`, `iss`, `aud`, `iat`, `nbf`, `exp` or `typ`
///
/// ## Usage
///
/// ```no_run
/// use crypto_core::jwt::TokenIssuer;
///
/// let private_pem = std::fs::read("jwt_private.pem").unwrap();
/// let public_pem = std::fs::read("jwt_public.pem").unwrap();
/// let issuer = TokenIssuer::new(&private_pem, &public_pem, "identity-service", vec!["api".into()])
///     .unwrap();
///
/// let pair = issuer.generate_token_pair("user-123", "user@example.com").unwrap();
/// let claims = issuer.validate(&pair.access_token).unwrap();
/// assert_eq!(claims.sub, "user-123");
/// ```
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use tracing::warn;

pub use jsonwebtoken::Algorithm;

// ============================================================================
// Constants
// ============================================================================

const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;
const REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// JWT algorithm - the only one this module will sign or accept
const JWT_ALGORITHM: Algorithm = Algorithm::RS256;

/// Claim names owned by the issuer.
pub const RESERVED_CLAIMS: [&str; 7] = ["sub", "iss", "aud", "iat", "nbf", "exp", "typ"];

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("signing key not configured")]
    SigningUnavailable,

    #[error("unexpected signing algorithm: {0:?}")]
    AlgorithmMismatch(Algorithm),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has no subject")]
    MissingSubject,

    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

pub type Result<T> = std::result::Result<T, JwtError>;

/// Token type tag carried in the `typ` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT claims: the registered set plus any custom claims supplied at issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,
    /// Issuer identifier
    pub iss: String,
    /// Audience set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aud: Vec<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Not before (Unix timestamp)
    pub nbf: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Token type: "access" or "refresh"
    pub typ: TokenKind,
    /// Custom claims (e.g. email)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Custom string claim, if present
    pub fn custom_str(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}

/// Access/refresh pair returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub access_expires_in: i64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: i64,
}

// ============================================================================
// Issuer
// ============================================================================

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: Option<EncodingKey>,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
    audience: Vec<String>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("can_sign", &self.can_sign())
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl TokenIssuer {
    /// Build an issuer that can both sign and verify.
    ///
    /// ## Arguments
    ///
    /// * `private_key_pem` - RSA private key in PEM format (PKCS#1 or PKCS#8)
    /// * `public_key_pem` - matching RSA public key in PEM format
    /// * `issuer` - value of the `iss` claim
    /// * `audience` - value of the `aud` claim; empty disables audience checks
    pub fn new(
        private_key_pem: &[u8],
        public_key_pem: &[u8],
        issuer: impl Into<String>,
        audience: Vec<String>,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| JwtError::KeyMaterial(format!("failed to parse RSA private key: {e}")))?;

        let mut this = Self::verification_only(public_key_pem, issuer, audience)?;
        this.encoding_key = Some(encoding_key);
        Ok(this)
    }

    /// Build an issuer for services that only validate tokens.
    ///
    /// Every issuance call on the result fails with
    /// [`JwtError::SigningUnavailable`].
    pub fn verification_only(
        public_key_pem: &[u8],
        issuer: impl Into<String>,
        audience: Vec<String>,
    ) -> Result<Self> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| JwtError::KeyMaterial(format!("failed to parse RSA public key: {e}")))?;

        Ok(Self {
            encoding_key: None,
            decoding_key,
            access_ttl: Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
            refresh_ttl: Duration::days(REFRESH_TOKEN_TTL_DAYS),
            issuer: issuer.into(),
            audience,
        })
    }

    /// Read both PEM files from disk and build a signing issuer.
    pub fn from_pem_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
        issuer: impl Into<String>,
        audience: Vec<String>,
    ) -> Result<Self> {
        let private_pem = read_pem(private_key_path.as_ref())?;
        let public_pem = read_pem(public_key_path.as_ref())?;
        Self::new(&private_pem, &public_pem, issuer, audience)
    }

    /// Override the default access/refresh lifetimes.
    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    pub fn can_sign(&self) -> bool {
        self.encoding_key.is_some()
    }

    pub fn access_token_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    // ------------------------------------------------------------------------
    // Token Generation
    // ------------------------------------------------------------------------

    /// Issue a short-lived access token for `subject`.
    pub fn generate_access_token(&self, subject: &str, extra: Map<String, Value>) -> Result<String> {
        self.issue(subject, TokenKind::Access, extra)
    }

    /// Issue a long-lived refresh token for `subject`.
    pub fn generate_refresh_token(
        &self,
        subject: &str,
        extra: Map<String, Value>,
    ) -> Result<String> {
        self.issue(subject, TokenKind::Refresh, extra)
    }

    /// Issue both tokens; the email rides on the access token only.
    pub fn generate_token_pair(&self, subject: &str, email: &str) -> Result<TokenPair> {
        let mut access_claims = Map::new();
        access_claims.insert("email".to_string(), Value::String(email.to_string()));

        let access_token = self.generate_access_token(subject, access_claims)?;
        let refresh_token = self.generate_refresh_token(subject, Map::new())?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            access_expires_in: self.access_ttl.num_seconds(),
            refresh_expires_in: self.refresh_ttl.num_seconds(),
        })
    }

    fn issue(&self, subject: &str, kind: TokenKind, mut extra: Map<String, Value>) -> Result<String> {
        let encoding_key = self
            .encoding_key
            .as_ref()
            .ok_or(JwtError::SigningUnavailable)?;

        extra.retain(|name, _| {
            let reserved = RESERVED_CLAIMS.contains(&name.as_str());
            if reserved {
                warn!(claim = %name, "Dropping caller-supplied reserved claim");
            }
            !reserved
        });

        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };

        let claims = Claims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
            typ: kind,
            extra,
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    // ------------------------------------------------------------------------
    // Token Validation
    // ------------------------------------------------------------------------

    /// Validate a token and return its claims.
    ///
    /// ## Errors
    ///
    /// - [`JwtError::AlgorithmMismatch`] if the header names anything but RS256
    /// - [`JwtError::InvalidToken`] on malformed input, bad signature, wrong
    ///   issuer/audience, or a timestamp outside `[nbf, exp]`
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let header =
            decode_header(token).map_err(|e| JwtError::InvalidToken(e.to_string()))?;
        if header.alg != JWT_ALGORITHM {
            return Err(JwtError::AlgorithmMismatch(header.alg));
        }

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        if self.audience.is_empty() {
            validation.set_required_spec_claims(&["exp", "nbf", "iss"]);
            validation.validate_aud = false;
        } else {
            // A token without `aud` would otherwise skip the audience check
            validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud"]);
            validation.set_audience(self.audience.as_slice());
        }

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAlgorithm => JwtError::AlgorithmMismatch(header.alg),
                _ => JwtError::InvalidToken(e.to_string()),
            })
    }

    /// Validate a token and require a specific `typ`.
    pub fn validate_kind(&self, token: &str, kind: TokenKind) -> Result<Claims> {
        let claims = self.validate(token)?;
        if claims.typ != kind {
            return Err(JwtError::InvalidToken(format!(
                "expected {} token, got {}",
                kind.as_str(),
                claims.typ.as_str()
            )));
        }
        Ok(claims)
    }

    /// Validate a token and return its subject.
    ///
    /// Never trust a subject taken from an unvalidated token.
    pub fn subject_from_token(&self, token: &str) -> Result<String> {
        let claims = self.validate(token)?;
        if claims.sub.is_empty() {
            return Err(JwtError::MissingSubject);
        }
        Ok(claims.sub)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| JwtError::KeyMaterial(format!("failed to read {}: {e}", path.display())))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Test RSA key pair - FOR TESTING ONLY
    const TEST_PRIVATE_KEY: &str = include_str!("../tests/fixtures/signing_private.pem");
    const TEST_PUBLIC_KEY: &str = include_str!("../tests/fixtures/signing_public.pem");

    fn test_issuer() -> TokenIssuer {
        TokenIssuer::new(
            TEST_PRIVATE_KEY.as_bytes(),
            TEST_PUBLIC_KEY.as_bytes(),
            "identity-service",
            vec!["api".to_string()],
        )
        .expect("Failed to build test issuer")
    }

    #[test]
    fn test_generate_access_token() {
        let issuer = test_issuer();
        let token = issuer
            .generate_access_token("user-123", Map::new())
            .expect("Failed to generate token");

        assert_eq!(token.matches('.').count(), 2); // JWT has 3 parts
    }

    #[test]
    fn test_validate_valid_token() {
        let issuer = test_issuer();
        let pair = issuer
            .generate_token_pair("user-123", "test@example.com")
            .expect("Failed to generate tokens");

        let claims = issuer.validate(&pair.access_token).expect("token should validate");
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.iss, "identity-service");
        assert_eq!(claims.aud, vec!["api".to_string()]);
        assert_eq!(claims.typ, TokenKind::Access);
        assert_eq!(claims.custom_str("email"), Some("test@example.com"));
        assert_eq!(claims.iat, claims.nbf);
    }

    #[test]
    fn test_refresh_token_has_no_email() {
        let issuer = test_issuer();
        let pair = issuer
            .generate_token_pair("user-123", "test@example.com")
            .expect("Failed to generate tokens");

        let claims = issuer.validate(&pair.refresh_token).unwrap();
        assert_eq!(claims.typ, TokenKind::Refresh);
        assert!(claims.custom_str("email").is_none());
    }

    #[test]
    fn test_validate_invalid_token() {
        let issuer = test_issuer();
        assert!(matches!(
            issuer.validate("invalid.token.here"),
            Err(JwtError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_reserved_claims_cannot_be_overridden() {
        let issuer = test_issuer();
        let mut extra = Map::new();
        extra.insert("sub".into(), Value::String("someone-else".into()));
        extra.insert("exp".into(), Value::from(i64::MAX));
        extra.insert("role".into(), Value::String("member".into()));

        let token = issuer.generate_access_token("user-123", extra).unwrap();
        let claims = issuer.validate(&token).unwrap();

        assert_eq!(claims.sub, "user-123");
        assert!(claims.exp - claims.iat <= ACCESS_TOKEN_TTL_MINUTES * 60);
        assert_eq!(claims.custom_str("role"), Some("member"));
    }

    #[test]
    fn test_validate_kind_rejects_wrong_type() {
        let issuer = test_issuer();
        let pair = issuer.generate_token_pair("user-123", "a@b.c").unwrap();

        assert!(issuer.validate_kind(&pair.refresh_token, TokenKind::Refresh).is_ok());
        assert!(matches!(
            issuer.validate_kind(&pair.refresh_token, TokenKind::Access),
            Err(JwtError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_subject_requires_sub() {
        let issuer = test_issuer();
        let token = issuer.generate_access_token("", Map::new()).unwrap();
        assert!(matches!(
            issuer.subject_from_token(&token),
            Err(JwtError::MissingSubject)
        ));
    }

    #[test]
    fn test_verification_only_cannot_sign() {
        let issuer = TokenIssuer::verification_only(
            TEST_PUBLIC_KEY.as_bytes(),
            "identity-service",
            vec!["api".to_string()],
        )
        .unwrap();

        assert!(!issuer.can_sign());
        assert!(matches!(
            issuer.generate_access_token("user-123", Map::new()),
            Err(JwtError::SigningUnavailable)
        ));

        // Tokens from the signing twin still validate
        let token = test_issuer()
            .generate_access_token("user-123", Map::new())
            .unwrap();
        assert_eq!(issuer.subject_from_token(&token).unwrap(), "user-123");
    }

    #[test]
    fn test_ttls_reported() {
        let issuer = test_issuer();
        assert_eq!(issuer.access_token_ttl(), Duration::minutes(15));
        assert_eq!(issuer.refresh_token_ttl(), Duration::days(7));

        let pair = issuer.generate_token_pair("user-123", "a@b.c").unwrap();
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.access_expires_in, 900);
        assert_eq!(pair.refresh_expires_in, 7 * 24 * 3600);
    }

    #[test]
    fn test_bad_key_material() {
        let result = TokenIssuer::new(b"not a key", TEST_PUBLIC_KEY.as_bytes(), "x", vec![]);
        assert!(matches!(result, Err(JwtError::KeyMaterial(_))));
    }
}
