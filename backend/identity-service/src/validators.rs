use std::borrow::Cow;
use validator::ValidationError;

/// Input validation utilities for identity service

/// Canonical form used for storage and lookup: trimmed and lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Email shape check: the address must contain an `@`
///
/// Deliverability is not judged here.
pub fn validate_email(email: &str) -> bool {
    email.contains('@')
}

/// validator crate compatible custom validator for email shape
pub fn validate_email_shape(email: &str) -> Result<(), ValidationError> {
    if validate_email(email) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_email").with_message(Cow::Borrowed("must contain @")))
    }
}

/// Split an `Authorization` header value into its bearer token
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  User@Example.COM \n"), "user@example.com");
    }

    #[test]
    fn test_valid_email() {
        assert!(validate_email("user@example.com"));
        assert!(validate_email("test.user+tag@sub.example.co.uk"));
        assert!(validate_email("a@b@c.io"));
        assert!(validate_email("@example.com"));
        assert!(validate_email("user@"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!validate_email("invalid"));
        assert!(!validate_email(""));
        assert!(!validate_email("user.example.com"));
    }

    #[test]
    fn test_email_shape_error_carries_message() {
        let err = validate_email_shape("invalid").unwrap_err();
        assert_eq!(err.code, "invalid_email");
        assert_eq!(err.message.as_deref(), Some("must contain @"));
    }

    #[test]
    fn test_parse_bearer() {
        assert_eq!(parse_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(parse_bearer("bearer   abc"), Some("abc"));
        assert_eq!(parse_bearer("Basic dXNlcjpwYXNz"), None);
        assert_eq!(parse_bearer("Bearer "), None);
        assert_eq!(parse_bearer("abc.def.ghi"), None);
    }
}
