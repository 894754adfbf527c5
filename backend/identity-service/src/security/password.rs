/// Password hashing and verification using Argon2id
///
/// ## Encoding
///
/// ```text
/// argon2id$v=19$m=65536,t=3,p=2$<salt>$<hash>
/// ```
///
/// Salt and hash are standard base64 without padding. The string carries its
/// own cost parameters, so hashes written with older parameters keep verifying
/// after the defaults change.
use crate::error::{IdentityError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

const ALGORITHM_TAG: &str = "argon2id";
const VERSION_FIELD: &str = "v=19";

/// Memory cost in KiB (64 MiB)
pub const MEMORY_COST_KIB: u32 = 64 * 1024;
pub const ITERATIONS: u32 = 3;
pub const PARALLELISM: u32 = 2;
pub const SALT_LEN: usize = 16;

// Ceilings for parameters read back from stored hashes
const MAX_MEMORY_COST_KIB: u32 = 1024 * 1024;
const MAX_ITERATIONS: u32 = 64;
const MAX_PARALLELISM: u32 = 64;
pub const HASH_LEN: usize = 32;

/// Cost parameters embedded in an encoded hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CostParams {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl CostParams {
    const DEFAULT: CostParams = CostParams {
        memory_kib: MEMORY_COST_KIB,
        iterations: ITERATIONS,
        parallelism: PARALLELISM,
    };

    fn parse(field: &str) -> Result<Self> {
        let mut memory_kib = None;
        let mut iterations = None;
        let mut parallelism = None;

        for pair in field.split(',') {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format_error(format!("parameter without value: {pair}")))?;
            let value: u32 = value
                .parse()
                .map_err(|_| format_error(format!("parameter {name} is not an integer")))?;
            if value == 0 {
                return Err(format_error(format!("parameter {name} is zero")));
            }

            let (slot, limit) = match name {
                "m" => (&mut memory_kib, MAX_MEMORY_COST_KIB),
                "t" => (&mut iterations, MAX_ITERATIONS),
                "p" => (&mut parallelism, MAX_PARALLELISM),
                other => return Err(format_error(format!("unknown parameter {other}"))),
            };
            if value > limit {
                return Err(format_error(format!("parameter {name} exceeds {limit}")));
            }
            if slot.replace(value).is_some() {
                return Err(format_error(format!("duplicate parameter {name}")));
            }
        }

        match (memory_kib, iterations, parallelism) {
            (Some(memory_kib), Some(iterations), Some(parallelism)) => Ok(Self {
                memory_kib,
                iterations,
                parallelism,
            }),
            _ => Err(format_error("missing cost parameter")),
        }
    }

    fn hasher(&self, output_len: usize) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(output_len),
        )
        .map_err(|e| format_error(format!("unsupported parameters: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Hash a password using Argon2id with the fixed cost parameters
///
/// ## Errors
///
/// - `EntropyFailure` if the OS randomness source fails
pub fn hash_password(password: &str) -> Result<String> {
    hash_with_rng(password, &mut OsRng)
}

/// Hash with a caller-supplied randomness source for the salt
pub fn hash_with_rng<R: RngCore>(password: &str, rng: &mut R) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rng.try_fill_bytes(&mut salt)
        .map_err(|e| IdentityError::EntropyFailure(e.to_string()))?;

    let params = CostParams::DEFAULT;
    let mut hash = [0u8; HASH_LEN];
    params
        .hasher(HASH_LEN)?
        .hash_password_into(password.as_bytes(), &salt, &mut hash)
        .map_err(|e| IdentityError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(format!(
        "{ALGORITHM_TAG}${VERSION_FIELD}$m={},t={},p={}${}${}",
        params.memory_kib,
        params.iterations,
        params.parallelism,
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash),
    ))
}

/// Verify a password against its encoded hash
///
/// Re-derives with the parameters stored in `encoded` and compares in
/// constant time.
///
/// ## Returns
///
/// `true` if password matches hash, `false` otherwise
///
/// ## Errors
///
/// - `PasswordFormat` if the layout, tag, version or parameters are not recognized
/// - `PasswordDecode` if the salt or hash field is not valid base64
pub fn verify_password(password: &str, encoded: &str) -> Result<bool> {
    let fields: Vec<&str> = encoded.split('$').collect();
    let [tag, version, params, salt, hash] = fields.as_slice() else {
        return Err(format_error(format!(
            "expected 5 fields, found {}",
            fields.len()
        )));
    };

    if *tag != ALGORITHM_TAG {
        return Err(format_error(format!("unsupported algorithm {tag}")));
    }
    if *version != VERSION_FIELD {
        return Err(format_error(format!("unsupported version {version}")));
    }
    let params = CostParams::parse(params)?;

    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|e| IdentityError::PasswordDecode(format!("salt: {e}")))?;
    let expected = STANDARD_NO_PAD
        .decode(hash)
        .map_err(|e| IdentityError::PasswordDecode(format!("hash: {e}")))?;

    let mut actual = vec![0u8; expected.len()];
    params
        .hasher(expected.len())?
        .hash_password_into(password.as_bytes(), &salt, &mut actual)
        .map_err(|e| format_error(format!("derivation failed: {e}")))?;

    Ok(constant_time_compare(&actual, &expected))
}

/// Compare two byte slices in time independent of where they differ
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

fn format_error(msg: impl Into<String>) -> IdentityError {
    IdentityError::PasswordFormat(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingRng;

    impl RngCore for FailingRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, _dest: &mut [u8]) {}
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            Err(rand::Error::new("entropy source unavailable"))
        }
    }

    // Cheap parameters for tests that only exercise parsing
    fn low_cost(password: &str) -> String {
        let salt = [7u8; SALT_LEN];
        let mut hash = [0u8; HASH_LEN];
        CostParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        }
        .hasher(HASH_LEN)
        .unwrap()
        .hash_password_into(password.as_bytes(), &salt, &mut hash)
        .unwrap();
        format!(
            "argon2id$v=19$m=256,t=1,p=1${}${}",
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash)
        )
    }

    fn replace_field(encoded: &str, index: usize, value: &str) -> String {
        let mut fields: Vec<&str> = encoded.split('$').collect();
        fields[index] = value;
        fields.join("$")
    }

    #[test]
    fn test_hash_and_verify_valid_password() {
        let password = "StrongP@ssw0rd!";
        let hash = hash_password(password).expect("should hash password successfully");
        assert!(verify_password(password, &hash).expect("should verify successfully"));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hash = hash_password("StrongP@ssw0rd!").expect("should hash password successfully");
        assert!(!verify_password("WrongPassword123!", &hash).expect("verification should succeed"));
    }

    #[test]
    fn test_encoding_layout() {
        let hash = hash_password("Password!2").unwrap();
        let fields: Vec<&str> = hash.split('$').collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], "argon2id");
        assert_eq!(fields[1], "v=19");
        assert_eq!(fields[2], "m=65536,t=3,p=2");
        assert_eq!(STANDARD_NO_PAD.decode(fields[3]).unwrap().len(), SALT_LEN);
        assert_eq!(STANDARD_NO_PAD.decode(fields[4]).unwrap().len(), HASH_LEN);
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = "StrongP@ssw0rd!";
        let hash1 = hash_password(password).expect("should hash successfully");
        let hash2 = hash_password(password).expect("should hash successfully");
        // Different salts should produce different hashes
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_entropy_failure() {
        let result = hash_with_rng("Password!2", &mut FailingRng);
        assert!(matches!(result, Err(IdentityError::EntropyFailure(_))));
    }

    #[test]
    fn test_verify_uses_embedded_parameters() {
        let encoded = low_cost("Password!2");
        assert!(verify_password("Password!2", &encoded).unwrap());
        assert!(!verify_password("Password!3", &encoded).unwrap());
    }

    #[test]
    fn test_mutated_hash_is_mismatch() {
        let encoded = low_cost("Password!2");
        let hash = encoded.rsplit('$').next().unwrap();
        // Flip the first character to another valid base64 symbol
        let first = if hash.starts_with('A') { "B" } else { "A" };
        let mutated = replace_field(&encoded, 4, &format!("{first}{}", &hash[1..]));
        assert!(!verify_password("Password!2", &mutated).unwrap());
    }

    #[test]
    fn test_mutated_salt_is_mismatch() {
        let encoded = low_cost("Password!2");
        let salt = encoded.split('$').nth(3).unwrap();
        let first = if salt.starts_with('A') { "B" } else { "A" };
        let mutated = replace_field(&encoded, 3, &format!("{first}{}", &salt[1..]));
        assert!(!verify_password("Password!2", &mutated).unwrap());
    }

    #[test]
    fn test_bad_base64_is_decode_error() {
        let encoded = low_cost("Password!2");
        let mutated = replace_field(&encoded, 4, "!!not-base64!!");
        assert!(matches!(
            verify_password("Password!2", &mutated),
            Err(IdentityError::PasswordDecode(_))
        ));
        let mutated = replace_field(&encoded, 3, "*");
        assert!(matches!(
            verify_password("Password!2", &mutated),
            Err(IdentityError::PasswordDecode(_))
        ));
    }

    #[test]
    fn test_rejects_unrecognized_layouts() {
        let encoded = low_cost("Password!2");
        let cases = [
            replace_field(&encoded, 0, "argon2i"),
            replace_field(&encoded, 0, "bcrypt"),
            replace_field(&encoded, 1, "v=16"),
            replace_field(&encoded, 2, "m=256,t=1"),
            replace_field(&encoded, 2, "m=256,t=1,p=1,x=4"),
            replace_field(&encoded, 2, "m=256,t=1,t=1"),
            replace_field(&encoded, 2, "m=256,t=0,p=1"),
            replace_field(&encoded, 2, "m=256,t=-1,p=1"),
            replace_field(&encoded, 2, "m=abc,t=1,p=1"),
            format!("{encoded}$extra"),
            encoded.splitn(2, '$').nth(1).unwrap().to_string(),
            String::new(),
        ];

        for case in cases {
            assert!(
                matches!(
                    verify_password("Password!2", &case),
                    Err(IdentityError::PasswordFormat(_))
                ),
                "expected format error for {case:?}"
            );
        }
    }

    #[test]
    fn test_oversized_parameters_rejected_before_derivation() {
        let encoded = low_cost("Password!2");
        let cases = [
            replace_field(&encoded, 2, "m=4294967295,t=1,p=1"),
            replace_field(&encoded, 2, "m=1048577,t=1,p=1"),
            replace_field(&encoded, 2, "m=256,t=65,p=1"),
            replace_field(&encoded, 2, "m=256,t=1,p=255"),
        ];

        for case in cases {
            assert!(
                matches!(
                    verify_password("Password!2", &case),
                    Err(IdentityError::PasswordFormat(_))
                ),
                "expected format error for {case:?}"
            );
        }

        assert_eq!(
            CostParams::parse("m=1048576,t=64,p=64").unwrap(),
            CostParams {
                memory_kib: MAX_MEMORY_COST_KIB,
                iterations: MAX_ITERATIONS,
                parallelism: MAX_PARALLELISM,
            }
        );
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abc", b"abc"));
        assert!(!constant_time_compare(b"abc", b"abd"));
        assert!(!constant_time_compare(b"abc", b"abcd"));
    }
}
