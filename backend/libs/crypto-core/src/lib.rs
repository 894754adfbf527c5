//! Signing and digest primitives shared by services that issue or accept
//! bearer tokens.
//!
//! - [`jwt`]: RS256 token issuance and validation
//! - [`hash`]: SHA-256 digests and token fingerprints

pub mod hash;
pub mod jwt;
