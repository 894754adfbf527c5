/// Identity Service Library
///
/// Provides authentication, authorization, and identity management.
///
/// ## Modules
///
/// - `config`: Service configuration
/// - `db`: User repository contract and PostgreSQL adapters (users, roles)
/// - `error`: Error types
/// - `memory`: In-memory adapters for every store contract
/// - `metrics`: Prometheus counters
/// - `models`: Data models
/// - `rbac`: Permission resolver contract
/// - `security`: JWT, password hashing, token revocation
/// - `services`: Identity orchestration
/// - `validators`: Input validation
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod rbac;
pub mod security;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use error::{IdentityError, Result};
pub use services::{AuthenticatedUser, IdentityService};
