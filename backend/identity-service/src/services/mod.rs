/// Service layer for identity-service
///
/// - Identity service: registration, authentication, profiles, password
///   changes, role/permission queries and logout
pub mod identity;

pub use identity::{AuthenticatedUser, IdentityService};
