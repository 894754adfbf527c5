/// Database operations for identity service
pub mod roles;
pub mod users;

// Re-export commonly used types
pub use roles::PgPermissionResolver;
pub use users::{PgUserRepository, UserRepository};
