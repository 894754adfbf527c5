/// Data models for identity and authentication
pub mod user;

pub use user::{
    ChangePasswordRequest, NewUser, RegisterRequest, UpdateProfileRequest, User, UserProfile,
    UserStatus,
};
