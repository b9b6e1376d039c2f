/// Data models for identity and access control
pub mod rbac;
pub mod user;

pub use rbac::{NewPermission, Permission, Role, ADMIN_ROLE, MODERATOR_ROLE, USER_ROLE};
pub use user::User;
