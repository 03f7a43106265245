//! ScyllaDB store implementations.

mod role;
mod user;

pub use role::ScyllaRoleStore;
pub use user::ScyllaUserStore;

pub(crate) use role::RoleRow;
pub(crate) use user::UserRow;
