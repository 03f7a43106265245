//! IDVAULT Store — ScyllaDB/Cassandra backend.
//!
//! This crate provides:
//! - Connection management ([`StoreConfig`], [`connect`])
//! - Idempotent schema initialization ([`Schema`])
//! - The user and role store implementations ([`ScyllaUserStore`],
//!   [`ScyllaRoleStore`])
//! - Driver-error classification ([`StoreError`])
//!
//! Durability, replication and query execution are the driver's job; this
//! crate owns schema definition, field mapping and the translation of
//! store calls into parameterized CQL.

mod connection;
mod error;
mod schema;
mod store;

pub use connection::{
    connect, ConsistencyLevel, Credentials, QueryProfile, Replication, StoreConfig,
};
pub use error::StoreError;
pub use schema::Schema;
pub use store::{ScyllaRoleStore, ScyllaUserStore};
