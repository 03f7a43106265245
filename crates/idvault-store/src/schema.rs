//! Idempotent schema initialization.
//!
//! Brings the cluster to the state the stores expect: keyspace, the
//! user-defined types for the embedded sub-records, the base tables, the
//! claim tables and the denormalized lookup views. Every statement is
//! `IF NOT EXISTS`, so running this on every startup is safe.

use scylla::Session;
use scylla::transport::errors::{DbError, QueryError};
use tracing::info;

use crate::connection::StoreConfig;
use crate::error::StoreError;
use crate::store::{RoleRow, UserRow};

pub(crate) const USER_CLAIMS_TABLE: &str = "user_claims";
pub(crate) const ROLE_CLAIMS_TABLE: &str = "role_claims";
pub(crate) const USERS_BY_USERNAME_VIEW: &str = "users_by_username";
pub(crate) const USERS_BY_EMAIL_VIEW: &str = "users_by_email";
pub(crate) const ROLES_BY_NAME_VIEW: &str = "roles_by_name";
pub(crate) const USER_CLAIMS_BY_CLAIM_VIEW: &str = "user_claims_by_claim";
pub(crate) const USERS_ROLES_INDEX: &str = "users_roles_idx";

/// Binds a row-mapping type to its physical table.
pub(crate) trait Table {
    const NAME: &'static str;
    fn create_cql(keyspace: &str) -> String;
}

/// Schema initializer.
///
/// Steps must run in order (keyspace, then types, then base tables, then
/// claim tables, then views) because each step references artifacts the
/// previous one created. [`Schema::initialize`] runs them all.
pub struct Schema<'a> {
    session: &'a Session,
    keyspace: String,
    replication_cql: String,
    durable_writes: bool,
}

impl<'a> Schema<'a> {
    pub fn new(session: &'a Session, config: &StoreConfig) -> Self {
        Self {
            session,
            keyspace: config.keyspace_name.clone(),
            replication_cql: config.replication.to_cql(),
            durable_writes: config.durable_writes,
        }
    }

    /// Provisions everything the stores need. Idempotent.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.ensure_keyspace().await?;
        self.ensure_types().await?;
        let users_table = self.ensure_table::<UserRow>().await?;
        let roles_table = self.ensure_table::<RoleRow>().await?;
        self.ensure_claim_tables().await?;
        self.ensure_views(users_table, roles_table).await?;
        info!(keyspace = %self.keyspace, "schema ready");
        Ok(())
    }

    /// Switches to the keyspace, creating it first if the switch fails
    /// because it does not exist. A failure after the creation attempt
    /// surfaces to the caller.
    pub async fn ensure_keyspace(&self) -> Result<(), StoreError> {
        if self.keyspace.is_empty() {
            return Err(StoreError::Config("keyspace name must not be empty"));
        }

        match self.session.use_keyspace(&self.keyspace, false).await {
            Ok(()) => Ok(()),
            Err(QueryError::DbError(DbError::Invalid, _)) => {
                info!(keyspace = %self.keyspace, "keyspace missing, creating");
                self.session
                    .query(
                        keyspace_cql(&self.keyspace, &self.replication_cql, self.durable_writes),
                        (),
                    )
                    .await?;
                self.session.use_keyspace(&self.keyspace, false).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Declares the user-defined types for the embedded sub-records.
    /// Must run before table creation, since the tables reference them.
    pub async fn ensure_types(&self) -> Result<(), StoreError> {
        for cql in types_cql(&self.keyspace) {
            self.session.query(cql, ()).await?;
        }
        info!("user-defined types ready");
        Ok(())
    }

    /// Creates the base table for an entity type and returns the resolved
    /// physical table name, which later steps consume instead of
    /// hard-coding it.
    pub(crate) async fn ensure_table<T: Table>(&self) -> Result<&'static str, StoreError> {
        self.session.query(T::create_cql(&self.keyspace), ()).await?;
        info!(table = T::NAME, "table ready");
        Ok(T::NAME)
    }

    /// Creates the claim tables. The (owner, kind, value) composite key
    /// makes inserts naturally deduplicating.
    pub async fn ensure_claim_tables(&self) -> Result<(), StoreError> {
        for cql in claim_tables_cql(&self.keyspace) {
            self.session.query(cql, ()).await?;
        }
        info!("claim tables ready");
        Ok(())
    }

    /// Creates the denormalized lookup views and the role-membership
    /// index over the resolved table names.
    pub async fn ensure_views(
        &self,
        users_table: &str,
        roles_table: &str,
    ) -> Result<(), StoreError> {
        for cql in views_cql(&self.keyspace, users_table, roles_table) {
            self.session.query(cql, ()).await?;
        }
        info!("lookup views ready");
        Ok(())
    }
}

fn keyspace_cql(keyspace: &str, replication_cql: &str, durable_writes: bool) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {keyspace} \
         WITH replication = {replication_cql} AND durable_writes = {durable_writes}"
    )
}

fn types_cql(keyspace: &str) -> [String; 4] {
    [
        format!(
            "CREATE TYPE IF NOT EXISTS {keyspace}.lockout_info (\
             end_at timestamp, enabled boolean, failed_attempts int)"
        ),
        format!(
            "CREATE TYPE IF NOT EXISTS {keyspace}.phone_info (\
             number text, confirmed_at timestamp)"
        ),
        format!(
            "CREATE TYPE IF NOT EXISTS {keyspace}.login_info (\
             provider text, provider_key text, display_name text)"
        ),
        format!(
            "CREATE TYPE IF NOT EXISTS {keyspace}.token_info (\
             provider text, name text, value text)"
        ),
    ]
}

fn claim_tables_cql(keyspace: &str) -> [String; 2] {
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {keyspace}.{USER_CLAIMS_TABLE} (\
             user_id uuid, kind text, value text, \
             PRIMARY KEY (user_id, kind, value))"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {keyspace}.{ROLE_CLAIMS_TABLE} (\
             role_id uuid, kind text, value text, \
             PRIMARY KEY (role_id, kind, value))"
        ),
    ]
}

fn views_cql(keyspace: &str, users_table: &str, roles_table: &str) -> [String; 5] {
    [
        // The IS NOT NULL predicates keep rows with unset lookup keys out
        // of the views.
        format!(
            "CREATE MATERIALIZED VIEW IF NOT EXISTS {keyspace}.{USERS_BY_USERNAME_VIEW} AS \
             SELECT * FROM {keyspace}.{users_table} \
             WHERE normalized_username IS NOT NULL AND id IS NOT NULL \
             PRIMARY KEY (normalized_username, id)"
        ),
        format!(
            "CREATE MATERIALIZED VIEW IF NOT EXISTS {keyspace}.{USERS_BY_EMAIL_VIEW} AS \
             SELECT * FROM {keyspace}.{users_table} \
             WHERE normalized_email IS NOT NULL AND id IS NOT NULL \
             PRIMARY KEY (normalized_email, id)"
        ),
        format!(
            "CREATE MATERIALIZED VIEW IF NOT EXISTS {keyspace}.{ROLES_BY_NAME_VIEW} AS \
             SELECT * FROM {keyspace}.{roles_table} \
             WHERE normalized_name IS NOT NULL AND id IS NOT NULL \
             PRIMARY KEY (normalized_name, id)"
        ),
        format!(
            "CREATE MATERIALIZED VIEW IF NOT EXISTS {keyspace}.{USER_CLAIMS_BY_CLAIM_VIEW} AS \
             SELECT * FROM {keyspace}.{USER_CLAIMS_TABLE} \
             WHERE kind IS NOT NULL AND value IS NOT NULL AND user_id IS NOT NULL \
             PRIMARY KEY ((kind, value), user_id)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {USERS_ROLES_INDEX} \
             ON {keyspace}.{users_table} (roles)"
        ),
    ]
}
