//! ScyllaDB implementation of [`RoleOps`] and [`RoleClaimOps`].
//!
//! Role membership is denormalized into every holding user's `roles` set,
//! so rename and delete are multi-row operations. Everything that must
//! hold together is applied in a single logged batch; if the
//! affected-user lookup fails, no batch is constructed.

use std::sync::Arc;

use futures::TryStreamExt;
use idvault_core::error::IdentityResult;
use idvault_core::models::claim::Claim;
use idvault_core::models::role::Role;
use idvault_core::store::{RoleClaimOps, RoleOps};
use scylla::batch::{Batch, BatchType};
use scylla::prepared_statement::PreparedStatement;
use scylla::{FromRow, SerializeRow, Session};
use uuid::Uuid;

use crate::connection::{QueryProfile, StoreConfig};
use crate::error::StoreError;
use crate::schema::{ROLE_CLAIMS_TABLE, ROLES_BY_NAME_VIEW, Table};
use crate::store::user::UserRow;

/// Database-side row shape for the roles table.
#[derive(Debug, FromRow, SerializeRow)]
pub(crate) struct RoleRow {
    id: Uuid,
    name: Option<String>,
    normalized_name: Option<String>,
}

impl Table for RoleRow {
    const NAME: &'static str = "roles";

    fn create_cql(keyspace: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {keyspace}.{} (\
             id uuid PRIMARY KEY, \
             name text, \
             normalized_name text)",
            Self::NAME
        )
    }
}

const COLUMNS: &str = "id, name, normalized_name";

impl From<&Role> for RoleRow {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            normalized_name: role.normalized_name.clone(),
        }
    }
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            normalized_name: row.normalized_name,
        }
    }
}

/// ScyllaDB-backed role store.
#[derive(Clone)]
pub struct ScyllaRoleStore {
    session: Arc<Session>,
    keyspace: String,
    profile: QueryProfile,
}

impl ScyllaRoleStore {
    pub fn new(session: Arc<Session>, config: &StoreConfig) -> Self {
        Self {
            session,
            keyspace: config.keyspace_name.clone(),
            profile: config.query.unwrap_or_default(),
        }
    }

    async fn prepare(&self, cql: String) -> Result<PreparedStatement, StoreError> {
        let mut statement = self.session.prepare(cql).await?;
        self.profile.apply(&mut statement);
        Ok(statement)
    }

    async fn fetch_one(
        &self,
        cql: String,
        values: impl scylla::serialize::row::SerializeRow,
    ) -> Result<Option<Role>, StoreError> {
        let statement = self.prepare(cql).await?;
        let row = self
            .session
            .execute(&statement, values)
            .await?
            .maybe_first_row_typed::<RoleRow>()
            .map_err(StoreError::decode)?;
        Ok(row.map(Role::from))
    }

    /// Ids of every user whose role set contains the normalized name,
    /// resolved through the roles index.
    async fn users_holding(&self, normalized_name: &str) -> Result<Vec<Uuid>, StoreError> {
        let statement = self
            .prepare(format!(
                "SELECT id FROM {}.{} WHERE roles CONTAINS ?",
                self.keyspace,
                UserRow::NAME
            ))
            .await?;
        let rows: Vec<(Uuid,)> = self
            .session
            .execute_iter(statement, (normalized_name,))
            .await?
            .into_typed::<(Uuid,)>()
            .try_collect()
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn prepare_membership_removal(&self) -> Result<PreparedStatement, StoreError> {
        self.prepare(format!(
            "UPDATE {}.{} SET roles = roles - ? WHERE id IN ?",
            self.keyspace,
            UserRow::NAME
        ))
        .await
    }
}

impl RoleOps for ScyllaRoleStore {
    async fn create(&self, role: &Role) -> IdentityResult<()> {
        let statement = self
            .prepare(format!(
                "INSERT INTO {}.{} ({COLUMNS}) VALUES (?, ?, ?)",
                self.keyspace,
                RoleRow::NAME
            ))
            .await?;
        self.session
            .execute(&statement, RoleRow::from(role))
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn update(&self, role: &Role) -> IdentityResult<()> {
        // Users hold the name that was stored when they were granted the
        // role, so the affected set is looked up under the previously
        // persisted normalized name, not the incoming one.
        let previous_name = self
            .find_by_id(role.id)
            .await?
            .and_then(|stored| stored.normalized_name);
        let affected = match &previous_name {
            Some(name) => self.users_holding(name).await?,
            None => Vec::new(),
        };

        let rewrite_role = self
            .prepare(format!(
                "UPDATE {}.{} SET name = ?, normalized_name = ? WHERE id = ?",
                self.keyspace,
                RoleRow::NAME
            ))
            .await?;
        let row = RoleRow::from(role);

        let mut batch = Batch::new(BatchType::Logged);
        self.profile.apply_to_batch(&mut batch);

        match previous_name {
            Some(previous) if !affected.is_empty() => {
                // A name inside a set cannot be changed in place: remove
                // the old entry and add the new one, together with the
                // role-row rewrite, as one atomic batch.
                let remove = self.prepare_membership_removal().await?;
                match &role.normalized_name {
                    Some(new_name) => {
                        let add = self
                            .prepare(format!(
                                "UPDATE {}.{} SET roles = roles + ? WHERE id IN ?",
                                self.keyspace,
                                UserRow::NAME
                            ))
                            .await?;
                        batch.append_statement(remove);
                        batch.append_statement(add);
                        batch.append_statement(rewrite_role);
                        self.session
                            .batch(
                                &batch,
                                (
                                    (vec![previous], &affected),
                                    (vec![new_name.clone()], &affected),
                                    row,
                                ),
                            )
                            .await
                            .map_err(StoreError::from)?;
                    }
                    None => {
                        batch.append_statement(remove);
                        batch.append_statement(rewrite_role);
                        self.session
                            .batch(&batch, ((vec![previous], &affected), row))
                            .await
                            .map_err(StoreError::from)?;
                    }
                }
            }
            _ => {
                batch.append_statement(rewrite_role);
                self.session
                    .batch(&batch, (row,))
                    .await
                    .map_err(StoreError::from)?;
            }
        }
        Ok(())
    }

    async fn delete(&self, role: &Role) -> IdentityResult<()> {
        let affected = match &role.normalized_name {
            Some(name) => self.users_holding(name).await?,
            None => Vec::new(),
        };

        let delete_role = self
            .prepare(format!(
                "DELETE FROM {}.{} WHERE id = ?",
                self.keyspace,
                RoleRow::NAME
            ))
            .await?;

        let mut batch = Batch::new(BatchType::Logged);
        self.profile.apply_to_batch(&mut batch);

        match &role.normalized_name {
            Some(name) if !affected.is_empty() => {
                let remove = self.prepare_membership_removal().await?;
                batch.append_statement(remove);
                batch.append_statement(delete_role);
                self.session
                    .batch(&batch, ((vec![name.clone()], &affected), (role.id,)))
                    .await
                    .map_err(StoreError::from)?;
            }
            _ => {
                batch.append_statement(delete_role);
                self.session
                    .batch(&batch, ((role.id,),))
                    .await
                    .map_err(StoreError::from)?;
            }
        }
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> IdentityResult<Option<Role>> {
        Ok(self
            .fetch_one(
                format!(
                    "SELECT {COLUMNS} FROM {}.{} WHERE id = ?",
                    self.keyspace,
                    RoleRow::NAME
                ),
                (id,),
            )
            .await?)
    }

    async fn find_by_name(&self, normalized_name: &str) -> IdentityResult<Option<Role>> {
        Ok(self
            .fetch_one(
                format!(
                    "SELECT {COLUMNS} FROM {}.{ROLES_BY_NAME_VIEW} \
                     WHERE normalized_name = ?",
                    self.keyspace
                ),
                (normalized_name,),
            )
            .await?)
    }
}

impl RoleClaimOps for ScyllaRoleStore {
    async fn claims(&self, role: &Role) -> IdentityResult<Vec<Claim>> {
        let statement = self
            .prepare(format!(
                "SELECT kind, value FROM {}.{ROLE_CLAIMS_TABLE} WHERE role_id = ?",
                self.keyspace
            ))
            .await?;
        let rows: Vec<(String, String)> = self
            .session
            .execute_iter(statement, (role.id,))
            .await
            .map_err(StoreError::from)?
            .into_typed::<(String, String)>()
            .try_collect()
            .await
            .map_err(StoreError::from)?;
        Ok(rows
            .into_iter()
            .map(|(kind, value)| Claim { kind, value })
            .collect())
    }

    async fn add_claim(&self, role: &Role, claim: &Claim) -> IdentityResult<()> {
        let statement = self
            .prepare(format!(
                "INSERT INTO {}.{ROLE_CLAIMS_TABLE} (role_id, kind, value) \
                 VALUES (?, ?, ?)",
                self.keyspace
            ))
            .await?;
        self.session
            .execute(
                &statement,
                (role.id, claim.kind.as_str(), claim.value.as_str()),
            )
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn remove_claim(&self, role: &Role, claim: &Claim) -> IdentityResult<()> {
        let statement = self
            .prepare(format!(
                "DELETE FROM {}.{ROLE_CLAIMS_TABLE} \
                 WHERE role_id = ? AND kind = ? AND value = ?",
                self.keyspace
            ))
            .await?;
        self.session
            .execute(
                &statement,
                (role.id, claim.kind.as_str(), claim.value.as_str()),
            )
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}
