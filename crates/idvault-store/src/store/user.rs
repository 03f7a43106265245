//! ScyllaDB implementation of [`UserOps`] and [`UserClaimOps`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use idvault_core::error::IdentityResult;
use idvault_core::models::claim::Claim;
use idvault_core::models::user::{Lockout, Login, Phone, Token, User};
use idvault_core::store::{UserClaimOps, UserOps};
use scylla::batch::{Batch, BatchType};
use scylla::prepared_statement::PreparedStatement;
use scylla::{FromRow, FromUserType, SerializeCql, SerializeRow, Session};
use uuid::Uuid;

use crate::connection::{QueryProfile, StoreConfig};
use crate::error::StoreError;
use crate::schema::{
    Table, USER_CLAIMS_BY_CLAIM_VIEW, USER_CLAIMS_TABLE, USERS_BY_EMAIL_VIEW,
    USERS_BY_USERNAME_VIEW,
};

#[derive(Debug, Clone, FromUserType, SerializeCql)]
pub(crate) struct LockoutUdt {
    end_at: Option<DateTime<Utc>>,
    enabled: bool,
    failed_attempts: i32,
}

impl From<&Lockout> for LockoutUdt {
    fn from(lockout: &Lockout) -> Self {
        Self {
            end_at: lockout.end,
            enabled: lockout.enabled,
            failed_attempts: lockout.failed_attempts,
        }
    }
}

impl From<LockoutUdt> for Lockout {
    fn from(udt: LockoutUdt) -> Self {
        Self {
            end: udt.end_at,
            enabled: udt.enabled,
            failed_attempts: udt.failed_attempts,
        }
    }
}

#[derive(Debug, Clone, FromUserType, SerializeCql)]
pub(crate) struct PhoneUdt {
    number: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl From<&Phone> for PhoneUdt {
    fn from(phone: &Phone) -> Self {
        Self {
            number: phone.number.clone(),
            confirmed_at: phone.confirmed_at,
        }
    }
}

impl From<PhoneUdt> for Phone {
    fn from(udt: PhoneUdt) -> Self {
        Self {
            number: udt.number,
            confirmed_at: udt.confirmed_at,
        }
    }
}

#[derive(Debug, Clone, FromUserType, SerializeCql)]
pub(crate) struct LoginUdt {
    provider: String,
    provider_key: String,
    display_name: Option<String>,
}

impl From<&Login> for LoginUdt {
    fn from(login: &Login) -> Self {
        Self {
            provider: login.provider.clone(),
            provider_key: login.provider_key.clone(),
            display_name: login.display_name.clone(),
        }
    }
}

impl From<LoginUdt> for Login {
    fn from(udt: LoginUdt) -> Self {
        Self {
            provider: udt.provider,
            provider_key: udt.provider_key,
            display_name: udt.display_name,
        }
    }
}

#[derive(Debug, Clone, FromUserType, SerializeCql)]
pub(crate) struct TokenUdt {
    provider: String,
    name: String,
    value: String,
}

impl From<&Token> for TokenUdt {
    fn from(token: &Token) -> Self {
        Self {
            provider: token.provider.clone(),
            name: token.name.clone(),
            value: token.value.clone(),
        }
    }
}

impl From<TokenUdt> for Token {
    fn from(udt: TokenUdt) -> Self {
        Token {
            provider: udt.provider,
            name: udt.name,
            value: udt.value,
        }
    }
}

/// Database-side row shape for the users table.
#[derive(Debug, FromRow, SerializeRow)]
pub(crate) struct UserRow {
    id: Uuid,
    username: Option<String>,
    normalized_username: Option<String>,
    email: Option<String>,
    normalized_email: Option<String>,
    email_confirmed_at: Option<DateTime<Utc>>,
    password_hash: Option<String>,
    security_stamp: Option<String>,
    phone: Option<PhoneUdt>,
    // Role-membership batches can leave partial rows behind; a null flag
    // reads as false.
    two_factor_enabled: Option<bool>,
    lockout: Option<LockoutUdt>,
    logins: Option<Vec<LoginUdt>>,
    tokens: Option<Vec<TokenUdt>>,
    roles: Option<Vec<String>>,
}

impl Table for UserRow {
    const NAME: &'static str = "users";

    fn create_cql(keyspace: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {keyspace}.{} (\
             id uuid PRIMARY KEY, \
             username text, \
             normalized_username text, \
             email text, \
             normalized_email text, \
             email_confirmed_at timestamp, \
             password_hash text, \
             security_stamp text, \
             phone frozen<phone_info>, \
             two_factor_enabled boolean, \
             lockout frozen<lockout_info>, \
             logins list<frozen<login_info>>, \
             tokens list<frozen<token_info>>, \
             roles set<text>)",
            Self::NAME
        )
    }
}

/// Column list in [`UserRow`] field order, for reads.
const COLUMNS: &str = "id, username, normalized_username, email, normalized_email, \
     email_confirmed_at, password_hash, security_stamp, phone, \
     two_factor_enabled, lockout, logins, tokens, roles";

impl From<&User> for UserRow {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            normalized_username: user.normalized_username.clone(),
            email: user.email.clone(),
            normalized_email: user.normalized_email.clone(),
            email_confirmed_at: user.email_confirmed_at,
            password_hash: user.password_hash.clone(),
            security_stamp: user.security_stamp.clone(),
            phone: user.phone.as_ref().map(PhoneUdt::from),
            two_factor_enabled: Some(user.two_factor_enabled),
            lockout: user.lockout.as_ref().map(LockoutUdt::from),
            logins: (!user.logins.is_empty())
                .then(|| user.logins.iter().map(LoginUdt::from).collect()),
            tokens: (!user.tokens.is_empty())
                .then(|| user.tokens.iter().map(TokenUdt::from).collect()),
            roles: (!user.roles.is_empty()).then(|| user.roles.clone()),
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            normalized_username: row.normalized_username,
            email: row.email,
            normalized_email: row.normalized_email,
            email_confirmed_at: row.email_confirmed_at,
            password_hash: row.password_hash,
            security_stamp: row.security_stamp,
            phone: row.phone.map(Phone::from),
            two_factor_enabled: row.two_factor_enabled.unwrap_or(false),
            lockout: row.lockout.map(Lockout::from),
            logins: row
                .logins
                .unwrap_or_default()
                .into_iter()
                .map(Login::from)
                .collect(),
            tokens: row
                .tokens
                .unwrap_or_default()
                .into_iter()
                .map(Token::from)
                .collect(),
            roles: row.roles.unwrap_or_default(),
        }
    }
}

/// ScyllaDB-backed user store.
#[derive(Clone)]
pub struct ScyllaUserStore {
    session: Arc<Session>,
    keyspace: String,
    profile: QueryProfile,
}

impl ScyllaUserStore {
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
    ) -> Result<Option<User>, StoreError> {
        let statement = self.prepare(cql).await?;
        let row = self
            .session
            .execute(&statement, values)
            .await?
            .maybe_first_row_typed::<UserRow>()
            .map_err(StoreError::decode)?;
        Ok(row.map(User::from))
    }

    async fn fetch_many(
        &self,
        cql: String,
        values: impl scylla::serialize::row::SerializeRow,
    ) -> Result<Vec<User>, StoreError> {
        let statement = self.prepare(cql).await?;
        let rows: Vec<UserRow> = self
            .session
            .execute_iter(statement, values)
            .await?
            .into_typed::<UserRow>()
            .try_collect()
            .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

impl UserOps for ScyllaUserStore {
    async fn create(&self, user: &User) -> IdentityResult<()> {
        let statement = self
            .prepare(format!(
                "INSERT INTO {}.{} ({COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                self.keyspace,
                UserRow::NAME
            ))
            .await?;
        self.session
            .execute(&statement, UserRow::from(user))
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn update(&self, user: &mut User) -> IdentityResult<()> {
        user.prune_defaults();
        let statement = self
            .prepare(format!(
                "UPDATE {}.{} SET \
                 username = ?, normalized_username = ?, email = ?, \
                 normalized_email = ?, email_confirmed_at = ?, \
                 password_hash = ?, security_stamp = ?, phone = ?, \
                 two_factor_enabled = ?, lockout = ?, logins = ?, \
                 tokens = ?, roles = ? \
                 WHERE id = ?",
                self.keyspace,
                UserRow::NAME
            ))
            .await?;
        self.session
            .execute(&statement, UserRow::from(&*user))
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn delete(&self, user: &User) -> IdentityResult<()> {
        let statement = self
            .prepare(format!(
                "DELETE FROM {}.{} WHERE id = ?",
                self.keyspace,
                UserRow::NAME
            ))
            .await?;
        self.session
            .execute(&statement, (user.id,))
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> IdentityResult<Option<User>> {
        Ok(self
            .fetch_one(
                format!(
                    "SELECT {COLUMNS} FROM {}.{} WHERE id = ?",
                    self.keyspace,
                    UserRow::NAME
                ),
                (id,),
            )
            .await?)
    }

    async fn find_by_username(&self, normalized_username: &str) -> IdentityResult<Option<User>> {
        Ok(self
            .fetch_one(
                format!(
                    "SELECT {COLUMNS} FROM {}.{USERS_BY_USERNAME_VIEW} \
                     WHERE normalized_username = ?",
                    self.keyspace
                ),
                (normalized_username,),
            )
            .await?)
    }

    async fn find_by_email(&self, normalized_email: &str) -> IdentityResult<Option<User>> {
        Ok(self
            .fetch_one(
                format!(
                    "SELECT {COLUMNS} FROM {}.{USERS_BY_EMAIL_VIEW} \
                     WHERE normalized_email = ?",
                    self.keyspace
                ),
                (normalized_email,),
            )
            .await?)
    }

    async fn find_by_login(&self, login: &Login) -> IdentityResult<Option<User>> {
        Ok(self
            .fetch_one(
                format!(
                    "SELECT {COLUMNS} FROM {}.{} \
                     WHERE logins CONTAINS ? ALLOW FILTERING",
                    self.keyspace,
                    UserRow::NAME
                ),
                (LoginUdt::from(login),),
            )
            .await?)
    }

    async fn users_in_role(&self, normalized_role: &str) -> IdentityResult<Vec<User>> {
        Ok(self
            .fetch_many(
                format!(
                    "SELECT {COLUMNS} FROM {}.{} WHERE roles CONTAINS ?",
                    self.keyspace,
                    UserRow::NAME
                ),
                (normalized_role,),
            )
            .await?)
    }
}

impl UserClaimOps for ScyllaUserStore {
    async fn claims(&self, user: &User) -> IdentityResult<Vec<Claim>> {
        let statement = self
            .prepare(format!(
                "SELECT kind, value FROM {}.{USER_CLAIMS_TABLE} WHERE user_id = ?",
                self.keyspace
            ))
            .await?;
        let rows: Vec<(String, String)> = self
            .session
            .execute_iter(statement, (user.id,))
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

    async fn add_claims(&self, user: &User, claims: &[Claim]) -> IdentityResult<()> {
        if claims.is_empty() {
            return Ok(());
        }
        let insert = self
            .prepare(format!(
                "INSERT INTO {}.{USER_CLAIMS_TABLE} (user_id, kind, value) \
                 VALUES (?, ?, ?)",
                self.keyspace
            ))
            .await?;

        let mut batch = Batch::new(BatchType::Logged);
        self.profile.apply_to_batch(&mut batch);
        for _ in claims {
            batch.append_statement(insert.clone());
        }

        let values: Vec<(Uuid, &str, &str)> = claims
            .iter()
            .map(|claim| (user.id, claim.kind.as_str(), claim.value.as_str()))
            .collect();
        self.session
            .batch(&batch, values)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn replace_claim(&self, user: &User, old: &Claim, new: &Claim) -> IdentityResult<()> {
        let delete = self
            .prepare(format!(
                "DELETE FROM {}.{USER_CLAIMS_TABLE} \
                 WHERE user_id = ? AND kind = ? AND value = ?",
                self.keyspace
            ))
            .await?;
        let insert = self
            .prepare(format!(
                "INSERT INTO {}.{USER_CLAIMS_TABLE} (user_id, kind, value) \
                 VALUES (?, ?, ?)",
                self.keyspace
            ))
            .await?;

        let mut batch = Batch::new(BatchType::Logged);
        self.profile.apply_to_batch(&mut batch);
        batch.append_statement(delete);
        batch.append_statement(insert);

        self.session
            .batch(
                &batch,
                (
                    (user.id, old.kind.as_str(), old.value.as_str()),
                    (user.id, new.kind.as_str(), new.value.as_str()),
                ),
            )
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn remove_claims(&self, user: &User, claims: &[Claim]) -> IdentityResult<()> {
        if claims.is_empty() {
            return Ok(());
        }
        let delete = self
            .prepare(format!(
                "DELETE FROM {}.{USER_CLAIMS_TABLE} \
                 WHERE user_id = ? AND kind = ? AND value = ?",
                self.keyspace
            ))
            .await?;

        let mut batch = Batch::new(BatchType::Logged);
        self.profile.apply_to_batch(&mut batch);
        for _ in claims {
            batch.append_statement(delete.clone());
        }

        let values: Vec<(Uuid, &str, &str)> = claims
            .iter()
            .map(|claim| (user.id, claim.kind.as_str(), claim.value.as_str()))
            .collect();
        self.session
            .batch(&batch, values)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn users_for_claim(&self, claim: &Claim) -> IdentityResult<Vec<User>> {
        let statement = self
            .prepare(format!(
                "SELECT user_id FROM {}.{USER_CLAIMS_BY_CLAIM_VIEW} \
                 WHERE kind = ? AND value = ?",
                self.keyspace
            ))
            .await?;
        let holders: Vec<(Uuid,)> = self
            .session
            .execute_iter(statement, (claim.kind.as_str(), claim.value.as_str()))
            .await
            .map_err(StoreError::from)?
            .into_typed::<(Uuid,)>()
            .try_collect()
            .await
            .map_err(StoreError::from)?;

        if holders.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = holders.into_iter().map(|(id,)| id).collect();

        Ok(self
            .fetch_many(
                format!(
                    "SELECT {COLUMNS} FROM {}.{} WHERE id IN ?",
                    self.keyspace,
                    UserRow::NAME
                ),
                (ids,),
            )
            .await?)
    }
}
