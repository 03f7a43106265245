//! Store trait groups implemented by storage backends.
//!
//! All operations are async and fallible. Driver failures are classified
//! into [`crate::error::TransportError`] kinds; lookups that find nothing
//! return `Ok(None)` rather than an error.

use uuid::Uuid;

use crate::error::IdentityResult;
use crate::models::claim::Claim;
use crate::models::role::Role;
use crate::models::user::{Login, User};

/// Persistence and lookup operations for user accounts.
pub trait UserOps: Send + Sync {
    fn create(&self, user: &User) -> impl Future<Output = IdentityResult<()>> + Send;

    /// Persists the full entity. Sub-records with all fields at their
    /// defaults are pruned to absent first.
    fn update(&self, user: &mut User) -> impl Future<Output = IdentityResult<()>> + Send;

    fn delete(&self, user: &User) -> impl Future<Output = IdentityResult<()>> + Send;

    fn find_by_id(&self, id: Uuid) -> impl Future<Output = IdentityResult<Option<User>>> + Send;

    /// Point lookup through the username view, keyed by normalized name.
    fn find_by_username(
        &self,
        normalized_username: &str,
    ) -> impl Future<Output = IdentityResult<Option<User>>> + Send;

    /// Point lookup through the email view, keyed by normalized email.
    fn find_by_email(
        &self,
        normalized_email: &str,
    ) -> impl Future<Output = IdentityResult<Option<User>>> + Send;

    /// Finds the user holding exactly this login entry.
    fn find_by_login(
        &self,
        login: &Login,
    ) -> impl Future<Output = IdentityResult<Option<User>>> + Send;

    /// All users whose role set contains the normalized role name.
    fn users_in_role(
        &self,
        normalized_role: &str,
    ) -> impl Future<Output = IdentityResult<Vec<User>>> + Send;
}

/// Claim operations for user accounts, backed by a companion table.
pub trait UserClaimOps: Send + Sync {
    fn claims(&self, user: &User) -> impl Future<Output = IdentityResult<Vec<Claim>>> + Send;

    fn add_claims(
        &self,
        user: &User,
        claims: &[Claim],
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    /// Atomically removes `old` and inserts `new`.
    fn replace_claim(
        &self,
        user: &User,
        old: &Claim,
        new: &Claim,
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    fn remove_claims(
        &self,
        user: &User,
        claims: &[Claim],
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    /// All users holding this claim, resolved through the claim view
    /// rather than a scan.
    fn users_for_claim(
        &self,
        claim: &Claim,
    ) -> impl Future<Output = IdentityResult<Vec<User>>> + Send;
}

/// Persistence and lookup operations for roles.
pub trait RoleOps: Send + Sync {
    fn create(&self, role: &Role) -> impl Future<Output = IdentityResult<()>> + Send;

    /// Persists the role, propagating a rename to every holding user.
    ///
    /// Membership is denormalized into each user's role set, so a rename
    /// removes the previously stored normalized name from every affected
    /// user and adds the new one, together with the role-row rewrite, in
    /// one atomic batch. If the affected-user lookup fails, no batch is
    /// applied.
    ///
    /// Known gap: affected users are those the role index returns at call
    /// time. If the index lags the base table, membership written
    /// concurrently with the rename can be missed.
    fn update(&self, role: &Role) -> impl Future<Output = IdentityResult<()>> + Send;

    /// Deletes the role and retracts it from every holding user's set in
    /// one atomic batch. A role with zero holders deletes in one step.
    fn delete(&self, role: &Role) -> impl Future<Output = IdentityResult<()>> + Send;

    fn find_by_id(&self, id: Uuid) -> impl Future<Output = IdentityResult<Option<Role>>> + Send;

    /// Point lookup through the role-name view, keyed by normalized name.
    fn find_by_name(
        &self,
        normalized_name: &str,
    ) -> impl Future<Output = IdentityResult<Option<Role>>> + Send;
}

/// Claim operations for roles, backed by a companion table.
pub trait RoleClaimOps: Send + Sync {
    fn claims(&self, role: &Role) -> impl Future<Output = IdentityResult<Vec<Claim>>> + Send;

    fn add_claim(
        &self,
        role: &Role,
        claim: &Claim,
    ) -> impl Future<Output = IdentityResult<()>> + Send;

    fn remove_claim(
        &self,
        role: &Role,
        claim: &Claim,
    ) -> impl Future<Output = IdentityResult<()>> + Send;
}
