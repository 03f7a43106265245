//! User entity and its embedded sub-records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IdentityError, IdentityResult};
use crate::models::codes::RecoveryCodes;

/// Reserved provider name for tokens managed by the store itself rather
/// than an external login provider.
pub const INTERNAL_TOKEN_PROVIDER: &str = "[idvault]";
/// Internal token name under which the authenticator key is kept.
pub const AUTHENTICATOR_KEY_TOKEN: &str = "authenticator_key";
/// Internal token name under which encoded recovery codes are kept.
pub const RECOVERY_CODES_TOKEN: &str = "recovery_codes";

/// An external login bound to a user.
///
/// The (provider, provider_key) pair is unique per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub provider: String,
    pub provider_key: String,
    pub display_name: Option<String>,
}

impl Login {
    pub fn new(
        provider: impl Into<String>,
        provider_key: impl Into<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            provider_key: provider_key.into(),
            display_name,
        }
    }
}

/// A named token held for a user.
///
/// The (provider, name) pair is unique per user; setting an existing pair
/// replaces its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub provider: String,
    pub name: String,
    pub value: String,
}

/// Lockout state for a user.
///
/// A record whose fields are all at their defaults is equivalent to "no
/// lockout data" and is pruned to `None` before persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockout {
    /// Lockout is in effect until this instant; `None` or a past instant
    /// means not locked out.
    pub end: Option<DateTime<Utc>>,
    pub enabled: bool,
    pub failed_attempts: i32,
}

impl Lockout {
    pub fn is_default(&self) -> bool {
        self.end.is_none() && !self.enabled && self.failed_attempts == 0
    }
}

/// Phone state for a user. Same pruning rule as [`Lockout`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phone {
    pub number: Option<String>,
    /// Presence implies the number is confirmed.
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Phone {
    pub fn is_default(&self) -> bool {
        self.number.is_none() && self.confirmed_at.is_none()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }
}

/// A user account.
///
/// All operations below mutate only the in-memory value; nothing reaches
/// the database until the backend's `update` persists the entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: Option<String>,
    pub normalized_username: Option<String>,
    pub email: Option<String>,
    pub normalized_email: Option<String>,
    /// Presence implies the email is confirmed.
    pub email_confirmed_at: Option<DateTime<Utc>>,
    /// Salted and hashed password representation, produced by the host.
    pub password_hash: Option<String>,
    /// Opaque value the host rotates whenever credentials change.
    pub security_stamp: Option<String>,
    pub phone: Option<Phone>,
    pub two_factor_enabled: bool,
    pub lockout: Option<Lockout>,
    pub logins: Vec<Login>,
    pub tokens: Vec<Token>,
    /// Normalized names of roles this user holds. Set semantics.
    pub roles: Vec<String>,
}

impl User {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Drops sub-records that carry no data, so a later read returns "no
    /// lockout/phone data" instead of a zero-valued record. Backends call
    /// this before persisting.
    pub fn prune_defaults(&mut self) {
        if self.lockout.as_ref().is_some_and(Lockout::is_default) {
            self.lockout = None;
        }
        if self.phone.as_ref().is_some_and(Phone::is_default) {
            self.phone = None;
        }
    }
}

// Account and email operations.
impl User {
    pub fn email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    pub fn set_email_confirmed(&mut self, confirmed: bool) {
        self.email_confirmed_at = confirmed.then(Utc::now);
    }
}

// Credential operations: password hash, tokens, authenticator key and
// recovery codes.
impl User {
    pub fn has_password(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    pub fn token(&self, provider: &str, name: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|t| t.provider == provider && t.name == name)
            .map(|t| t.value.as_str())
    }

    /// Sets the value of the (provider, name) token, replacing any
    /// existing entry. Last write wins; no duplicate error is surfaced.
    pub fn set_token(
        &mut self,
        provider: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        let provider = provider.into();
        let name = name.into();
        self.remove_token(&provider, &name);
        self.tokens.push(Token {
            provider,
            name,
            value: value.into(),
        });
    }

    /// No-op if the token is absent.
    pub fn remove_token(&mut self, provider: &str, name: &str) {
        self.tokens
            .retain(|t| !(t.provider == provider && t.name == name));
    }

    pub fn authenticator_key(&self) -> Option<&str> {
        self.token(INTERNAL_TOKEN_PROVIDER, AUTHENTICATOR_KEY_TOKEN)
    }

    pub fn set_authenticator_key(&mut self, key: impl Into<String>) {
        self.set_token(INTERNAL_TOKEN_PROVIDER, AUTHENTICATOR_KEY_TOKEN, key);
    }

    /// Replaces the whole recovery-code collection.
    pub fn replace_recovery_codes(
        &mut self,
        codes: impl IntoIterator<Item = String>,
    ) -> IdentityResult<()> {
        let codes = RecoveryCodes::new(codes)?;
        self.set_token(INTERNAL_TOKEN_PROVIDER, RECOVERY_CODES_TOKEN, codes.encode());
        Ok(())
    }

    /// Consumes a recovery code. Returns whether the code was valid; an
    /// unknown code leaves the stored collection unchanged.
    pub fn redeem_recovery_code(&mut self, code: &str) -> bool {
        let mut codes = RecoveryCodes::decode(
            self.token(INTERNAL_TOKEN_PROVIDER, RECOVERY_CODES_TOKEN)
                .unwrap_or(""),
        );
        if !codes.redeem(code) {
            return false;
        }
        self.set_token(INTERNAL_TOKEN_PROVIDER, RECOVERY_CODES_TOKEN, codes.encode());
        true
    }

    pub fn recovery_code_count(&self) -> usize {
        RecoveryCodes::decode(
            self.token(INTERNAL_TOKEN_PROVIDER, RECOVERY_CODES_TOKEN)
                .unwrap_or(""),
        )
        .count()
    }
}

// External login operations.
impl User {
    /// Adds an external login. A second login with the same
    /// (provider, provider_key) pair is a conflict, not a silent
    /// overwrite.
    pub fn add_login(&mut self, login: Login) -> IdentityResult<()> {
        if self
            .logins
            .iter()
            .any(|l| l.provider == login.provider && l.provider_key == login.provider_key)
        {
            return Err(IdentityError::InvalidOperation(format!(
                "login with provider '{}' and key '{}' already exists",
                login.provider, login.provider_key
            )));
        }
        self.logins.push(login);
        Ok(())
    }

    /// No-op if the login is absent.
    pub fn remove_login(&mut self, provider: &str, provider_key: &str) {
        self.logins
            .retain(|l| !(l.provider == provider && l.provider_key == provider_key));
    }
}

// Role membership operations. Set semantics: duplicate adds and absent
// removes are silently ignored.
impl User {
    pub fn add_role(&mut self, normalized_name: impl Into<String>) {
        let normalized_name = normalized_name.into();
        if !self.roles.contains(&normalized_name) {
            self.roles.push(normalized_name);
        }
    }

    pub fn remove_role(&mut self, normalized_name: &str) {
        self.roles.retain(|r| r != normalized_name);
    }

    pub fn is_in_role(&self, normalized_name: &str) -> bool {
        self.roles.iter().any(|r| r == normalized_name)
    }
}

// Lockout operations.
impl User {
    pub fn lockout_end(&self) -> Option<DateTime<Utc>> {
        self.lockout.as_ref().and_then(|l| l.end)
    }

    pub fn set_lockout_end(&mut self, end: Option<DateTime<Utc>>) {
        self.lockout.get_or_insert_with(Lockout::default).end = end;
    }

    pub fn lockout_enabled(&self) -> bool {
        self.lockout.as_ref().is_some_and(|l| l.enabled)
    }

    pub fn set_lockout_enabled(&mut self, enabled: bool) {
        self.lockout.get_or_insert_with(Lockout::default).enabled = enabled;
    }

    pub fn failed_attempts(&self) -> i32 {
        self.lockout.as_ref().map_or(0, |l| l.failed_attempts)
    }

    /// Increments the failed-attempt counter and returns the new count.
    pub fn increment_failed_attempts(&mut self) -> i32 {
        let lockout = self.lockout.get_or_insert_with(Lockout::default);
        lockout.failed_attempts += 1;
        lockout.failed_attempts
    }

    pub fn reset_failed_attempts(&mut self) {
        if let Some(lockout) = self.lockout.as_mut() {
            lockout.failed_attempts = 0;
        }
    }
}

// Phone operations.
impl User {
    pub fn phone_number(&self) -> Option<&str> {
        self.phone.as_ref().and_then(|p| p.number.as_deref())
    }

    /// Replaces the phone sub-record. Setting a new number resets any
    /// previous confirmation; `None` clears the sub-record.
    pub fn set_phone_number(&mut self, number: Option<String>) {
        self.phone = number.map(|number| Phone {
            number: Some(number),
            confirmed_at: None,
        });
    }

    /// Fails when the user has no phone number to confirm.
    pub fn phone_confirmed(&self) -> IdentityResult<bool> {
        match &self.phone {
            Some(phone) => Ok(phone.is_confirmed()),
            None => Err(IdentityError::InvalidOperation(
                "cannot get the confirmation status of the phone number \
                 since the user does not have one"
                    .into(),
            )),
        }
    }

    /// Fails when the user has no phone number to confirm.
    pub fn set_phone_confirmed(&mut self, confirmed: bool) -> IdentityResult<()> {
        match self.phone.as_mut() {
            Some(phone) => {
                phone.confirmed_at = confirmed.then(Utc::now);
                Ok(())
            }
            None => Err(IdentityError::InvalidOperation(
                "cannot set the confirmation status of the phone number \
                 since the user does not have one"
                    .into(),
            )),
        }
    }
}
