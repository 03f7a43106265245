//! Tests for the in-memory user entity operations.

use idvault_core::error::IdentityError;
use idvault_core::models::user::{Lockout, Login, Phone, User};
use uuid::Uuid;

fn user() -> User {
    User::new(Uuid::new_v4())
}

#[test]
fn add_login_rejects_duplicate_provider_key_pair() {
    let mut user = user();

    user.add_login(Login::new("google", "key-1", Some("Google".into())))
        .unwrap();

    let result = user.add_login(Login::new("google", "key-1", None));
    assert!(matches!(result, Err(IdentityError::InvalidOperation(_))));

    // The collection still holds exactly one (provider, key) entry.
    assert_eq!(user.logins.len(), 1);
}

#[test]
fn same_provider_different_key_is_not_a_duplicate() {
    let mut user = user();

    user.add_login(Login::new("google", "key-1", None)).unwrap();
    user.add_login(Login::new("google", "key-2", None)).unwrap();

    assert_eq!(user.logins.len(), 2);
}

#[test]
fn remove_login_that_was_never_added_is_a_noop() {
    let mut user = user();
    user.add_login(Login::new("google", "key-1", None)).unwrap();

    user.remove_login("github", "key-1");

    assert_eq!(user.logins.len(), 1);
}

#[test]
fn set_token_is_last_write_wins() {
    let mut user = user();

    user.set_token("provider", "refresh", "v1");
    user.set_token("provider", "refresh", "v2");

    let entries: Vec<_> = user
        .tokens
        .iter()
        .filter(|t| t.provider == "provider" && t.name == "refresh")
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].value, "v2");
}

#[test]
fn remove_token_that_was_never_set_is_a_noop() {
    let mut user = user();
    user.set_token("provider", "refresh", "v1");

    user.remove_token("provider", "access");

    assert_eq!(user.token("provider", "refresh"), Some("v1"));
}

#[test]
fn role_membership_has_set_semantics() {
    let mut user = user();

    user.add_role("ADMIN");
    user.add_role("ADMIN");
    assert_eq!(user.roles.len(), 1);
    assert!(user.is_in_role("ADMIN"));

    user.remove_role("AUDITOR");
    assert_eq!(user.roles.len(), 1);

    user.remove_role("ADMIN");
    assert!(!user.is_in_role("ADMIN"));
}

#[test]
fn email_confirmation_tracks_a_timestamp() {
    let mut user = user();
    assert!(!user.email_confirmed());

    user.set_email_confirmed(true);
    assert!(user.email_confirmed());
    assert!(user.email_confirmed_at.is_some());

    user.set_email_confirmed(false);
    assert!(!user.email_confirmed());
    assert!(user.email_confirmed_at.is_none());
}

#[test]
fn confirming_a_missing_phone_number_fails() {
    let mut user = user();

    assert!(matches!(
        user.set_phone_confirmed(true),
        Err(IdentityError::InvalidOperation(_))
    ));
    assert!(matches!(
        user.phone_confirmed(),
        Err(IdentityError::InvalidOperation(_))
    ));
}

#[test]
fn phone_confirmation_after_setting_a_number() {
    let mut user = user();

    user.set_phone_number(Some("+420123456789".into()));
    assert_eq!(user.phone_number(), Some("+420123456789"));
    assert!(!user.phone_confirmed().unwrap());

    user.set_phone_confirmed(true).unwrap();
    assert!(user.phone_confirmed().unwrap());

    // Setting a new number resets the confirmation.
    user.set_phone_number(Some("+420987654321".into()));
    assert!(!user.phone_confirmed().unwrap());
}

#[test]
fn lockout_counters() {
    let mut user = user();

    assert_eq!(user.failed_attempts(), 0);
    assert!(!user.lockout_enabled());
    assert_eq!(user.lockout_end(), None);

    assert_eq!(user.increment_failed_attempts(), 1);
    assert_eq!(user.increment_failed_attempts(), 2);
    assert_eq!(user.failed_attempts(), 2);

    user.reset_failed_attempts();
    assert_eq!(user.failed_attempts(), 0);
}

#[test]
fn reset_failed_attempts_without_lockout_data_is_a_noop() {
    let mut user = user();
    user.reset_failed_attempts();
    assert!(user.lockout.is_none());
}

#[test]
fn default_sub_records_are_pruned_before_persistence() {
    let mut user = user();

    // Touch lockout and phone in ways that leave them at their defaults.
    user.set_lockout_enabled(true);
    user.set_lockout_enabled(false);
    user.set_phone_number(Some("+1555".into()));
    user.phone.as_mut().unwrap().number = None;

    assert!(user.lockout.is_some());
    assert!(user.phone.is_some());

    user.prune_defaults();

    assert!(user.lockout.is_none());
    assert!(user.phone.is_none());
    assert_eq!(user.lockout_end(), None);
    assert_eq!(user.phone_number(), None);
}

#[test]
fn non_default_sub_records_survive_pruning() {
    let mut user = user();

    user.increment_failed_attempts();
    user.set_phone_number(Some("+1555".into()));

    user.prune_defaults();

    assert_eq!(user.failed_attempts(), 1);
    assert_eq!(user.phone_number(), Some("+1555"));
}

#[test]
fn sub_record_default_predicates() {
    assert!(Lockout::default().is_default());
    assert!(Phone::default().is_default());

    let locked = Lockout {
        enabled: true,
        ..Lockout::default()
    };
    assert!(!locked.is_default());

    let counted = Lockout {
        failed_attempts: 1,
        ..Lockout::default()
    };
    assert!(!counted.is_default());
}

#[test]
fn has_password_ignores_empty_hashes() {
    let mut user = user();
    assert!(!user.has_password());

    user.password_hash = Some(String::new());
    assert!(!user.has_password());

    user.password_hash = Some("$argon2id$...".into());
    assert!(user.has_password());
}
