//! End-to-end tests against a live ScyllaDB/Cassandra cluster.
//!
//! These are ignored by default because they need a reachable node; run
//! them with `cargo test -- --ignored` and point `SCYLLA_URI` at the
//! cluster (defaults to 127.0.0.1).

use std::sync::Arc;

use idvault_core::models::claim::Claim;
use idvault_core::models::role::Role;
use idvault_core::models::user::{Login, User};
use idvault_core::store::{RoleClaimOps, RoleOps, UserClaimOps, UserOps};
use idvault_store::{connect, Schema, ScyllaRoleStore, ScyllaUserStore, StoreConfig};
use scylla::Session;
use uuid::Uuid;


async fn setup() -> (Arc<Session>, StoreConfig) {
    let node = std::env::var("SCYLLA_URI").unwrap_or_else(|_| "127.0.0.1".into());
    let config = StoreConfig {
        contact_points: vec![node],
        keyspace_name: "idvault_test".into(),
        ..StoreConfig::default()
    };

    let session = connect(&config).await.unwrap();
    Schema::new(&session, &config).initialize().await.unwrap();

    (Arc::new(session), config)
}

fn sample_user() -> User {
    let id = Uuid::new_v4();
    let mut user = User::new(id);
    user.username = Some(format!("user-{id}"));
    user.normalized_username = Some(format!("USER-{id}"));
    user.email = Some(format!("{id}@example.com"));
    user.normalized_email = Some(format!("{id}@EXAMPLE.COM"));
    user.password_hash = Some("$argon2id$stub".into());
    user.security_stamp = Some(Uuid::new_v4().to_string());
    user
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn schema_initialization_is_idempotent() {
    let (session, config) = setup().await;

    // A second run must produce no error and no duplicate artifacts.
    Schema::new(&session, &config).initialize().await.unwrap();
    Schema::new(&session, &config).initialize().await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn create_then_find_by_id_round_trips_all_fields() {
    let (session, config) = setup().await;
    let store = ScyllaUserStore::new(session, &config);

    let mut user = sample_user();
    user.two_factor_enabled = true;
    user.set_email_confirmed(true);
    user.add_login(Login::new("google", "key-1", Some("Google".into())))
        .unwrap();
    user.set_token("google", "refresh", "tok");
    user.add_role("ADMIN");

    store.create(&user).await.unwrap();

    let found = store.find_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(found.username, user.username);
    assert_eq!(found.normalized_username, user.normalized_username);
    assert_eq!(found.email, user.email);
    assert_eq!(found.normalized_email, user.normalized_email);
    assert_eq!(found.password_hash, user.password_hash);
    assert_eq!(found.security_stamp, user.security_stamp);
    assert!(found.two_factor_enabled);
    assert!(found.email_confirmed());
    assert_eq!(found.logins, user.logins);
    assert_eq!(found.tokens, user.tokens);
    assert_eq!(found.roles, user.roles);
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn find_by_normalized_username_and_email_use_the_views() {
    let (session, config) = setup().await;
    let store = ScyllaUserStore::new(session, &config);

    let user = sample_user();
    store.create(&user).await.unwrap();

    let by_name = store
        .find_by_username(user.normalized_username.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_name.id, user.id);

    let by_email = store
        .find_by_email(user.normalized_email.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_email.id, user.id);

    assert!(store.find_by_username("NO-SUCH-USER").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn find_by_login_matches_the_stored_entry() {
    let (session, config) = setup().await;
    let store = ScyllaUserStore::new(session, &config);

    let mut user = sample_user();
    let login = Login::new("github", Uuid::new_v4().to_string(), None);
    user.add_login(login.clone()).unwrap();
    store.create(&user).await.unwrap();

    let found = store.find_by_login(&login).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn pruned_sub_records_read_back_as_absent() {
    let (session, config) = setup().await;
    let store = ScyllaUserStore::new(session, &config);

    let mut user = sample_user();
    user.set_lockout_enabled(true);
    user.set_lockout_enabled(false);
    store.create(&user).await.unwrap();
    store.update(&mut user).await.unwrap();

    let found = store.find_by_id(user.id).await.unwrap().unwrap();
    assert!(found.lockout.is_none());
    assert!(found.phone.is_none());
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn renaming_a_role_rewrites_every_holder() {
    let (session, config) = setup().await;
    let users = ScyllaUserStore::new(session.clone(), &config);
    let roles = ScyllaRoleStore::new(session, &config);

    let marker = Uuid::new_v4().simple().to_string();
    let old_name = format!("ADMIN-{marker}");
    let new_name = format!("SUPERADMIN-{marker}");

    let mut role = Role::new(Uuid::new_v4());
    role.name = Some(format!("admin-{marker}"));
    role.normalized_name = Some(old_name.clone());
    roles.create(&role).await.unwrap();

    let mut holders = Vec::new();
    for _ in 0..3 {
        let mut user = sample_user();
        user.add_role(&old_name);
        users.create(&user).await.unwrap();
        holders.push(user.id);
    }

    role.name = Some(format!("superadmin-{marker}"));
    role.normalized_name = Some(new_name.clone());
    roles.update(&role).await.unwrap();

    for id in holders {
        let user = users.find_by_id(id).await.unwrap().unwrap();
        assert!(user.is_in_role(&new_name), "missing new role name");
        assert!(!user.is_in_role(&old_name), "old role name still present");
    }

    let stored = roles.find_by_id(role.id).await.unwrap().unwrap();
    assert_eq!(stored.normalized_name, Some(new_name.clone()));
    assert!(roles.find_by_name(&new_name).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn deleting_a_role_retracts_it_from_every_holder() {
    let (session, config) = setup().await;
    let users = ScyllaUserStore::new(session.clone(), &config);
    let roles = ScyllaRoleStore::new(session, &config);

    let name = format!("AUDITOR-{}", Uuid::new_v4().simple());
    let mut role = Role::new(Uuid::new_v4());
    role.name = Some(name.to_lowercase());
    role.normalized_name = Some(name.clone());
    roles.create(&role).await.unwrap();

    let mut user = sample_user();
    user.add_role(&name);
    users.create(&user).await.unwrap();

    roles.delete(&role).await.unwrap();

    let user = users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(!user.is_in_role(&name));
    assert!(roles.find_by_id(role.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn deleting_a_role_with_zero_holders_succeeds() {
    let (session, config) = setup().await;
    let roles = ScyllaRoleStore::new(session, &config);

    let mut role = Role::new(Uuid::new_v4());
    role.name = Some("orphan".into());
    role.normalized_name = Some(format!("ORPHAN-{}", Uuid::new_v4().simple()));
    roles.create(&role).await.unwrap();

    roles.delete(&role).await.unwrap();
    assert!(roles.find_by_id(role.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn users_in_role_resolves_through_the_index() {
    let (session, config) = setup().await;
    let users = ScyllaUserStore::new(session, &config);

    let name = format!("OPERATORS-{}", Uuid::new_v4().simple());
    let mut member = sample_user();
    member.add_role(&name);
    users.create(&member).await.unwrap();

    let bystander = sample_user();
    users.create(&bystander).await.unwrap();

    let found = users.users_in_role(&name).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, member.id);
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn claim_flow_uses_the_companion_table_and_view() {
    let (session, config) = setup().await;
    let store = ScyllaUserStore::new(session, &config);

    let user = sample_user();
    store.create(&user).await.unwrap();

    let marker = Uuid::new_v4().simple().to_string();
    let department = Claim::new("department", format!("identity-{marker}"));
    let level = Claim::new("level", format!("senior-{marker}"));

    store
        .add_claims(&user, &[department.clone(), level.clone()])
        .await
        .unwrap();
    // The composite key dedupes repeated inserts.
    store.add_claims(&user, &[department.clone()]).await.unwrap();

    let mut claims = store.claims(&user).await.unwrap();
    claims.sort_by(|a, b| a.kind.cmp(&b.kind));
    assert_eq!(claims, vec![department.clone(), level.clone()]);

    let holders = store.users_for_claim(&department).await.unwrap();
    assert_eq!(holders.len(), 1);
    assert_eq!(holders[0].id, user.id);

    let principal = Claim::new("level", format!("principal-{marker}"));
    store
        .replace_claim(&user, &level, &principal)
        .await
        .unwrap();
    store.remove_claims(&user, &[department]).await.unwrap();

    let claims = store.claims(&user).await.unwrap();
    assert_eq!(claims, vec![principal]);
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB cluster (set SCYLLA_URI)"]
async fn role_claims_round_trip() {
    let (session, config) = setup().await;
    let roles = ScyllaRoleStore::new(session, &config);

    let mut role = Role::new(Uuid::new_v4());
    role.name = Some("support".into());
    role.normalized_name = Some(format!("SUPPORT-{}", Uuid::new_v4().simple()));
    roles.create(&role).await.unwrap();

    let claim = Claim::new("permission", "tickets.read");
    roles.add_claim(&role, &claim).await.unwrap();
    assert_eq!(roles.claims(&role).await.unwrap(), vec![claim.clone()]);

    roles.remove_claim(&role, &claim).await.unwrap();
    assert!(roles.claims(&role).await.unwrap().is_empty());
}
