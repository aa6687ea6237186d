//! Local user materialization after a provider accepts a ticket.

use std::sync::Arc;

use chrono::{Duration, Utc};

use kc_core::EventType;
use kc_federation::{AuthFailure, DirectoryCredential, DirectoryEntry, EditMode};
use kc_model::user::attributes;
use kc_model::User;
use kc_storage::UserProvider;

use crate::harness::{DispatcherTestHarness, MemoryDirectory, ProviderSpec};

const REALM: &str = "KEYCLOAK.ORG";
const DN: &str = "uid=user1,ou=People,dc=keycloak,dc=org";

fn entry_changed_days_ago(days: i64) -> DirectoryEntry {
    DirectoryEntry::new(DN, "user1")
        .with_email("user1@keycloak.org")
        .with_credential(DirectoryCredential {
            password: None,
            password_changed_at: Some(Utc::now() - Duration::days(days)),
        })
}

#[tokio::test]
async fn repeated_resolution_updates_the_same_user() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new(
        "kerberos-ldap",
        0,
        REALM,
        Arc::new(MemoryDirectory::new().with_user("user1", "ou=People,dc=keycloak,dc=org")),
    ))?;

    let first = harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;
    let second = harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.user_id, second.user_id);
    assert_eq!(harness.user_count().await?, 1);
    assert_eq!(harness.events.of_type(EventType::UserImported).len(), 1);
    assert_eq!(harness.events.of_type(EventType::UserUpdated).len(), 1);
    Ok(())
}

#[tokio::test]
async fn stale_password_violates_policy_and_writes_nothing() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::with_policy("passwordAge(90)")?;
    harness.add_provider(
        ProviderSpec::new(
            "kerberos-ldap",
            0,
            REALM,
            Arc::new(MemoryDirectory::new().with_entry(entry_changed_days_ago(200))),
        )
        .validate_password_policy(),
    )?;

    let resolution = harness.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await;

    match &resolution.outcome {
        Err(AuthFailure::PasswordPolicyViolation { provider, violations }) => {
            assert_eq!(provider, "kerberos-ldap");
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].rule.name(), "passwordAge");
        }
        other => panic!("expected a policy violation, got {other:?}"),
    }
    // The ticket itself was accepted.
    assert!(resolution.attempts[0].outcome.is_accepted());
    assert_eq!(harness.user_count().await?, 0);
    assert_eq!(harness.events.of_type(EventType::PasswordPolicyError).len(), 1);
    assert!(harness.events.of_type(EventType::Login).is_empty());
    Ok(())
}

#[tokio::test]
async fn recent_password_passes_policy() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::with_policy("passwordAge(90)")?;
    harness.add_provider(
        ProviderSpec::new(
            "kerberos-ldap",
            0,
            REALM,
            Arc::new(MemoryDirectory::new().with_entry(entry_changed_days_ago(10))),
        )
        .validate_password_policy(),
    )?;

    let identity = harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;
    assert!(identity.created);
    Ok(())
}

#[tokio::test]
async fn policy_is_ignored_unless_the_provider_enforces_it() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::with_policy("passwordAge(90)")?;
    harness.add_provider(ProviderSpec::new(
        "kerberos-ldap",
        0,
        REALM,
        Arc::new(MemoryDirectory::new().with_entry(entry_changed_days_ago(200))),
    ))?;

    let identity = harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;
    assert_eq!(identity.username, "user1");
    Ok(())
}

#[tokio::test]
async fn unsynced_provider_keeps_local_edits() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    let directory = Arc::new(
        MemoryDirectory::new()
            .with_entry(DirectoryEntry::new(DN, "user1").with_email("user1@keycloak.org")),
    );
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap", 0, REALM, directory.clone())
            .edit_mode(EditMode::Unsynced),
    )?;

    harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;

    let mut local = harness.user("user1").await?.expect("user imported");
    local.email = Some("someone@example.org".into());
    harness.users.update(&local).await?;

    directory.put(
        DirectoryEntry::new(DN, "user1")
            .with_email("changed@keycloak.org")
            .with_name("Tom", "Brady"),
    );
    harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;

    let user = harness.user("user1").await?.expect("user kept");
    assert_eq!(user.email.as_deref(), Some("someone@example.org"));
    // Empty values are still filled.
    assert_eq!(user.first_name.as_deref(), Some("Tom"));
    Ok(())
}

#[tokio::test]
async fn read_only_provider_refreshes_from_directory() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    let directory = Arc::new(
        MemoryDirectory::new()
            .with_entry(DirectoryEntry::new(DN, "user1").with_group("staff")),
    );
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap", 0, REALM, directory.clone())
            .edit_mode(EditMode::ReadOnly)
            .trust_email(),
    )?;

    harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;

    let mut local = harness.user("user1").await?.expect("user imported");
    local.group_memberships.push("local-only".into());
    harness.users.update(&local).await?;

    directory.put(
        DirectoryEntry::new(DN, "user1")
            .with_email("user1@keycloak.org")
            .with_group("admins"),
    );
    let identity = harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;
    assert_eq!(identity.group_memberships, ["admins"]);

    let user = harness.user("user1").await?.expect("user kept");
    assert_eq!(user.email.as_deref(), Some("user1@keycloak.org"));
    assert!(user.email_verified);
    assert_eq!(user.get_first_attribute(attributes::LDAP_ENTRY_DN), Some(DN));
    Ok(())
}

#[tokio::test]
async fn user_of_another_provider_is_a_conflict() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(
        ProviderSpec::new(
            "kerberos-ldap",
            0,
            REALM,
            Arc::new(MemoryDirectory::new().with_user("user1", "ou=People,dc=keycloak,dc=org")),
        )
        .expected_realm(REALM),
    )?;
    let kc2 = Arc::new(MemoryDirectory::new().with_user("user1", "ou=People,dc=kc2,dc=com"));
    harness.add_provider(
        ProviderSpec::new("kerberos-kc2", 1, "KC2.COM", kc2).expected_realm("KC2.COM"),
    )?;

    harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;
    let resolution = harness.resolve(&harness.ticket("user1@KC2.COM")?).await;

    match &resolution.outcome {
        Err(AuthFailure::IdentityConflict {
            provider,
            username,
            linked_to,
        }) => {
            assert_eq!(provider, "kerberos-kc2");
            assert_eq!(username, "user1");
            assert_eq!(linked_to.as_deref(), Some("kerberos-ldap"));
        }
        other => panic!("expected a conflict, got {other:?}"),
    }

    let user = harness.user("user1").await?.expect("user kept");
    assert!(user.is_linked_to("kerberos-ldap"));
    assert_eq!(
        user.get_first_attribute(attributes::KERBEROS_PRINCIPAL),
        Some("user1@KEYCLOAK.ORG")
    );
    Ok(())
}

#[tokio::test]
async fn local_account_is_never_taken_over() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new(
        "kerberos-ldap",
        0,
        REALM,
        Arc::new(MemoryDirectory::new().with_user("user1", "ou=People,dc=keycloak,dc=org")),
    ))?;
    harness
        .users
        .create(&User::new(harness.realm_id, "user1").with_email("local@example.org"))
        .await?;

    let failure = harness
        .dispatcher
        .resolve(&harness.ticket("user1@KEYCLOAK.ORG")?)
        .await
        .unwrap_err();
    assert!(matches!(
        failure,
        AuthFailure::IdentityConflict { linked_to: None, .. }
    ));
    assert_eq!(failure.public_message(), "authentication failed");
    Ok(())
}
