//! Multi-realm dispatch scenarios.
//!
//! Realm layout used throughout:
//! - `KEYCLOAK.ORG` with directories for group A and group B
//! - `KC2.COM` with its own directory
//!
//! Clients of `KC2.COM` reach the `KEYCLOAK.ORG` service through a
//! cross-realm ticket, so realm binding is decided by the client realm.

use std::sync::Arc;
use std::time::Duration;

use kc_core::EventType;
use kc_federation::{AttemptOutcome, AuthFailure, LookupError};
use kc_model::user::attributes;

use crate::harness::{DispatcherTestHarness, MemoryDirectory, ProviderSpec};

const KEYCLOAK: &str = "KEYCLOAK.ORG";
const KC2: &str = "KC2.COM";

fn group_a() -> Arc<MemoryDirectory> {
    Arc::new(
        MemoryDirectory::new()
            .with_user("user1", "ou=People,dc=keycloak,dc=org")
            .with_user("user2", "ou=People,dc=keycloak,dc=org"),
    )
}

fn group_b() -> Arc<MemoryDirectory> {
    Arc::new(MemoryDirectory::new().with_user("user1B", "ou=GroupB,dc=keycloak,dc=org"))
}

fn kc2() -> Arc<MemoryDirectory> {
    Arc::new(MemoryDirectory::new().with_user("user1C", "ou=People,dc=kc2,dc=com"))
}

/// Scenario A: a single wildcard provider.
#[tokio::test]
async fn single_wildcard_provider_imports_user() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new("kerberos-ldap", 0, KEYCLOAK, group_a()))?;

    let resolution = harness.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await;
    let identity = resolution.outcome?;

    assert_eq!(identity.username, "user1");
    assert_eq!(identity.source_provider, "kerberos-ldap");
    assert_eq!(identity.principal, "user1@KEYCLOAK.ORG");
    assert_eq!(identity.directory_dn, "uid=user1,ou=People,dc=keycloak,dc=org");
    assert!(identity.created);

    let user = harness.user("user1").await?.expect("user imported");
    assert_eq!(user.federation_link.as_deref(), Some("kerberos-ldap"));
    assert_eq!(user.email.as_deref(), Some("user1@keycloak.org"));
    assert_eq!(
        user.get_first_attribute(attributes::KERBEROS_PRINCIPAL),
        Some("user1@KEYCLOAK.ORG")
    );

    assert_eq!(resolution.attempts.len(), 1);
    assert!(resolution.attempts[0].outcome.is_accepted());
    assert_eq!(harness.events.of_type(EventType::Login).len(), 1);
    assert_eq!(harness.events.of_type(EventType::UserImported).len(), 1);
    Ok(())
}

/// Scenario B: three realm-bound providers behind one service principal,
/// ticket from a client of the second realm.
#[tokio::test]
async fn ticket_routes_to_provider_of_its_realm() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap-groupA", 0, KEYCLOAK, group_a()).expected_realm(KEYCLOAK),
    )?;
    harness.add_provider(
        ProviderSpec::new("kerberos-kc2", 1, KEYCLOAK, kc2()).expected_realm(KC2),
    )?;
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap-groupB", 2, KEYCLOAK, group_b()).expected_realm(KEYCLOAK),
    )?;

    let ticket = harness.cross_realm_ticket("user1C@KC2.COM", KEYCLOAK)?;
    let resolution = harness.resolve(&ticket).await;
    let identity = resolution.outcome?;

    assert_eq!(identity.source_provider, "kerberos-kc2");
    assert_eq!(identity.username, "user1c");
    assert_eq!(identity.principal, "user1C@KC2.COM");
    assert_eq!(identity.directory_dn, "uid=user1C,ou=People,dc=kc2,dc=com");

    let kinds: Vec<_> = resolution.attempts.iter().map(|a| a.outcome.kind()).collect();
    assert_eq!(kinds, ["realm_mismatch", "accepted"]);
    match &resolution.attempts[0].outcome {
        AttemptOutcome::RealmMismatch { expected, actual } => {
            assert_eq!(expected, KEYCLOAK);
            assert_eq!(actual, KC2);
        }
        other => panic!("unexpected outcome {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn cross_realm_client_binds_by_client_realm() -> anyhow::Result<()> {
    // Service ticket for HTTP/localhost@KEYCLOAK.ORG held by a KC2.COM client.
    let accepting = DispatcherTestHarness::new()?;
    accepting.add_provider(
        ProviderSpec::new("kerberos-kc2", 0, KEYCLOAK, kc2()).expected_realm(KC2),
    )?;
    let ticket = accepting.cross_realm_ticket("user1C@KC2.COM", KEYCLOAK)?;

    let resolution = accepting.resolve(&ticket).await;
    assert_eq!(resolution.attempts.len(), 1);
    let identity = resolution.outcome?;
    assert_eq!(identity.source_provider, "kerberos-kc2");
    assert_eq!(identity.principal, "user1C@KC2.COM");

    let rejecting = DispatcherTestHarness::new()?;
    let directory = kc2();
    rejecting.add_provider(
        ProviderSpec::new("kerberos-keycloak", 0, KEYCLOAK, directory.clone())
            .expected_realm(KEYCLOAK),
    )?;
    let ticket = rejecting.cross_realm_ticket("user1C@KC2.COM", KEYCLOAK)?;

    let resolution = rejecting.resolve(&ticket).await;
    let Err(AuthFailure::AllProvidersExhausted { attempts }) = &resolution.outcome else {
        panic!("expected exhaustion, got {:?}", resolution.outcome);
    };
    assert_eq!(
        attempts[0].outcome,
        AttemptOutcome::RealmMismatch {
            expected: KEYCLOAK.to_string(),
            actual: KC2.to_string(),
        }
    );
    assert_eq!(directory.lookups(), 0);
    assert_eq!(rejecting.user_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn service_realm_is_not_a_routing_hint() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    // Bound to KC2.COM clients but holding the KEYCLOAK.ORG service key.
    harness.add_provider(
        ProviderSpec::new("kerberos-kc2-via-keycloak", 0, KEYCLOAK, kc2()).expected_realm(KC2),
    )?;
    harness.add_provider(ProviderSpec::new("kerberos-kc2", 1, KC2, kc2()).expected_realm(KC2))?;

    // Sealed for HTTP/localhost@KC2.COM: the first provider cannot open it.
    let resolution = harness.resolve(&harness.ticket("user1C@KC2.COM")?).await;

    let kinds: Vec<_> = resolution.attempts.iter().map(|a| a.outcome.kind()).collect();
    assert_eq!(kinds, ["cryptographic", "accepted"]);
    assert_eq!(resolution.outcome?.source_provider, "kerberos-kc2");
    Ok(())
}

#[tokio::test]
async fn realm_binding_beats_priority() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    // Both providers can open KEYCLOAK.ORG tickets; only the second is bound to it.
    harness.add_provider(
        ProviderSpec::new("kerberos-kc2", 0, KEYCLOAK, kc2()).expected_realm(KC2),
    )?;
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap-groupA", 10, KEYCLOAK, group_a()).expected_realm(KEYCLOAK),
    )?;

    let identity = harness.dispatcher.resolve(&harness.ticket("user2@KEYCLOAK.ORG")?).await?;
    assert_eq!(identity.source_provider, "kerberos-ldap-groupA");
    Ok(())
}

#[tokio::test]
async fn wildcards_resolve_in_priority_order() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    let late = group_a();
    harness.add_provider(ProviderSpec::new("kerberos-late", 5, KEYCLOAK, late.clone()))?;
    harness.add_provider(ProviderSpec::new("kerberos-early", 1, KEYCLOAK, group_a()))?;

    let resolution = harness.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await;
    assert_eq!(resolution.outcome?.source_provider, "kerberos-early");
    assert_eq!(resolution.attempts.len(), 1);
    assert_eq!(late.lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn equal_priorities_keep_registration_order() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new("kerberos-first", 3, KEYCLOAK, group_a()))?;
    harness.add_provider(ProviderSpec::new("kerberos-second", 3, KEYCLOAK, group_a()))?;

    let identity = harness.dispatcher.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await?;
    assert_eq!(identity.source_provider, "kerberos-first");
    Ok(())
}

/// Scenario C: no provider is bound to the ticket's realm.
#[tokio::test]
async fn all_realms_mismatch_exhausts_providers() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    let directory = group_a();
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap-groupA", 0, KEYCLOAK, directory.clone())
            .expected_realm(KEYCLOAK),
    )?;
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap-groupB", 1, KEYCLOAK, group_b()).expected_realm(KEYCLOAK),
    )?;

    let ticket = harness.cross_realm_ticket("user1C@KC2.COM", KEYCLOAK)?;
    let resolution = harness.resolve(&ticket).await;

    let Err(AuthFailure::AllProvidersExhausted { attempts }) = &resolution.outcome else {
        panic!("expected exhaustion, got {:?}", resolution.outcome);
    };
    assert_eq!(attempts.len(), 2);
    assert!(attempts
        .iter()
        .all(|a| matches!(a.outcome, AttemptOutcome::RealmMismatch { .. })));

    // Mismatched providers are never asked for the user.
    assert_eq!(directory.lookups(), 0);
    assert_eq!(harness.user_count().await?, 0);
    assert_eq!(harness.events.of_type(EventType::LoginError).len(), 1);
    Ok(())
}

/// Scenario D: the first provider's directory is too slow.
#[tokio::test]
async fn directory_timeout_falls_through_to_next_provider() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    let slow = Arc::new(
        MemoryDirectory::new()
            .with_user("user1", "ou=Slow,dc=keycloak,dc=org")
            .with_delay(Duration::from_secs(5)),
    );
    harness.add_provider(
        ProviderSpec::new("kerberos-slow", 0, KEYCLOAK, slow.clone())
            .lookup_timeout(Duration::from_millis(50)),
    )?;
    harness.add_provider(ProviderSpec::new("kerberos-ldap", 1, KEYCLOAK, group_a()))?;

    let started = std::time::Instant::now();
    let resolution = harness.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await;
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(matches!(
        resolution.attempts[0].outcome,
        AttemptOutcome::DirectoryLookupFailed(LookupError::Timeout)
    ));
    assert_eq!(slow.lookups(), 1);

    let identity = resolution.outcome?;
    assert_eq!(identity.source_provider, "kerberos-ldap");
    assert_eq!(identity.directory_dn, "uid=user1,ou=People,dc=keycloak,dc=org");
    Ok(())
}

#[tokio::test]
async fn lookup_failures_are_recorded_and_skipped() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new(
        "kerberos-down",
        0,
        KEYCLOAK,
        Arc::new(MemoryDirectory::unreachable()),
    ))?;
    harness.add_provider(ProviderSpec::new("kerberos-groupB", 1, KEYCLOAK, group_b()))?;
    harness.add_provider(ProviderSpec::new("kerberos-groupA", 2, KEYCLOAK, group_a()))?;

    let resolution = harness.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await;

    let kinds: Vec<_> = resolution.attempts.iter().map(|a| a.outcome.kind()).collect();
    assert_eq!(kinds, ["connection_error", "not_found", "accepted"]);
    assert_eq!(resolution.outcome?.source_provider, "kerberos-groupA");
    Ok(())
}

#[tokio::test]
async fn disabled_providers_are_not_consulted() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new("kerberos-off", 0, KEYCLOAK, group_a()).disabled())?;

    let resolution = harness.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await;
    assert!(matches!(
        resolution.outcome,
        Err(AuthFailure::AllProvidersExhausted { ref attempts }) if attempts.is_empty()
    ));
    Ok(())
}

#[tokio::test]
async fn negotiate_header_is_resolved() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new("kerberos-ldap", 0, KEYCLOAK, group_a()))?;

    let ticket = harness.ticket("user2@KEYCLOAK.ORG")?;
    let header = kc_federation_kerberos::NegotiateHeader::encode(ticket.token());
    let identity = harness.dispatcher.resolve_negotiate(&header).await?;
    assert_eq!(identity.username, "user2");

    let failure = harness
        .dispatcher
        .resolve_negotiate("Basic dXNlcjI6c2VjcmV0")
        .await
        .unwrap_err();
    assert!(matches!(
        failure,
        AuthFailure::AllProvidersExhausted { ref attempts } if attempts.is_empty()
    ));
    assert_eq!(failure.public_message(), "authentication failed");
    Ok(())
}
