//! Provider registration while tickets are being resolved.

use std::sync::Arc;

use kc_core::EventType;
use kc_federation::{AuthFailure, ConfigurationStore, FederationError};

use crate::harness::{DispatcherTestHarness, MemoryDirectory, ProviderSpec};

const REALM: &str = "KEYCLOAK.ORG";

fn people() -> Arc<MemoryDirectory> {
    Arc::new(
        MemoryDirectory::new()
            .with_user("user1", "ou=People,dc=keycloak,dc=org")
            .with_user("user2", "ou=People,dc=keycloak,dc=org")
            .with_user("user3", "ou=People,dc=keycloak,dc=org"),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dispatch_survives_concurrent_registry_changes() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap", 10, REALM, people()).expected_realm(REALM),
    )?;

    let mut tickets = Vec::new();
    for i in 0..48 {
        tickets.push(harness.ticket(&format!("user{}@KEYCLOAK.ORG", i % 3 + 1))?);
    }

    let handles: Vec<_> = tickets
        .into_iter()
        .map(|ticket| {
            let dispatcher = harness.dispatcher.clone();
            tokio::spawn(async move { dispatcher.resolve(&ticket).await })
        })
        .collect();

    // Churn providers bound to another realm; they never match these tickets.
    for round in 0..16 {
        let name = format!("kerberos-kc2-{round}");
        harness.add_provider(
            ProviderSpec::new(&name, round % 3, "KC2.COM", people()).expected_realm("KC2.COM"),
        )?;
        tokio::task::yield_now().await;
        harness.remove_provider(&name)?;
    }

    for joined in futures::future::join_all(handles).await {
        let identity = joined??;
        assert_eq!(identity.source_provider, "kerberos-ldap");
    }

    assert_eq!(harness.user_count().await?, 3);
    assert_eq!(harness.events.of_type(EventType::UserImported).len(), 3);
    assert_eq!(harness.events.of_type(EventType::Login).len(), 48);
    assert_eq!(harness.config_store.components().len(), 1);
    Ok(())
}

#[tokio::test]
async fn removed_provider_stops_resolving() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new("kerberos-ldap", 0, REALM, people()))?;
    let ticket = harness.ticket("user2@KEYCLOAK.ORG")?;

    harness.dispatcher.resolve(&ticket).await?;
    harness.remove_provider("kerberos-ldap")?;

    let failure = harness.dispatcher.resolve(&ticket).await.unwrap_err();
    assert!(matches!(failure, AuthFailure::AllProvidersExhausted { .. }));
    assert_eq!(harness.events.of_type(EventType::ProviderRemoved).len(), 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_names_are_rejected() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new("kerberos-ldap", 0, REALM, people()))?;

    let err = harness
        .add_provider(ProviderSpec::new("kerberos-ldap", 1, REALM, people()))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FederationError>(),
        Some(FederationError::DuplicateProvider(_))
    ));
    assert_eq!(harness.dispatcher.registry().len(), 1);
    Ok(())
}
