//! Ticket validation failures and how dispatch continues past them.

use std::sync::Arc;

use chrono::{Duration, Utc};

use kc_federation::{AttemptOutcome, AuthFailure};
use kc_federation_kerberos::ValidationError;

use crate::harness::{DispatcherTestHarness, MemoryDirectory, ProviderSpec};

const REALM: &str = "KEYCLOAK.ORG";

fn directory() -> Arc<MemoryDirectory> {
    Arc::new(MemoryDirectory::new().with_user("user1", "ou=People,dc=keycloak,dc=org"))
}

fn single_provider() -> anyhow::Result<DispatcherTestHarness> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(ProviderSpec::new("kerberos-ldap", 0, REALM, directory()))?;
    Ok(harness)
}

fn only_attempt(outcome: &Result<kc_federation::ResolvedIdentity, AuthFailure>) -> &AttemptOutcome {
    match outcome {
        Err(AuthFailure::AllProvidersExhausted { attempts }) if attempts.len() == 1 => {
            &attempts[0].outcome
        }
        other => panic!("expected a single failed attempt, got {other:?}"),
    }
}

#[tokio::test]
async fn expired_ticket_is_rejected() -> anyhow::Result<()> {
    let harness = single_provider()?;
    let now = Utc::now();
    let ticket = harness.kdc(REALM)?.ticket_between(
        "user1@KEYCLOAK.ORG",
        now - Duration::hours(10),
        now - Duration::hours(1),
    )?;

    let resolution = harness.resolve(&ticket).await;
    assert_eq!(
        only_attempt(&resolution.outcome),
        &AttemptOutcome::ValidationFailed(ValidationError::Expired)
    );
    assert_eq!(harness.user_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn postdated_ticket_is_rejected() -> anyhow::Result<()> {
    let harness = single_provider()?;
    let now = Utc::now();
    let ticket = harness.kdc(REALM)?.ticket_between(
        "user1@KEYCLOAK.ORG",
        now + Duration::hours(1),
        now + Duration::hours(10),
    )?;

    let resolution = harness.resolve(&ticket).await;
    assert_eq!(
        only_attempt(&resolution.outcome),
        &AttemptOutcome::ValidationFailed(ValidationError::Expired)
    );
    Ok(())
}

#[tokio::test]
async fn clock_skew_is_tolerated() -> anyhow::Result<()> {
    let harness = single_provider()?;
    let now = Utc::now();
    let ticket = harness.kdc(REALM)?.ticket_between(
        "user1@KEYCLOAK.ORG",
        now - Duration::hours(10),
        now - Duration::seconds(60),
    )?;

    let identity = harness.dispatcher.resolve(&ticket).await?;
    assert_eq!(identity.username, "user1");
    Ok(())
}

#[tokio::test]
async fn tampered_ticket_is_rejected() -> anyhow::Result<()> {
    let harness = single_provider()?;
    let mut token = harness.ticket("user1@KEYCLOAK.ORG")?.token().to_vec();
    let last = token.len() - 1;
    token[last] ^= 0x01;

    let resolution = harness
        .resolve(&kc_federation::InboundTicket::new(token))
        .await;
    assert!(matches!(
        only_attempt(&resolution.outcome),
        AttemptOutcome::ValidationFailed(_)
    ));
    assert_eq!(harness.user_count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn garbage_token_is_malformed() -> anyhow::Result<()> {
    let harness = single_provider()?;
    let resolution = harness
        .resolve(&kc_federation::InboundTicket::new(b"not a ticket".to_vec()))
        .await;
    assert!(matches!(
        only_attempt(&resolution.outcome),
        AttemptOutcome::ValidationFailed(ValidationError::MalformedToken(_))
    ));
    Ok(())
}

#[tokio::test]
async fn wrong_service_key_fails_cryptographically() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    let rogue = harness.rogue_keytab(REALM)?;
    harness.add_provider(ProviderSpec::new("kerberos-rogue", 0, REALM, directory()).keytab(rogue))?;

    let resolution = harness.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await;
    assert!(matches!(
        only_attempt(&resolution.outcome),
        AttemptOutcome::ValidationFailed(ValidationError::Cryptographic(_))
    ));
    Ok(())
}

#[tokio::test]
async fn ticket_for_another_service_fails_cryptographically() -> anyhow::Result<()> {
    let harness = single_provider()?;
    // KC2.COM service ticket presented to a KEYCLOAK.ORG wildcard provider.
    let resolution = harness.resolve(&harness.ticket("user1@KC2.COM")?).await;
    assert!(matches!(
        only_attempt(&resolution.outcome),
        AttemptOutcome::ValidationFailed(ValidationError::Cryptographic(_))
    ));
    Ok(())
}

#[tokio::test]
async fn unreadable_keytab_is_a_configuration_fault() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(
        ProviderSpec::new("kerberos-broken", 0, REALM, directory())
            .keytab(harness.missing_keytab()),
    )?;
    harness.add_provider(ProviderSpec::new("kerberos-ldap", 1, REALM, directory()))?;

    let resolution = harness.resolve(&harness.ticket("user1@KEYCLOAK.ORG")?).await;

    assert!(matches!(
        resolution.attempts[0].outcome,
        AttemptOutcome::ConfigurationFault(_)
    ));
    assert_eq!(resolution.attempts[0].provider, "kerberos-broken");
    assert_eq!(resolution.outcome?.source_provider, "kerberos-ldap");
    Ok(())
}

#[tokio::test]
async fn asserted_principal_is_only_a_hint() -> anyhow::Result<()> {
    let harness = DispatcherTestHarness::new()?;
    harness.add_provider(
        ProviderSpec::new("kerberos-ldap", 0, REALM, directory()).expected_realm(REALM),
    )?;

    // Claiming another realm routes the ticket away from the provider.
    let ticket = harness
        .ticket("user1@KEYCLOAK.ORG")?
        .with_asserted_principal(kc_federation_kerberos::PrincipalName::parse("user1@KC2.COM")?);
    let resolution = harness.resolve(&ticket).await;
    assert!(matches!(
        only_attempt(&resolution.outcome),
        AttemptOutcome::RealmMismatch { .. }
    ));
    Ok(())
}
