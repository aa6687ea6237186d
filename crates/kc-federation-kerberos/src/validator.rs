//! Per-provider ticket validation.
//!
//! A [`KerberosTicketValidator`] owns one provider's service credential.
//! The keytab is loaded on every call: concurrent validations share no
//! mutable state and a rotated keytab file takes effect on the next call.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::acceptor::{AuthenticatedPrincipal, KeytabAcceptor, SecurityContextAcceptor};
use crate::error::AcceptError;
use crate::keytab::Keytab;
use crate::principal::PrincipalName;

/// Default tolerated clock difference.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Where a provider's keytab comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum KeytabSource {
    /// Keytab file on disk, read on every validation.
    File(PathBuf),
    /// Keytab bytes held in memory.
    Inline(Arc<[u8]>),
}

impl KeytabSource {
    /// Creates an inline source from a keytab.
    ///
    /// ## Errors
    ///
    /// Returns an error if the keytab cannot be serialized.
    pub fn inline(keytab: &Keytab) -> crate::error::KerberosResult<Self> {
        Ok(Self::Inline(keytab.to_bytes()?.into()))
    }

    /// Loads and parses the keytab.
    ///
    /// ## Errors
    ///
    /// Returns a configuration fault if the keytab is unreadable or invalid.
    pub async fn load(&self) -> Result<Keytab, AcceptError> {
        match self {
            Self::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    AcceptError::configuration(format!("cannot read keytab {}: {e}", path.display()))
                })?;
                Keytab::parse(&bytes).map_err(|e| {
                    AcceptError::configuration(format!("keytab {}: {e}", path.display()))
                })
            }
            Self::Inline(bytes) => Keytab::parse(bytes)
                .map_err(|e| AcceptError::configuration(format!("inline keytab: {e}"))),
        }
    }
}

impl fmt::Debug for KeytabSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Inline(bytes) => write!(f, "Inline([{} bytes])", bytes.len()),
        }
    }
}

/// The service principal and keys a provider accepts tickets with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCredential {
    /// Service principal, e.g. `HTTP/localhost@KEYCLOAK.ORG`.
    pub service_principal: PrincipalName,
    /// Keytab holding the service keys.
    pub keytab: KeytabSource,
}

impl ServiceCredential {
    /// Creates a credential.
    #[must_use]
    pub const fn new(service_principal: PrincipalName, keytab: KeytabSource) -> Self {
        Self {
            service_principal,
            keytab,
        }
    }
}

/// Validates opaque SPNEGO tokens for one provider.
#[async_trait]
pub trait TicketValidator: Send + Sync {
    /// Validates a token and returns the authenticated client.
    ///
    /// ## Errors
    ///
    /// Returns [`AcceptError::Validation`] if the ticket is rejected and
    /// [`AcceptError::Configuration`] if the provider cannot validate at all.
    async fn validate(&self, token: &[u8]) -> Result<AuthenticatedPrincipal, AcceptError>;
}

/// Keytab-based ticket validator.
#[derive(Clone)]
pub struct KerberosTicketValidator {
    credential: ServiceCredential,
    clock_skew: Duration,
    acceptor: Arc<dyn SecurityContextAcceptor>,
}

impl KerberosTicketValidator {
    /// Creates a validator using the bundled keytab acceptor.
    #[must_use]
    pub fn new(credential: ServiceCredential) -> Self {
        Self {
            credential,
            clock_skew: DEFAULT_CLOCK_SKEW,
            acceptor: Arc::new(KeytabAcceptor),
        }
    }

    /// Sets the tolerated clock skew.
    #[must_use]
    pub const fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Replaces the GSS mechanism.
    #[must_use]
    pub fn with_acceptor(mut self, acceptor: Arc<dyn SecurityContextAcceptor>) -> Self {
        self.acceptor = acceptor;
        self
    }

    /// Returns the service credential.
    #[must_use]
    pub const fn credential(&self) -> &ServiceCredential {
        &self.credential
    }
}

impl fmt::Debug for KerberosTicketValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KerberosTicketValidator")
            .field("credential", &self.credential)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TicketValidator for KerberosTicketValidator {
    async fn validate(&self, token: &[u8]) -> Result<AuthenticatedPrincipal, AcceptError> {
        let keytab = self.credential.keytab.load().await?;

        let result = self.acceptor.accept(
            token,
            &self.credential.service_principal,
            &keytab,
            self.clock_skew,
            Utc::now(),
        );

        match &result {
            Ok(accepted) => debug!(
                service = %self.credential.service_principal,
                principal = %accepted.principal,
                kvno = accepted.kvno,
                "Ticket accepted"
            ),
            Err(e) => debug!(
                service = %self.credential.service_principal,
                reason = e.kind(),
                error = %e,
                "Ticket rejected"
            ),
        }

        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::issuer::TicketIssuer;
    use crate::keytab::{EncryptionType, KeytabEntry};
    use crate::spnego::Framing;

    fn service() -> PrincipalName {
        PrincipalName::parse("HTTP/localhost@KEYCLOAK.ORG").unwrap()
    }

    fn client() -> PrincipalName {
        PrincipalName::parse("user1@KEYCLOAK.ORG").unwrap()
    }

    fn keytab() -> Keytab {
        let mut keytab = Keytab::new();
        keytab.add(KeytabEntry::generate(service(), 1, EncryptionType::Aes256));
        keytab
    }

    fn validator(keytab: &Keytab) -> KerberosTicketValidator {
        KerberosTicketValidator::new(ServiceCredential::new(
            service(),
            KeytabSource::inline(keytab).unwrap(),
        ))
    }

    #[tokio::test]
    async fn accepts_valid_ticket() {
        let keytab = keytab();
        let token = TicketIssuer::from_keytab(&keytab, &service())
            .unwrap()
            .ticket(client())
            .mint()
            .unwrap();

        let accepted = validator(&keytab).validate(&token).await.unwrap();
        assert_eq!(accepted.principal, client());
        assert_eq!(accepted.realm(), "KEYCLOAK.ORG");
        assert_eq!(accepted.service, service());
        assert_eq!(accepted.kvno, 1);
    }

    #[tokio::test]
    async fn accepts_raw_krb5_framing() {
        let keytab = keytab();
        let token = TicketIssuer::from_keytab(&keytab, &service())
            .unwrap()
            .ticket(client())
            .framing(Framing::Krb5)
            .mint()
            .unwrap();

        assert!(validator(&keytab).validate(&token).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_keytab_is_cryptographic() {
        let token = TicketIssuer::from_keytab(&keytab(), &service())
            .unwrap()
            .ticket(client())
            .mint()
            .unwrap();

        // same principal and kvno, different key
        let err = validator(&keytab()).validate(&token).await.unwrap_err();
        assert!(matches!(
            err,
            AcceptError::Validation(ValidationError::Cryptographic(_))
        ));
    }

    #[tokio::test]
    async fn ticket_for_other_service_is_cryptographic() {
        let other = PrincipalName::parse("HTTP/localhost@KC2.COM").unwrap();
        let mut other_keytab = Keytab::new();
        other_keytab.add(KeytabEntry::generate(other.clone(), 1, EncryptionType::Aes256));
        let token = TicketIssuer::from_keytab(&other_keytab, &other)
            .unwrap()
            .ticket(client())
            .mint()
            .unwrap();

        let err = validator(&keytab()).validate(&token).await.unwrap_err();
        assert!(matches!(
            err,
            AcceptError::Validation(ValidationError::Cryptographic(_))
        ));
    }

    #[tokio::test]
    async fn expired_ticket_is_rejected() {
        let keytab = keytab();
        let now = Utc::now();
        let token = TicketIssuer::from_keytab(&keytab, &service())
            .unwrap()
            .ticket(client())
            .valid_between(now - chrono::Duration::hours(10), now - chrono::Duration::hours(1))
            .mint()
            .unwrap();

        let err = validator(&keytab).validate(&token).await.unwrap_err();
        assert_eq!(err, AcceptError::Validation(ValidationError::Expired));
    }

    #[tokio::test]
    async fn clock_skew_is_tolerated() {
        let keytab = keytab();
        let now = Utc::now();
        let token = TicketIssuer::from_keytab(&keytab, &service())
            .unwrap()
            .ticket(client())
            .valid_between(now - chrono::Duration::hours(1), now - chrono::Duration::seconds(60))
            .mint()
            .unwrap();

        assert!(validator(&keytab).validate(&token).await.is_ok());

        let strict = validator(&keytab).with_clock_skew(Duration::from_secs(5));
        assert_eq!(
            strict.validate(&token).await.unwrap_err(),
            AcceptError::Validation(ValidationError::Expired)
        );
    }

    #[tokio::test]
    async fn future_ticket_is_rejected() {
        let keytab = keytab();
        let now = Utc::now();
        let token = TicketIssuer::from_keytab(&keytab, &service())
            .unwrap()
            .ticket(client())
            .valid_between(now + chrono::Duration::hours(1), now + chrono::Duration::hours(2))
            .mint()
            .unwrap();

        let err = validator(&keytab).validate(&token).await.unwrap_err();
        assert_eq!(err, AcceptError::Validation(ValidationError::Expired));
    }

    #[tokio::test]
    async fn malformed_token_is_rejected() {
        let err = validator(&keytab()).validate(b"garbage").await.unwrap_err();
        assert!(matches!(
            err,
            AcceptError::Validation(ValidationError::MalformedToken(_))
        ));
    }

    #[tokio::test]
    async fn missing_keytab_file_is_configuration_fault() {
        let validator = KerberosTicketValidator::new(ServiceCredential::new(
            service(),
            KeytabSource::File(PathBuf::from("/nonexistent/http.keytab")),
        ));

        let err = validator.validate(b"anything").await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn corrupt_keytab_is_configuration_fault() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.keytab");
        std::fs::write(&path, b"definitely not a keytab").unwrap();

        let validator = KerberosTicketValidator::new(ServiceCredential::new(
            service(),
            KeytabSource::File(path),
        ));

        assert!(validator.validate(b"x").await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn rotated_keytab_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("http.keytab");

        let old = keytab();
        old.write(&path).unwrap();
        let validator = KerberosTicketValidator::new(ServiceCredential::new(
            service(),
            KeytabSource::File(path.clone()),
        ));
        let old_ticket = TicketIssuer::from_keytab(&old, &service())
            .unwrap()
            .ticket(client())
            .mint()
            .unwrap();
        assert!(validator.validate(&old_ticket).await.is_ok());

        let mut rotated = Keytab::new();
        rotated.add(KeytabEntry::generate(service(), 2, EncryptionType::Aes256));
        rotated.write(&path).unwrap();
        let new_ticket = TicketIssuer::from_keytab(&rotated, &service())
            .unwrap()
            .ticket(client())
            .mint()
            .unwrap();

        assert!(validator.validate(&new_ticket).await.is_ok());
        assert!(validator.validate(&old_ticket).await.is_err());
    }

    #[tokio::test]
    async fn kvno_zero_uses_newest_key() {
        let mut keytab = Keytab::new();
        keytab.add(KeytabEntry::generate(service(), 1, EncryptionType::Aes256));
        keytab.add(KeytabEntry::generate(service(), 5, EncryptionType::Aes256));

        let token = TicketIssuer::from_keytab(&keytab, &service())
            .unwrap()
            .ticket(client())
            .kvno(0)
            .mint()
            .unwrap();

        let accepted = validator(&keytab).validate(&token).await.unwrap();
        assert_eq!(accepted.kvno, 5);
    }

    #[tokio::test]
    async fn concurrent_validations_are_independent() {
        let keytab = keytab();
        let validator = Arc::new(validator(&keytab));
        let issuer = TicketIssuer::from_keytab(&keytab, &service()).unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let principal = PrincipalName::parse(&format!("user{i}@KEYCLOAK.ORG")).unwrap();
            let token = issuer.ticket(principal.clone()).mint().unwrap();
            let validator = Arc::clone(&validator);
            handles.push(tokio::spawn(async move {
                let accepted = validator.validate(&token).await.unwrap();
                assert_eq!(accepted.principal, principal);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[test]
    fn inline_source_debug_hides_bytes() {
        let source = KeytabSource::inline(&keytab()).unwrap();
        assert!(format!("{source:?}").starts_with("Inline(["));
    }
}
