//! Ticket issuing.
//!
//! Stands in for a KDC: seals service tickets with a key from the service's
//! keytab. Used by scenario tests and the `kc ticket mint` command.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{KerberosError, KerberosResult};
use crate::keytab::{Keytab, KeytabEntry};
use crate::principal::PrincipalName;
use crate::spnego::{self, Framing};
use crate::ticket::{ApReq, EncTicketPart, TicketHeader};

/// Default ticket lifetime.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(10 * 60 * 60);

/// Issues tickets for one service key.
#[derive(Debug, Clone)]
pub struct TicketIssuer {
    entry: KeytabEntry,
}

impl TicketIssuer {
    /// Creates an issuer for a keytab entry.
    ///
    /// ## Errors
    ///
    /// Returns an error if the entry's enctype is not supported.
    pub fn new(entry: KeytabEntry) -> KerberosResult<Self> {
        if entry.etype().is_none() {
            return Err(KerberosError::keytab(format!(
                "unsupported enctype {}",
                entry.key_type
            )));
        }
        Ok(Self { entry })
    }

    /// Creates an issuer from the newest key for `service` in `keytab`.
    ///
    /// ## Errors
    ///
    /// Returns `KeyNotFound` if the keytab has no usable key for `service`.
    pub fn from_keytab(keytab: &Keytab, service: &PrincipalName) -> KerberosResult<Self> {
        let entry = keytab
            .newest_key(service)
            .ok_or_else(|| KerberosError::KeyNotFound(service.to_string()))?;
        Self::new(entry.clone())
    }

    /// Service principal tickets are issued for.
    #[must_use]
    pub const fn service(&self) -> &PrincipalName {
        &self.entry.principal
    }

    /// Starts a ticket for `client`.
    #[must_use]
    pub fn ticket(&self, client: PrincipalName) -> TicketRequest<'_> {
        let now = Utc::now();
        TicketRequest {
            issuer: self,
            client,
            start: now,
            end: now + delta(DEFAULT_LIFETIME),
            kvno: self.entry.kvno,
            header_realm: None,
            framing: Framing::Spnego,
        }
    }
}

fn delta(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}

/// Builder for a single ticket.
#[derive(Debug)]
pub struct TicketRequest<'a> {
    issuer: &'a TicketIssuer,
    client: PrincipalName,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    kvno: u32,
    header_realm: Option<String>,
    framing: Framing,
}

impl TicketRequest<'_> {
    /// Sets the validity window.
    #[must_use]
    pub const fn valid_between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Sets the lifetime, starting now.
    #[must_use]
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.start = Utc::now();
        self.end = self.start + delta(lifetime);
        self
    }

    /// Overrides the kvno written to the header. Zero means "any version".
    #[must_use]
    pub const fn kvno(mut self, kvno: u32) -> Self {
        self.kvno = kvno;
        self
    }

    /// Overrides the cleartext realm, which defaults to the service realm.
    #[must_use]
    pub fn header_realm(mut self, realm: impl Into<String>) -> Self {
        self.header_realm = Some(realm.into());
        self
    }

    /// Sets the outer framing.
    #[must_use]
    pub const fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Seals and frames the ticket.
    ///
    /// ## Errors
    ///
    /// Returns an error if sealing fails.
    pub fn mint(self) -> KerberosResult<Vec<u8>> {
        let service = self.issuer.service();
        let header = TicketHeader {
            realm: self
                .header_realm
                .unwrap_or_else(|| service.realm().to_string()),
            sname: service.to_string(),
            kvno: self.kvno,
            etype: self.issuer.entry.key_type,
        };
        let part = EncTicketPart {
            cname: self.client.to_string(),
            authtime: self.start.timestamp(),
            starttime: self.start.timestamp(),
            endtime: self.end.timestamp(),
        };

        let request = ApReq::seal(header, &part, &self.issuer.entry.key)?;
        spnego::wrap(&request.encode(), self.framing)
    }
}
