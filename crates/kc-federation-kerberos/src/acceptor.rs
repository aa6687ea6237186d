//! GSS security context acceptance.
//!
//! [`SecurityContextAcceptor`] is the seam between ticket validation policy
//! and the mechanism that actually opens tickets. [`KeytabAcceptor`] opens
//! tickets sealed by [`crate::issuer::TicketIssuer`] with keys from a
//! keytab; a platform GSS-API binding can implement the same trait.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::keytab::Keytab;
use crate::principal::PrincipalName;
use crate::spnego;
use crate::ticket::ApReq;

/// A client principal whose ticket was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    /// Authenticated client principal. Its realm is authoritative.
    pub principal: PrincipalName,
    /// Service principal the ticket was issued for.
    pub service: PrincipalName,
    /// Initial authentication time.
    pub auth_time: DateTime<Utc>,
    /// Ticket end time.
    pub expires_at: DateTime<Utc>,
    /// Key version that opened the ticket.
    pub kvno: u32,
}

impl AuthenticatedPrincipal {
    /// Realm of the authenticated client.
    #[must_use]
    pub fn realm(&self) -> &str {
        self.principal.realm()
    }
}

/// Accepts a GSS initial context token for a service.
pub trait SecurityContextAcceptor: Send + Sync {
    /// Validates `token` against the service's keys at time `now`.
    ///
    /// ## Errors
    ///
    /// Returns a [`ValidationError`] describing why the ticket was rejected.
    fn accept(
        &self,
        token: &[u8],
        service: &PrincipalName,
        keytab: &Keytab,
        clock_skew: Duration,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedPrincipal, ValidationError>;
}

/// Keytab-backed acceptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeytabAcceptor;

impl SecurityContextAcceptor for KeytabAcceptor {
    fn accept(
        &self,
        token: &[u8],
        service: &PrincipalName,
        keytab: &Keytab,
        clock_skew: Duration,
        now: DateTime<Utc>,
    ) -> Result<AuthenticatedPrincipal, ValidationError> {
        let request = ApReq::decode(spnego::unwrap(token)?)?;
        let header = request.header();

        let sname = PrincipalName::parse(&header.sname)
            .map_err(|e| ValidationError::malformed(e.to_string()))?;
        if &sname != service {
            return Err(ValidationError::crypto(format!(
                "ticket is for {sname}, not {service}"
            )));
        }

        let entry = keytab
            .find_key(service, header.kvno, header.etype)
            .ok_or_else(|| {
                ValidationError::crypto(format!(
                    "no key for kvno {} enctype {}",
                    header.kvno, header.etype
                ))
            })?;

        let part = request.open(&entry.key)?;

        let starts_at = part.starts_at()?;
        let ends_at = part.ends_at()?;
        let auth_time = part.auth_time()?;
        if !within_lifetime(starts_at, ends_at, clock_skew, now) {
            return Err(ValidationError::Expired);
        }

        let principal = PrincipalName::parse(&part.cname)
            .map_err(|e| ValidationError::malformed(e.to_string()))?;

        Ok(AuthenticatedPrincipal {
            principal,
            service: sname,
            auth_time,
            expires_at: ends_at,
            kvno: entry.kvno,
        })
    }
}

/// True if `now` lies in `[starts_at - skew, ends_at + skew]`.
///
/// A bound that overflows the calendar saturates instead of wrapping.
fn within_lifetime(
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    clock_skew: Duration,
    now: DateTime<Utc>,
) -> bool {
    let skew = chrono::Duration::from_std(clock_skew).unwrap_or(chrono::Duration::MAX);
    let not_before = starts_at
        .checked_sub_signed(skew)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let not_after = ends_at
        .checked_add_signed(skew)
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    not_before <= now && now <= not_after
}

/// Reads the cleartext service realm of a token without any cryptography.
///
/// This is the realm of the service the ticket was issued for. A
/// cross-realm client authenticates from another realm, so the value says
/// nothing about the client. Returns `None` if the token cannot be decoded.
#[must_use]
pub fn peek_service_realm(token: &[u8]) -> Option<String> {
    let inner = spnego::unwrap(token).ok()?;
    ApReq::decode(inner).ok().map(|req| req.header().realm.clone())
}
