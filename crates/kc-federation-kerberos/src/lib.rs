//! # kc-federation-kerberos
//!
//! Kerberos/SPNEGO ticket validation for user storage providers.
//!
//! ## Components
//!
//! - [`spnego`] - SPNEGO / GSS framing and the `Negotiate` header
//! - [`keytab`] - MIT keytab reading and writing
//! - [`ticket`] - sealed service ticket format
//! - [`acceptor`] - the GSS mechanism seam
//! - [`validator`] - per-provider [`TicketValidator`]
//! - [`issuer`] - ticket minting for tests and tooling
//!
//! ## NIST 800-53 Rev5 Controls
//!
//! - IA-2: Identification and authentication
//! - SC-12: Cryptographic key management
//! - SC-13: Cryptographic protection

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod acceptor;
pub mod error;
pub mod issuer;
pub mod keytab;
pub mod principal;
pub mod spnego;
pub mod ticket;
pub mod validator;

pub use acceptor::{peek_service_realm, AuthenticatedPrincipal, KeytabAcceptor, SecurityContextAcceptor};
pub use error::{AcceptError, KerberosError, KerberosResult, ValidationError};
pub use issuer::TicketIssuer;
pub use keytab::{EncryptionType, Keytab, KeytabEntry};
pub use principal::PrincipalName;
pub use spnego::{Framing, NegotiateHeader};
pub use validator::{KerberosTicketValidator, KeytabSource, ServiceCredential, TicketValidator};
