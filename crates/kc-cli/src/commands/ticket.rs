//! Ticket minting and inspection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use kc_federation_kerberos::ticket::ApReq;
use kc_federation_kerberos::{
    spnego, EncryptionType, Framing, KerberosTicketValidator, Keytab, KeytabSource,
    NegotiateHeader, PrincipalName, ServiceCredential, TicketIssuer, TicketValidator,
};
use serde::Serialize;

use crate::cli::TicketCommand;
use crate::config::OutputFormat;
use crate::error::CliError;
use crate::output::output_single;
use crate::CliConfig;

/// What `ticket inspect` reports.
#[derive(Debug, Serialize)]
pub struct TicketSummary {
    /// Cleartext realm (a hint only).
    pub header_realm: String,
    /// Service principal the ticket is for.
    pub service: String,
    /// Key version used to seal the ticket.
    pub kvno: u32,
    /// Encryption type.
    pub enctype: String,
    /// Authenticated client, when the ticket was opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Initial authentication time, when the ticket was opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<DateTime<Utc>>,
    /// End of validity, when the ticket was opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Runs a ticket command.
///
/// ## Errors
///
/// Returns an error if the keytab is unusable or the ticket is rejected.
pub async fn run_ticket(
    cmd: TicketCommand,
    config: &CliConfig,
    format: OutputFormat,
) -> crate::CliResult<()> {
    match cmd {
        TicketCommand::Mint {
            keytab,
            service,
            client,
            lifetime,
            offset,
            header_realm,
            raw,
        } => {
            let request = MintRequest {
                keytab,
                service,
                client,
                lifetime: Duration::from_secs(lifetime),
                offset_secs: offset,
                header_realm,
                framing: if raw { Framing::Krb5 } else { Framing::Spnego },
            };
            println!("{}", mint(&request)?);
            Ok(())
        }
        TicketCommand::Inspect { token, keytab } => {
            let token = super::parse_token(&token)?;
            let skew = Duration::from_secs(config.engine.kerberos.clock_skew_secs);
            let summary = inspect(&token, keytab.as_deref(), skew).await?;
            output_single(&summary, format)
        }
    }
}

/// Parameters of `ticket mint`.
#[derive(Debug, Clone)]
pub struct MintRequest {
    /// Keytab holding the service key.
    pub keytab: PathBuf,
    /// Service principal.
    pub service: String,
    /// Client principal.
    pub client: String,
    /// Ticket lifetime.
    pub lifetime: Duration,
    /// Shift of the validity window from now, in seconds.
    pub offset_secs: i64,
    /// Cleartext realm override.
    pub header_realm: Option<String>,
    /// Outer framing.
    pub framing: Framing,
}

/// Mints a ticket and returns the `Negotiate` header value.
///
/// ## Errors
///
/// Returns an error if a principal is invalid or the keytab has no key
/// for the service.
pub fn mint(request: &MintRequest) -> crate::CliResult<String> {
    let service = PrincipalName::parse(&request.service)?;
    let client = PrincipalName::parse(&request.client)?;
    let keytab = Keytab::read(&request.keytab)?;
    let issuer = TicketIssuer::from_keytab(&keytab, &service)?;

    let lifetime = chrono::Duration::from_std(request.lifetime)
        .map_err(|_| CliError::InvalidArgument("lifetime out of range".into()))?;
    let start = Utc::now() + chrono::Duration::seconds(request.offset_secs);

    let mut ticket = issuer
        .ticket(client)
        .valid_between(start, start + lifetime)
        .framing(request.framing);
    if let Some(realm) = &request.header_realm {
        ticket = ticket.header_realm(realm.clone());
    }

    Ok(NegotiateHeader::encode(&ticket.mint()?))
}

/// Decodes a ticket, opening it if a keytab is given.
///
/// ## Errors
///
/// Returns an error if the token is malformed, or if a keytab is given and
/// the ticket cannot be opened with it.
pub async fn inspect(
    token: &[u8],
    keytab: Option<&Path>,
    clock_skew: Duration,
) -> crate::CliResult<TicketSummary> {
    let request = ApReq::decode(spnego::unwrap(token)?)?;
    let header = request.header();

    let mut summary = TicketSummary {
        header_realm: header.realm.clone(),
        service: header.sname.clone(),
        kvno: header.kvno,
        enctype: EncryptionType::from_code(header.etype)
            .map_or_else(|| header.etype.to_string(), |e| e.to_string()),
        client: None,
        auth_time: None,
        expires_at: None,
    };

    if let Some(path) = keytab {
        let service = PrincipalName::parse(&header.sname)?;
        let validator = KerberosTicketValidator::new(ServiceCredential::new(
            service,
            KeytabSource::File(path.to_path_buf()),
        ))
        .with_clock_skew(clock_skew);

        let principal = validator.validate(token).await?;
        summary.client = Some(principal.principal.to_string());
        summary.auth_time = Some(principal.auth_time);
        summary.expires_at = Some(principal.expires_at);
    }

    Ok(summary)
}
