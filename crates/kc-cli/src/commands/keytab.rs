//! Keytab commands.

use std::path::Path;

use chrono::DateTime;
use kc_federation_kerberos::{EncryptionType, Keytab, KeytabEntry, PrincipalName};
use serde::Serialize;
use tabled::Tabled;

use crate::cli::KeytabCommand;
use crate::config::OutputFormat;
use crate::error::CliError;
use crate::output::{output, success};

/// One keytab entry as shown by `keytab list`. The key itself is omitted.
#[derive(Debug, Serialize, Tabled)]
pub struct KeytabRow {
    /// Principal.
    #[tabled(rename = "Principal")]
    pub principal: String,
    /// Key version number.
    #[tabled(rename = "KVNO")]
    pub kvno: u32,
    /// Encryption type name or number.
    #[tabled(rename = "Enctype")]
    pub enctype: String,
    /// When the key was written.
    #[tabled(rename = "Timestamp")]
    pub timestamp: String,
}

impl From<&KeytabEntry> for KeytabRow {
    fn from(entry: &KeytabEntry) -> Self {
        Self {
            principal: entry.principal.to_string(),
            kvno: entry.kvno,
            enctype: entry
                .etype()
                .map_or_else(|| entry.key_type.to_string(), |e| e.to_string()),
            timestamp: DateTime::from_timestamp(i64::from(entry.timestamp), 0)
                .map_or_else(|| entry.timestamp.to_string(), |t| t.to_rfc3339()),
        }
    }
}

/// Runs a keytab command.
///
/// ## Errors
///
/// Returns an error if the keytab cannot be read or written or an
/// argument is invalid.
pub fn run_keytab(cmd: KeytabCommand, format: OutputFormat) -> crate::CliResult<()> {
    match cmd {
        KeytabCommand::List { keytab } => {
            let keytab = Keytab::read(&keytab)?;
            let rows: Vec<KeytabRow> = keytab.entries().iter().map(KeytabRow::from).collect();
            output(&rows, format)
        }
        KeytabCommand::Add {
            keytab,
            principal,
            kvno,
            enctype,
        } => {
            let principal = PrincipalName::parse(&principal)?;
            let etype = enctype
                .parse::<EncryptionType>()
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
            add_key(&keytab, principal.clone(), kvno, etype)?;
            success(&format!(
                "Added {etype} key kvno {kvno} for {principal} to {}",
                keytab.display()
            ));
            Ok(())
        }
    }
}

/// Appends a generated key to a keytab, creating the file if needed.
fn add_key(
    path: &Path,
    principal: PrincipalName,
    kvno: u32,
    etype: EncryptionType,
) -> crate::CliResult<()> {
    let mut keytab = if path.exists() {
        Keytab::read(path)?
    } else {
        Keytab::new()
    };
    keytab.add(KeytabEntry::generate(principal, kvno, etype));
    keytab.write(path)?;
    Ok(())
}
