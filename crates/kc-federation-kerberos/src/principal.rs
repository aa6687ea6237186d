//! Kerberos principal names.
//!
//! The text form is `component[/component...]@REALM`. A backslash escapes
//! `/`, `@` and `\` inside a component or the realm.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KerberosError, KerberosResult};

/// Name type of an ordinary user principal.
pub const NT_PRINCIPAL: u32 = 1;
/// Name type of a service with host name as instance.
pub const NT_SRV_HST: u32 = 3;

/// A parsed Kerberos principal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalName {
    components: Vec<String>,
    realm: String,
}

impl PrincipalName {
    /// Creates a principal from its parts.
    ///
    /// ## Errors
    ///
    /// Returns an error if there are no components, a component is empty, or
    /// the realm is empty.
    pub fn new(components: Vec<String>, realm: impl Into<String>) -> KerberosResult<Self> {
        let realm = realm.into();
        if components.is_empty() || components.iter().any(String::is_empty) {
            return Err(KerberosError::principal("empty name component"));
        }
        if realm.is_empty() {
            return Err(KerberosError::principal("empty realm"));
        }
        Ok(Self { components, realm })
    }

    /// Parses `name@REALM`. A realm is required.
    ///
    /// ## Errors
    ///
    /// Returns an error if the text has no realm or is otherwise invalid.
    pub fn parse(text: &str) -> KerberosResult<Self> {
        let (components, realm) = split(text)?;
        let realm = realm.ok_or_else(|| KerberosError::principal(format!("'{text}' has no realm")))?;
        Self::new(components, realm)
    }

    /// Parses a name, using `default_realm` when the text has none.
    ///
    /// ## Errors
    ///
    /// Returns an error if the text is invalid.
    pub fn parse_with_default_realm(text: &str, default_realm: &str) -> KerberosResult<Self> {
        let (components, realm) = split(text)?;
        Self::new(components, realm.unwrap_or_else(|| default_realm.to_string()))
    }

    /// Returns the name components.
    #[must_use]
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Returns the realm.
    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// Returns the name without the realm, e.g. `user1` or `HTTP/localhost`.
    #[must_use]
    pub fn local_name(&self) -> String {
        self.components.join("/")
    }

    /// Returns the first component, the user name for user principals.
    #[must_use]
    pub fn primary(&self) -> &str {
        // new() guarantees at least one component
        self.components.first().map_or("", String::as_str)
    }

    /// Returns the conventional name type for this principal.
    #[must_use]
    pub fn name_type(&self) -> u32 {
        if self.components.len() > 1 {
            NT_SRV_HST
        } else {
            NT_PRINCIPAL
        }
    }
}

fn escape(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        if matches!(c, '/' | '@' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn split(text: &str) -> KerberosResult<(Vec<String>, Option<String>)> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut realm: Option<String> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| KerberosError::principal("trailing escape"))?;
                match &mut realm {
                    Some(r) => r.push(escaped),
                    None => current.push(escaped),
                }
            }
            '@' if realm.is_none() => {
                components.push(std::mem::take(&mut current));
                realm = Some(String::new());
            }
            '@' => return Err(KerberosError::principal("multiple '@' separators")),
            '/' if realm.is_none() => components.push(std::mem::take(&mut current)),
            _ => match &mut realm {
                Some(r) => r.push(c),
                None => current.push(c),
            },
        }
    }

    if realm.is_none() {
        components.push(current);
    }

    Ok((components, realm))
}

impl fmt::Display for PrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .components
            .iter()
            .map(|c| escape(c))
            .collect::<Vec<_>>()
            .join("/");
        write!(f, "{name}@{}", escape(&self.realm))
    }
}

impl FromStr for PrincipalName {
    type Err = KerberosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PrincipalName {
    type Error = KerberosError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PrincipalName> for String {
    fn from(value: PrincipalName) -> Self {
        value.to_string()
    }
}
