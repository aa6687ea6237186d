//! Local password policy.
//!
//! Policies use the admin console syntax, rules joined by `and`:
//!
//! ```text
//! length(8) and digits(1) and upperCase(1) and lowerCase(1)
//!   and specialChars(1) and notUsername and passwordAge(90)
//! ```
//!
//! When a provider sets `validatePasswordPolicy`, the directory credential
//! is checked at login. Value rules apply only when the directory exposes
//! the password value; `passwordAge` applies only when it exposes the last
//! change time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::error::FederationError;
use crate::provider::DirectoryCredential;

/// One policy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRule {
    /// Minimum length.
    Length(usize),
    /// Maximum length.
    MaxLength(usize),
    /// Minimum number of digits.
    Digits(usize),
    /// Minimum number of upper-case letters.
    UpperCase(usize),
    /// Minimum number of lower-case letters.
    LowerCase(usize),
    /// Minimum number of non-alphanumeric characters.
    SpecialChars(usize),
    /// Password must not equal the username.
    NotUsername,
    /// Password must not equal the email.
    NotEmail,
    /// Password must have been changed within this many days.
    PasswordAge(i64),
}

impl PolicyRule {
    /// Policy syntax name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Length(_) => "length",
            Self::MaxLength(_) => "maxLength",
            Self::Digits(_) => "digits",
            Self::UpperCase(_) => "upperCase",
            Self::LowerCase(_) => "lowerCase",
            Self::SpecialChars(_) => "specialChars",
            Self::NotUsername => "notUsername",
            Self::NotEmail => "notEmail",
            Self::PasswordAge(_) => "passwordAge",
        }
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length(n)
            | Self::MaxLength(n)
            | Self::Digits(n)
            | Self::UpperCase(n)
            | Self::LowerCase(n)
            | Self::SpecialChars(n) => write!(f, "{}({n})", self.name()),
            Self::PasswordAge(days) => write!(f, "{}({days})", self.name()),
            Self::NotUsername | Self::NotEmail => f.write_str(self.name()),
        }
    }
}

/// A failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    /// The rule that failed.
    pub rule: PolicyRule,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.rule {
            PolicyRule::Length(n) => write!(f, "shorter than {n} characters"),
            PolicyRule::MaxLength(n) => write!(f, "longer than {n} characters"),
            PolicyRule::Digits(n) => write!(f, "fewer than {n} digits"),
            PolicyRule::UpperCase(n) => write!(f, "fewer than {n} upper-case letters"),
            PolicyRule::LowerCase(n) => write!(f, "fewer than {n} lower-case letters"),
            PolicyRule::SpecialChars(n) => write!(f, "fewer than {n} special characters"),
            PolicyRule::NotUsername => f.write_str("equals the username"),
            PolicyRule::NotEmail => f.write_str("equals the email"),
            PolicyRule::PasswordAge(days) => write!(f, "not changed in the last {days} days"),
        }
    }
}

/// A parsed password policy. The empty policy accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordPolicy {
    rules: Vec<PolicyRule>,
}

impl PasswordPolicy {
    /// Policy without rules.
    #[must_use]
    pub const fn none() -> Self {
        Self { rules: Vec::new() }
    }

    /// Returns the rules.
    #[must_use]
    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Returns true if the policy has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Checks a directory credential.
    #[must_use]
    pub fn check(
        &self,
        username: &str,
        email: Option<&str>,
        credential: &DirectoryCredential,
        now: DateTime<Utc>,
    ) -> Vec<PolicyViolation> {
        self.rules
            .iter()
            .filter(|rule| !rule_holds(**rule, username, email, credential, now))
            .map(|rule| PolicyViolation { rule: *rule })
            .collect()
    }
}

fn count(password: &str, pred: impl Fn(char) -> bool) -> usize {
    password.chars().filter(|c| pred(*c)).count()
}

fn rule_holds(
    rule: PolicyRule,
    username: &str,
    email: Option<&str>,
    credential: &DirectoryCredential,
    now: DateTime<Utc>,
) -> bool {
    if let PolicyRule::PasswordAge(days) = rule {
        return credential
            .password_changed_at
            .map_or(true, |changed| now - changed <= Duration::days(days));
    }

    let Some(password) = credential.password.as_deref() else {
        return true;
    };

    match rule {
        PolicyRule::Length(n) => password.chars().count() >= n,
        PolicyRule::MaxLength(n) => password.chars().count() <= n,
        PolicyRule::Digits(n) => count(password, |c| c.is_ascii_digit()) >= n,
        PolicyRule::UpperCase(n) => count(password, char::is_uppercase) >= n,
        PolicyRule::LowerCase(n) => count(password, char::is_lowercase) >= n,
        PolicyRule::SpecialChars(n) => count(password, |c| !c.is_alphanumeric()) >= n,
        PolicyRule::NotUsername => !password.eq_ignore_ascii_case(username),
        PolicyRule::NotEmail => email.map_or(true, |e| !password.eq_ignore_ascii_case(e)),
        PolicyRule::PasswordAge(_) => true,
    }
}

impl FromStr for PasswordPolicy {
    type Err = FederationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rules = Vec::new();

        for term in s.split(" and ").map(str::trim).filter(|t| !t.is_empty()) {
            let (name, arg) = match term.split_once('(') {
                Some((name, rest)) => {
                    let arg = rest.strip_suffix(')').ok_or_else(|| {
                        FederationError::config(format!("password policy: unclosed '{term}'"))
                    })?;
                    (name.trim(), Some(arg.trim()))
                }
                None => (term, None),
            };

            let number = |default: i64| -> Result<i64, FederationError> {
                match arg {
                    None | Some("") => Ok(default),
                    Some(v) => v.parse().map_err(|_| {
                        FederationError::config(format!("password policy: bad argument in '{term}'"))
                    }),
                }
            };
            let size = |default: i64| -> Result<usize, FederationError> {
                usize::try_from(number(default)?).map_err(|_| {
                    FederationError::config(format!("password policy: negative argument in '{term}'"))
                })
            };

            let rule = match name {
                "length" => PolicyRule::Length(size(8)?),
                "maxLength" => PolicyRule::MaxLength(size(64)?),
                "digits" => PolicyRule::Digits(size(1)?),
                "upperCase" => PolicyRule::UpperCase(size(1)?),
                "lowerCase" => PolicyRule::LowerCase(size(1)?),
                "specialChars" => PolicyRule::SpecialChars(size(1)?),
                "notUsername" => PolicyRule::NotUsername,
                "notEmail" => PolicyRule::NotEmail,
                "passwordAge" | "forceExpiredPasswordChange" => PolicyRule::PasswordAge(number(365)?),
                other => {
                    return Err(FederationError::config(format!(
                        "password policy: unknown rule '{other}'"
                    )))
                }
            };
            rules.push(rule);
        }

        Ok(Self { rules })
    }
}

impl fmt::Display for PasswordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules: Vec<String> = self.rules.iter().map(ToString::to_string).collect();
        f.write_str(&rules.join(" and "))
    }
}
