//! SPNEGO and GSS-API framing.
//!
//! Accepts either a SPNEGO `NegTokenInit` (RFC 4178) carrying a Kerberos
//! mechanism token, or a bare Kerberos v5 GSS `InitialContextToken`
//! (RFC 4121 section 4.1). Both unwrap to the inner Kerberos token that
//! starts with the two-byte token identifier.
//!
//! DER is read and written with `der-parser`; this module only knows the
//! shape of the two structures.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use der_parser::asn1_rs::{Any, Class, FromDer, Header, Length, Tag, ToDer};

use crate::error::{KerberosError, KerberosResult, ValidationError};

/// DER encoding of OID 1.3.6.1.5.5.2 (SPNEGO).
pub const OID_SPNEGO: &[u8] = &[0x2b, 0x06, 0x01, 0x05, 0x05, 0x02];
/// DER encoding of OID 1.2.840.113554.1.2.2 (Kerberos v5).
pub const OID_KRB5: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x12, 0x01, 0x02, 0x02];
/// DER encoding of OID 1.2.840.48018.1.2.2 (Kerberos v5, Microsoft legacy).
pub const OID_KRB5_LEGACY: &[u8] = &[0x2a, 0x86, 0x48, 0x82, 0xf7, 0x12, 0x01, 0x02, 0x02];

/// Maximum accepted token size.
pub const MAX_TOKEN_LEN: usize = 64 * 1024;

// ============================================================================
// DER
// ============================================================================

/// Identifier of a DER element: class, tag and constructed bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ident {
    class: Class,
    tag: Tag,
    constructed: bool,
}

impl Ident {
    const fn universal(tag: Tag, constructed: bool) -> Self {
        Self {
            class: Class::Universal,
            tag,
            constructed,
        }
    }

    const fn context(n: u32) -> Self {
        Self {
            class: Class::ContextSpecific,
            tag: Tag(n),
            constructed: true,
        }
    }
}

/// `[APPLICATION 0]`, the GSS `InitialContextToken`.
const GSS_TOKEN: Ident = Ident {
    class: Class::Application,
    tag: Tag(0),
    constructed: true,
};
const OID: Ident = Ident::universal(Tag::Oid, false);
const OCTET_STRING: Ident = Ident::universal(Tag::OctetString, false);
const SEQUENCE: Ident = Ident::universal(Tag::Sequence, true);
const CONTEXT_0: Ident = Ident::context(0);
const CONTEXT_2: Ident = Ident::context(2);

/// Reads one element, returning the bytes after it and the element.
fn read(bytes: &[u8]) -> Result<(&[u8], Any<'_>), ValidationError> {
    Any::from_der(bytes).map_err(|e| ValidationError::malformed(format!("bad DER: {e}")))
}

fn matches_ident(any: &Any<'_>, ident: Ident) -> bool {
    any.header.class() == ident.class
        && any.header.tag() == ident.tag
        && any.header.is_constructed() == ident.constructed
}

/// Reads one element that must carry `ident`; returns the rest and its value.
fn expect(bytes: &[u8], ident: Ident) -> Result<(&[u8], &[u8]), ValidationError> {
    let (rest, any) = read(bytes)?;
    if !matches_ident(&any, ident) {
        return Err(ValidationError::malformed(format!(
            "expected {:?} {:?}, found {:?} {:?}",
            ident.class,
            ident.tag,
            any.header.class(),
            any.header.tag()
        )));
    }
    Ok((rest, any.data))
}

/// Encodes one element around `value`.
fn tlv(ident: Ident, value: &[u8]) -> KerberosResult<Vec<u8>> {
    let header = Header::new(
        ident.class,
        ident.constructed,
        ident.tag,
        Length::Definite(value.len()),
    );
    let mut out = header
        .to_der_vec()
        .map_err(|e| KerberosError::Encoding(e.to_string()))?;
    out.extend_from_slice(value);
    Ok(out)
}

// ============================================================================
// Framing
// ============================================================================

/// Which outer framing a token uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// SPNEGO `NegTokenInit`, as browsers send it.
    #[default]
    Spnego,
    /// Bare Kerberos v5 GSS token.
    Krb5,
}

/// Returns the inner Kerberos token of a SPNEGO or raw GSS token.
///
/// ## Errors
///
/// Returns `MalformedToken` if the framing is invalid or names an
/// unsupported mechanism.
pub fn unwrap(token: &[u8]) -> Result<&[u8], ValidationError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(ValidationError::malformed("token too large"));
    }

    let (trailing, body) = expect(token, GSS_TOKEN)?;
    if !trailing.is_empty() {
        return Err(ValidationError::malformed("trailing bytes after token"));
    }

    let (rest, mech) = expect(body, OID)?;

    if mech == OID_SPNEGO {
        let (_, init) = expect(rest, CONTEXT_0)?;
        return unwrap_krb5(neg_token_init(init)?);
    }
    if is_krb5(mech) {
        return Ok(rest);
    }

    Err(ValidationError::malformed("unsupported GSS mechanism"))
}

fn is_krb5(oid: &[u8]) -> bool {
    oid == OID_KRB5 || oid == OID_KRB5_LEGACY
}

fn unwrap_krb5(token: &[u8]) -> Result<&[u8], ValidationError> {
    let (_, body) = expect(token, GSS_TOKEN)?;
    let (rest, mech) = expect(body, OID)?;
    if !is_krb5(mech) {
        return Err(ValidationError::malformed("mechanism token is not Kerberos"));
    }
    Ok(rest)
}

fn neg_token_init(value: &[u8]) -> Result<&[u8], ValidationError> {
    let (_, mut fields) = expect(value, SEQUENCE)?;
    let mut offers_krb5 = false;
    let mut mech_token = None;

    while !fields.is_empty() {
        let (rest, field) = read(fields)?;
        fields = rest;
        if matches_ident(&field, CONTEXT_0) {
            let (_, mut types) = expect(field.data, SEQUENCE)?;
            while !types.is_empty() {
                let (rest, oid) = expect(types, OID)?;
                offers_krb5 |= is_krb5(oid);
                types = rest;
            }
        } else if matches_ident(&field, CONTEXT_2) {
            mech_token = Some(expect(field.data, OCTET_STRING)?.1);
        }
        // reqFlags, mechListMIC
    }

    if !offers_krb5 {
        return Err(ValidationError::malformed("no Kerberos mechanism offered"));
    }
    mech_token.ok_or_else(|| ValidationError::malformed("NegTokenInit without mechToken"))
}

/// Wraps an inner Kerberos token as a GSS `InitialContextToken`.
///
/// ## Errors
///
/// Returns `Encoding` if a DER header cannot be written.
pub fn wrap_krb5(inner: &[u8]) -> KerberosResult<Vec<u8>> {
    let mut body = tlv(OID, OID_KRB5)?;
    body.extend_from_slice(inner);
    tlv(GSS_TOKEN, &body)
}

/// Wraps an inner Kerberos token in a SPNEGO `NegTokenInit`.
///
/// ## Errors
///
/// Returns `Encoding` if a DER header cannot be written.
pub fn wrap_spnego(inner: &[u8]) -> KerberosResult<Vec<u8>> {
    let mech_types = tlv(CONTEXT_0, &tlv(SEQUENCE, &tlv(OID, OID_KRB5)?)?)?;
    let mech_token = tlv(CONTEXT_2, &tlv(OCTET_STRING, &wrap_krb5(inner)?)?)?;

    let mut init = mech_types;
    init.extend_from_slice(&mech_token);
    let neg_token_init = tlv(CONTEXT_0, &tlv(SEQUENCE, &init)?)?;

    let mut body = tlv(OID, OID_SPNEGO)?;
    body.extend_from_slice(&neg_token_init);
    tlv(GSS_TOKEN, &body)
}

/// Wraps an inner token with the requested framing.
///
/// ## Errors
///
/// Returns `Encoding` if a DER header cannot be written.
pub fn wrap(inner: &[u8], framing: Framing) -> KerberosResult<Vec<u8>> {
    match framing {
        Framing::Spnego => wrap_spnego(inner),
        Framing::Krb5 => wrap_krb5(inner),
    }
}

// ============================================================================
// HTTP header
// ============================================================================

/// A parsed `Authorization: Negotiate <base64>` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiateHeader {
    token: Vec<u8>,
}

impl NegotiateHeader {
    /// Scheme name, also used as the `WWW-Authenticate` challenge.
    pub const SCHEME: &'static str = "Negotiate";

    /// Parses the value of an `Authorization` header.
    ///
    /// ## Errors
    ///
    /// Returns `MalformedToken` if the scheme is not `Negotiate` or the token
    /// is not valid base64.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let value = value.trim();
        let (scheme, encoded) = value
            .split_once(char::is_whitespace)
            .ok_or_else(|| ValidationError::malformed("missing Negotiate token"))?;

        if !scheme.eq_ignore_ascii_case(Self::SCHEME) {
            return Err(ValidationError::malformed("authorization scheme is not Negotiate"));
        }

        let encoded = encoded.trim();
        if encoded.is_empty() || encoded.len() > MAX_TOKEN_LEN * 4 / 3 + 4 {
            return Err(ValidationError::malformed("bad Negotiate token length"));
        }

        let token = STANDARD
            .decode(encoded)
            .map_err(|_| ValidationError::malformed("Negotiate token is not base64"))?;
        Ok(Self { token })
    }

    /// Builds a header value for a token.
    #[must_use]
    pub fn encode(token: &[u8]) -> String {
        format!("{} {}", Self::SCHEME, STANDARD.encode(token))
    }

    /// Returns the decoded token.
    #[must_use]
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// Consumes the header, returning the token.
    #[must_use]
    pub fn into_token(self) -> Vec<u8> {
        self.token
    }
}
