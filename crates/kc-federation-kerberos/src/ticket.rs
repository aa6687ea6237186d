//! Service ticket (AP-REQ) encoding and sealing.
//!
//! ```text
//! 01 00 | u16 header_len | header | nonce[12] | sealed enc-part + tag
//! ```
//!
//! The header is cleartext JSON naming the service realm, service principal,
//! key version and enctype. It is bound to the ciphertext as AEAD additional
//! data, so tampering with it breaks the seal. The enc-part carries the
//! client principal and the ticket times.

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM, AES_256_GCM, NONCE_LEN};
use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{KerberosError, KerberosResult, ValidationError};
use crate::keytab::EncryptionType;

/// Token identifier of a Kerberos AP-REQ inside a GSS token.
pub const TOK_ID_AP_REQ: [u8; 2] = [0x01, 0x00];

/// Cleartext ticket header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketHeader {
    /// Realm that issued the ticket (the service realm).
    pub realm: String,
    /// Service principal the ticket is for.
    pub sname: String,
    /// Key version used to seal the ticket.
    pub kvno: u32,
    /// Enctype used to seal the ticket.
    pub etype: i32,
}

/// Encrypted part of the ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncTicketPart {
    /// Client principal, `name@REALM`.
    pub cname: String,
    /// Initial authentication time, seconds since the epoch.
    pub authtime: i64,
    /// Start of validity, seconds since the epoch.
    pub starttime: i64,
    /// End of validity, seconds since the epoch.
    pub endtime: i64,
}

impl EncTicketPart {
    /// Start of validity.
    ///
    /// ## Errors
    ///
    /// Returns `MalformedToken` if the time is outside the representable range.
    pub fn starts_at(&self) -> Result<DateTime<Utc>, ValidationError> {
        timestamp("starttime", self.starttime)
    }

    /// End of validity.
    ///
    /// ## Errors
    ///
    /// Returns `MalformedToken` if the time is outside the representable range.
    pub fn ends_at(&self) -> Result<DateTime<Utc>, ValidationError> {
        timestamp("endtime", self.endtime)
    }

    /// Initial authentication time.
    ///
    /// ## Errors
    ///
    /// Returns `MalformedToken` if the time is outside the representable range.
    pub fn auth_time(&self) -> Result<DateTime<Utc>, ValidationError> {
        timestamp("authtime", self.authtime)
    }
}

fn timestamp(field: &str, secs: i64) -> Result<DateTime<Utc>, ValidationError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ValidationError::malformed(format!("{field} {secs} out of range")))
}

/// A decoded, still sealed AP-REQ.
#[derive(Debug, Clone)]
pub struct ApReq {
    header: TicketHeader,
    header_bytes: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    sealed: Vec<u8>,
}

impl ApReq {
    /// Decodes the inner Kerberos token.
    ///
    /// ## Errors
    ///
    /// Returns `MalformedToken` if the token identifier, lengths or header
    /// are invalid.
    pub fn decode(inner: &[u8]) -> Result<Self, ValidationError> {
        let rest = inner
            .strip_prefix(&TOK_ID_AP_REQ)
            .ok_or_else(|| ValidationError::malformed("not an AP-REQ"))?;

        if rest.len() < 2 {
            return Err(ValidationError::malformed("truncated ticket"));
        }
        let (len, rest) = rest.split_at(2);
        let header_len = usize::from(u16::from_be_bytes([len[0], len[1]]));

        if rest.len() < header_len + NONCE_LEN {
            return Err(ValidationError::malformed("truncated ticket"));
        }
        let (header_bytes, rest) = rest.split_at(header_len);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);

        let header: TicketHeader = serde_json::from_slice(header_bytes)
            .map_err(|e| ValidationError::malformed(format!("ticket header: {e}")))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        nonce_bytes.copy_from_slice(nonce);

        Ok(Self {
            header,
            header_bytes: header_bytes.to_vec(),
            nonce: nonce_bytes,
            sealed: sealed.to_vec(),
        })
    }

    /// Seals an enc-part under `key`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the key does not fit the enctype or serialization
    /// fails.
    pub fn seal(header: TicketHeader, part: &EncTicketPart, key: &[u8]) -> KerberosResult<Self> {
        let header_bytes =
            serde_json::to_vec(&header).map_err(|e| KerberosError::Encoding(e.to_string()))?;
        if header_bytes.len() > usize::from(u16::MAX) {
            return Err(KerberosError::Encoding("ticket header too long".to_string()));
        }

        let key = aead_key(header.etype, key).map_err(|e| KerberosError::Crypto(e.to_string()))?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce[..]);

        let mut sealed =
            serde_json::to_vec(part).map_err(|e| KerberosError::Encoding(e.to_string()))?;
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce),
            Aad::from(header_bytes.as_slice()),
            &mut sealed,
        )
        .map_err(|_| KerberosError::Crypto("seal failed".to_string()))?;

        Ok(Self {
            header,
            header_bytes,
            nonce,
            sealed,
        })
    }

    /// Opens the enc-part with `key`.
    ///
    /// ## Errors
    ///
    /// Returns `Cryptographic` if the key is wrong or anything was altered,
    /// and `MalformedToken` if the plaintext is not a valid enc-part.
    pub fn open(&self, key: &[u8]) -> Result<EncTicketPart, ValidationError> {
        let key = aead_key(self.header.etype, key)?;

        let mut in_out = self.sealed.clone();
        let plaintext = key
            .open_in_place(
                Nonce::assume_unique_for_key(self.nonce),
                Aad::from(self.header_bytes.as_slice()),
                &mut in_out,
            )
            .map_err(|_| ValidationError::crypto("ticket seal does not open"))?;

        serde_json::from_slice(plaintext)
            .map_err(|e| ValidationError::malformed(format!("enc-part: {e}")))
    }

    /// Encodes the inner Kerberos token.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(4 + self.header_bytes.len() + NONCE_LEN + self.sealed.len());
        out.extend_from_slice(&TOK_ID_AP_REQ);
        // seal() and decode() both bound the header to u16
        out.extend_from_slice(&(self.header_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.header_bytes);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed);
        out
    }

    /// Returns the cleartext header.
    #[must_use]
    pub const fn header(&self) -> &TicketHeader {
        &self.header
    }
}

fn aead_key(etype: i32, key: &[u8]) -> Result<LessSafeKey, ValidationError> {
    let algorithm = match EncryptionType::from_code(etype) {
        Some(EncryptionType::Aes128) => &AES_128_GCM,
        Some(EncryptionType::Aes256) => &AES_256_GCM,
        None => return Err(ValidationError::crypto(format!("unsupported enctype {etype}"))),
    };
    let unbound = UnboundKey::new(algorithm, key)
        .map_err(|_| ValidationError::crypto("key does not match enctype"))?;
    Ok(LessSafeKey::new(unbound))
}
