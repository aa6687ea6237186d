//! MIT keytab files.
//!
//! Layout (all integers big-endian):
//!
//! ```text
//! u8 0x05 | u8 version
//! repeated: i32 size | record
//! record:   u16 count | data realm | data component * count
//!           | u32 name_type (v2 only) | u32 timestamp | u8 kvno
//!           | u16 key_type | data key | [u32 kvno]
//! data:     u16 length | bytes
//! ```
//!
//! A negative record size marks a hole of that many bytes. Version `0x0501`
//! counts the realm among the components and has no name type; it is read
//! but never written.
//!
//! ## NIST 800-53 Rev5: SC-12 (Cryptographic Key Establishment and Management)
//!
//! Key bytes are never printed by `Debug`.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{KerberosError, KerberosResult};
use crate::principal::PrincipalName;

const KEYTAB_MAGIC: u8 = 0x05;
const VERSION_1: u8 = 0x01;
const VERSION_2: u8 = 0x02;

// ============================================================================
// Encryption types
// ============================================================================

/// Supported encryption types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionType {
    /// 128-bit AES key (enctype 17).
    Aes128,
    /// 256-bit AES key (enctype 18).
    Aes256,
}

impl EncryptionType {
    /// IANA enctype number.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Aes128 => 17,
            Self::Aes256 => 18,
        }
    }

    /// Looks up an enctype number.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            17 => Some(Self::Aes128),
            18 => Some(Self::Aes256),
            _ => None,
        }
    }

    /// Key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes256 => 32,
        }
    }

    /// Conventional name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Aes128 => "aes128-cts-hmac-sha1-96",
            Self::Aes256 => "aes256-cts-hmac-sha1-96",
        }
    }
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EncryptionType {
    type Err = KerberosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aes128" | "aes128-cts-hmac-sha1-96" | "17" => Ok(Self::Aes128),
            "aes256" | "aes256-cts-hmac-sha1-96" | "18" => Ok(Self::Aes256),
            other => Err(KerberosError::keytab(format!("unsupported enctype '{other}'"))),
        }
    }
}

// ============================================================================
// Entries
// ============================================================================

/// One key of one principal.
#[derive(Clone, PartialEq, Eq)]
pub struct KeytabEntry {
    /// Principal the key belongs to.
    pub principal: PrincipalName,
    /// Kerberos name type.
    pub name_type: u32,
    /// Seconds since the epoch when the key was written.
    pub timestamp: u32,
    /// Key version number.
    pub kvno: u32,
    /// Raw enctype number, possibly one this crate cannot use.
    pub key_type: i32,
    /// Key bytes.
    pub key: Vec<u8>,
}

impl KeytabEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(principal: PrincipalName, kvno: u32, etype: EncryptionType, key: Vec<u8>) -> Self {
        Self {
            name_type: principal.name_type(),
            principal,
            timestamp: now_timestamp(),
            kvno,
            key_type: etype.code(),
            key,
        }
    }

    /// Creates an entry with a fresh random key.
    #[must_use]
    pub fn generate(principal: PrincipalName, kvno: u32, etype: EncryptionType) -> Self {
        let mut key = vec![0u8; etype.key_len()];
        rand::rng().fill(&mut key[..]);
        Self::new(principal, kvno, etype, key)
    }

    /// Returns the encryption type, if supported.
    #[must_use]
    pub const fn etype(&self) -> Option<EncryptionType> {
        EncryptionType::from_code(self.key_type)
    }
}

impl fmt::Debug for KeytabEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeytabEntry")
            .field("principal", &self.principal.to_string())
            .field("kvno", &self.kvno)
            .field("key_type", &self.key_type)
            .field("key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

fn now_timestamp() -> u32 {
    u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(u32::MAX)
}

// ============================================================================
// Keytab
// ============================================================================

/// An in-memory keytab.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keytab {
    entries: Vec<KeytabEntry>,
}

impl Keytab {
    /// Creates an empty keytab.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all entries in file order.
    #[must_use]
    pub fn entries(&self) -> &[KeytabEntry] {
        &self.entries
    }

    /// Appends an entry.
    pub fn add(&mut self, entry: KeytabEntry) {
        self.entries.push(entry);
    }

    /// Finds the key for `principal` with the given enctype.
    ///
    /// A `kvno` of zero selects the highest available version.
    #[must_use]
    pub fn find_key(&self, principal: &PrincipalName, kvno: u32, key_type: i32) -> Option<&KeytabEntry> {
        let mut candidates = self
            .entries
            .iter()
            .filter(|e| &e.principal == principal && e.key_type == key_type);

        if kvno == 0 {
            candidates.max_by_key(|e| e.kvno)
        } else {
            candidates.find(|e| e.kvno == kvno)
        }
    }

    /// Returns the newest usable entry for `principal`, preferring AES-256.
    #[must_use]
    pub fn newest_key(&self, principal: &PrincipalName) -> Option<&KeytabEntry> {
        self.entries
            .iter()
            .filter(|e| &e.principal == principal && e.etype().is_some())
            .max_by_key(|e| (e.kvno, e.key_type))
    }

    /// Reads and parses a keytab file.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid keytab.
    pub fn read(path: impl AsRef<Path>) -> KerberosResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Writes the keytab in version `0x0502` format.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: impl AsRef<Path>) -> KerberosResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// Parses keytab bytes.
    ///
    /// ## Errors
    ///
    /// Returns an error if the bytes are not a structurally valid keytab.
    pub fn parse(bytes: &[u8]) -> KerberosResult<Self> {
        let mut reader = Reader::new(bytes);

        if reader.u8()? != KEYTAB_MAGIC {
            return Err(KerberosError::keytab("bad magic"));
        }
        let version = reader.u8()?;
        if version != VERSION_1 && version != VERSION_2 {
            return Err(KerberosError::keytab(format!("unsupported version 0x05{version:02x}")));
        }

        let mut entries = Vec::new();
        while !reader.is_empty() {
            let size = reader.i32()?;
            if size == 0 {
                break;
            }
            let len = size.unsigned_abs() as usize;
            let record = reader.bytes(len)?;
            if size < 0 {
                continue;
            }
            entries.push(parse_record(record, version)?);
        }

        Ok(Self { entries })
    }

    /// Serializes the keytab in version `0x0502` format.
    ///
    /// ## Errors
    ///
    /// Returns an error if a field exceeds the format's length limits.
    pub fn to_bytes(&self) -> KerberosResult<Vec<u8>> {
        let mut out = vec![KEYTAB_MAGIC, VERSION_2];

        for entry in &self.entries {
            let mut record = Vec::new();
            let count = u16::try_from(entry.principal.components().len())
                .map_err(|_| KerberosError::keytab("too many components"))?;
            record.extend_from_slice(&count.to_be_bytes());
            put_data(&mut record, entry.principal.realm().as_bytes())?;
            for component in entry.principal.components() {
                put_data(&mut record, component.as_bytes())?;
            }
            record.extend_from_slice(&entry.name_type.to_be_bytes());
            record.extend_from_slice(&entry.timestamp.to_be_bytes());
            record.push((entry.kvno & 0xff) as u8);
            let key_type = u16::try_from(entry.key_type)
                .map_err(|_| KerberosError::keytab("key type out of range"))?;
            record.extend_from_slice(&key_type.to_be_bytes());
            put_data(&mut record, &entry.key)?;
            record.extend_from_slice(&entry.kvno.to_be_bytes());

            let size = i32::try_from(record.len())
                .map_err(|_| KerberosError::keytab("record too large"))?;
            out.extend_from_slice(&size.to_be_bytes());
            out.extend_from_slice(&record);
        }

        Ok(out)
    }
}

fn put_data(out: &mut Vec<u8>, data: &[u8]) -> KerberosResult<()> {
    let len = u16::try_from(data.len()).map_err(|_| KerberosError::keytab("field too long"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(data);
    Ok(())
}

fn parse_record(record: &[u8], version: u8) -> KerberosResult<KeytabEntry> {
    let mut reader = Reader::new(record);

    let mut count = reader.u16()?;
    if version == VERSION_1 {
        count = count
            .checked_sub(1)
            .ok_or_else(|| KerberosError::keytab("v1 record without realm"))?;
    }

    let realm = reader.string()?;
    let components = (0..count)
        .map(|_| reader.string())
        .collect::<KerberosResult<Vec<_>>>()?;
    let principal = PrincipalName::new(components, realm)?;

    let name_type = if version == VERSION_2 {
        reader.u32()?
    } else {
        principal.name_type()
    };
    let timestamp = reader.u32()?;
    let kvno8 = reader.u8()?;
    let key_type = i32::from(reader.u16()?);
    let key_len = reader.u16()? as usize;
    let key = reader.bytes(key_len)?.to_vec();

    let kvno = if reader.remaining() >= 4 {
        match reader.u32()? {
            0 => u32::from(kvno8),
            kvno => kvno,
        }
    } else {
        u32::from(kvno8)
    };

    Ok(KeytabEntry {
        principal,
        name_type,
        timestamp,
        kvno,
        key_type,
        key,
    })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    const fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    const fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn bytes(&mut self, n: usize) -> KerberosResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(KerberosError::keytab("truncated"));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> KerberosResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> KerberosResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> KerberosResult<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> KerberosResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> KerberosResult<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn string(&mut self) -> KerberosResult<String> {
        let len = self.u16()? as usize;
        String::from_utf8(self.bytes(len)?.to_vec())
            .map_err(|_| KerberosError::keytab("non UTF-8 name"))
    }
}
