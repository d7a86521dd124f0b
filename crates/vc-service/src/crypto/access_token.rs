//! RTC access token issuance.
//!
//! A token binds a room id, user id, privileges and a validity window into a
//! packed binary message authenticated with HMAC-SHA256 under the RTC
//! application key. The version marker and app id lead the token in plain
//! text; the packed message and its MAC follow as unpadded URL-safe base64
//! so the token can travel in query strings.
//!
//! Layout (integers little-endian, strings and byte blobs prefixed with a
//! u16 length):
//!
//! ```text
//! token   = "001" | app_id | base64url( bytes(message) | bytes(mac) )
//! message = u32 nonce | u32 issued_at | u32 expire_at
//!         | str room_id | str user_id
//!         | u16 count | (u16 privilege | u32 expire_at) * count
//! mac     = HMAC-SHA256(app_key, message)
//! ```
//!
//! Privileges are written in ascending code order. A privilege issued with
//! expiry 0 inherits the token expiry and is written with that value.

use super::{hmac_sha256, random_u32, verify_hmac_sha256};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::instrument;

/// Version marker that prefixes every token.
pub const TOKEN_VERSION: &str = "001";

/// Fixed validity window for issued tokens (24 hours).
pub const TOKEN_VALIDITY_SECONDS: u32 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("At least one privilege is required")]
    NoPrivileges,

    #[error("Duplicate privilege: {0}")]
    DuplicatePrivilege(PrivilegeKind),

    #[error("Field {0} exceeds the maximum encodable length")]
    FieldTooLong(&'static str),

    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(i64),

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token signature mismatch")]
    SignatureMismatch,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// Privileges
// ============================================================================

/// Media capability grantable to a token holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrivilegeKind {
    Publish,
    Subscribe,
}

impl PrivilegeKind {
    /// Wire code of the privilege.
    pub fn code(self) -> u16 {
        match self {
            PrivilegeKind::Publish => 0,
            PrivilegeKind::Subscribe => 4,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(PrivilegeKind::Publish),
            4 => Some(PrivilegeKind::Subscribe),
            _ => None,
        }
    }
}

impl fmt::Display for PrivilegeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrivilegeKind::Publish => write!(f, "publish"),
            PrivilegeKind::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// A privilege with its own expiry. An expiry of 0 inherits the token expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Privilege {
    pub kind: PrivilegeKind,
    pub expire_at: u32,
}

impl Privilege {
    pub fn new(kind: PrivilegeKind, expire_at: u32) -> Self {
        Self { kind, expire_at }
    }

    /// Privilege that lives exactly as long as the token.
    pub fn inherit(kind: PrivilegeKind) -> Self {
        Self { kind, expire_at: 0 }
    }
}

/// Ordered set of privileges with unique kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrivilegeSet {
    entries: BTreeMap<PrivilegeKind, u32>,
}

impl PrivilegeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set, rejecting repeated kinds.
    pub fn from_privileges(
        privileges: impl IntoIterator<Item = Privilege>,
    ) -> Result<Self, TokenError> {
        let mut set = Self::new();
        for privilege in privileges {
            set.insert(privilege)?;
        }
        Ok(set)
    }

    /// Subscribe and publish for the lifetime of the token, which is what a
    /// client needs to talk with the agent.
    pub fn join_room() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PrivilegeKind::Subscribe, 0);
        entries.insert(PrivilegeKind::Publish, 0);
        Self { entries }
    }

    pub fn insert(&mut self, privilege: Privilege) -> Result<(), TokenError> {
        if self.entries.contains_key(&privilege.kind) {
            return Err(TokenError::DuplicatePrivilege(privilege.kind));
        }
        self.entries.insert(privilege.kind, privilege.expire_at);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Privilege> + '_ {
        self.entries
            .iter()
            .map(|(kind, expire_at)| Privilege::new(*kind, *expire_at))
    }
}

// ============================================================================
// Issuance
// ============================================================================

/// Claims carried by a token, as recovered by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub version: String,
    pub nonce: u32,
    pub app_id: String,
    pub room_id: String,
    pub user_id: String,
    pub issued_at: u32,
    pub expire_at: u32,
    pub privileges: Vec<Privilege>,
}

/// Issue a fresh access token.
///
/// Every call draws a new nonce, so two tokens for the same inputs and the
/// same second still differ.
#[instrument(skip_all)]
pub fn issue(
    app_id: &str,
    app_key: &SecretString,
    room_id: &str,
    user_id: &str,
    privileges: &PrivilegeSet,
    now_unix_seconds: i64,
) -> Result<String, TokenError> {
    let nonce = random_u32().map_err(TokenError::Signing)?;
    issue_with_nonce(
        app_id,
        app_key,
        room_id,
        user_id,
        privileges,
        now_unix_seconds,
        nonce,
    )
}

fn issue_with_nonce(
    app_id: &str,
    app_key: &SecretString,
    room_id: &str,
    user_id: &str,
    privileges: &PrivilegeSet,
    now_unix_seconds: i64,
    nonce: u32,
) -> Result<String, TokenError> {
    if app_id.is_empty() {
        return Err(TokenError::EmptyField("AppId"));
    }
    if app_key.expose_secret().is_empty() {
        return Err(TokenError::EmptyField("AppKey"));
    }
    if room_id.is_empty() {
        return Err(TokenError::EmptyField("RoomId"));
    }
    if user_id.is_empty() {
        return Err(TokenError::EmptyField("UserId"));
    }
    if privileges.is_empty() {
        return Err(TokenError::NoPrivileges);
    }

    let issued_at = u32::try_from(now_unix_seconds)
        .map_err(|_| TokenError::TimestampOutOfRange(now_unix_seconds))?;
    let expire_at = issued_at
        .checked_add(TOKEN_VALIDITY_SECONDS)
        .ok_or(TokenError::TimestampOutOfRange(now_unix_seconds))?;

    let claims = TokenClaims {
        version: TOKEN_VERSION.to_string(),
        nonce,
        app_id: app_id.to_string(),
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
        issued_at,
        expire_at,
        privileges: privileges
            .iter()
            .map(|p| Privilege::new(p.kind, resolve_expiry(p.expire_at, expire_at)))
            .collect(),
    };

    serialize(&claims, app_key)
}

fn resolve_expiry(privilege_expire_at: u32, token_expire_at: u32) -> u32 {
    if privilege_expire_at == 0 {
        token_expire_at
    } else {
        privilege_expire_at
    }
}

fn serialize(claims: &TokenClaims, app_key: &SecretString) -> Result<String, TokenError> {
    let message = pack_message(claims)?;
    let mac = hmac_sha256(app_key.expose_secret().as_bytes(), &message)
        .map_err(TokenError::Signing)?;

    let mut content = ByteWriter::default();
    content.put_bytes("message", &message)?;
    content.put_bytes("signature", &mac)?;

    Ok(format!(
        "{}{}{}",
        claims.version,
        claims.app_id,
        URL_SAFE_NO_PAD.encode(content.into_inner())
    ))
}

fn pack_message(claims: &TokenClaims) -> Result<Vec<u8>, TokenError> {
    let mut buf = ByteWriter::default();
    buf.put_u32(claims.nonce);
    buf.put_u32(claims.issued_at);
    buf.put_u32(claims.expire_at);
    buf.put_str("RoomId", &claims.room_id)?;
    buf.put_str("UserId", &claims.user_id)?;

    let mut privileges = claims.privileges.clone();
    privileges.sort_by_key(|p| p.kind.code());
    let count =
        u16::try_from(privileges.len()).map_err(|_| TokenError::FieldTooLong("privileges"))?;
    buf.put_u16(count);
    for privilege in &privileges {
        buf.put_u16(privilege.kind.code());
        buf.put_u32(privilege.expire_at);
    }

    Ok(buf.into_inner())
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a token issued for `app_id` and verify its MAC against `app_key`.
///
/// The app id is carried in plain text ahead of the encoded body with no
/// delimiter, so the caller names the app the token belongs to.
///
/// The proxy never needs this on the request path; it exists so operators
/// and tests can inspect what was handed to a client.
pub fn decode(
    token: &str,
    app_id: &str,
    app_key: &SecretString,
) -> Result<TokenClaims, TokenError> {
    let body = token
        .strip_prefix(TOKEN_VERSION)
        .ok_or_else(|| TokenError::Malformed("unsupported version".to_string()))?;
    let encoded = body
        .strip_prefix(app_id)
        .ok_or_else(|| TokenError::Malformed("app id mismatch".to_string()))?;

    let raw = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| TokenError::Malformed(format!("invalid base64: {}", e)))?;

    let mut content = ByteReader::new(&raw);
    let message = content.get_bytes()?;
    let mac = content.get_bytes()?;
    content.finish()?;

    if !verify_hmac_sha256(app_key.expose_secret().as_bytes(), message, mac) {
        return Err(TokenError::SignatureMismatch);
    }

    let mut reader = ByteReader::new(message);
    let nonce = reader.get_u32()?;
    let issued_at = reader.get_u32()?;
    let expire_at = reader.get_u32()?;
    let room_id = reader.get_string()?;
    let user_id = reader.get_string()?;

    let count = reader.get_u16()?;
    let mut privileges = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let code = reader.get_u16()?;
        let kind = PrivilegeKind::from_code(code)
            .ok_or_else(|| TokenError::Malformed(format!("unknown privilege {}", code)))?;
        privileges.push(Privilege::new(kind, reader.get_u32()?));
    }
    reader.finish()?;

    Ok(TokenClaims {
        version: TOKEN_VERSION.to_string(),
        nonce,
        app_id: app_id.to_string(),
        room_id,
        user_id,
        issued_at,
        expire_at,
        privileges,
    })
}

// ============================================================================
// Packing helpers
// ============================================================================

#[derive(Default)]
struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn put_bytes(&mut self, field: &'static str, value: &[u8]) -> Result<(), TokenError> {
        let len = u16::try_from(value.len()).map_err(|_| TokenError::FieldTooLong(field))?;
        self.put_u16(len);
        self.buf.extend_from_slice(value);
        Ok(())
    }

    fn put_str(&mut self, field: &'static str, value: &str) -> Result<(), TokenError> {
        self.put_bytes(field, value.as_bytes())
    }

    fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], TokenError> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| TokenError::Malformed("length overflow".to_string()))?;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| TokenError::Malformed("unexpected end of token".to_string()))?;
        self.pos = end;
        Ok(slice)
    }

    fn get_u16(&mut self) -> Result<u16, TokenError> {
        let bytes: [u8; 2] = self
            .take(2)?
            .try_into()
            .map_err(|_| TokenError::Malformed("bad u16".to_string()))?;
        Ok(u16::from_le_bytes(bytes))
    }

    fn get_u32(&mut self) -> Result<u32, TokenError> {
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| TokenError::Malformed("bad u32".to_string()))?;
        Ok(u32::from_le_bytes(bytes))
    }

    fn get_bytes(&mut self) -> Result<&'a [u8], TokenError> {
        let len = self.get_u16()?;
        self.take(usize::from(len))
    }

    fn get_string(&mut self) -> Result<String, TokenError> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| TokenError::Malformed("string is not UTF-8".to_string()))
    }

    fn finish(&self) -> Result<(), TokenError> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(TokenError::Malformed("trailing bytes".to_string()))
        }
    }
}
