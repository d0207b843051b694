//! Identifier: tagged identity for notes.
//!
//! A note created while offline gets a `Temporary` id minted by
//! [`TempIdGenerator`]. When the server confirms the create, the note is
//! remapped onto the `Permanent` id the server assigned. The two kinds are
//! separate enum variants, so nothing about the text of an id (length, digit
//! count, prefix) is ever used to tell them apart.
//!
//! Temporary tokens display as `{session:016x}-{seq}`: a random per-session
//! seed plus a monotonic counter.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Prefix used by the human-readable form of temporary identifiers.
const TEMP_PREFIX: &str = "tmp:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("Identifier is empty")]
    Empty,
    #[error("Invalid temporary token: {0}")]
    InvalidToken(String),
}

/// Client-minted token: random session seed plus per-session sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempToken {
    session: u64,
    seq: u64,
}

impl TempToken {
    pub fn session(&self) -> u64 {
        self.session
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Display for TempToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{}", self.session, self.seq)
    }
}

impl FromStr for TempToken {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IdentifierError::InvalidToken(s.to_string());
        let (session, seq) = s.split_once('-').ok_or_else(invalid)?;
        if session.len() != 16 || !session.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let session = u64::from_str_radix(&session.to_ascii_lowercase(), 16).map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self { session, seq })
    }
}

impl Serialize for TempToken {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TempToken {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Server-assigned identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for ServerId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ServerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identity of a note: either minted locally or assigned by the server.
///
/// Serialized in tagged form so persisted queues never depend on the shape
/// of the id itself:
///
/// ```
/// use notes_sync::{Identifier, ServerId};
///
/// let id = Identifier::Permanent(ServerId::from(42));
/// let json = serde_json::to_string(&id).unwrap();
/// assert_eq!(json, r#"{"kind":"permanent","value":"42"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Identifier {
    Temporary(TempToken),
    Permanent(ServerId),
}

impl Identifier {
    pub fn is_temporary(&self) -> bool {
        matches!(self, Identifier::Temporary(_))
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self, Identifier::Permanent(_))
    }

    /// The server id, if this note has been confirmed.
    pub fn server_id(&self) -> Option<&ServerId> {
        match self {
            Identifier::Permanent(id) => Some(id),
            Identifier::Temporary(_) => None,
        }
    }
}

impl From<ServerId> for Identifier {
    fn from(id: ServerId) -> Self {
        Identifier::Permanent(id)
    }
}

impl From<TempToken> for Identifier {
    fn from(token: TempToken) -> Self {
        Identifier::Temporary(token)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Temporary(token) => write!(f, "{TEMP_PREFIX}{token}"),
            Identifier::Permanent(id) => write!(f, "{id}"),
        }
    }
}

/// Parses the display form: `tmp:<token>` or a bare server id.
impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdentifierError::Empty);
        }
        match s.strip_prefix(TEMP_PREFIX) {
            Some(token) => Ok(Identifier::Temporary(token.parse()?)),
            None => Ok(Identifier::Permanent(ServerId::new(s))),
        }
    }
}

/// Mints temporary identifiers for the lifetime of one client session.
///
/// Every generator draws a fresh random session seed, so tokens minted before
/// a restart never collide with tokens minted after it, and the counter keeps
/// rapid successive creates apart within a session.
#[derive(Debug)]
pub struct TempIdGenerator {
    session: u64,
    next: AtomicU64,
}

impl TempIdGenerator {
    /// Create a generator with a random, non-zero session seed.
    pub fn new() -> Self {
        use rand::Rng;
        loop {
            let session: u64 = rand::rng().random();
            if session != 0 {
                return Self::with_session(session);
            }
        }
    }

    /// Create a generator with a fixed session seed.
    pub fn with_session(session: u64) -> Self {
        Self {
            session,
            next: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Mint the next temporary identifier.
    pub fn mint(&self) -> TempToken {
        TempToken {
            session: self.session,
            seq: self.next.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for TempIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
