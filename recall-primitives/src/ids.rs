//! Session and message identifier types.

use std::borrow::Borrow;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

const MAX_SESSION_KEY_LEN: usize = 256;

/// Tenant-scoped conversation identifier under which messages and cache
/// entries are partitioned.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey(String);

impl SessionKey {
    /// Creates a session key after validating its format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSessionKey`] if the key is empty, longer than
    /// 256 bytes, or contains control characters.
    pub fn new(key: impl Into<String>) -> crate::Result<Self> {
        let key = key.into();
        validate_session_key(&key)?;
        Ok(Self(key))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SessionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SessionKey {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for SessionKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<SessionKey> for String {
    fn from(value: SessionKey) -> Self {
        value.0
    }
}

fn validate_session_key(key: &str) -> crate::Result<()> {
    if key.trim().is_empty() {
        return Err(Error::InvalidSessionKey {
            key: key.into(),
            reason: "session key cannot be empty".into(),
        });
    }

    if key.len() > MAX_SESSION_KEY_LEN {
        return Err(Error::InvalidSessionKey {
            key: key.into(),
            reason: format!("session key length must be <= {MAX_SESSION_KEY_LEN}"),
        });
    }

    if key.chars().any(char::is_control) {
        return Err(Error::InvalidSessionKey {
            key: key.escape_debug().to_string(),
            reason: "session key must not contain control characters".into(),
        });
    }

    Ok(())
}

/// Unique identifier for a message recorded in a session transcript.
///
/// Assigned once when the message is built and carried unchanged through the
/// store, the journal file, and the cache. Two copies of a message with the
/// same id are the same message, which is how a cache refresh recognises a
/// message it already holds. Serialises as the bare hyphenated UUID string.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generates a fresh identifier for a new message.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::random()
    }
}

impl Display for MessageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<MessageId> for Uuid {
    fn from(value: MessageId) -> Self {
        value.0
    }
}

impl FromStr for MessageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s).map_err(Error::from)?;
        Ok(Self::from_uuid(uuid))
    }
}
