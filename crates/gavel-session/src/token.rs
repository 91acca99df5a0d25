//! Session tokens and their digests.

use std::fmt;

use gavel_types::constants::{SESSION_TOKEN_BYTES, TOKEN_LOG_PREFIX_LEN};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// Bearer token handed to the client at login.
///
/// `Display` and `Debug` only show the first few characters, so a token
/// that ends up in a log line cannot be replayed.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Draw a fresh token from the operating system's CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; SESSION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        prefix_of(&self.0)
    }

    #[must_use]
    pub fn digest(&self) -> TokenDigest {
        TokenDigest::of(&self.0)
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", self.prefix())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({}…)", self.prefix())
    }
}

/// SHA-256 of a token string. The registry's key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenDigest([u8; 32]);

impl TokenDigest {
    #[must_use]
    pub fn of(token: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        Self(hasher.finalize().into())
    }
}

impl fmt::Debug for TokenDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "digest:{}", hex::encode(&self.0[..4]))
    }
}

/// The loggable head of a token, whatever its length.
pub(crate) fn prefix_of(token: &str) -> &str {
    token
        .char_indices()
        .nth(TOKEN_LOG_PREFIX_LEN)
        .map_or(token, |(end, _)| &token[..end])
}
