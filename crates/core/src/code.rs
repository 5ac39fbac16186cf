//! User-facing alert codes.

use compact_str::CompactString;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of every alert code.
pub const CODE_LEN: usize = 5;

/// 5-character alphanumeric code identifying an alert within a chat's book.
/// Uniqueness is only meaningful per book; it is not globally enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertCode(CompactString);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("alert codes are {CODE_LEN} letters or digits")]
pub struct ParseCodeError;

impl AlertCode {
    /// Generate a fresh code, drawn uniformly from A-Z and 0-9.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code: CompactString = (0..CODE_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Wrap a code that was previously produced by [`AlertCode::generate`],
    /// e.g. one read back from storage. Performs no validation.
    pub fn new_unchecked(code: impl Into<CompactString>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AlertCode {
    type Err = ParseCodeError;

    /// Parse user input, normalizing to uppercase.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != CODE_LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ParseCodeError);
        }
        Ok(Self(s.to_ascii_uppercase().into()))
    }
}
