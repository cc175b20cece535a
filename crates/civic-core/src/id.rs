//! Issue identifiers
//!
//! Hash-based, fixed width: 24 lowercase Crockford base32 characters
//! (15 bytes of a SHA-256 digest over a random UUID and the current time).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Length of a well-formed identifier
pub const ID_LEN: usize = 24;

const ALPHABET: &str = "0123456789abcdefghjkmnpqrstvwxyz";

/// Validated issue identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueId(String);

impl IssueId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        let uuid = Uuid::new_v4();
        let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);

        let mut hasher = Sha256::new();
        hasher.update(uuid.as_bytes());
        hasher.update(timestamp.to_le_bytes());
        let hash = hasher.finalize();

        // 15 bytes encode to exactly 24 base32 chars, no padding
        let encoded = base32::encode(base32::Alphabet::Crockford, &hash[..15]).to_lowercase();
        Self(encoded)
    }

    /// Check identifier syntax without allocating
    pub fn is_valid(raw: &str) -> bool {
        raw.len() == ID_LEN && raw.chars().all(|c| ALPHABET.contains(c))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for IssueId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if Self::is_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::Error::InvalidId(s.to_string()))
        }
    }
}

impl TryFrom<String> for IssueId {
    type Error = crate::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<IssueId> for String {
    fn from(id: IssueId) -> Self {
        id.0
    }
}

impl std::fmt::Display for IssueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
