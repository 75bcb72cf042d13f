//! Domain identifiers (strongly-typed task ids).
//!
//! Task ids are "slugs": the 16 bytes of a v4 UUID rendered as 22 characters
//! of URL-safe base64 without padding. The version and variant bits of the
//! UUID pin four positions of the encoding to a narrow character class, so a
//! well-formed id can be checked position by position.
//!
//! ## Why not accept any string?
//! - Dependency lists come from user-authored task definitions.
//! - A malformed entry must be rejected before anything is written to the
//!   relation tables, otherwise a task could wait forever on an id that no
//!   completion event will ever carry.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

/// Length of an encoded task id.
pub const TASK_ID_LEN: usize = 22;

const URL_SAFE_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{8}[Q-T][A-Za-z0-9_-][CGKOSWaeimquy26-][A-Za-z0-9_-]{10}[AQgw]$")
        .expect("slug pattern is a valid regex")
});

/// Error returned when a string is not a well-formed task id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed task id {0:?}")]
pub struct IdError(pub String);

/// Identifier of a Task.
///
/// Construction always validates, so holding a `TaskId` means the value is
/// well-formed. Ordering is plain string ordering, which the relation tables
/// use as their row order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId(String);

impl TaskId {
    /// Parse and validate a task id.
    pub fn parse(value: &str) -> Result<Self, IdError> {
        if Self::is_well_formed(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(IdError(value.to_string()))
        }
    }

    /// Check the per-position character classes of the slug encoding.
    pub fn is_well_formed(value: &str) -> bool {
        value.len() == TASK_ID_LEN && SLUG_PATTERN.is_match(value)
    }

    /// Generate a fresh random task id (slug of a v4 UUID).
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Slug encoding of `uuid`. Only v4 UUIDs yield a well-formed id.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(encode_slug(uuid.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// URL-safe base64 without padding.
fn encode_slug(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(TASK_ID_LEN);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let n = (b0 << 16) | (b1 << 8) | b2;
        let sextets = [(n >> 18) & 63, (n >> 12) & 63, (n >> 6) & 63, n & 63];
        // 1 byte -> 2 chars, 2 bytes -> 3 chars, 3 bytes -> 4 chars
        for &s in &sextets[..chunk.len() + 1] {
            out.push(URL_SAFE_ALPHABET[s as usize] as char);
        }
    }
    out
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if Self::is_well_formed(&value) {
            Ok(Self(value))
        } else {
            Err(IdError(value))
        }
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
