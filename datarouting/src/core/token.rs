use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One-time opaque identifier correlating a suspended transmission with its
/// eventual external confirmation.
///
/// Generated tokens are URL-safe. Parsed tokens are taken verbatim; only
/// blank input is refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(String);

impl ResumeToken {
    /// Generates a fresh, unguessable token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when parsing an empty or blank token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resume token: {0:?}")]
pub struct InvalidToken(pub String);

impl FromStr for ResumeToken {
    type Err = InvalidToken;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(InvalidToken(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}
