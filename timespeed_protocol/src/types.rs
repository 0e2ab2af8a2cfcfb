// Core ID and version types for the time-speed wire protocol.
//
// `PlayerId` is the multiplayer identity of a game process (the game's own
// 64-bit unique player ID, not something the relay assigns). `ModVersion` is
// the semantic version a process reports for each installed add-on; peers use
// the host's reported version to decide whether the host can understand a
// request before sending one.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique multiplayer ID of a game process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic version of an installed add-on. On the wire it is the
/// `"major.minor.patch"` string from the add-on's manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Oldest version that understands the peer request messages.
pub const MIN_COMPATIBLE_VERSION: ModVersion = ModVersion::new(2, 8, 0);

impl ModVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn is_older_than(&self, other: ModVersion) -> bool {
        *self < other
    }
}

impl fmt::Display for ModVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid mod version {0:?}: expected major.minor.patch")]
pub struct ParseVersionError(pub String);

impl FromStr for ModVersion {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_owned());
        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u32, ParseVersionError> {
            parts.next().ok_or_else(err)?.parse().map_err(|_| err())
        };
        let version = ModVersion::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(version)
    }
}

impl TryFrom<String> for ModVersion {
    type Error = ParseVersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ModVersion> for String {
    fn from(version: ModVersion) -> Self {
        version.to_string()
    }
}
