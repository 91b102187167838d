use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

const ID_PREFIX: &str = "shot-";
const ID_DIGITS: usize = 20;
const ARTIFACT_EXTENSION: &str = "png";
/// Largest timestamp that fits in `ID_DIGITS` digits.
const MAX_NANOS: u128 = 10u128.pow(ID_DIGITS as u32) - 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtifactIdError {
    #[error("artifact id must start with 'shot-': {raw}")]
    MissingPrefix { raw: String },
    #[error("artifact id timestamp must be 20 ascii digits: {raw}")]
    InvalidTimestamp { raw: String },
    #[error("artifact id space exhausted: no 20-digit timestamp left after the newest id")]
    Exhausted,
}

/// Sortable identifier of one captured artifact.
///
/// The textual form is `shot-` followed by a zero-padded nanosecond
/// timestamp, so string order, numeric order and capture order agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Timestamps past the 20-digit range saturate at the largest id.
    pub fn from_nanos(nanos: u128) -> Self {
        let nanos = nanos.min(MAX_NANOS);
        Self(format!("{ID_PREFIX}{nanos:0width$}", width = ID_DIGITS))
    }

    pub fn parse(raw: &str) -> Result<Self, ArtifactIdError> {
        let digits = raw
            .strip_prefix(ID_PREFIX)
            .ok_or_else(|| ArtifactIdError::MissingPrefix {
                raw: raw.to_string(),
            })?;
        if digits.len() != ID_DIGITS || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(ArtifactIdError::InvalidTimestamp {
                raw: raw.to_string(),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Parses a stored file name (`<id>.png`); anything else yields `None`.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(ARTIFACT_EXTENSION)?.strip_suffix('.')?;
        Self::parse(stem).ok()
    }

    pub fn file_name(&self) -> String {
        format!("{}.{ARTIFACT_EXTENSION}", self.0)
    }

    pub fn nanos(&self) -> u128 {
        self.0[ID_PREFIX.len()..].parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints strictly increasing ids from the wall clock.
#[derive(Debug, Default)]
pub struct IdMinter {
    last_nanos: Option<u128>,
}

impl IdMinter {
    pub fn seeded(last: Option<&ArtifactId>) -> Self {
        Self {
            last_nanos: last.map(ArtifactId::nanos),
        }
    }

    /// Fails with [`ArtifactIdError::Exhausted`] rather than repeat an id.
    pub fn mint(&mut self) -> Result<ArtifactId, ArtifactIdError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        self.next_at(now)
    }

    fn next_at(&mut self, now_nanos: u128) -> Result<ArtifactId, ArtifactIdError> {
        let nanos = match self.last_nanos {
            Some(last) if now_nanos <= last => last + 1,
            _ => now_nanos,
        };
        if nanos > MAX_NANOS {
            return Err(ArtifactIdError::Exhausted);
        }
        self.last_nanos = Some(nanos);
        Ok(ArtifactId::from_nanos(nanos))
    }
}

#[cfg(test)]
pub(crate) fn test_id(n: u128) -> ArtifactId {
    ArtifactId::from_nanos(1_000 + n)
}
