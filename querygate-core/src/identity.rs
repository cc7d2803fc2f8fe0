//! Validated identifiers.
//!
//! A `TenantId` or `SessionId` can only be built from a non-empty string, so
//! store operations that take them never have to reject their input.

use crate::{QueryGateResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// External store/customer identifier that scopes cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate and wrap a tenant identifier.
    pub fn new(raw: impl Into<String>) -> QueryGateResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "tenant".to_string(),
            }
            .into());
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = crate::QueryGateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Opaque conversation session token.
///
/// Ids are caller-supplied or generated. Once a session is evicted its id may
/// be reused and will start a fresh session, so ids are not unique across time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Validate and wrap a caller-supplied session id.
    pub fn new(raw: impl Into<String>) -> QueryGateResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "session_id".to_string(),
            }
            .into());
        }
        Ok(Self(raw))
    }

    /// Generate a fresh, time-sortable session id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Use the caller's id when present, otherwise generate one.
    pub fn or_generate(raw: Option<&str>) -> QueryGateResult<Self> {
        match raw {
            Some(raw) => Self::new(raw),
            None => Ok(Self::generate()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = crate::QueryGateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}
