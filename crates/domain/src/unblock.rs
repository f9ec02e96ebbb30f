//! Temporary unblock grants and their evaluated status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An administrator-granted exemption from quota blocking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnblockOverride {
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
    pub granted_by: String,
    pub granted_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Free-form label of the grant length chosen by the admin (e.g. `"24h"`).
    #[serde(default)]
    pub duration_type: Option<String>,
}

impl UnblockOverride {
    /// Active up to and including `expires_at`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

/// Result of checking an identity for an unblock grant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnblockStatus {
    pub is_unblocked: bool,
    /// Present only when a grant exists but has lapsed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_type: Option<String>,
}

impl UnblockStatus {
    /// No grant on record.
    pub fn none() -> Self {
        Self::default()
    }

    /// A grant exists but is past its expiry.
    pub fn expired() -> Self {
        Self {
            expired: Some(true),
            ..Self::default()
        }
    }

    pub fn active(grant: &UnblockOverride) -> Self {
        Self {
            is_unblocked: true,
            expired: None,
            expires_at: Some(grant.expires_at),
            granted_by: Some(grant.granted_by.clone()),
            granted_at: Some(grant.granted_at),
            reason: grant.reason.clone(),
            duration_type: grant.duration_type.clone(),
        }
    }

    /// Evaluate an optional grant at `now`.
    pub fn evaluate(grant: Option<&UnblockOverride>, now: DateTime<Utc>) -> Self {
        match grant {
            None => Self::none(),
            Some(g) if g.is_active_at(now) => Self::active(g),
            Some(_) => Self::expired(),
        }
    }
}
