//! Quota policy model: scopes, enforcement modes, and the policy document.
//!
//! A policy is addressed by a [`PolicyKey`] (scope + identifier).  The
//! Default scope has exactly one addressable record, so its identifier is
//! normalized to [`DEFAULT_IDENTIFIER`] whenever a key is built.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, StoreError};

/// Identifier every Default-scoped policy is stored under.
pub const DEFAULT_IDENTIFIER: &str = "default";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scope & enforcement mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Level at which a policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    /// A single identity, keyed by e-mail.
    User,
    /// Every member of a directory group.
    Group,
    /// Organization-wide fallback.
    Default,
}

impl PolicyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for PolicyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            "default" => Ok(Self::Default),
            other => Err(Error::Validation(format!(
                "scope must be one of user, group, default (got '{other}')"
            ))),
        }
    }
}

/// What happens once usage reaches a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Report only; never blocks.
    #[default]
    Alert,
    /// Deny once any configured limit is reached.
    Block,
}

impl EnforcementMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for EnforcementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnforcementMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alert" => Ok(Self::Alert),
            "block" => Ok(Self::Block),
            other => Err(Error::Validation(format!(
                "enforcement_mode must be 'alert' or 'block' (got '{other}')"
            ))),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Key
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Store key of a policy: `(scope, identifier)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyKey {
    pub scope: PolicyScope,
    pub identifier: String,
}

impl PolicyKey {
    /// Build a key, normalizing the identifier of Default-scoped keys.
    pub fn new(scope: PolicyScope, identifier: impl Into<String>) -> Self {
        let identifier = match scope {
            PolicyScope::Default => DEFAULT_IDENTIFIER.to_string(),
            _ => identifier.into(),
        };
        Self { scope, identifier }
    }

    pub fn user(email: impl Into<String>) -> Self {
        Self::new(PolicyScope::User, email)
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(PolicyScope::Group, name)
    }

    pub fn default_scope() -> Self {
        Self::new(PolicyScope::Default, DEFAULT_IDENTIFIER)
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.identifier)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A stored quota policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub scope: PolicyScope,
    pub identifier: String,
    /// Monthly token cap. `0` = unlimited.
    pub monthly_token_limit: u64,
    #[serde(default)]
    pub daily_token_limit: Option<u64>,
    /// Monthly spend cap in USD.
    #[serde(default)]
    pub monthly_cost_limit: Option<Decimal>,
    pub warning_threshold_80: u64,
    pub warning_threshold_90: u64,
    #[serde(default)]
    pub enforcement_mode: EnforcementMode,
    #[serde(default = "d_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn d_true() -> bool {
    true
}

impl QuotaPolicy {
    pub fn key(&self) -> PolicyKey {
        PolicyKey::new(self.scope, self.identifier.clone())
    }

    /// Materialize a validated creation request.
    ///
    /// Normalizes the Default identifier and fills in any warning threshold
    /// the caller left unset.
    pub fn from_new(new: NewPolicy, now: DateTime<Utc>) -> Self {
        let key = PolicyKey::new(new.scope, new.identifier);
        let (warn_80, warn_90) = resolve_thresholds(
            new.monthly_token_limit,
            new.warning_threshold_80,
            new.warning_threshold_90,
        );
        Self {
            scope: key.scope,
            identifier: key.identifier,
            monthly_token_limit: new.monthly_token_limit,
            daily_token_limit: new.daily_token_limit,
            monthly_cost_limit: new.monthly_cost_limit,
            warning_threshold_80: warn_80,
            warning_threshold_90: warn_90,
            enforcement_mode: new.enforcement_mode,
            enabled: new.enabled,
            created_at: now,
            updated_at: now,
            created_by: new.created_by,
        }
    }
}

/// `percent`% of `limit`, rounded down.
pub fn derive_threshold(limit: u64, percent: u64) -> u64 {
    (u128::from(limit) * u128::from(percent) / 100) as u64
}

fn resolve_thresholds(limit: u64, warn_80: Option<u64>, warn_90: Option<u64>) -> (u64, u64) {
    (
        warn_80.unwrap_or_else(|| derive_threshold(limit, 80)),
        warn_90.unwrap_or_else(|| derive_threshold(limit, 90)),
    )
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Create / update requests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Input to policy creation.
#[derive(Debug, Clone)]
pub struct NewPolicy {
    pub scope: PolicyScope,
    pub identifier: String,
    pub monthly_token_limit: u64,
    pub daily_token_limit: Option<u64>,
    pub monthly_cost_limit: Option<Decimal>,
    pub warning_threshold_80: Option<u64>,
    pub warning_threshold_90: Option<u64>,
    pub enforcement_mode: EnforcementMode,
    pub enabled: bool,
    pub created_by: Option<String>,
}

impl NewPolicy {
    /// Alert-mode, enabled policy with only a monthly token limit.
    pub fn new(scope: PolicyScope, identifier: impl Into<String>, monthly_token_limit: u64) -> Self {
        Self {
            scope,
            identifier: identifier.into(),
            monthly_token_limit,
            daily_token_limit: None,
            monthly_cost_limit: None,
            warning_threshold_80: None,
            warning_threshold_90: None,
            enforcement_mode: EnforcementMode::Alert,
            enabled: true,
            created_by: None,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.scope != PolicyScope::Default && self.identifier.trim().is_empty() {
            return Err(Error::Validation(format!(
                "identifier must not be empty for {} policies",
                self.scope
            )));
        }
        validate_limits(self.daily_token_limit, self.monthly_cost_limit)?;
        let (w80, w90) = resolve_thresholds(
            self.monthly_token_limit,
            self.warning_threshold_80,
            self.warning_threshold_90,
        );
        check_threshold_order(w80, w90)
    }
}

/// Caller-supplied partial update.  `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct PolicyUpdate {
    pub monthly_token_limit: Option<u64>,
    pub daily_token_limit: Option<u64>,
    pub monthly_cost_limit: Option<Decimal>,
    pub warning_threshold_80: Option<u64>,
    pub warning_threshold_90: Option<u64>,
    pub enforcement_mode: Option<EnforcementMode>,
    pub enabled: Option<bool>,
}

impl PolicyUpdate {
    /// Checks what can be checked without the stored record.  The final
    /// threshold order is enforced again by [`PolicyPatch::apply`].
    pub fn validate(&self) -> Result<(), Error> {
        validate_limits(self.daily_token_limit, self.monthly_cost_limit)?;
        match self.monthly_token_limit {
            Some(limit) => {
                let (w80, w90) =
                    resolve_thresholds(limit, self.warning_threshold_80, self.warning_threshold_90);
                check_threshold_order(w80, w90)
            }
            None => match (self.warning_threshold_80, self.warning_threshold_90) {
                (Some(w80), Some(w90)) => check_threshold_order(w80, w90),
                _ => Ok(()),
            },
        }
    }

    /// Resolve into the patch a store applies.
    ///
    /// A new monthly limit re-derives whichever warning threshold the caller
    /// did not supply explicitly.
    pub fn into_patch(self, now: DateTime<Utc>) -> PolicyPatch {
        let (warn_80, warn_90) = match self.monthly_token_limit {
            Some(limit) => {
                let (w80, w90) =
                    resolve_thresholds(limit, self.warning_threshold_80, self.warning_threshold_90);
                (Some(w80), Some(w90))
            }
            None => (self.warning_threshold_80, self.warning_threshold_90),
        };
        PolicyPatch {
            monthly_token_limit: self.monthly_token_limit,
            daily_token_limit: self.daily_token_limit,
            monthly_cost_limit: self.monthly_cost_limit,
            warning_threshold_80: warn_80,
            warning_threshold_90: warn_90,
            enforcement_mode: self.enforcement_mode,
            enabled: self.enabled,
            updated_at: now,
        }
    }
}

/// Fully resolved field changes for one stored policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyPatch {
    pub monthly_token_limit: Option<u64>,
    pub daily_token_limit: Option<u64>,
    pub monthly_cost_limit: Option<Decimal>,
    pub warning_threshold_80: Option<u64>,
    pub warning_threshold_90: Option<u64>,
    pub enforcement_mode: Option<EnforcementMode>,
    pub enabled: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl PolicyPatch {
    /// Apply to `policy`, refreshing `updated_at`.
    ///
    /// Fails with [`StoreError::Rejected`] when the patched record would have
    /// `warning_threshold_80 > warning_threshold_90`; `policy` is then left
    /// untouched.
    pub fn apply(&self, policy: &mut QuotaPolicy) -> Result<(), StoreError> {
        let mut next = policy.clone();
        if let Some(v) = self.monthly_token_limit {
            next.monthly_token_limit = v;
        }
        if let Some(v) = self.daily_token_limit {
            next.daily_token_limit = Some(v);
        }
        if let Some(v) = self.monthly_cost_limit {
            next.monthly_cost_limit = Some(v);
        }
        if let Some(v) = self.warning_threshold_80 {
            next.warning_threshold_80 = v;
        }
        if let Some(v) = self.warning_threshold_90 {
            next.warning_threshold_90 = v;
        }
        if let Some(v) = self.enforcement_mode {
            next.enforcement_mode = v;
        }
        if let Some(v) = self.enabled {
            next.enabled = v;
        }
        next.updated_at = self.updated_at;

        if let Err(Error::Validation(msg)) =
            check_threshold_order(next.warning_threshold_80, next.warning_threshold_90)
        {
            return Err(StoreError::Rejected(msg));
        }
        *policy = next;
        Ok(())
    }
}

fn validate_limits(daily: Option<u64>, cost: Option<Decimal>) -> Result<(), Error> {
    if daily == Some(0) {
        return Err(Error::Validation(
            "daily_token_limit must be greater than 0".into(),
        ));
    }
    if let Some(cost) = cost {
        if cost <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "monthly_cost_limit must be greater than 0 (got {cost})"
            )));
        }
    }
    Ok(())
}

fn check_threshold_order(warn_80: u64, warn_90: u64) -> Result<(), Error> {
    if warn_80 > warn_90 {
        return Err(Error::Validation(format!(
            "warning_threshold_80 ({warn_80}) must not exceed warning_threshold_90 ({warn_90})"
        )));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
