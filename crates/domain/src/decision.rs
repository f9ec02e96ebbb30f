//! Enforcement decision and the usage snapshot attached to it.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::policy::{EnforcementMode, PolicyKey, PolicyScope, QuotaPolicy};
use crate::unblock::UnblockStatus;
use crate::usage::UsageRecord;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// No enabled policy applies; the identity is unlimited.
    NoPolicy,
    /// An active unblock grant bypasses enforcement.
    Unblocked,
    WithinQuota,
    MonthlyExceeded,
    DailyExceeded,
    CostExceeded,
    /// A backend failed; the request was let through.
    CheckFailed,
    /// The request carried no usable identity; let through.
    InvalidRequest,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoPolicy => "no_policy",
            Self::Unblocked => "unblocked",
            Self::WithinQuota => "within_quota",
            Self::MonthlyExceeded => "monthly_exceeded",
            Self::DailyExceeded => "daily_exceeded",
            Self::CostExceeded => "cost_exceeded",
            Self::CheckFailed => "check_failed",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which stored policy a decision was made against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRef {
    pub scope: PolicyScope,
    pub identifier: String,
}

impl From<&QuotaPolicy> for PolicyRef {
    fn from(policy: &QuotaPolicy) -> Self {
        Self {
            scope: policy.scope,
            identifier: policy.identifier.clone(),
        }
    }
}

impl From<PolicyRef> for PolicyKey {
    fn from(r: PolicyRef) -> Self {
        PolicyKey::new(r.scope, r.identifier)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage summary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Usage against each configured limit of a policy.
///
/// Raw counters are always present; `*_limit` / `*_percent` pairs appear
/// only for dimensions the policy actually limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub monthly_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_percent: Option<f64>,
    pub daily_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_percent: Option<f64>,
    pub estimated_cost: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_limit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_percent: Option<f64>,
}

impl UsageSummary {
    /// Summarize a usage record whose daily counter is already normalized.
    pub fn build(usage: &UsageRecord, policy: &QuotaPolicy) -> Self {
        let monthly = (policy.monthly_token_limit > 0).then_some(policy.monthly_token_limit);
        let daily = policy.daily_token_limit.filter(|l| *l > 0);
        let cost = policy.monthly_cost_limit.filter(|l| *l > Decimal::ZERO);

        Self {
            monthly_tokens: usage.total_tokens,
            monthly_limit: monthly,
            monthly_percent: monthly.map(|l| token_percent(usage.total_tokens, l)),
            daily_tokens: usage.daily_tokens,
            daily_limit: daily,
            daily_percent: daily.map(|l| token_percent(usage.daily_tokens, l)),
            estimated_cost: usage
                .estimated_cost
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            cost_limit: cost,
            cost_percent: cost.map(|l| cost_percent(usage.estimated_cost, l)),
        }
    }
}

/// `value / limit × 100`, one decimal place.  `limit` must be non-zero.
pub fn token_percent(value: u64, limit: u64) -> f64 {
    let pct = value as f64 / limit as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Cost percentage computed in decimal arithmetic, one decimal place.
pub fn cost_percent(value: Decimal, limit: Decimal) -> f64 {
    value
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|v| v.checked_div(limit))
        .map(|p| p.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|p| p.to_f64())
        .unwrap_or(f64::INFINITY)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Decision
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of one enforcement check.  Built fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
    pub enforcement_mode: Option<EnforcementMode>,
    pub usage: Option<UsageSummary>,
    pub policy: Option<PolicyRef>,
    pub unblock_status: Option<UnblockStatus>,
    pub message: String,
}

impl Decision {
    fn bare(reason: DecisionReason, message: String) -> Self {
        Self {
            allowed: true,
            reason,
            enforcement_mode: None,
            usage: None,
            policy: None,
            unblock_status: None,
            message,
        }
    }

    pub fn no_policy() -> Self {
        Self::bare(
            DecisionReason::NoPolicy,
            "No quota policy configured - unlimited access".into(),
        )
    }

    /// Fail-open result; `cause` only ever reaches the message.
    pub fn check_failed(cause: &dyn fmt::Display) -> Self {
        Self::bare(
            DecisionReason::CheckFailed,
            format!("Quota check failed (fail-open): {cause}"),
        )
    }

    pub fn invalid_request(detail: &str) -> Self {
        Self::bare(
            DecisionReason::InvalidRequest,
            format!("Invalid quota check request (fail-open): {detail}"),
        )
    }

    pub fn is_blocked(&self) -> bool {
        !self.allowed
    }
}

/// Format an integer with `,` thousands separators.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
