//! Enforcement decisions: policy + unblock grant + usage → ALLOW / BLOCK.
//!
//! [`QuotaEngine::decide`] is the user-facing path and never fails: any
//! store error (timeouts included) turns into an ALLOW with reason
//! `check_failed`.  [`QuotaEngine::report`] is operator-facing and
//! propagates errors instead.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use qg_domain::decision::{cost_percent, group_thousands, token_percent};
use qg_domain::{
    Decision, DecisionReason, EnforcementMode, PolicyRef, QuotaPolicy, Result, StoreResult,
    UnblockStatus, UsageRecord, UsageReport, UsageSummary,
};
use qg_store::Stores;

use crate::resolver::PolicyResolver;
use crate::unblock::OverrideChecker;
use crate::usage::UsageReader;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Limit evaluation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The first limit a usage record has reached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitBreach {
    Monthly { used: u64, limit: u64 },
    Daily { used: u64, limit: u64 },
    Cost { used: Decimal, limit: Decimal },
}

impl LimitBreach {
    pub fn reason(&self) -> DecisionReason {
        match self {
            Self::Monthly { .. } => DecisionReason::MonthlyExceeded,
            Self::Daily { .. } => DecisionReason::DailyExceeded,
            Self::Cost { .. } => DecisionReason::CostExceeded,
        }
    }

    pub fn message(&self) -> String {
        match *self {
            Self::Monthly { used, limit } => format!(
                "Monthly quota exceeded: {} / {} tokens ({:.1}%). Contact your administrator for assistance.",
                group_thousands(used),
                group_thousands(limit),
                token_percent(used, limit),
            ),
            Self::Daily { used, limit } => format!(
                "Daily quota exceeded: {} / {} tokens ({:.1}%). Quota resets at UTC midnight.",
                group_thousands(used),
                group_thousands(limit),
                token_percent(used, limit),
            ),
            Self::Cost { used, limit } => format!(
                "Monthly cost limit exceeded: ${:.2} / ${:.2} ({:.1}%). Contact your administrator for assistance.",
                used,
                limit,
                cost_percent(used, limit),
            ),
        }
    }
}

/// Check `usage` against `policy` in fixed order (monthly tokens, daily
/// tokens, cost), each inclusive, stopping at the first breach.
///
/// `usage` must already have its daily counter normalized for today.
/// Token limits come first; cost is an estimate and is checked last.
pub fn first_breach(policy: &QuotaPolicy, usage: &UsageRecord) -> Option<LimitBreach> {
    let monthly = policy.monthly_token_limit;
    if monthly > 0 && usage.total_tokens >= monthly {
        return Some(LimitBreach::Monthly {
            used: usage.total_tokens,
            limit: monthly,
        });
    }

    if let Some(daily) = policy.daily_token_limit.filter(|l| *l > 0) {
        if usage.daily_tokens >= daily {
            return Some(LimitBreach::Daily {
                used: usage.daily_tokens,
                limit: daily,
            });
        }
    }

    if let Some(cost) = policy.monthly_cost_limit.filter(|l| *l > Decimal::ZERO) {
        if usage.estimated_cost >= cost {
            return Some(LimitBreach::Cost {
                used: usage.estimated_cost,
                limit: cost,
            });
        }
    }

    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// QuotaEngine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stateless decision engine.
///
/// Holds only read handles to the stores, so one instance can be shared
/// behind an `Arc` and called concurrently for any number of identities.
pub struct QuotaEngine {
    resolver: PolicyResolver,
    usage: UsageReader,
    overrides: OverrideChecker,
}

impl QuotaEngine {
    /// Build an engine whose every store call is bounded by `timeout`.
    pub fn new(stores: &Stores, timeout: Duration) -> Self {
        Self {
            resolver: PolicyResolver::new(stores.policies.clone(), timeout),
            usage: UsageReader::new(stores.usage.clone(), timeout),
            overrides: OverrideChecker::new(stores.overrides.clone(), timeout),
        }
    }

    pub fn from_parts(
        resolver: PolicyResolver,
        usage: UsageReader,
        overrides: OverrideChecker,
    ) -> Self {
        Self {
            resolver,
            usage,
            overrides,
        }
    }

    /// Decide whether `identifier` (member of `groups`) may proceed at `now`.
    ///
    /// Never returns an error; failures fail open.
    pub async fn decide(&self, identifier: &str, groups: &[String], now: DateTime<Utc>) -> Decision {
        if identifier.trim().is_empty() {
            tracing::warn!("quota check without identifier, allowing");
            return Decision::invalid_request("identifier is required");
        }

        match self.evaluate(identifier, groups, now).await {
            Ok(decision) => {
                if decision.allowed {
                    tracing::debug!(identifier, reason = %decision.reason, "quota check passed");
                } else {
                    tracing::info!(identifier, reason = %decision.reason, "quota check blocked");
                }
                decision
            }
            Err(e) => {
                tracing::warn!(identifier, error = %e, "quota check failed, allowing (fail-open)");
                Decision::check_failed(&e)
            }
        }
    }

    async fn evaluate(
        &self,
        identifier: &str,
        groups: &[String],
        now: DateTime<Utc>,
    ) -> StoreResult<Decision> {
        let Some(policy) = self.resolver.resolve(identifier, groups).await? else {
            return Ok(Decision::no_policy());
        };

        let unblock = self.overrides.status(identifier, now).await?;
        let usage = self.usage.read(identifier, now).await?;
        let summary = UsageSummary::build(&usage, &policy);

        if unblock.is_unblocked {
            let until = unblock
                .expires_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            return Ok(decided(
                &policy,
                true,
                DecisionReason::Unblocked,
                summary,
                unblock,
                format!("Access granted - temporarily unblocked until {until}"),
            ));
        }

        if policy.enforcement_mode != EnforcementMode::Block {
            return Ok(decided(
                &policy,
                true,
                DecisionReason::WithinQuota,
                summary,
                unblock,
                "Access granted - enforcement mode is alert-only".into(),
            ));
        }

        Ok(match first_breach(&policy, &usage) {
            Some(breach) => decided(
                &policy,
                false,
                breach.reason(),
                summary,
                unblock,
                breach.message(),
            ),
            None => decided(
                &policy,
                true,
                DecisionReason::WithinQuota,
                summary,
                unblock,
                "Access granted - within quota limits".into(),
            ),
        })
    }

    /// Usage for `identifier` in the context of its effective policy.
    pub async fn report(
        &self,
        identifier: &str,
        groups: &[String],
        now: DateTime<Utc>,
    ) -> Result<UsageReport> {
        let policy = self.resolver.resolve(identifier, groups).await?;
        let usage = self.usage.read(identifier, now).await?;
        Ok(UsageReport::build(identifier, &usage, policy.as_ref()))
    }
}

fn decided(
    policy: &QuotaPolicy,
    allowed: bool,
    reason: DecisionReason,
    summary: UsageSummary,
    unblock: UnblockStatus,
    message: String,
) -> Decision {
    Decision {
        allowed,
        reason,
        enforcement_mode: Some(policy.enforcement_mode),
        usage: Some(summary),
        policy: Some(PolicyRef::from(policy)),
        unblock_status: Some(unblock),
        message,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
