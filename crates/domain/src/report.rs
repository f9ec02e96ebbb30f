//! Operator-facing usage report: usage in the context of the effective policy.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decision::{PolicyRef, UsageSummary};
use crate::policy::{EnforcementMode, QuotaPolicy};
use crate::usage::UsageRecord;

/// Monthly alert band.  Reporting only; never consulted for enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Above the 80% threshold.
    Warning,
    /// Above the 90% threshold.
    Critical,
    /// Above the monthly limit itself.
    Exceeded,
}

impl AlertLevel {
    /// Band for `total_tokens` under `policy`; `None` when below 80% or the
    /// monthly limit is unlimited.
    pub fn classify(total_tokens: u64, policy: &QuotaPolicy) -> Option<Self> {
        if policy.monthly_token_limit == 0 {
            return None;
        }
        if total_tokens > policy.monthly_token_limit {
            Some(Self::Exceeded)
        } else if total_tokens > policy.warning_threshold_90 {
            Some(Self::Critical)
        } else if total_tokens > policy.warning_threshold_80 {
            Some(Self::Warning)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub identifier: String,
    pub policy_applied: bool,
    pub unlimited: bool,
    pub policy: Option<PolicyRef>,
    pub enforcement_mode: Option<EnforcementMode>,
    pub monthly_tokens: u64,
    pub daily_tokens: u64,
    pub estimated_cost: Decimal,
    pub summary: Option<UsageSummary>,
    pub warning_threshold_80: Option<u64>,
    pub warning_threshold_90: Option<u64>,
    pub alert_level: Option<AlertLevel>,
}

impl UsageReport {
    /// Build from a normalized usage record and the resolved policy, if any.
    pub fn build(identifier: &str, usage: &UsageRecord, policy: Option<&QuotaPolicy>) -> Self {
        let mut report = Self {
            identifier: identifier.to_string(),
            policy_applied: false,
            unlimited: true,
            policy: None,
            enforcement_mode: None,
            monthly_tokens: usage.total_tokens,
            daily_tokens: usage.daily_tokens,
            estimated_cost: usage.estimated_cost,
            summary: None,
            warning_threshold_80: None,
            warning_threshold_90: None,
            alert_level: None,
        };

        if let Some(policy) = policy {
            report.policy_applied = true;
            report.unlimited = false;
            report.policy = Some(PolicyRef::from(policy));
            report.enforcement_mode = Some(policy.enforcement_mode);
            report.summary = Some(UsageSummary::build(usage, policy));
            report.warning_threshold_80 = Some(policy.warning_threshold_80);
            report.warning_threshold_90 = Some(policy.warning_threshold_90);
            report.alert_level = AlertLevel::classify(usage.total_tokens, policy);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{NewPolicy, PolicyScope};

    fn policy(monthly: u64) -> QuotaPolicy {
        QuotaPolicy::from_new(
            NewPolicy::new(PolicyScope::Group, "eng", monthly),
            "2026-03-01T00:00:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn alert_bands() {
        let p = policy(1000);
        assert_eq!(AlertLevel::classify(800, &p), None);
        assert_eq!(AlertLevel::classify(801, &p), Some(AlertLevel::Warning));
        assert_eq!(AlertLevel::classify(901, &p), Some(AlertLevel::Critical));
        assert_eq!(AlertLevel::classify(1000, &p), Some(AlertLevel::Critical));
        assert_eq!(AlertLevel::classify(1001, &p), Some(AlertLevel::Exceeded));
    }

    #[test]
    fn unlimited_policy_never_alerts() {
        assert_eq!(AlertLevel::classify(u64::MAX, &policy(0)), None);
    }

    #[test]
    fn report_without_policy_is_unlimited() {
        let usage = UsageRecord::empty("a@x.io", "2026-03-14T00:00:00Z".parse().unwrap());
        let report = UsageReport::build("a@x.io", &usage, None);
        assert!(!report.policy_applied);
        assert!(report.unlimited);
        assert!(report.summary.is_none());
        assert!(report.alert_level.is_none());
    }

    #[test]
    fn report_with_policy_carries_thresholds() {
        let mut usage = UsageRecord::empty("a@x.io", "2026-03-14T00:00:00Z".parse().unwrap());
        usage.total_tokens = 950;
        let report = UsageReport::build("a@x.io", &usage, Some(&policy(1000)));
        assert!(report.policy_applied);
        assert_eq!(report.warning_threshold_80, Some(800));
        assert_eq!(report.warning_threshold_90, Some(900));
        assert_eq!(report.alert_level, Some(AlertLevel::Critical));
        assert_eq!(report.policy.unwrap().identifier, "eng");
    }
}
