//! Shared types for QuotaGate: the policy/usage/override data model, the
//! decision returned by enforcement checks, the error taxonomy, and
//! configuration.

pub mod config;
pub mod decision;
pub mod error;
pub mod policy;
pub mod report;
pub mod unblock;
pub mod usage;

pub use decision::{Decision, DecisionReason, PolicyRef, UsageSummary};
pub use error::{Error, Result, StoreError, StoreResult};
pub use policy::{
    EnforcementMode, NewPolicy, PolicyKey, PolicyPatch, PolicyScope, PolicyUpdate, QuotaPolicy,
    DEFAULT_IDENTIFIER,
};
pub use report::{AlertLevel, UsageReport};
pub use unblock::{UnblockOverride, UnblockStatus};
pub use usage::{month_key, UsageRecord};
