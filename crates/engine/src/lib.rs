//! `qg-engine`: policy resolution, enforcement decisions, and policy
//! administration for QuotaGate.
//!
//! ```text
//! identifier + groups
//!        │
//!        ▼
//!  PolicyResolver ──► OverrideChecker ──► UsageReader ──► QuotaEngine ──► Decision
//! ```
//!
//! Every store call made from here is bounded by the configured timeout.
//! [`QuotaEngine::decide`] converts any failure into a fail-open decision;
//! [`PolicyAdmin`] and [`QuotaEngine::report`] surface them as typed errors.

mod bounded;

pub mod admin;
pub mod engine;
pub mod resolver;
pub mod unblock;
pub mod usage;

pub use admin::PolicyAdmin;
pub use engine::{first_breach, LimitBreach, QuotaEngine};
pub use resolver::PolicyResolver;
pub use unblock::OverrideChecker;
pub use usage::UsageReader;
