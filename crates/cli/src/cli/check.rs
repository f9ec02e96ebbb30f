use std::io::Write;
use std::time::Duration;

use chrono::Utc;

use qg_engine::QuotaEngine;
use qg_store::Stores;

/// Exit code for a blocked identity.
pub const EXIT_BLOCKED: i32 = 2;

/// Print the decision for `identifier` as JSON.
///
/// Returns 0 when allowed and [`EXIT_BLOCKED`] when blocked.  Store
/// failures never surface here; they fail open inside the engine.
pub async fn check<W: Write>(
    stores: &Stores,
    timeout: Duration,
    identifier: &str,
    groups: &[String],
    pretty: bool,
    out: &mut W,
) -> anyhow::Result<i32> {
    let engine = QuotaEngine::new(stores, timeout);
    let decision = engine.decide(identifier, groups, Utc::now()).await;

    let json = if pretty {
        serde_json::to_string_pretty(&decision)?
    } else {
        serde_json::to_string(&decision)?
    };
    writeln!(out, "{json}")?;

    Ok(if decision.allowed { 0 } else { EXIT_BLOCKED })
}

/// Print the usage report for `identifier` as pretty JSON.
pub async fn report<W: Write>(
    stores: &Stores,
    timeout: Duration,
    identifier: &str,
    groups: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let engine = QuotaEngine::new(stores, timeout);
    let report = engine.report(identifier, groups, Utc::now()).await?;
    writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
    Ok(())
}
