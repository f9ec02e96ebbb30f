//! `quotagate policy ...` subcommands.

use std::io::Write;
use std::time::Duration;

use clap::Args;
use rust_decimal::Decimal;

use qg_domain::{EnforcementMode, NewPolicy, PolicyScope, PolicyUpdate};
use qg_engine::PolicyAdmin;
use qg_store::Stores;

use super::PolicyCommand;

#[derive(Debug, Args)]
pub struct CreateArgs {
    /// user, group, or default.
    pub scope: PolicyScope,
    /// E-mail or group name; ignored for the default scope.
    #[arg(default_value = "default")]
    pub identifier: String,
    /// Monthly token limit (0 = unlimited).
    #[arg(long)]
    pub monthly: u64,
    /// Daily token limit.
    #[arg(long)]
    pub daily: Option<u64>,
    /// Monthly cost limit, e.g. 250.00.
    #[arg(long)]
    pub cost: Option<Decimal>,
    /// Warning threshold; defaults to 80% of the monthly limit.
    #[arg(long = "warn-80")]
    pub warn_80: Option<u64>,
    /// Warning threshold; defaults to 90% of the monthly limit.
    #[arg(long = "warn-90")]
    pub warn_90: Option<u64>,
    /// alert (report only) or block.
    #[arg(long, default_value = "alert")]
    pub mode: EnforcementMode,
    /// Create the policy disabled.
    #[arg(long)]
    pub disabled: bool,
    /// Administrator recorded as the creator.
    #[arg(long)]
    pub created_by: Option<String>,
}

impl From<CreateArgs> for NewPolicy {
    fn from(args: CreateArgs) -> Self {
        let mut new = NewPolicy::new(args.scope, args.identifier, args.monthly);
        new.daily_token_limit = args.daily;
        new.monthly_cost_limit = args.cost;
        new.warning_threshold_80 = args.warn_80;
        new.warning_threshold_90 = args.warn_90;
        new.enforcement_mode = args.mode;
        new.enabled = !args.disabled;
        new.created_by = args.created_by;
        new
    }
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    pub scope: PolicyScope,
    #[arg(default_value = "default")]
    pub identifier: String,
    #[arg(long)]
    pub monthly: Option<u64>,
    #[arg(long)]
    pub daily: Option<u64>,
    #[arg(long)]
    pub cost: Option<Decimal>,
    #[arg(long = "warn-80")]
    pub warn_80: Option<u64>,
    #[arg(long = "warn-90")]
    pub warn_90: Option<u64>,
    #[arg(long)]
    pub mode: Option<EnforcementMode>,
    /// true or false.
    #[arg(long)]
    pub enabled: Option<bool>,
}

impl UpdateArgs {
    fn into_update(self) -> (PolicyScope, String, PolicyUpdate) {
        let update = PolicyUpdate {
            monthly_token_limit: self.monthly,
            daily_token_limit: self.daily,
            monthly_cost_limit: self.cost,
            warning_threshold_80: self.warn_80,
            warning_threshold_90: self.warn_90,
            enforcement_mode: self.mode,
            enabled: self.enabled,
        };
        (self.scope, self.identifier, update)
    }
}

/// Execute a policy subcommand, printing results as pretty JSON.
///
/// Returns exit code 1 when `get` finds nothing; errors propagate.
pub async fn run<W: Write>(
    stores: &Stores,
    timeout: Duration,
    command: PolicyCommand,
    out: &mut W,
) -> anyhow::Result<i32> {
    let admin = PolicyAdmin::new(stores.policies.clone(), timeout);

    match command {
        PolicyCommand::Create(args) => {
            let policy = admin.create(args.into()).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&policy)?)?;
        }
        PolicyCommand::Get { scope, identifier } => match admin.get(scope, &identifier).await? {
            Some(policy) => writeln!(out, "{}", serde_json::to_string_pretty(&policy)?)?,
            None => {
                eprintln!("no {scope} policy for '{identifier}'");
                return Ok(1);
            }
        },
        PolicyCommand::Update(args) => {
            let (scope, identifier, update) = args.into_update();
            let policy = admin.update(scope, &identifier, update).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&policy)?)?;
        }
        PolicyCommand::Delete { scope, identifier } => {
            let deleted = admin.delete(scope, &identifier).await?;
            let body = serde_json::json!({ "deleted": deleted });
            writeln!(out, "{body}")?;
        }
        PolicyCommand::List { scope } => {
            let policies = admin.list(scope).await?;
            writeln!(out, "{}", serde_json::to_string_pretty(&policies)?)?;
        }
    }

    Ok(0)
}
