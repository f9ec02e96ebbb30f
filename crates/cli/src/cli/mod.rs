pub mod check;
pub mod config;
pub mod policy;

use std::io::Write;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};

use qg_domain::config::Config;
use qg_domain::PolicyScope;

/// QuotaGate: quota policy resolution and enforcement decisions.
#[derive(Debug, Parser)]
#[command(name = "quotagate", version, about)]
pub struct Cli {
    /// Path to the config file (overrides `QG_CONFIG`).
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decide whether an identity may proceed.  Exits 2 when blocked.
    Check {
        /// User identifier (e-mail).
        identifier: String,
        /// Group membership; repeat for several groups.
        #[arg(long = "group")]
        groups: Vec<String>,
        /// Pretty-print the decision JSON.
        #[arg(long)]
        pretty: bool,
    },
    /// Show current-month usage against the effective policy.
    Report {
        identifier: String,
        #[arg(long = "group")]
        groups: Vec<String>,
    },
    /// Policy administration.
    #[command(subcommand)]
    Policy(PolicyCommand),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommand {
    /// Create a policy; fails if one already exists for the scope/identifier.
    Create(policy::CreateArgs),
    /// Print one policy.
    Get {
        scope: PolicyScope,
        /// Ignored for the default scope.
        #[arg(default_value = "default")]
        identifier: String,
    },
    /// Change selected fields of an existing policy.
    Update(policy::UpdateArgs),
    /// Remove a policy.
    Delete {
        scope: PolicyScope,
        #[arg(default_value = "default")]
        identifier: String,
    },
    /// List policies, optionally for one scope.
    List {
        #[arg(long)]
        scope: Option<PolicyScope>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from `explicit`, else the path in `QG_CONFIG`,
/// else `config.toml`.  A missing file yields the defaults.  Returns the
/// parsed [`Config`] and the path that was used.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<(Config, String)> {
    let config_path = explicit
        .map(str::to_string)
        .or_else(|| std::env::var("QG_CONFIG").ok())
        .unwrap_or_else(|| "config.toml".into());

    let config = if Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {config_path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {config_path}"))?
    } else {
        Config::default()
    };

    Ok((config, config_path))
}

// ── Dispatch ──────────────────────────────────────────────────────────

/// Run one command, writing its output to `out`.  Returns the process exit
/// code.
pub async fn run<W: Write>(
    command: Command,
    config: &Config,
    config_path: &str,
    out: &mut W,
) -> anyhow::Result<i32> {
    let timeout = config.store.timeout();
    match command {
        Command::Check {
            identifier,
            groups,
            pretty,
        } => {
            let stores = open_stores(config)?;
            check::check(&stores, timeout, &identifier, &groups, pretty, out).await
        }
        Command::Report { identifier, groups } => {
            let stores = open_stores(config)?;
            check::report(&stores, timeout, &identifier, &groups, out).await?;
            Ok(0)
        }
        Command::Policy(cmd) => {
            let stores = open_stores(config)?;
            policy::run(&stores, timeout, cmd, out).await
        }
        Command::Config(ConfigCommand::Validate) => config::validate(config, config_path, out),
        Command::Config(ConfigCommand::Show) => {
            config::show(config, out)?;
            Ok(0)
        }
    }
}

fn open_stores(config: &Config) -> anyhow::Result<qg_store::Stores> {
    qg_store::open(&config.store)
        .with_context(|| format!("opening {:?} store", config.store.backend))
}
