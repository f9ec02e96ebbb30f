use std::io::Write;

use qg_domain::config::{Config, ConfigSeverity};

/// Validate the config, printing any issues.
///
/// Returns exit code 0 when valid (warnings allowed), 1 when errors are found.
pub fn validate<W: Write>(config: &Config, config_path: &str, out: &mut W) -> anyhow::Result<i32> {
    let issues = config.validate();

    if issues.is_empty() {
        writeln!(out, "Config OK ({config_path})")?;
        return Ok(0);
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        writeln!(out, "{issue}")?;
    }

    writeln!(
        out,
        "\n{error_count} error(s), {warning_count} warning(s) in {config_path}"
    )?;

    Ok(if error_count == 0 { 0 } else { 1 })
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show<W: Write>(config: &Config, out: &mut W) -> anyhow::Result<()> {
    write!(out, "{}", toml::to_string_pretty(config)?)?;
    Ok(())
}
