//! `config validate` / `config show`.
//!
//! ToolGate has two declarative inputs: `config.toml` and the policy
//! document it points at. `validate` checks both in one pass so a bad
//! policy file is caught before `serve` refuses to start.

use std::path::Path;

use anyhow::Context;

use tg_domain::config::Config;
use tg_domain::policy::PolicyConfig;
use tg_domain::validation::{Issue, Severity};

/// Validate the config file and, when one is configured, the policy
/// document. Returns false when any errors were found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let mut ok = report("config", config_path, &config.validate());

    match &config.policy.path {
        Some(path) => match load_policy(path) {
            Ok(policy) => {
                ok &= report("policy", &path.display().to_string(), &policy.validate());
            }
            Err(reason) => {
                println!("policy: unreadable ({reason})");
                ok = false;
            }
        },
        None => {
            println!("policy: none configured (catalog stays empty, every call is denied)");
        }
    }

    ok
}

/// Print one document's findings, errors before warnings.
fn report(label: &str, source: &str, issues: &[Issue]) -> bool {
    if issues.is_empty() {
        println!("{label}: OK ({source})");
        return true;
    }

    let (errors, warnings): (Vec<&Issue>, Vec<&Issue>) = issues
        .iter()
        .partition(|i| i.severity == Severity::Error);

    println!(
        "{label}: {} error(s), {} warning(s) in {source}",
        errors.len(),
        warnings.len()
    );
    for issue in errors.iter().chain(warnings.iter()) {
        println!("  {issue}");
    }

    errors.is_empty()
}

/// Synchronous policy load for the CLI path; the serving path goes
/// through the async `FilePolicySource` instead.
fn load_policy(path: &Path) -> Result<PolicyConfig, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("reading {}: {e}", path.display()))?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw).map_err(|e| format!("parsing {}: {e}", path.display()))
    } else {
        serde_json::from_str(&raw).map_err(|e| format!("parsing {}: {e}", path.display()))
    }
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config).context("serializing resolved config")?;
    print!("{rendered}");
    Ok(())
}
