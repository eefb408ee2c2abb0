pub mod config;

use clap::{Parser, Subcommand};

/// ToolGate — an MCP gateway and tool-hosting runtime.
#[derive(Debug, Parser)]
#[command(name = "toolgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Serve MCP over stdin/stdout instead of HTTP.
    Stdio,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config (and policy document, when configured) and
    /// report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `TG_CONFIG` (or
/// `config.toml` by default). Returns the parsed
/// [`Config`](tg_domain::config::Config) and the path that was used.
///
/// Shared by `serve`, `stdio`, and `config` subcommands so the logic
/// lives in one place.
pub fn load_config() -> anyhow::Result<(tg_domain::config::Config, String)> {
    let config_path = std::env::var("TG_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        tg_domain::config::Config::default()
    };

    Ok((config, config_path))
}
