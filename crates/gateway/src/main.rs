use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use tg_domain::config::Config;
use tg_domain::validation::Severity;
use tg_gateway::api;
use tg_gateway::bootstrap::build_state;
use tg_gateway::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing(false);
            let (config, _config_path) = tg_gateway::cli::load_config()?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Stdio) => {
            // Stdout carries the protocol; logs go to stderr.
            init_tracing(true);
            let (config, _config_path) = tg_gateway::cli::load_config()?;
            run_stdio(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = tg_gateway::cli::load_config()?;
            let valid = tg_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = tg_gateway::cli::load_config()?;
            tg_gateway::cli::config::show(&config)?;
            Ok(())
        }
        Some(Command::Version) => {
            println!("toolgate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing.
fn init_tracing(to_stderr: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tg_gateway=debug"));
    if to_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    }
}

/// Validate the config, bailing out on errors (startup is the only
/// place ToolGate exits non-zero).
fn validate_config(config: &Config) -> anyhow::Result<()> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            Severity::Warning => tracing::warn!("config: {issue}"),
            Severity::Error => tracing::error!("config: {issue}"),
        }
    }
    let error_count = issues
        .iter()
        .filter(|i| i.severity == Severity::Error)
        .count();
    if error_count > 0 {
        anyhow::bail!("config validation failed with {error_count} error(s)");
    }
    Ok(())
}

/// Start the HTTP server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("ToolGate starting");
    validate_config(&config)?;

    let state = build_state(config.clone()).await?;

    // ── Periodic catalog refresh ─────────────────────────────────────
    {
        let catalog = state.catalog.clone();
        let interval_ms = config.policy.min_reload_interval_ms.max(1_000);
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                if let Err(e) = catalog.ensure_fresh(&cancel).await {
                    tracing::warn!(error = %e, "periodic catalog refresh failed");
                }
            }
        });
    }

    // ── Gateway: initial build + periodic rebuild ────────────────────
    if let Some(aggregator) = state.gateway.clone() {
        let interval_ms = config.gateway.min_rebuild_interval_ms.max(1_000);
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            aggregator.rebuild(&cancel).await;
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                aggregator.ensure_fresh(&cancel).await;
            }
        });
    }

    // ── CORS layer (config-aware) ────────────────────────────────────
    let cors_layer = build_cors_layer(&config.server.cors);

    // ── Concurrency limit (backpressure protection) ──────────────────
    let max_concurrent = std::env::var("TG_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Rate-limit layer (per-IP token bucket via governor) ──────────
    let governor_layer = config.server.rate_limit.as_ref().map(|rl| {
        use tower_governor::governor::GovernorConfigBuilder;
        use tower_governor::GovernorLayer;

        let gov_config = GovernorConfigBuilder::default()
            .per_second(rl.requests_per_second)
            .burst_size(rl.burst_size)
            .finish()
            .expect("rate_limit: requests_per_second and burst_size must be > 0");

        tracing::info!(
            requests_per_second = rl.requests_per_second,
            burst_size = rl.burst_size,
            "per-IP rate limiting enabled"
        );

        GovernorLayer {
            config: std::sync::Arc::new(gov_config),
        }
    });
    if governor_layer.is_none() {
        tracing::info!("per-IP rate limiting disabled (no [server.rate_limit] in config)");
    }

    // ── Router ───────────────────────────────────────────────────────
    let router = api::router(state.clone())
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));
    let app = if let Some(gov) = governor_layer {
        router.layer(gov).with_state(state)
    } else {
        router.with_state(state)
    };

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "ToolGate listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}

/// Serve MCP over stdin/stdout.
async fn run_stdio(config: Arc<Config>) -> anyhow::Result<()> {
    validate_config(&config)?;
    let state = build_state(config).await?;

    // Warm the gateway once so tools/list is populated immediately.
    if let Some(aggregator) = &state.gateway {
        aggregator.rebuild(&CancellationToken::new()).await;
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    tg_gateway::rpc::stdio::run(state.dispatcher.clone(), cancel)
        .await
        .context("stdio transport error")?;
    Ok(())
}

/// One compiled entry of the CORS allowlist.
///
/// MCP clients are expected to be local dev tools, so the config
/// speaks in origins with an optional `:*` port wildcard; everything
/// is compiled once here and evaluated by a single predicate.
enum OriginRule {
    /// Literal `"*"`.
    Any,
    /// A full origin, matched byte-for-byte.
    Exact(String),
    /// `scheme://host:` with any numeric port.
    AnyPort(String),
}

impl OriginRule {
    fn compile(origin: &str) -> Option<Self> {
        if origin == "*" {
            return Some(OriginRule::Any);
        }
        if let Some(base) = origin.strip_suffix(":*") {
            return Some(OriginRule::AnyPort(format!("{base}:")));
        }
        // Reject entries that could never appear in an Origin header.
        if origin.parse::<HeaderValue>().is_err() {
            tracing::warn!(origin = %origin, "unusable CORS origin entry, ignoring");
            return None;
        }
        Some(OriginRule::Exact(origin.to_string()))
    }

    fn permits(&self, origin: &str) -> bool {
        match self {
            OriginRule::Any => true,
            OriginRule::Exact(allowed) => origin == allowed,
            OriginRule::AnyPort(base) => match origin.strip_prefix(base.as_str()) {
                // Everything after `host:` has to be a port number;
                // "http://localhost:3000.evil.com" is not one.
                Some(port) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
                None => false,
            },
        }
    }
}

/// Build a [`CorsLayer`] from the configured allowed origins.
fn build_cors_layer(cors: &tg_domain::config::CorsConfig) -> CorsLayer {
    use axum::http::header;

    let rules: Vec<OriginRule> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| OriginRule::compile(origin))
        .collect();

    if rules.iter().any(|r| matches!(r, OriginRule::Any)) {
        tracing::warn!("CORS allowlist contains \"*\", every origin is permitted");
    }

    let allow_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .is_ok_and(|o| rules.iter().any(|rule| rule.permits(o)))
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
