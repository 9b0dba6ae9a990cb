//! Forward HTTP proxy.
//!
//! ```text
//!                 ┌───────────────────────────────────────────────────────┐
//!                 │                    FORWARD PROXY                      │
//!                 │                                                       │
//!   Client ───────┼─▶ listener ──▶ dispatcher ──┬─▶ tunnel ──────────────┼───▶ Origin
//!                 │     (net)     filter/parse  ├─▶ cache (revalidate) ──┼───▶ (HTTP/1.0,
//!                 │               redirect      └─▶ upstream (forward) ──┼───▶  CONNECT)
//!                 │                                                       │
//!                 │   config (hot reload) · registry · observability      │
//!                 └───────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use forward_proxy::config::ProxyConfig;
use forward_proxy::lifecycle::{load_or_default, run, StartupOptions};
use forward_proxy::observability::init_logging;

#[derive(Parser)]
#[command(name = "forward-proxy")]
#[command(about = "Forward HTTP proxy with blocking, redirects and caching", long_about = None)]
struct Cli {
    /// Configuration file (JSON, or TOML for any other extension).
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Log level; overrides `observability.log_level`.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Reload the configuration when the file changes.
    #[arg(long, overrides_with = "no_watch")]
    watch: bool,

    /// Never watch the configuration file.
    #[arg(long, overrides_with = "watch")]
    no_watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = load_or_default(&cli.config)?;
    let missing = loaded.is_none();
    let config: ProxyConfig = loaded.unwrap_or_default();

    let level = cli.log_level.as_deref().unwrap_or(&config.observability.log_level);
    init_logging(level);
    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if missing {
        tracing::warn!(path = ?cli.config, "Config file not found, using defaults");
    }

    let watch = match (cli.watch, cli.no_watch) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };
    let options = StartupOptions {
        config_path: cli.config,
        watch,
    };

    run(config, options).await?;
    Ok(())
}
