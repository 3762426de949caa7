//! Entry point: loads configuration, restores persisted WAF state, and
//! serves the reverse-proxy/admin surface until shutdown.

mod admin;
mod config;
mod detector;
mod error;
mod events;
mod gate;
mod lock_utils;
mod private_target;
mod proxy;
mod server;
mod state;

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use config::Config;
use gate::AppState;
use state::IpStateStore;

#[derive(Parser)]
#[command(name = "nexus-waf")]
#[command(about = "Inline HTTP reverse-proxy Web Application Firewall", long_about = None)]
struct Cli {
    /// Path to the startup TOML config file.
    #[arg(short, long, default_value = "waf.toml")]
    config: String,

    /// Override the bind port from the config file.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        config.waf_port = port;
    }

    let store = IpStateStore::load(&config.banned_ips_path);
    let events = events::EventSink::new(&config.log_path);

    info!("╔════════════════════════════════════════════╗");
    info!("║              NexusWAF reverse proxy         ║");
    info!("╚════════════════════════════════════════════╝");
    info!("");
    info!("WAF port:    {}", config.waf_port);
    info!("Backend:     {}", config.snapshot().backend_url);
    info!(
        "Rate limit:  {} req / {}s",
        config.snapshot().max_requests,
        config.snapshot().time_window_seconds
    );
    info!(
        "Ban policy:  {} violations / {}s window",
        config.max_violations, config.violation_window_seconds
    );
    info!(
        "Banned IPs:  {} loaded from {}",
        store.banned_ips().len(),
        config.banned_ips_path.display()
    );
    warn!("admin surface at /admin is unauthenticated; bind it to a trusted interface only");

    let state = Arc::new(AppState::new(config, store, events));
    state.spawn_state_sweeper();

    let result = server::run(state.clone()).await;

    info!("persisting banned ip set before exit");
    state.store.save_on_shutdown();

    result
}
