use procura::api;
use procura::config::{default_config_path, ProcuraConfig};
use procura::node::Node;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Run the node
///
/// Serves the HTTP API on all interfaces at the configured port and runs the
/// discovery, health and reconciliation timers until Ctrl-C or SIGTERM.
///
/// ## Configuration Loading
///
/// Configuration is loaded from `--config` if provided, otherwise from
/// `~/.local/share/procura/config.toml`. If the file doesn't exist, a
/// default one is generated. `--port` and `--registry-url` override the
/// corresponding config values.
///
/// ## Logging
///
/// `RUST_LOG` takes precedence over `[logging] level`.
pub async fn execute(
    config_path: Option<String>,
    port: Option<u16>,
    registry_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_config(&config_path, port, registry_url)?;

    init_tracing(&config.logging.level);
    info!(
        "procura v{} starting (config: {})",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    let node = Arc::new(Node::from_config(&config).await?);
    let handle = node.start().await;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.node.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, node = %config.node.id, "HTTP API listening");

    let served = axum::serve(listener, api::router(node))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Shutdown signal received...");
    handle.shutdown().await;
    served?;
    Ok(())
}

/// Load (or create) the config file and apply command-line overrides.
fn load_config(
    path: &Path,
    port: Option<u16>,
    registry_url: Option<String>,
) -> Result<ProcuraConfig, Box<dyn std::error::Error>> {
    if !path.exists() {
        println!("📝 No config file found. Creating default configuration...");
        ProcuraConfig::create_default(path)?;
        println!("   Created: {}", path.display());
    }

    let mut config = ProcuraConfig::load(path)?;
    if let Some(port) = port {
        config.node.port = port;
    }
    if let Some(url) = registry_url {
        config.network.registry_url = Some(url);
    }
    Ok(config)
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // A subscriber may already be installed (tests, embedding).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
