//! Clawhost - configures, supervises and proxies the local chat gateway.

use anyhow::Context;
use clap::Parser;
use clawhost::auth::StaticOwnerAuthenticator;
use clawhost::config::{ensure_dir, load_config_from_path, validate_config, Config, LogConfig};
use clawhost::controller::GatewayController;
use clawhost::gateway::FileConfigStore;
use clawhost::proxy::ProxyBridge;
use clawhost::server::{build_router, AppState};
use clawhost::supervisor::{RetryPolicy, RetryingSupervisor, SupervisorCtl};
use clawhost::watcher::HealthWatcher;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

// ---- CLI ----

#[derive(Parser)]
#[command(name = "clawhost", about = "Gateway control plane", version)]
struct Args {
    /// Config file (JSON or TOML)
    #[arg(long, short, env = "CLAWHOST_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides server.bind)
    #[arg(long)]
    bind: Option<String>,

    /// Port (overrides server.port)
    #[arg(long, short)]
    port: Option<u16>,
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log.level.as_str().into());

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if log.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ---- Main ----

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => {
            dotenvy::dotenv().ok();
            load_config_from_path(path)?
        }
        None => Config::from_env()?,
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config.log);
    info!("Starting Clawhost v{}", clawhost::VERSION);

    let validation = validate_config(&config);
    for issue in &validation.warnings {
        warn!("Config: {}", issue);
    }
    if !validation.valid {
        for issue in &validation.errors {
            error!("Config: {}", issue);
        }
        anyhow::bail!("invalid configuration");
    }

    let auth = StaticOwnerAuthenticator::from_config(&config.server).ok_or_else(|| {
        anyhow::anyhow!(
            "No owner token configured. Set server.owner_token or CLAWHOST_OWNER_TOKEN."
        )
    })?;

    ensure_dir(&config.gateway.home_dir).with_context(|| {
        format!(
            "failed to create gateway home {}",
            config.gateway.home_dir.display()
        )
    })?;

    // Supervisor, store and controller
    let ctl = SupervisorCtl::from_config(&config.supervisor)?;
    let supervisor = RetryingSupervisor::new(ctl, RetryPolicy::from(&config.supervisor));
    let store = FileConfigStore::new(config.gateway.document_path());
    let controller = Arc::new(GatewayController::new(
        config.gateway.clone(),
        Arc::new(store),
        Arc::new(supervisor),
    ));

    match controller.recover().await {
        Ok(status) => info!(state = %status.state, "Gateway state recovered"),
        Err(e) => warn!("Gateway recovery failed: {}", e),
    }

    // Watcher
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = if config.watcher.enabled {
        let watcher = HealthWatcher::new(controller.clone(), config.watcher.interval);
        Some(tokio::spawn(watcher.run(shutdown_rx)))
    } else {
        None
    };

    // Build router
    let proxy = Arc::new(ProxyBridge::new(controller.clone(), config.proxy.clone())?);
    let state = AppState {
        controller: controller.clone(),
        proxy,
        auth: Arc::new(auth),
    };
    let app = build_router(state, &config.server.cors_origins);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    info!("Control API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = watcher {
        let _ = handle.await;
    }

    info!("Clawhost shutdown complete");
    Ok(())
}
