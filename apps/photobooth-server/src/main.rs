use std::{env, future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use photobooth_ops::init_tracing;
use photobooth_orchestrator::{SimulatedHardware, SystemHandle};
use photobooth_types::{config::PhotoboothConfig, lifecycle::LifecycleState};
use tokio::net::TcpListener;
use tracing::{info, warn};

mod routes;
#[cfg(test)]
mod testing;

const DEFAULT_CONFIG_PATH: &str = "configs/photobooth.toml";

#[derive(Debug, Parser)]
#[command(name = "photobooth-server", about = "Photobooth capture and live preview server")]
struct Args {
    /// TOML config file. Defaults to $PHOTOBOOTH_CONFIG, then configs/photobooth.toml.
    #[arg(long)]
    config: Option<String>,
    /// Override `server.bind_addr`.
    #[arg(long)]
    bind: Option<String>,
    /// Override `server.port`.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config);
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    init_tracing(&config.ops)?;

    let handle = SystemHandle::new();
    handle.spawn_initialization(config.clone(), Arc::new(SimulatedHardware))?;

    let ready_timeout = Duration::from_millis(config.server.ready_timeout_ms);
    let waiter = handle.clone();
    let state = tokio::task::spawn_blocking(move || waiter.wait_ready(ready_timeout)).await?;
    match state {
        LifecycleState::Ready => info!("Camera system ready"),
        LifecycleState::Failed => warn!(
            "Camera system failed to initialize: {}; serving without capture",
            handle.failure().unwrap_or_default()
        ),
        other => warn!("Camera system still {other} after {ready_timeout:?}; serving anyway"),
    }

    let addr: SocketAddr = format!("{}:{}", config.server.bind_addr, config.server.port)
        .parse()
        .context("invalid server bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Serving photobooth on http://{addr}");

    serve(listener, handle, shutdown_signal()).await
}

/// Serve until `signal` resolves. The camera system is shut down before the
/// server drains, so live MJPEG responses end instead of holding it open.
async fn serve<S>(listener: TcpListener, handle: SystemHandle, signal: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let releaser = handle.clone();
    axum::serve(listener, routes::router(handle.clone()))
        .with_graceful_shutdown(async move {
            signal.await;
            release(releaser).await;
        })
        .await
        .context("HTTP server error")?;

    // No-op unless serving stopped without the signal.
    release(handle).await;
    Ok(())
}

async fn release(handle: SystemHandle) {
    if handle.state() == LifecycleState::ShuttingDown {
        return;
    }
    info!("Stopping camera system");
    if let Err(err) = tokio::task::spawn_blocking(move || handle.shutdown()).await {
        warn!("Camera system shutdown task failed: {err}");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("SIGTERM handler unavailable: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

fn load_config(from_args: Option<String>) -> PhotoboothConfig {
    let from_env = env::var("PHOTOBOOTH_CONFIG").ok();
    let path = from_args
        .or(from_env)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
    match PhotoboothConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                PhotoboothConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!(
                "Failed to load config from '{}': {err}. Falling back to internal defaults.",
                path
            );
            PhotoboothConfig::default()
        }
    }
}
