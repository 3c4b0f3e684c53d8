//! skiffd - the SKIFF exchange server daemon.

use clap::Parser;
use skiff_server::{Server, ServerConfig};
use skiff_store::MemoryStore;
use std::process::ExitCode;
use std::sync::Arc;

/// SKIFF - secure point-to-point file exchange server
#[derive(Parser)]
#[command(name = "skiffd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Listen port
    #[arg(short = 'p', value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::default();
    if let Some(port) = cli.port {
        config.port = port;
    }

    let server = match Server::new(config, Arc::new(MemoryStore::new())) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::from(1);
        }
    };

    let bound = match server.bind().await {
        Ok(bound) => bound,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::from(1);
        }
    };

    match server.run(bound, shutdown_signal()).await {
        Ok(()) => {
            tracing::info!("server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "fatal runtime error");
            ExitCode::from(2)
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
