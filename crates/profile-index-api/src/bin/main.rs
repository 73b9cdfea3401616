//! Profile Index server and maintenance CLI
//!
//! ```bash
//! # Run the API, the bus consumers, the revalidation sweep and cleanup
//! profile-index serve --port 8080 --data-dir /var/lib/profile-index
//!
//! # One-shot jobs against a stopped server's data directory
//! profile-index revalidate --data-dir /var/lib/profile-index
//! profile-index cleanup --data-dir /var/lib/profile-index
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use profile_index_api::{App, AppOptions};
use profile_index_core::CoreConfig;

#[derive(Parser)]
#[command(name = "profile-index")]
#[command(about = "Profile Index - validation, indexing and deletion of directory nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct StateArgs {
    /// sled data directory
    #[arg(long, env = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Elasticsearch base URL
    #[arg(long, env = "ELASTICSEARCH_URL")]
    elasticsearch_url: Option<String>,
}

impl From<StateArgs> for AppOptions {
    fn from(args: StateArgs) -> Self {
        AppOptions {
            data_dir: args.data_dir,
            elasticsearch_url: args.elasticsearch_url,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server with consumers, the revalidation sweep and cleanup
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080", env = "PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "HOST")]
        host: String,

        #[command(flatten)]
        state: StateArgs,
    },

    /// Re-enter stale nodes into validation once and wait for the results
    Revalidate {
        #[command(flatten)]
        state: StateArgs,

        /// Seconds to wait for the pipeline to drain
        #[arg(long, default_value = "300")]
        drain_secs: u64,
    },

    /// Purge old validation_failed nodes and tombstones once
    Cleanup {
        #[command(flatten)]
        state: StateArgs,
    },
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();
    let config = CoreConfig::from_env();

    match cli.command {
        Commands::Serve { port, host, state } => {
            let addr: SocketAddr = format!("{}:{}", host, port)
                .parse()
                .context("invalid listen address")?;
            let app = App::build(&state.into(), config).await?;
            app.start_consumers().await?;
            let schedulers = app.start_schedulers();

            tracing::info!(%addr, version = env!("CARGO_PKG_VERSION"), "Starting Profile Index");
            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app.router())
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            app.drain(Duration::from_secs(10)).await;
            app.shutdown();
            for scheduler in schedulers {
                if let Err(e) = scheduler.await {
                    tracing::error!(error = %e, "Scheduler did not stop cleanly");
                }
            }
        }

        Commands::Revalidate { state, drain_secs } => {
            let app = App::build(&state.into(), config).await?;
            app.start_consumers().await?;
            let republished = app.services.revalidation.run_once().await?;
            let drained = app.drain(Duration::from_secs(drain_secs)).await;
            app.shutdown();
            tracing::info!(republished, drained, "Revalidation finished");
            if !drained {
                anyhow::bail!("revalidation did not finish within {}s", drain_secs);
            }
        }

        Commands::Cleanup { state } => {
            let app = App::build(&state.into(), config).await?;
            let report = app.services.cleanup.run_once().await;
            app.shutdown();
            if !report.is_ok() {
                anyhow::bail!("cleanup finished with errors: {}", report.errors.join("; "));
            }
        }
    }

    Ok(())
}
