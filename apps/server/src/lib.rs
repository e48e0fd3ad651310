//! # Amora Server
//!
//! HTTP surface of the media store, built on `Axum` over [`amora_storage`].
//!
//! ## Example
//! ```no_run
//! use amora_server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Server::builder()
//!         .port(8090)
//!         .build()
//!         .await?
//!         .run()
//!         .await
//! }
//! ```

mod error;
mod handlers;
mod router;
mod state;

pub use error::{ApiError, ErrorCode};
pub use state::{AppState, AppStateInner};

use amora_kernel::config::{AppConfig, LoggingConfig, QuotaSetting};
use amora_logger::{LevelFilter, Logger};
use amora_storage::{QuotaMode, Storage};
use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

/// Time granted to in-flight requests once shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Installs the global subscriber described by `cfg`.
///
/// # Errors
/// Fails on an unknown level, malformed filter directives, an unusable log
/// directory, or when a subscriber is already installed.
pub fn init_logger(cfg: &LoggingConfig) -> Result<Logger> {
    let level: LevelFilter =
        cfg.level.parse().with_context(|| format!("Invalid log level: {}", cfg.level))?;

    let mut builder = Logger::builder().name(env!("CARGO_PKG_NAME")).level(level);
    if let Some(filter) = &cfg.filter {
        builder = builder.env_filter(filter.as_str());
    }
    if let Some(directory) = &cfg.directory {
        builder = builder.path(directory).json(cfg.json);
    }

    builder.init().context("Failed to initialize logging")
}

/// A fluent builder for configuring and initializing the [`Server`].
#[must_use = "builders do nothing unless you call .build()"]
#[derive(Debug, Default)]
pub struct ServerBuilder {
    cfg: AppConfig,
}

impl ServerBuilder {
    /// Set up the server's configuration.
    pub fn config(mut self, cfg: AppConfig) -> Self {
        self.cfg = cfg;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.cfg.server.port = port;
        self
    }

    /// Overrides the directory that holds the per-user namespaces.
    pub fn media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cfg.media.root = root.into();
        self
    }

    async fn init_storage(&self) -> Result<Storage> {
        let media = &self.cfg.media;
        let quota = match media.quota {
            QuotaSetting::Advisory => QuotaMode::Advisory,
            QuotaSetting::Strict => QuotaMode::Strict,
        };

        Storage::builder()
            .root(&media.root)
            .create(media.create_root)
            .tmp_max_age(media.tmp_max_age())
            .max_files(media.max_files)
            .quota(quota)
            .max_file_bytes(media.max_file_bytes)
            .connect()
            .await
            .with_context(|| format!("Failed to open media storage at {}", media.root.display()))
    }

    /// Consumes the builder and initializes the server.
    ///
    /// # Process
    /// 1. Opens the media storage (creating the root when configured to)
    /// 2. Constructs application state
    ///
    /// # Errors
    /// Returns an error if the storage root cannot be created or resolved.
    pub async fn build(self) -> Result<Server> {
        info!(address = %self.cfg.server.socket_addr(), "Initializing server");

        let storage = self.init_storage().await?;
        Ok(Server { state: AppState::new(self.cfg, storage) })
    }
}

/// A fully initialized server instance ready to run.
#[must_use = "call .run().await to start the server"]
#[derive(Debug)]
pub struct Server {
    state: AppState,
}

impl Server {
    /// Returns a new [`ServerBuilder`] to configure the server.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The fully layered application router, ready to serve or to drive in tests.
    #[must_use]
    pub fn router(&self) -> Router {
        router::init(self.state.clone())
    }

    /// Starts the server and runs until the shutdown signal is received.
    ///
    /// # Errors
    /// Returns an error if the server fails to bind to the configured address.
    pub async fn run(self) -> Result<()> {
        let address = self.state.config.server.socket_addr();
        let app = self.router();

        let handle = Handle::<SocketAddr>::new();
        let shutdown_handle = handle.clone();

        tokio::spawn(async move {
            if let Err(e) = shutdown_signal().await {
                error!("Error while waiting for shutdown signal: {e}");
                return;
            }
            info!("Shutdown signal received, starting graceful shutdown...");
            shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        });

        info!("Starting HTTP server on http://{address}");

        axum_server::bind(address)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("HTTP server failed")?;

        info!("Server shutdown complete");
        Ok(())
    }

    /// Returns a reference to the application state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }
}

/// Listens for shutdown signals (Ctrl+C, SIGTERM).
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("Failed to install Ctrl+C handler") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?
            .recv()
            .await;
        Ok::<_, anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        res = ctrl_c => {
            res.context("Ctrl+C signal received")?;
        },
        res = terminate => {
            res.context("SIGTERM signal received")?;
        },
    }

    Ok(())
}
