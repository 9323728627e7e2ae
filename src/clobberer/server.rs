use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState, SharedState};
use super::db::{ClobbererDb, DbHandle};
use super::models::ReleasePrefixes;
use super::taskcluster::TaskclusterClient;
use crate::config::{ClobbererConfig, TaskclusterSection};

/// Configuration for the clobberer server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub prefixes: ReleasePrefixes,
    pub taskcluster: TaskclusterSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ClobbererConfig::default().into()
    }
}

impl From<ClobbererConfig> for ServerConfig {
    fn from(config: ClobbererConfig) -> Self {
        Self {
            host: config.server.host,
            port: config.server.port,
            db_path: config.server.db_path,
            dev_mode: config.server.dev_mode,
            prefixes: config.buildbot.into(),
            taskcluster: config.taskcluster,
        }
    }
}

/// Build the full application router: every blueprint plus request tracing.
pub fn build_router(state: SharedState, dev_mode: bool) -> Router {
    let mut app = api::api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Open (or create) the database file, creating its parent directory.
pub fn open_db(path: &std::path::Path) -> Result<ClobbererDb> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    ClobbererDb::new(path).context("Failed to initialize clobberer database")
}

/// Start the clobberer server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = open_db(&config.db_path)?;
    let taskcluster = TaskclusterClient::from_config(&config.taskcluster)
        .context("Failed to build Taskcluster client")?;

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        prefixes: config.prefixes,
        taskcluster: Arc::new(taskcluster),
        taskcluster_config: config.taskcluster,
    });

    let app = build_router(state, config.dev_mode);

    let host = if config.dev_mode {
        "0.0.0.0"
    } else {
        config.host.as_str()
    };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        db_path = %config.db_path.display(),
        dev_mode = config.dev_mode,
        "clobberer listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
