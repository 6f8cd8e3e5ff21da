//! Azure AD authorization-code demo server
//!
//! Single binary that:
//! 1. Keeps per-user login sessions behind a signed cookie
//! 2. Redirects logged-in users to the authority with a fresh state + PKCE
//! 3. Redeems the callback code and stores the token on the session
//! 4. Calls the protected resource API with that token
//!
//! `auth-demo simulate` drives the whole flow from a scripted browser.

mod browser;
mod callback;
mod config;
mod error;
mod metrics;
mod resource;
mod routes;
mod session;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{FromRef, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum_extra::extract::cookie::Key;
use azure_auth::{AuthorityClient, AuthorityConfig, CannedExchanger, TokenExchanger};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use session_store::SessionStore;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::resource::ResourceState;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "auth-demo", version, about = "Azure AD authorization-code flow demo")]
struct Cli {
    /// Path to the TOML config file (falls back to CONFIG_PATH, then auth-demo.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Drive a running server through login, callback, /me and logout
    Simulate {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        base_url: String,
        #[arg(long, default_value = "testuser")]
        username: String,
        /// Authorization code the simulated provider hands back
        #[arg(long, default_value = "XXXXXXXXX")]
        code: String,
    },
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    sessions: Arc<SessionStore>,
    exchanger: Arc<dyn TokenExchanger>,
    authority: Arc<AuthorityConfig>,
    post_logout_redirect_uri: Option<String>,
    resource: ResourceState,
    cookie_key: Key,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Build the axum router with all routes and shared state.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(routes::index))
        .route("/login", get(routes::login).post(routes::login))
        .route("/logout", get(routes::logout))
        .route("/azureLogin", get(routes::azure_login))
        .route("/azureResponse", get(callback::azure_response))
        .route("/me", get(resource::me))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cli.config.as_deref()).await,
        Command::Simulate {
            base_url,
            username,
            code,
        } => {
            let report = browser::run_scenario(&base_url, &username, &code).await?;
            let steps: Vec<String> = report
                .steps
                .iter()
                .map(|s| format!("{}={}", s.name, s.status))
                .collect();
            info!(
                steps = %steps.join(" "),
                me_status = report.me_status,
                me_body = %report.me_body,
                "simulated browser session completed"
            );
            Ok(())
        }
    }
}

async fn serve(cli_config_path: Option<&str>) -> Result<()> {
    info!("starting auth-demo");

    let prometheus = metrics::install_recorder().context("installing metrics recorder")?;

    let config_path = Config::resolve_path(cli_config_path);
    let config = if cli_config_path.is_some() || config_path.exists() {
        info!(path = %config_path.display(), "loading configuration");
        Config::load(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?
    } else {
        info!("no config file, using defaults and environment");
        Config::parse("").context("failed to build config from environment")?
    };

    info!(
        listen_addr = %config.server.listen_addr,
        tenant_id = %config.azure.tenant_id,
        client_id = %config.azure.client_id,
        redirect_uri = %config.azure.redirect_uri,
        resource_url = %config.resource.url,
        mock_token_exchange = config.test_mode.mock_token_exchange,
        mock_resource = config.test_mode.mock_resource,
        "configuration loaded"
    );

    let state = app_state(&config, prometheus)?;
    let app = build_router(state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await?;
    let _ = shutdown_tx.send(());

    // The drain timer starts at signal receipt, not at server start.
    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Wire config into handler state: pick the exchanger, build HTTP clients.
fn app_state(config: &Config, prometheus: PrometheusHandle) -> Result<AppState> {
    let timeout = Duration::from_secs(config.server.timeout_secs);
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("building HTTP client")?;

    let authority = config.authority();
    let exchanger: Arc<dyn TokenExchanger> = if config.test_mode.mock_token_exchange {
        warn!("test mode: token exchange returns canned tokens");
        Arc::new(CannedExchanger::new())
    } else {
        Arc::new(AuthorityClient::new(
            http.clone(),
            authority.clone(),
            config.azure.client_secret.clone(),
        ))
    };
    if config.test_mode.mock_resource {
        warn!("test mode: /me returns a canned profile");
    }

    let secret = config
        .session
        .secret
        .as_ref()
        .context("session secret missing after validation")?;

    Ok(AppState {
        sessions: Arc::new(SessionStore::new(Duration::from_secs(
            config.session.state_ttl_secs,
        ))),
        exchanger,
        authority: Arc::new(authority),
        post_logout_redirect_uri: config.azure.post_logout_redirect_uri.clone(),
        resource: ResourceState {
            client: http,
            url: config.resource.url.clone(),
            timeout,
            mock: config.test_mode.mock_resource,
        },
        cookie_key: session::cookie_key(secret),
        started_at: Instant::now(),
        prometheus,
    })
}

/// GET /health: liveness plus a session count.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "exchanger": state.exchanger.id(),
        "sessions": state.sessions.len().await,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint: returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("installing SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("installing Ctrl+C handler")?;
                info!("received SIGINT, shutting down");
            }
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("installing Ctrl+C handler")?;
        info!("received SIGINT, shutting down");
    }

    Ok(())
}
