use anyhow::{bail, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::api::{metrics::init_metrics, rate_limit::spawn_cleanup_task};
use storefront::cli::{run_command, Cli};
use storefront::config::Config;
use storefront::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if !cli.is_serve() {
        return run_command(&cli).await;
    }

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!(problem = %problem, "Invalid configuration");
        }
        bail!("Refusing to start with {} configuration problem(s)", problems.len());
    }

    tracing::info!("Starting storefront v{}", env!("CARGO_PKG_VERSION"));

    // Initialize database
    let db = storefront::db::init(&config.server.data_dir).await?;

    let metrics_handle = init_metrics()?;
    let state = AppState::new(config.clone(), db.clone()).with_metrics(metrics_handle);

    // Bootstrap administrator from configuration
    if let (Some(email), Some(password)) = (&config.auth.admin_email, &config.auth.admin_password) {
        let created = state
            .authority
            .ensure_admin_user(
                email,
                password,
                config.auth.admin_first_name.clone(),
                config.auth.admin_last_name.clone(),
            )
            .await?;
        if created {
            tracing::info!(email = %email, "Bootstrap administrator created");
        }
    }

    if config.rate_limit.enabled {
        spawn_cleanup_task(state.rate_limiter.clone(), config.rate_limit.cleanup_interval);
    }

    let app = storefront::api::create_router(Arc::new(state));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    db.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
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

    tracing::info!("Shutdown signal received");
}
