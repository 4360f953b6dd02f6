use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};
use webresearch_gui::config::AppConfig;
use webresearch_gui::routes::build_router;
use webresearch_gui::state::AppState;
use webresearch_gui::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config)?;

    let state = AppState::try_new(&config)?;
    let app: Router = build_router(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        address = %config.listen_addr,
        max_concurrency = config.max_concurrency,
        assets = %config.assets_dir.display(),
        "webresearch-gui listening"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| {
            error!(error = %err, "server shutdown with error");
            err
        })?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            stream.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
