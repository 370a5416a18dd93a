use core_config::server::ServerConfig;
use std::future::Future;
use std::io;
use tokio::signal;
use tracing::{error, info, warn};

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

/// Serve until a shutdown signal, then run `cleanup` bounded by the
/// configured shutdown timeout.
pub async fn serve<F>(router: axum::Router, config: &ServerConfig, cleanup: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send,
{
    let listener = tokio::net::TcpListener::bind(config.address()).await?;
    info!("Server starting on {}", listener.local_addr()?);

    let serve_result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| error!("Server encountered an error: {:?}", e));

    info!(
        "Starting cleanup tasks (timeout: {:?})",
        config.shutdown_timeout
    );
    match tokio::time::timeout(config.shutdown_timeout, cleanup).await {
        Ok(()) => info!("Cleanup completed successfully"),
        Err(_) => warn!(
            "Cleanup exceeded timeout of {:?}, forcing shutdown",
            config.shutdown_timeout
        ),
    }

    serve_result
}
