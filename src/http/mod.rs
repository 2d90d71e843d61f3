pub mod file_server;
pub mod proxy;

use crate::errors::ServeError;
use crate::services::config::ServerConfig;
use crate::services::logger::Logger;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;

/// Binds `config` and serves `app` until Ctrl+C or SIGTERM.
pub async fn serve(config: &ServerConfig, app: Router, logger: &Logger) -> Result<(), ServeError> {
    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    logger.info(
        "Listening",
        Some(&serde_json::json!({"addr": addr})),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(logger.clone()))
        .await
        .map_err(ServeError::Serve)?;

    logger.info("Server stopped", None);
    Ok(())
}

async fn shutdown_signal(logger: Logger) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            logger.warn(
                "Ctrl+C handler unavailable",
                Some(&serde_json::json!({"error": err.to_string()})),
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => logger.info("Received Ctrl+C signal", None),
        _ = terminate => logger.info("Received SIGTERM signal", None),
    }
}
