use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// HTTP server with a bounded graceful shutdown.
pub struct WebServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<std::io::Result<()>>,
    grace: Duration,
}

impl WebServer {
    /// Bind and start serving in the background. Bind failure is returned to the caller.
    pub async fn start(bind_addr: &str, app: Router, grace: Duration) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("binding web server to {bind_addr}"))?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|stop| *stop).await;
                })
                .await
        });

        tracing::info!(addr = %local_addr, "web server listening");
        Ok(Self {
            local_addr,
            shutdown_tx,
            task,
            grace,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight requests, at most `grace`.
    pub async fn stop(self) {
        self.shutdown_tx.send_replace(true);
        let mut task = self.task;
        match tokio::time::timeout(self.grace, &mut task).await {
            Ok(Ok(Ok(()))) => tracing::info!("web server stopped"),
            Ok(Ok(Err(e))) => tracing::error!(error = %e, "web server failed"),
            Ok(Err(e)) => tracing::error!(error = %e, "web server task failed"),
            Err(_) => {
                tracing::warn!(grace_secs = self.grace.as_secs(), "web server shutdown timed out");
                task.abort();
            }
        }
    }
}
