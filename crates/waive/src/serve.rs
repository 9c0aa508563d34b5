//! Gateway server: one bridge, one worker, one HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use waiveconf::WaiveConfig;
use waiveproto::bridge::channel;
use waiveproto::{spawn_worker, BridgeOptions};

use crate::gateway::{router, GatewayState};
use crate::library::LibraryWorker;

/// A bound, running gateway.
pub struct Server {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    worker_shutdown: CancellationToken,
    http: JoinHandle<Result<()>>,
    worker: JoinHandle<()>,
}

impl Server {
    /// Bind the listener and start the worker and HTTP tasks.
    pub async fn start(config: Arc<WaiveConfig>) -> Result<Self> {
        let addr = config.bind.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;
        Self::start_on(listener, config)
    }

    pub fn start_on(listener: TcpListener, config: Arc<WaiveConfig>) -> Result<Self> {
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;
        let shutdown = CancellationToken::new();
        let worker_shutdown = CancellationToken::new();

        let options = BridgeOptions::default().with_reply_timeout(config.bridge.reply_timeout());
        let (bridge, port) = channel(options);
        let worker = spawn_worker(LibraryWorker::new(config.clone()), port, worker_shutdown.clone());

        let app = router(GatewayState::new(config, bridge));
        let http_shutdown = shutdown.clone();
        let http = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { http_shutdown.cancelled().await })
                .await
                .context("Server error")
        });

        Ok(Self {
            local_addr,
            shutdown,
            worker_shutdown,
            http,
            worker,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop accepting requests, let in-flight ones drain, then stop the worker.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.wait().await
    }

    /// Wait until the server exits, either via [`Server::stop`] or a
    /// cancelled shutdown token.
    pub async fn wait(self) -> Result<()> {
        let served = self.http.await.context("HTTP task panicked")?;
        self.worker_shutdown.cancel();
        self.worker.await.context("Worker task panicked")?;
        served
    }
}

/// Run the gateway until SIGINT or SIGTERM.
pub async fn run(config: WaiveConfig) -> Result<()> {
    let config = Arc::new(config);

    info!("Waive gateway starting");
    info!("   Assets: {}", config.paths.assets_root.display());
    match config.bridge.reply_timeout() {
        Some(timeout) => info!("   Reply timeout: {:?}", timeout),
        None => info!("   Reply timeout: none (wait for the worker)"),
    }

    let server = Server::start(config).await?;
    let addr = server.local_addr();

    info!("Waive ready on http://{}", addr);
    info!("   Work: GET /api/{{operation}}/{{id}} or POST /apipost");
    info!("   Samples: GET /sample/{{group}}/{{category}}/{{folder}}/{{filename}}");
    info!("   Health: GET http://{}/health", addr);

    let token = server.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    server.wait().await?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
