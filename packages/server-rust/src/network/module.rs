//! HTTP listener with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds the port, `serve()`
//! accepts connections until the shutdown future resolves, then drains.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{health_handler, liveness_handler, readiness_handler, rpc_handler, AppState};
use super::lifecycle::{Lifecycle, Phase};
use super::middleware::build_http_layers;
use crate::dispatch::Dispatcher;

/// Health routes. Everything else falls through to the dispatcher.
pub const HEALTH_PATH: &str = "/-/health";
pub const LIVENESS_PATH: &str = "/-/live";
pub const READINESS_PATH: &str = "/-/ready";

pub struct NetworkModule {
    config: NetworkConfig,
    dispatcher: Arc<Dispatcher>,
    listener: Option<TcpListener>,
    lifecycle: Arc<Lifecycle>,
}

impl NetworkModule {
    #[must_use]
    pub fn new(config: NetworkConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            dispatcher,
            listener: None,
            lifecycle: Arc::new(Lifecycle::new()),
        }
    }

    #[must_use]
    pub fn lifecycle(&self) -> Arc<Lifecycle> {
        Arc::clone(&self.lifecycle)
    }

    /// Health routes, the RPC fallback and the middleware stack.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            dispatcher: Arc::clone(&self.dispatcher),
            lifecycle: Arc::clone(&self.lifecycle),
            body_limit: self.config.body_limit,
            start_time: Instant::now(),
        };

        Router::new()
            .route(HEALTH_PATH, get(health_handler))
            .route(LIVENESS_PATH, get(liveness_handler))
            .route(READINESS_PATH, get(readiness_handler))
            .fallback(rpc_handler)
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the listener and returns the bound port, which differs from
    /// the configured one when that is 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then waits up to the configured
    /// drain timeout for in-flight calls.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, if the TLS
    /// material cannot be loaded, or on a fatal I/O error.
    pub async fn serve(mut self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let Some(listener) = self.listener.take() else {
            anyhow::bail!("start() must be called before serve()");
        };
        let router = self.build_router();
        let lifecycle = self.lifecycle;
        let config = self.config;

        {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move {
                shutdown.await;
                lifecycle.request_stop();
            });
        }
        lifecycle.set_phase(Phase::Serving);

        match &config.tls {
            Some(tls) => serve_tls(listener, router, tls, &config, Arc::clone(&lifecycle)).await?,
            None => serve_plain(listener, router, Arc::clone(&lifecycle)).await?,
        }

        if lifecycle.drain(config.drain_timeout).await {
            info!("all requests drained");
        }
        Ok(())
    }
}

async fn serve_plain(listener: TcpListener, router: Router, lifecycle: Arc<Lifecycle>) -> anyhow::Result<()> {
    info!("serving plain HTTP");
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move { lifecycle.stopped().await })
        .await?;
    Ok(())
}

/// Serves TLS with rustls, reusing the already bound listener.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls: &TlsConfig,
    config: &NetworkConfig,
    lifecycle: Arc<Lifecycle>,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load TLS certificate or key: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();

    {
        let handle = handle.clone();
        let grace = config.drain_timeout;
        tokio::spawn(async move {
            lifecycle.stopped().await;
            handle.graceful_shutdown(Some(grace));
        });
    }

    info!(%addr, "serving HTTPS");
    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;
    use crate::config::DispatchConfig;
    use crate::dispatch::Registries;

    fn module() -> NetworkModule {
        let config = NetworkConfig {
            host: "127.0.0.1".to_string(),
            drain_timeout: Duration::from_secs(1),
            ..NetworkConfig::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(Registries::stock(), DispatchConfig::default()));
        NetworkModule::new(config, dispatcher)
    }

    async fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn lifecycle_is_shared() {
        let module = module();
        assert!(Arc::ptr_eq(&module.lifecycle(), &module.lifecycle()));
        assert_eq!(module.lifecycle().phase(), Phase::Starting);
    }

    #[tokio::test]
    async fn start_binds_an_ephemeral_port() {
        let mut module = module();
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let err = module().serve(std::future::pending::<()>()).await.unwrap_err();
        assert!(err.to_string().contains("start()"));
    }

    #[tokio::test]
    async fn serves_rpc_and_health_then_drains() {
        let mut module = module();
        let port = module.start().await.unwrap();
        let lifecycle = module.lifecycle();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async move {
            let _ = stop_rx.await;
        }));

        let rpc = get(port, "/ping/ping.json?pong=hi").await;
        assert!(rpc.starts_with("HTTP/1.1 200"), "{rpc}");
        assert!(rpc.contains("\"HI\""), "{rpc}");
        assert!(rpc.to_ascii_lowercase().contains("x-request-id:"), "{rpc}");
        assert!(rpc.contains("x-rpc-info-service: ping"), "{rpc}");

        let ready = get(port, READINESS_PATH).await;
        assert!(ready.starts_with("HTTP/1.1 200"), "{ready}");

        stop_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(lifecycle.phase(), Phase::Stopped);
    }
}
