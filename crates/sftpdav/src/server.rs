//! HTTP server lifecycle management for WebDAV.
//!
//! This module provides the HTTP server that serves WebDAV requests
//! and handles the server lifecycle (start, stop).

use crate::filesystem::SftpWebDav;
use crate::remote::RemoteFs;
use dav_server::davpath::DavPath;
use dav_server::{memls::MemLs, DavHandler};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8888;

/// Configuration for the WebDAV server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 = auto-assign).
    pub port: u16,
    /// Bind address.
    pub bind_address: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl From<SocketAddr> for ServerConfig {
    fn from(addr: SocketAddr) -> Self {
        Self {
            port: addr.port(),
            bind_address: addr.ip(),
        }
    }
}

/// A running WebDAV server instance.
pub struct WebDavServer {
    /// The actual bound address.
    pub addr: SocketAddr,
    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server task handle.
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl WebDavServer {
    /// Start serving `fs`.
    ///
    /// Locking is handled by dav-server's in-memory lock manager, so locks
    /// are only coordinated among clients of this process.
    pub async fn start<R: RemoteFs>(
        fs: SftpWebDav<R>,
        config: ServerConfig,
    ) -> Result<Self, std::io::Error> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;

        info!(addr = %actual_addr, home = %fs.session().home(), "Starting WebDAV server");

        let dav_handler = DavHandler::builder()
            .filesystem(Box::new(fs.clone()))
            .locksystem(MemLs::new())
            .build_handler();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let server_handle = tokio::spawn(async move {
            tokio::select! {
                () = run_server(listener, Arc::new(dav_handler), fs) => {
                    debug!("Server loop ended");
                }
                _ = shutdown_rx => {
                    info!("Received shutdown signal");
                }
            }
        });

        Ok(Self {
            addr: actual_addr,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Get the URL for this server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the server.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!("WebDAV server stopped");
    }

    /// Stop the server synchronously (for use in Drop).
    fn stop_sync(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for WebDavServer {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

/// Run the server accept loop.
async fn run_server<R: RemoteFs>(
    listener: TcpListener,
    handler: Arc<DavHandler>,
    fs: SftpWebDav<R>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let handler = handler.clone();
                let fs = fs.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req: Request<Incoming>| {
                        let handler = handler.clone();
                        let fs = fs.clone();
                        async move {
                            let method = req.method().clone();
                            let path = req.uri().path().to_string();
                            let resp = handler.handle(req).await;
                            log_request(&fs, &method, &path, resp.status());
                            Ok::<_, Infallible>(resp)
                        }
                    });

                    if let Err(e) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        warn!(peer = %peer_addr, error = %e, "HTTP connection error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

/// One line per request: method, request path, remote path and status.
fn log_request<R: RemoteFs>(
    fs: &SftpWebDav<R>,
    method: &hyper::Method,
    path: &str,
    status: hyper::StatusCode,
) {
    let remote = DavPath::new(path).map_or_else(|_| "-".to_string(), |p| fs.remote_path(&p));
    info!(method = %method, path = %path, remote = %remote, status = status.as_u16(), "request");
}
