use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream as StdTcpStream};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{ConnectInfo, DefaultBodyLimit};
use axum::routing::get;
use axum::{Extension, Router};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{Instant, Sleep};
use tokio_rustls::TlsAcceptor;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::handlers::{download, index, picture, upload};
use crate::language::Localisations;
use crate::middleware::{add_security_headers, require_auth};
use crate::state::AppState;
use crate::utils::{is_hyper_abort, is_socket_abort};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },
}

/// build the router: pages, picture, downloads and uploads behind the auth gate
pub fn build_router(state: Arc<AppState>) -> Router {
    tracing::debug!("Building router for directory: {:?}", state.config.directory);

    let body_limit = match state.config.max_upload_size {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(index).post(upload))
        .route("/__droopy/picture", get(picture).post(upload))
        .route("/*name", get(download).post(upload))
        .layer(body_limit)
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(axum::middleware::from_fn(add_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// bind the configured address
pub fn bind(config: &Config) -> Result<TcpListener, ServerError> {
    let addr = format!("{}:{}", config.bind_host(), config.port);
    TcpListener::bind((config.bind_host(), config.port))
        .map_err(|source| ServerError::Bind { addr, source })
}

/// bind, then serve until the process exits
pub fn run(state: Arc<AppState>, tls: Option<TlsAcceptor>) -> Result<(), ServerError> {
    let listener = bind(&state.config)?;
    serve(listener, state, tls);
    Ok(())
}

/// accept forever, one OS thread per connection
pub fn serve(listener: TcpListener, state: Arc<AppState>, tls: Option<TlsAcceptor>) {
    let timeout = state.config.timeout;
    let router = build_router(state);

    tracing::info!("Server running and ready to accept connections");
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => spawn_connection(stream, router.clone(), tls.clone(), timeout),
            Err(e) => tracing::warn!("Failed to accept connection: {}", e),
        }
    }
}

fn spawn_connection(stream: StdTcpStream, router: Router, tls: Option<TlsAcceptor>, timeout: Duration) {
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(e) => {
            tracing::debug!("Dropping connection without peer address: {}", e);
            return;
        }
    };
    tracing::debug!("Accepted connection from {}", peer);

    let spawned = std::thread::Builder::new()
        .name(format!("droopy-conn-{}", peer))
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    tracing::error!("Failed to build runtime for {}: {}", peer, e);
                    return;
                }
            };
            runtime.block_on(serve_connection(stream, peer, router, tls, timeout));
        });

    if let Err(e) = spawned {
        tracing::error!("Failed to spawn connection thread for {}: {}", peer, e);
    }
}

fn into_tokio(stream: StdTcpStream) -> io::Result<TcpStream> {
    stream.set_nonblocking(true)?;
    let stream = TcpStream::from_std(stream)?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn serve_connection(
    stream: StdTcpStream,
    peer: SocketAddr,
    router: Router,
    tls: Option<TlsAcceptor>,
    timeout: Duration,
) {
    let stream = match into_tokio(stream) {
        Ok(stream) => IdleTimeout::new(stream, timeout),
        Err(e) => {
            tracing::warn!("Failed to set up socket for {}: {}", peer, e);
            return;
        }
    };
    let app = router.layer(Extension(ConnectInfo(peer)));

    let outcome = match tls {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(stream) => serve_http(stream, app, timeout).await,
            Err(e) if is_socket_abort(&e) => {
                tracing::debug!("TLS handshake with {} aborted: {}", peer, e);
                return;
            }
            Err(e) => {
                tracing::warn!("TLS handshake with {} failed: {}", peer, e);
                return;
            }
        },
        None => serve_http(stream, app, timeout).await,
    };

    match outcome {
        Ok(()) => tracing::debug!("Connection from {} closed", peer),
        Err(e) if is_hyper_abort(&e) => tracing::info!("Connection from {} aborted: {}", peer, e),
        Err(e) => tracing::warn!("Error serving {}: {}", peer, e),
    }
}

// one request per connection
async fn serve_http<I>(io: I, app: Router, timeout: Duration) -> Result<(), hyper::Error>
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    http1::Builder::new()
        .keep_alive(false)
        .timer(TokioTimer::new())
        .header_read_timeout(timeout)
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(app))
        .await
}

/// fails reads and writes with `TimedOut` once no progress was made for `timeout`
pub struct IdleTimeout<S> {
    inner: S,
    timeout: Duration,
    deadline: Pin<Box<Sleep>>,
}

impl<S> IdleTimeout<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            deadline: Box::pin(tokio::time::sleep(timeout)),
        }
    }

    fn touch(&mut self) {
        let next = Instant::now() + self.timeout;
        self.deadline.as_mut().reset(next);
    }

    fn poll_expired<T>(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<T>> {
        match self.deadline.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connection idle for too long",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for IdleTimeout<S> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_expired(cx),
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for IdleTimeout<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_write(cx, buf) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_expired(cx),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_flush(cx) {
            Poll::Ready(result) => {
                this.touch();
                Poll::Ready(result)
            }
            Poll::Pending => this.poll_expired(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_shutdown(cx) {
            Poll::Ready(result) => Poll::Ready(result),
            Poll::Pending => this.poll_expired(cx),
        }
    }
}

/// print startup banner with server info
pub fn print_startup_banner(config: &Config, localisations: &Localisations) {
    let mut languages: Vec<&str> = localisations.tags().collect();
    languages.sort_unstable();

    tracing::info!("Droopy starting...");
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("📡 Listening on: {}://{}:{}", config.scheme(), config.bind_host(), config.port);
    tracing::info!("📁 Storing uploads in: {:?}", config.directory);
    if config.publish_files {
        tracing::info!("📤 Publishing stored files for download");
    }
    if let Some(picture) = &config.picture {
        tracing::info!("🖼️ Picture: {:?}", picture);
    }
    if config.auth.is_some() {
        tracing::info!("🔐 Basic authentication enabled");
        if config.tls.is_none() {
            tracing::warn!("⚠️ Credentials travel in clear text without --ssl");
        }
    }
    tracing::info!("🌐 Languages: {}", languages.join(", "));
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_idle_read_times_out() {
        let (client, _server) = tokio::io::duplex(64);
        let mut client = IdleTimeout::new(client, Duration::from_millis(50));

        let mut buf = [0u8; 8];
        let err = client.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn test_progress_resets_deadline() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut client = IdleTimeout::new(client, Duration::from_millis(200));

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            server.write_all(b"x").await.unwrap();
            let mut buf = [0u8; 1];
            client.read_exact(&mut buf).await.unwrap();
        }
    }
}
