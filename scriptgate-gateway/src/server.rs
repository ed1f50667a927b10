//! TLS listener and connection-level timeouts.
//!
//! Each accepted connection gets its own task: TLS handshake, then HTTP/1.1
//! with keep-alive served by hyper. Slow clients are bounded by the
//! timeouts in [`ServerTimeouts`], independently of the per-script deadline.

use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{middleware, Router};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use scriptgate_core::GatewaySettings;

use crate::cors::{cors_middleware, CorsPolicy};
use crate::error::StartupError;

/// Connection-level limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeouts {
    /// Time allowed for the TLS handshake and for each request's headers.
    pub header_read: Duration,
    /// Time allowed to receive a full request body.
    pub body_read: Duration,
    /// Time allowed from a request's arrival to its response.
    pub write: Duration,
    /// A keep-alive connection with no traffic for this long is closed.
    pub idle: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            header_read: Duration::from_secs(5),
            body_read: Duration::from_secs(30),
            write: Duration::from_secs(60),
            idle: Duration::from_secs(60),
        }
    }
}

/// Wrap the router with request tracing, the body/write timeouts and CORS.
///
/// A request that exceeds `write` is answered with 408 and its handler
/// future is dropped, which kills any script it started. CORS is the
/// outermost layer so the 408 and every other response carry its headers.
#[allow(deprecated)]
pub fn build_app(router: Router, cors: CorsPolicy, timeouts: &ServerTimeouts) -> Router {
    router
        .layer(RequestBodyTimeoutLayer::new(timeouts.body_read))
        .layer(TimeoutLayer::new(timeouts.write))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(cors, cors_middleware))
}

/// Check both PEM files exist and build the rustls server configuration.
///
/// # Errors
/// Returns [`StartupError::TlsMaterialMissing`] if either file is absent and
/// [`StartupError::Tls`] if the material cannot be parsed or paired.
pub fn load_tls_config(cert_file: &Path, key_file: &Path) -> Result<Arc<ServerConfig>, StartupError> {
    for path in [cert_file, key_file] {
        if !path.exists() {
            return Err(StartupError::TlsMaterialMissing { path: path.to_owned() });
        }
    }

    let certs = load_certs(cert_file)?;
    let key = load_private_key(key_file)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| StartupError::Tls(e.to_string()))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, StartupError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StartupError::Tls(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(StartupError::Tls(format!("no certificates in {}", path.display())));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, StartupError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| StartupError::Tls(format!("{}: {e}", path.display())))?
        .ok_or_else(|| StartupError::Tls(format!("no private key in {}", path.display())))
}

/// A bound TLS listener ready to serve the gateway.
pub struct GatewayServer {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    app: Router,
    timeouts: ServerTimeouts,
}

impl GatewayServer {
    /// Load TLS material and bind the configured address.
    ///
    /// # Errors
    /// Returns TLS errors from [`load_tls_config`] and
    /// [`StartupError::Bind`] if the address cannot be bound.
    pub async fn bind(
        settings: &GatewaySettings,
        app: Router,
        timeouts: ServerTimeouts,
    ) -> Result<Self, StartupError> {
        let tls = load_tls_config(&settings.tls_cert_file, &settings.tls_key_file)?;
        let addr = SocketAddr::new(settings.bind_address, settings.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        Ok(Self { listener, acceptor: TlsAcceptor::from(tls), app, timeouts })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    /// Propagates the OS error if the socket address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails.
    ///
    /// Errors on individual connections are logged and never stop the loop.
    ///
    /// # Errors
    /// Returns the listener's I/O error once accepting fails for a reason
    /// other than a single aborted connection.
    pub async fn serve(self) -> io::Result<()> {
        let mut conn_count: u64 = 0;
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if is_per_connection(&e) => {
                    tracing::debug!(error = %e, "accept aborted");
                    continue;
                }
                Err(e) => {
                    tracing::error!(error = %e, connections = conn_count, "listener failed");
                    return Err(e);
                }
            };
            conn_count += 1;

            let acceptor = self.acceptor.clone();
            let app = self.app.clone();
            let timeouts = self.timeouts;
            tokio::spawn(async move {
                if let Err(e) = handle_tls_connection(stream, acceptor, app, timeouts).await {
                    tracing::debug!(peer = %peer, error = %e, "connection closed with error");
                }
            });
        }
    }
}

fn is_per_connection(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}

async fn handle_tls_connection(
    stream: TcpStream,
    acceptor: TlsAcceptor,
    app: Router,
    timeouts: ServerTimeouts,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let tls_stream = tokio::time::timeout(timeouts.header_read, acceptor.accept(stream))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"))??;
    serve_connection(tls_stream, app, timeouts).await?;
    Ok(())
}

/// Serve HTTP/1.1 on an established stream until the peer leaves, a header
/// read times out, or the connection sits idle for `timeouts.idle`.
///
/// # Errors
/// Returns hyper's error when the connection fails, including a header read
/// that exceeds `timeouts.header_read`.
pub async fn serve_connection<S>(stream: S, app: Router, timeouts: ServerTimeouts) -> Result<(), hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let activity = Activity::new();
    let io = TokioIo::new(Tracked { inner: stream, activity: activity.clone() });

    let mut builder = http1::Builder::new();
    builder
        .timer(TokioTimer::new())
        .header_read_timeout(timeouts.header_read)
        .keep_alive(true);
    let conn = builder.serve_connection(io, TowerToHyperService::new(app));
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            result = conn.as_mut() => return result,
            () = activity.idle_for(timeouts.idle), if !closing => {
                tracing::debug!(idle_s = timeouts.idle.as_secs_f64(), "closing idle connection");
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
        }
    }
}

/// Time of the last byte moved on a connection.
#[derive(Debug, Clone)]
struct Activity {
    origin: Instant,
    last_ms: Arc<AtomicU64>,
}

impl Activity {
    fn new() -> Self {
        Self { origin: Instant::now(), last_ms: Arc::new(AtomicU64::new(0)) }
    }

    fn touch(&self) {
        let ms = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_ms.store(ms, Ordering::Relaxed);
    }

    fn last(&self) -> Instant {
        self.origin + Duration::from_millis(self.last_ms.load(Ordering::Relaxed))
    }

    /// Resolves once no traffic has been seen for `limit`.
    async fn idle_for(&self, limit: Duration) {
        loop {
            let deadline = self.last() + limit;
            if Instant::now() >= deadline {
                return;
            }
            tokio::time::sleep_until(deadline.into()).await;
        }
    }
}

/// Stream wrapper that records activity on every successful read or write.
struct Tracked<S> {
    inner: S,
    activity: Activity,
}

impl<S: AsyncRead + Unpin> AsyncRead for Tracked<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.touch();
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Tracked<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if matches!(poll, Poll::Ready(Ok(n)) if n > 0) {
            self.activity.touch();
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
