//! HTTP transport and connection draining.
//!
//! # Draining and Kubernetes
//!
//! The server never reacts to signals itself. The
//! [`ShutdownSequencer`](crate::ShutdownSequencer) decides when to stop and
//! then calls [`ServerHandle::drain`], which:
//!
//! 1. Stops `listener.accept()`: no new connections are made.
//! 2. Asks every open connection to finish its in-flight request and close
//!    (keep-alive connections included).
//! 3. Waits for all of that, up to the given budget. Past the budget the
//!    remaining connections are dropped and [`Error::DrainTimeout`] is
//!    returned.
//!
//! Until `drain` is called the server keeps answering, so probes still work
//! while the sequencer is delaying, or stuck.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;
use crate::shutdown::Transport;
use crate::status::Status;

/// A bound, not yet serving, HTTP server.
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
}

impl Server {
    /// Binds `addr` (a `host:port` string). Port `0` picks a free port; see
    /// [`local_addr`](Server::local_addr).
    pub async fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr.parse()?;
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Starts accepting connections on a background task and dispatching
    /// them through `router`. Serves until [`ServerHandle::drain`] is called
    /// or the handle is dropped.
    pub fn start(self, router: Router) -> ServerHandle {
        let (stop, stop_rx) = watch::channel(false);
        info!(addr = %self.addr, "podlab listening");

        let task = tokio::spawn(accept_loop(self.listener, Arc::new(router), stop_rx));
        ServerHandle { addr: self.addr, stop, task }
    }
}

/// Control over a running [`Server`].
pub struct ServerHandle {
    addr: SocketAddr,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stops accepting, lets in-flight requests finish, and waits at most
    /// `timeout` for every connection to close.
    pub async fn drain(self, timeout: Duration) -> Result<(), Error> {
        let Self { stop, mut task, .. } = self;
        stop.send_replace(true);

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!("accept loop failed: {e}");
                Ok(())
            }
            Err(_) => {
                // Dropping the accept loop's JoinSet aborts the stragglers.
                task.abort();
                Err(Error::DrainTimeout(timeout))
            }
        }
    }
}

impl Transport for ServerHandle {
    fn drain(
        self,
        timeout: Duration,
    ) -> impl std::future::Future<Output = Result<(), Error>> + Send {
        ServerHandle::drain(self, timeout)
    }
}

async fn accept_loop(listener: TcpListener, router: Arc<Router>, mut stop: watch::Receiver<bool>) {
    // JoinSet tracks every connection task so drain can wait for them.
    let mut tasks = JoinSet::new();
    let conn_stop = stop.clone();

    loop {
        tokio::select! {
            // Check stop first so a drain request wins over queued accepts.
            biased;

            _ = stopped(&mut stop) => {
                info!(in_flight = tasks.len(), "drain requested, no longer accepting connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("accept error: {e}");
                        continue;
                    }
                };
                tasks.spawn(serve_connection(stream, peer, Arc::clone(&router), conn_stop.clone()));
            }

            // Reap finished connection tasks so the JoinSet stays bounded.
            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    drop(listener);
    while tasks.join_next().await.is_some() {}
    info!("podlab stopped serving");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    mut stop: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    // Called once per request on the connection.
    let svc = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { dispatch(router, req, peer).await }
    });

    // Handles both HTTP/1.1 and HTTP/2, whatever the client negotiates.
    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = stopped(&mut stop) => {
            // Finishes the current request, then closes instead of keeping
            // the connection alive for the next one.
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };

    if let Err(e) = result {
        debug!(%peer, "connection error: {e}");
    }
}

/// Resolves once drain is requested or the handle is dropped.
///
/// The `watch::Ref` returned by `wait_for` is not `Send`, so it is dropped
/// here rather than held across the connection's final await.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response. Never fails: unknown
/// methods and paths become 405 and 404.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let response = match Method::try_from(req.method()) {
        Ok(method) => router.handle(Request::new(method, req.uri(), peer)).await,
        Err(()) => Response::status(Status::MethodNotAllowed),
    };

    debug!(
        method = %req.method(),
        path = req.uri().path(),
        %peer,
        status = ?response.status_code(),
        "request"
    );
    Ok(response.into_inner())
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn assert_send<T: Send>(_: &T) {}

    fn ping_router() -> Router {
        Router::new().get("/ping", |_req: Request| async { Response::text("pong\n") })
    }

    #[tokio::test]
    async fn connection_future_is_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, peer) = listener.accept().await.unwrap();

        let (_stop, stop_rx) = watch::channel(false);
        let fut = serve_connection(stream, peer, Arc::new(ping_router()), stop_rx);
        assert_send(&fut);
    }

    #[tokio::test]
    async fn drain_closes_idle_keep_alive_connection() {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        let handle = server.start(ping_router());

        let mut client = TcpStream::connect(handle.local_addr()).await.unwrap();
        client
            .write_all(b"GET /ping HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        let mut buf = [0u8; 1024];
        let n = client.read(&mut buf).await.unwrap();
        let head = String::from_utf8_lossy(&buf[..n]);
        assert!(head.starts_with("HTTP/1.1 200"), "{head}");

        // The connection is now idle but still open.
        let started = tokio::time::Instant::now();
        handle.drain(Duration::from_secs(2)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        let n = tokio::time::timeout(Duration::from_secs(1), client.read(&mut buf))
            .await
            .expect("server should close the connection")
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
