//! HTTP/1 accept loop with per-connection timeouts and bounded graceful drain.
//!
//! Each accepted connection runs in its own task tracked by a [`TaskTracker`].
//! Requests see the connection's cancellation token through
//! [`users::RequestCancellation`], so backend calls stop once the connection
//! is torn down.
//!
//! Connection timing is owned by a per-connection watchdog rather than hyper:
//! the header-read deadline starts at the first byte of a request (or at
//! accept), and the gap between requests is bounded only by the idle timeout.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::Result;
use axum::{extract::Request, Router};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tower::ServiceExt;
use tracing::{debug, info, warn};
use users::RequestCancellation;

use crate::ingress::READ_TIMEOUT;

#[derive(Clone, Debug)]
pub struct ServerTimeouts {
    /// Deadline for receiving request headers, counted from their first byte.
    pub header_read: Duration,
    /// Keep-alive connections with nothing in flight are closed after this.
    pub idle: Duration,
    /// How long shutdown waits for open connections before cancelling them.
    pub drain: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            header_read: READ_TIMEOUT,
            idle: Duration::from_secs(120),
            drain: Duration::from_secs(30),
        }
    }
}

struct ActivityState {
    in_flight: usize,
    /// Last request boundary (accept, request start or response end).
    last: Instant,
    /// Set when request bytes arrive while nothing is in flight.
    reading_since: Option<Instant>,
}

/// What a connection is currently doing, shared by the socket wrapper, the
/// service and the watchdog.
struct Activity {
    state: Mutex<ActivityState>,
    changed: Notify,
}

struct InFlight(Arc<Activity>);

enum Watch {
    Busy,
    Header(Instant),
    Idle(Instant),
}

impl Activity {
    fn new() -> Arc<Self> {
        let now = Instant::now();
        Arc::new(Self {
            state: Mutex::new(ActivityState {
                in_flight: 0,
                last: now,
                // The first request must arrive within the header deadline
                reading_since: Some(now),
            }),
            changed: Notify::new(),
        })
    }

    fn begin(self: &Arc<Self>) -> InFlight {
        {
            let mut st = self.state.lock();
            st.in_flight += 1;
            st.last = Instant::now();
            st.reading_since = None;
        }
        self.changed.notify_one();
        InFlight(self.clone())
    }

    fn bytes_read(&self) {
        {
            let mut st = self.state.lock();
            if st.in_flight > 0 || st.reading_since.is_some() {
                return;
            }
            st.reading_since = Some(Instant::now());
        }
        self.changed.notify_one();
    }

    fn watch(&self, timeouts: &ServerTimeouts) -> Watch {
        let st = self.state.lock();
        if st.in_flight > 0 {
            Watch::Busy
        } else if let Some(since) = st.reading_since {
            Watch::Header(since + timeouts.header_read)
        } else {
            Watch::Idle(st.last + timeouts.idle)
        }
    }

    fn header_overdue(&self, header_read: Duration) -> bool {
        let st = self.state.lock();
        st.in_flight == 0 && st.reading_since.is_some_and(|s| s.elapsed() >= header_read)
    }

    fn is_idle_for(&self, idle: Duration) -> bool {
        let st = self.state.lock();
        st.in_flight == 0 && st.reading_since.is_none() && st.last.elapsed() >= idle
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        {
            let mut st = self.0.state.lock();
            st.in_flight -= 1;
            st.last = Instant::now();
        }
        self.0.changed.notify_one();
    }
}

/// Socket that reports incoming bytes to the connection's [`Activity`].
struct WatchedStream {
    stream: TcpStream,
    activity: Arc<Activity>,
}

impl AsyncRead for WatchedStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let res = Pin::new(&mut self.stream).poll_read(cx, buf);
        if buf.filled().len() > before {
            self.activity.bytes_read();
        }
        res
    }
}

impl AsyncWrite for WatchedStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Serve `app` on `listener` until `shutdown` is cancelled, then drain.
///
/// Draining stops accepting, asks every connection to finish its current
/// request, and after `timeouts.drain` cancels whatever is still running.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    timeouts: ServerTimeouts,
) -> Result<()> {
    let tracker = TaskTracker::new();
    let hard_stop = CancellationToken::new();

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            },
        };

        tracker.spawn(serve_connection(
            stream,
            peer,
            app.clone(),
            hard_stop.child_token(),
            shutdown.clone(),
            timeouts.clone(),
        ));
    }

    drop(listener);
    tracker.close();
    info!(open = tracker.len(), "HTTP server draining connections");

    if tokio::time::timeout(timeouts.drain, tracker.wait())
        .await
        .is_err()
    {
        warn!(
            open = tracker.len(),
            "drain timeout reached, cancelling remaining requests"
        );
        hard_stop.cancel();
        tracker.wait().await;
    }

    info!("HTTP server stopped");
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    conn_token: CancellationToken,
    shutdown: CancellationToken,
    timeouts: ServerTimeouts,
) {
    debug!(%peer, "connection accepted");
    let activity = Activity::new();

    let service = {
        let activity = activity.clone();
        let token = conn_token.clone();
        hyper::service::service_fn(move |mut req: Request<Incoming>| {
            let in_flight = activity.begin();
            req.extensions_mut()
                .insert(RequestCancellation(token.clone()));
            let app = app.clone();
            async move {
                let res = app.oneshot(req).await;
                drop(in_flight);
                res
            }
        })
    };

    // No hyper timer: the loop below owns header and idle deadlines.
    let mut builder = hyper::server::conn::http1::Builder::new();
    builder.keep_alive(true);
    let io = WatchedStream {
        stream,
        activity: activity.clone(),
    };
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        let watch = activity.watch(&timeouts);
        let (wake_at, armed) = match watch {
            Watch::Busy => (Instant::now() + timeouts.idle, false),
            Watch::Header(at) => (at, true),
            Watch::Idle(at) => (at, !closing),
        };
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    debug!(%peer, error = %e, "connection error");
                }
                break;
            }
            _ = conn_token.cancelled() => {
                debug!(%peer, "connection aborted");
                break;
            }
            _ = shutdown.cancelled(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = activity.changed.notified() => {}
            _ = tokio::time::sleep_until(wake_at), if armed => {
                if activity.header_overdue(timeouts.header_read) {
                    debug!(%peer, "request header read timed out");
                    break;
                }
                if !closing && activity.is_idle_for(timeouts.idle) {
                    debug!(%peer, "closing idle connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }
    }

    // Anything still bound to this connection is released.
    conn_token.cancel();
    debug!(%peer, "connection closed");
}
