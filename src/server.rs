//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Immediately stopping `listener.accept()`, so no new connections are made.
//! 2. Letting every in-flight connection task run to completion, or until
//!    [`Config::shutdown_grace`] runs out. Connections still open then are
//!    aborted; their contexts still get their `done` hook and go back to the
//!    pool.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::app::AppContext;
use crate::config::Config;
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    config: Config,
}

impl Server {
    /// Creates a server from explicit settings.
    ///
    /// ```rust,no_run
    /// use trellis::{Config, Server};
    /// let server = Server::new(Config::bind("0.0.0.0:3000")?);
    /// # Ok::<(), trellis::Error>(())
    /// ```
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by in-flight requests completing).
    pub async fn serve<G: AppContext>(self, router: Router<G>) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops when `signal` resolves
    /// instead of on SIGTERM / Ctrl-C.
    pub async fn serve_with_shutdown<G: AppContext>(
        self,
        router: Router<G>,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.config.addr).await?;
        self.run(listener, router, signal).await
    }

    async fn run<G: AppContext>(
        self,
        listener: TcpListener,
        mut router: Router<G>,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr = listener.local_addr()?;

        // The route table is frozen from here on; sharing it needs no lock.
        router.pool.set_capacity(self.config.pool_capacity);
        let router = Arc::new(router);

        info!(%addr, "trellis listening");

        let mut tasks = JoinSet::new();
        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { handle(&router, req).await }
                        });

                        // `auto::Builder` handles both HTTP/1.1 and HTTP/2.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drain(&mut tasks, self.config.shutdown_grace).await;

        info!("trellis stopped");
        Ok(())
    }
}

async fn drain(tasks: &mut JoinSet<()>, grace: Option<std::time::Duration>) {
    let wait_all = async { while tasks.join_next().await.is_some() {} };
    let Some(grace) = grace else {
        wait_all.await;
        return;
    };
    if tokio::time::timeout(grace, wait_all).await.is_err() {
        warn!(remaining = tasks.len(), "shutdown grace period elapsed, aborting connections");
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

// ── Request handling ──────────────────────────────────────────────────────────

/// Converts one hyper request, runs it through the router, converts back.
///
/// The error type is [`Infallible`]: every failure becomes a response (405,
/// 400, or 500 from the dispatcher), so hyper never sees an error.
async fn handle<G, B>(
    router: &Router<G>,
    req: hyper::Request<B>,
) -> Result<http::Response<Full<Bytes>>, Infallible>
where
    G: AppContext,
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();

    let Ok(method) = Method::try_from(&parts.method) else {
        return Ok(Response::empty(StatusCode::METHOD_NOT_ALLOWED).into_http());
    };

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(%method, path = parts.uri.path(), "failed to read request body: {e}");
            return Ok(Response::empty(StatusCode::BAD_REQUEST).into_http());
        }
    };

    let request = Request::from_parts(method, &parts.uri, parts.headers, body);
    Ok(router.dispatch(request).await.into_http())
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available. If a handler can't be installed the
/// failure is logged and that signal is simply never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
