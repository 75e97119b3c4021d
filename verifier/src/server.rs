//! Ephemeral static file server used for verification.
//!
//! The listener is bound on the caller's thread so bind failures surface
//! synchronously. Serving happens on a dedicated thread running a
//! current-thread `tokio` runtime. Stopping, explicitly or on drop, signals a
//! graceful shutdown and joins that thread.

use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::thread::JoinHandle;

use axum::Router;
use camino::Utf8Path;
use log::{debug, trace, warn};
use tokio::sync::oneshot;
use tower_http::services::ServeDir;

use crate::config::ReadinessBudget;
use crate::error::{Result, VerifyError};
use crate::probe::{AssetFetcher, FetchResponse};

const SERVER_THREAD_NAME: &str = "assetcheck-server";

/// A running loopback HTTP server rooted at a document directory.
///
/// Dropping the handle stops the server.
#[derive(Debug)]
pub struct EphemeralServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<std::io::Result<()>>>,
}

impl EphemeralServer {
    /// Binds `127.0.0.1:port` and starts serving `document_root`.
    ///
    /// Passing port `0` binds any free port; [`port`](Self::port) reports it.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ServerBind`] when the port cannot be bound, or
    /// [`VerifyError::Io`] when the listener or server thread cannot be set up.
    pub fn start(document_root: &Utf8Path, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .map_err(|source| VerifyError::ServerBind { port, source })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let router = Router::new().fallback_service(ServeDir::new(document_root));
        let (shutdown, signal) = oneshot::channel();
        let thread = std::thread::Builder::new()
            .name(SERVER_THREAD_NAME.to_owned())
            .spawn(move || serve(listener, router, signal))?;

        debug!(target: "server", "serving {document_root} on http://{addr}");
        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// The bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Base URL without a trailing slash, e.g. `http://127.0.0.1:4579`.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Polls the root URL until any HTTP response arrives.
    ///
    /// Returns the number of attempts used.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ServerStartTimeout`] when the budget runs out.
    pub fn wait_until_ready(
        &self,
        fetcher: &dyn AssetFetcher,
        budget: ReadinessBudget,
    ) -> Result<u32> {
        let url = format!("{}/", self.base_url());
        for attempt in 1..=budget.attempts {
            match fetcher.fetch(&url) {
                FetchResponse::Status(status) => {
                    trace!(target: "server", "ready after {attempt} attempt(s), status {status}");
                    return Ok(attempt);
                }
                FetchResponse::Transport(reason) => {
                    trace!(target: "server", "readiness attempt {attempt} failed: {reason}");
                }
            }
            if attempt < budget.attempts {
                std::thread::sleep(budget.interval);
            }
        }

        Err(VerifyError::ServerStartTimeout {
            url,
            attempts: budget.attempts,
        })
    }

    /// Stops the server and waits for its thread to finish.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::ServerShutdown`] if the server loop failed or its
    /// thread panicked.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            if shutdown.send(()).is_err() {
                debug!(target: "server", "server loop already exited");
            }
        }
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let outcome = match thread.join() {
            Ok(outcome) => outcome,
            Err(_) => Err(std::io::Error::other("server thread panicked")),
        };
        outcome.map_err(|source| VerifyError::ServerShutdown { source })
    }
}

impl Drop for EphemeralServer {
    fn drop(&mut self) {
        if let Err(VerifyError::ServerShutdown { source }) = self.shutdown_and_join() {
            warn!(target: "server", "verification server did not stop cleanly: {source}");
        }
    }
}

fn serve(
    listener: TcpListener,
    router: Router,
    signal: oneshot::Receiver<()>,
) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { signal.await.unwrap_or_default() })
            .await
    })
}
