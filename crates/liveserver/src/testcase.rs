//! Controller glue for test harnesses.
//!
//! WHY: End-to-end tests need a real listening server whose startup
//! failures surface on the test thread and whose teardown is
//! deterministic, instead of a background thread that silently never
//! answers.
//!
//! WHAT: `LiveServerHarness` — starts one [`LiveServerThread`] per test
//! class, waits for readiness, re-surfaces captured startup errors on
//! the calling thread, and tears the thread down at teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{address_from_env, parse_address, AssetSettings};
use crate::errors::Result;
use crate::handlers::RequestHandler;
use crate::lifecycle::LiveServerThread;
use crate::resources::{ensure_shareable, ConnectionMap};

const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct LiveServerHarness {
    host: String,
    port: u16,
    thread: Option<LiveServerThread>,
}

impl LiveServerHarness {
    /// Starts a live server at the given `host:port` spec and blocks
    /// until it is ready or its startup has failed.
    ///
    /// # Errors
    ///
    /// - [`crate::LiveServerError::InvalidAddress`] before any thread
    ///   starts, on a malformed spec.
    /// - [`crate::LiveServerError::UnsupportedBackingStore`] before any
    ///   thread starts, when a handed-off connection cannot be shared.
    /// - The exact captured startup error (bind failure, handler
    ///   construction failure) re-surfaced from the server thread.
    pub fn setup(
        address_spec: &str,
        app_handler: Arc<dyn RequestHandler>,
        assets: Option<AssetSettings>,
        connections: Option<ConnectionMap>,
    ) -> Result<Self> {
        let (host, port) = parse_address(address_spec)?;
        Self::start_thread(host, port, app_handler, assets, connections)
    }

    /// Like [`Self::setup`], with the address sourced from
    /// [`crate::config::ADDRESS_ENV_VAR`] (default
    /// [`crate::config::DEFAULT_ADDRESS`]).
    pub fn setup_from_env(
        app_handler: Arc<dyn RequestHandler>,
        assets: Option<AssetSettings>,
        connections: Option<ConnectionMap>,
    ) -> Result<Self> {
        let (host, port) = address_from_env()?;
        Self::start_thread(host, port, app_handler, assets, connections)
    }

    fn start_thread(
        host: String,
        port: u16,
        app_handler: Arc<dyn RequestHandler>,
        assets: Option<AssetSettings>,
        connections: Option<ConnectionMap>,
    ) -> Result<Self> {
        if let Some(connections) = &connections {
            ensure_shareable(connections)?;
        }

        let mut thread = LiveServerThread::new(&host, port, app_handler);
        if let Some(assets) = assets {
            thread = thread.with_assets(assets);
        }
        if let Some(connections) = connections {
            thread = thread.with_connections(connections);
        }

        thread.start()?;
        thread.wait_ready(None);
        if let Some(error) = thread.take_error() {
            // The thread already terminated past the readiness signal;
            // reap it before surfacing the failure.
            let _ = thread.join(Some(TEARDOWN_TIMEOUT));
            return Err(error);
        }

        tracing::info!(host = %host, port, "live server ready");
        Ok(Self {
            host,
            port,
            thread: Some(thread),
        })
    }

    /// Base URL clients should target, using the actual bound address
    /// (relevant when the configured port was 0).
    #[must_use]
    pub fn live_server_url(&self) -> String {
        match self.server_addr() {
            Some(addr) => format!("http://{addr}"),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    /// Actual bound socket address, while the server is up.
    #[must_use]
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.thread.as_ref().and_then(LiveServerThread::local_addr)
    }

    /// Stops the server and joins its thread. Idempotent: the second and
    /// later calls are no-ops.
    pub fn teardown(&mut self) -> Result<()> {
        match self.thread.as_mut() {
            Some(thread) => {
                let result = thread.join(Some(TEARDOWN_TIMEOUT));
                self.thread = None;
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for LiveServerHarness {
    fn drop(&mut self) {
        if let Err(error) = self.teardown() {
            tracing::error!(%error, "live server teardown failed during drop");
        }
    }
}
