//! Background thread that owns and runs a [`PollableServer`] for the
//! duration of a test run.
//!
//! The thread moves through `constructed → running → (ready | failed) →
//! stopping → stopped`. Startup failures are captured in an error slot
//! and the readiness latch is signaled regardless, so the controlling
//! thread waiting on it can never hang on a failed startup.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::config::AssetSettings;
use crate::errors::{LiveServerError, Result};
use crate::handlers::{RequestHandler, StaticFilesHandler};
use crate::latch::ReadinessLatch;
use crate::resources::{install_connections, ConnectionMap};
use crate::server::{PollableServer, DEFAULT_POLL_INTERVAL};

type ServerSlot = Arc<Mutex<Option<Arc<PollableServer>>>>;
type ErrorSlot = Arc<Mutex<Option<LiveServerError>>>;

pub struct LiveServerThread {
    host: String,
    port: u16,
    app_handler: Arc<dyn RequestHandler>,
    assets: Option<AssetSettings>,
    connections_override: Option<ConnectionMap>,
    poll_interval: Duration,
    is_ready: Arc<ReadinessLatch>,
    terminated: Arc<ReadinessLatch>,
    error: ErrorSlot,
    server: ServerSlot,
    handle: Option<thread::JoinHandle<()>>,
}

impl LiveServerThread {
    pub fn new(host: &str, port: u16, app_handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            host: host.to_string(),
            port,
            app_handler,
            assets: None,
            connections_override: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            is_ready: Arc::new(ReadinessLatch::new()),
            terminated: Arc::new(ReadinessLatch::new()),
            error: Arc::new(Mutex::new(None)),
            server: Arc::new(Mutex::new(None)),
            handle: None,
        }
    }

    /// Adds static/media file serving in front of the application handler.
    #[must_use]
    pub fn with_assets(mut self, assets: AssetSettings) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Hands named data connections over to the server thread, which
    /// installs them into its thread-local registry before serving.
    #[must_use]
    pub fn with_connections(mut self, connections: ConnectionMap) -> Self {
        self.connections_override = Some(connections);
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Spawns the server thread. Startup errors inside the thread are
    /// captured, not raised here; wait on readiness and check
    /// [`Self::take_error`] afterwards.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }

        let runner = Runner {
            host: self.host.clone(),
            port: self.port,
            app_handler: Arc::clone(&self.app_handler),
            assets: self.assets.clone(),
            connections_override: self.connections_override.take(),
            poll_interval: self.poll_interval,
            is_ready: Arc::clone(&self.is_ready),
            terminated: Arc::clone(&self.terminated),
            error: Arc::clone(&self.error),
            server: Arc::clone(&self.server),
        };

        let handle = thread::Builder::new()
            .name("liveserver".to_string())
            .spawn(move || runner.run())
            .map_err(|source| LiveServerError::Startup {
                addr: format!("{}:{}", self.host, self.port),
                source,
            })?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Waits for the readiness latch; `true` means the latch fired
    /// (successful startup or captured failure), `false` means timeout.
    pub fn wait_ready(&self, timeout: Option<Duration>) -> bool {
        self.is_ready.wait(timeout)
    }

    /// Takes the captured startup error, if the thread failed.
    pub fn take_error(&self) -> Option<LiveServerError> {
        self.error.lock().unwrap().take()
    }

    /// Actual bound address, available once the thread is ready.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        let server = self.server.lock().unwrap();
        server.as_ref().and_then(|server| server.local_addr().ok())
    }

    /// Stops the owned server (bounded), releases the socket, then joins
    /// the thread. Repeated calls are a no-op once the server reference
    /// is gone.
    ///
    /// Callers must have waited on the readiness latch first.
    pub fn join(&mut self, timeout: Option<Duration>) -> Result<()> {
        let server = self.server.lock().unwrap().take();
        if let Some(server) = server {
            server.shutdown()?;
            // Dropping the last controller-side reference; the thread's
            // own reference goes away when `run` returns, closing the
            // socket.
            drop(server);
        }

        if self.handle.is_some() {
            if let Some(limit) = timeout {
                if !self.terminated.wait(Some(limit)) {
                    return Err(LiveServerError::ShutdownTimeout(limit));
                }
            } else {
                self.terminated.wait(None);
            }
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("live server thread panicked during teardown");
            }
        }
        Ok(())
    }
}

/// State moved onto the spawned thread; `run` is the thread entry point.
struct Runner {
    host: String,
    port: u16,
    app_handler: Arc<dyn RequestHandler>,
    assets: Option<AssetSettings>,
    connections_override: Option<ConnectionMap>,
    poll_interval: Duration,
    is_ready: Arc<ReadinessLatch>,
    terminated: Arc<ReadinessLatch>,
    error: ErrorSlot,
    server: ServerSlot,
}

impl Runner {
    fn run(mut self) {
        if let Some(overrides) = self.connections_override.take() {
            // Resources created by the controlling thread are not
            // implicitly visible here; install them before serving.
            install_connections(overrides);
        }

        match self.build_and_bind() {
            Ok(server) => {
                *self.server.lock().unwrap() = Some(Arc::clone(&server));
                self.is_ready.set();
                server.serve_forever(self.poll_interval);
            }
            Err(err) => {
                tracing::info!(error = %err, "live server startup failed");
                *self.error.lock().unwrap() = Some(err);
                self.is_ready.set();
            }
        }

        self.terminated.set();
    }

    /// Builds the handler chain and binds the server socket. Both steps
    /// happen on the server thread; any failure becomes a captured
    /// startup error.
    fn build_and_bind(&self) -> Result<Arc<PollableServer>> {
        let addr = format!("{}:{}", self.host, self.port);
        let startup = |source: std::io::Error| LiveServerError::Startup {
            addr: addr.clone(),
            source,
        };

        let handler: Arc<dyn RequestHandler> = match &self.assets {
            Some(assets) => {
                let media = StaticFilesHandler::new(
                    &assets.media_root,
                    &assets.media_url,
                    Arc::clone(&self.app_handler),
                )
                .map_err(startup)?;
                let chain = StaticFilesHandler::new(
                    &assets.static_root,
                    &assets.static_url,
                    Arc::new(media),
                )
                .map_err(startup)?;
                Arc::new(chain)
            }
            None => Arc::clone(&self.app_handler),
        };

        let server = PollableServer::bind(&self.host, self.port, handler).map_err(startup)?;
        Ok(Arc::new(server))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::LiveServerThread;
    use crate::handlers::HandlerResult;
    use crate::http::{HttpRequest, HttpResponse};

    fn app_handler() -> Arc<dyn crate::handlers::RequestHandler> {
        Arc::new(|_req: &HttpRequest| -> HandlerResult { Ok(HttpResponse::ok(b"app".to_vec())) })
    }

    #[test]
    fn failed_bind_signals_readiness_and_captures_error() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("should bind");
        let port = occupied.local_addr().expect("should have addr").port();

        let mut thread = LiveServerThread::new("127.0.0.1", port, app_handler());
        thread.start().expect("spawn should succeed");

        assert!(thread.wait_ready(Some(Duration::from_secs(5))));
        let error = thread.take_error().expect("bind failure should be captured");
        assert!(matches!(error, crate::errors::LiveServerError::Startup { .. }));

        // Teardown after a failed startup: no server reference, no-op
        // shutdown, prompt join.
        thread.join(Some(Duration::from_secs(5))).expect("should join");
    }

    #[test]
    fn join_twice_is_a_no_op() {
        let mut thread = LiveServerThread::new("127.0.0.1", 0, app_handler());
        thread.start().expect("spawn should succeed");
        assert!(thread.wait_ready(Some(Duration::from_secs(5))));
        assert!(thread.take_error().is_none());

        thread.join(Some(Duration::from_secs(5))).expect("should join");
        thread
            .join(Some(Duration::from_secs(5)))
            .expect("second join should be a no-op");
    }

    #[test]
    fn join_timeout_reports_the_caller_bound() {
        let (release, wait_for_release) = std::sync::mpsc::channel::<()>();

        let mut thread = LiveServerThread::new("127.0.0.1", 0, app_handler());
        thread.handle = Some(std::thread::spawn(move || {
            wait_for_release.recv().ok();
        }));

        let limit = Duration::from_millis(50);
        let err = thread.join(Some(limit)).expect_err("should time out");
        match err {
            crate::errors::LiveServerError::ShutdownTimeout(bound) => assert_eq!(bound, limit),
            other => panic!("unexpected error: {other}"),
        }

        // The handle survives a timed-out join, so a later call can
        // still reap the thread.
        release.send(()).expect("worker should still be waiting");
        thread.terminated.set();
        thread
            .join(Some(Duration::from_secs(5)))
            .expect("should join once released");
    }

    #[test]
    fn missing_asset_root_is_a_captured_startup_error() {
        let assets = crate::config::AssetSettings {
            static_root: "/definitely/not/a/dir".into(),
            static_url: "/static/".into(),
            media_root: "/definitely/not/a/dir".into(),
            media_url: "/media/".into(),
        };

        let mut thread = LiveServerThread::new("127.0.0.1", 0, app_handler()).with_assets(assets);
        thread.start().expect("spawn should succeed");

        assert!(thread.wait_ready(Some(Duration::from_secs(5))));
        assert!(thread.take_error().is_some());
        thread.join(Some(Duration::from_secs(5))).expect("should join");
    }
}
