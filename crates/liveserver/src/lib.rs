//! Embeddable live HTTP server for end-to-end tests.
//!
//! A test harness starts the server before a test run and stops it
//! deterministically afterward, so browser automation and other external
//! clients can exercise real network requests against the application
//! under test. The server runs on its own thread, polls its socket on a
//! bounded interval so it can always be asked to stop, signals readiness
//! exactly once, and propagates startup failures back to the controlling
//! thread instead of hanging it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use liveserver::{HandlerResult, HttpRequest, HttpResponse, LiveServerHarness};
//!
//! let app = Arc::new(|req: &HttpRequest| -> HandlerResult {
//!     Ok(HttpResponse::ok(format!("you asked for {}", req.path)))
//! });
//!
//! let mut harness = LiveServerHarness::setup("localhost:8081", app, None, None)?;
//! let url = harness.live_server_url();
//! // drive a browser or HTTP client at `url` ...
//! harness.teardown()?;
//! # Ok::<(), liveserver::LiveServerError>(())
//! ```

pub mod config;
pub mod errors;
pub mod handlers;
pub mod http;
pub mod latch;
pub mod lifecycle;
pub mod resources;
pub mod server;
pub mod testcase;

pub use config::{AssetSettings, ADDRESS_ENV_VAR, DEFAULT_ADDRESS};
pub use errors::{BoxedError, LiveServerError, Result};
pub use handlers::{HandlerResult, RequestHandler, StaticFilesHandler};
pub use http::{HttpRequest, HttpResponse};
pub use latch::ReadinessLatch;
pub use lifecycle::LiveServerThread;
pub use resources::{with_connection, ConnectionMap, DataConnection};
pub use server::{PollableServer, DEFAULT_POLL_INTERVAL};
pub use testcase::LiveServerHarness;
