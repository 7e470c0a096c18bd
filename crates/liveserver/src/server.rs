//! Cooperatively stoppable HTTP server.
//!
//! WHY: A plain blocking accept loop cannot be interrupted from another
//! thread, which makes deterministic teardown impossible. The server
//! here polls its socket on a bounded interval instead, re-checking a
//! serving flag between waits so it can be asked to stop at any time.
//!
//! WHAT: `PollableServer` — binds one listening socket, accepts and
//! dispatches at most one connection per wake-up, and exposes
//! `serve_forever` / `shutdown` / `handle_request`.
//!
//! HOW: The listener sits in non-blocking mode; `WouldBlock` on accept
//! means "nothing readable", and the loop then parks on a condvar with
//! the poll interval as timeout. `shutdown` clears the serving flag and
//! notifies the condvar, so observed shutdown latency is usually well
//! below one poll interval, and never above it.

use std::io::{self, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::errors::{BoxedError, LiveServerError, Result};
use crate::handlers::RequestHandler;
use crate::http::{read_request, HttpResponse, RequestReadError};
use crate::latch::ReadinessLatch;

/// How often the serve loop re-checks the serving flag when idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long `shutdown` waits for the loop to exit before declaring the
/// server stuck.
const SHUTDOWN_WAIT: Duration = Duration::from_secs(2);

/// Read/write timeout on accepted connections so one stalled client
/// cannot wedge the single-threaded dispatch loop.
const CLIENT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve-loop state. `StopRequested` covers the window where a
/// `shutdown` lands after readiness was signaled but before the loop has
/// marked itself serving; the loop honors it instead of racing past it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ServeState {
    Idle,
    Serving,
    StopRequested,
}

pub struct PollableServer {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    state: Mutex<ServeState>,
    wakeup: Condvar,
    is_shut_down: ReadinessLatch,
}

impl PollableServer {
    /// Binds the listening socket and wires it to `handler`.
    pub fn bind(host: &str, port: u16, handler: Arc<dyn RequestHandler>) -> io::Result<Self> {
        let listener = TcpListener::bind((host, port))?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            handler,
            state: Mutex::new(ServeState::Idle),
            wakeup: Condvar::new(),
            is_shut_down: ReadinessLatch::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handles one request at a time until [`Self::shutdown`] is called,
    /// re-checking for a shutdown request at least every `poll_interval`.
    pub fn serve_forever(&self, poll_interval: Duration) {
        {
            let mut state = self.state.lock().unwrap();
            if *state == ServeState::StopRequested {
                // shutdown() won the race with loop startup
                *state = ServeState::Idle;
                drop(state);
                self.is_shut_down.set();
                return;
            }
            *state = ServeState::Serving;
        }
        self.is_shut_down.clear();
        tracing::info!(addr = ?self.listener.local_addr().ok(), "live server loop started");

        loop {
            {
                let state = self.state.lock().unwrap();
                if *state != ServeState::Serving {
                    break;
                }
            }

            match self.listener.accept() {
                Ok((stream, peer)) => self.dispatch(stream, peer),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    let state = self.state.lock().unwrap();
                    if *state == ServeState::Serving {
                        let _ = self.wakeup.wait_timeout(state, poll_interval).unwrap();
                    }
                }
                Err(err) => {
                    // transient; never stops the server
                    tracing::debug!(error = %err, "accept failed");
                }
            }
        }

        {
            let mut state = self.state.lock().unwrap();
            *state = ServeState::Idle;
        }
        self.is_shut_down.set();
        tracing::info!("live server loop exited");
    }

    /// Stops the serve loop and blocks until it has fully exited.
    ///
    /// Must be called from a different thread than the one running
    /// `serve_forever`, at most once per serve cycle.
    ///
    /// # Errors
    ///
    /// [`LiveServerError::ShutdownTimeout`] when the loop has not exited
    /// within the fixed bound, instead of hanging the caller forever.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            *state = ServeState::StopRequested;
        }
        self.wakeup.notify_all();

        if !self.is_shut_down.wait(Some(SHUTDOWN_WAIT)) {
            return Err(LiveServerError::ShutdownTimeout(SHUTDOWN_WAIT));
        }
        Ok(())
    }

    /// Single-shot variant: blocks until one connection arrives, then
    /// accepts and dispatches it. Manual stepping only; the lifecycle
    /// thread always uses `serve_forever`.
    pub fn handle_request(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.dispatch(stream, peer);
                    return;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    let guard = self.state.lock().unwrap();
                    let _ = self.wakeup.wait_timeout(guard, DEFAULT_POLL_INTERVAL).unwrap();
                }
                Err(err) => {
                    tracing::debug!(error = %err, "accept failed");
                    return;
                }
            }
        }
    }

    /// Processes one accepted connection. Errors are contained here:
    /// logged, the connection closed, the loop untouched.
    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        if let Err(err) = self.try_dispatch(&stream, peer) {
            tracing::error!(peer = %peer, error = %err, "request dispatch failed");
        }
    }

    fn try_dispatch(
        &self,
        stream: &TcpStream,
        peer: SocketAddr,
    ) -> std::result::Result<(), BoxedError> {
        // accepted sockets inherit the listener's non-blocking mode on
        // some platforms
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(CLIENT_IO_TIMEOUT))?;
        stream.set_write_timeout(Some(CLIENT_IO_TIMEOUT))?;

        let request = {
            let mut reader = BufReader::new(stream);
            read_request(&mut reader)
        };

        let response = match request {
            Ok(request) => {
                tracing::debug!(peer = %peer, method = %request.method, path = %request.path, "request");
                self.handler.handle(&request)?
            }
            Err(RequestReadError::Malformed(reason)) => {
                tracing::debug!(peer = %peer, reason, "malformed request");
                HttpResponse::bad_request()
            }
            Err(RequestReadError::Io(err)) => return Err(err.into()),
        };

        let mut writer = stream;
        writer.write_all(&response.render())?;
        writer.flush()?;
        Ok(())
    }
}
