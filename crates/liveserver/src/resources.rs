//! Data-connection hand-off between the controller thread and the
//! server thread.
//!
//! Connections created by the controlling test thread are not implicitly
//! visible to the server thread, so the lifecycle thread installs an
//! explicit alias → connection map into thread-local storage before it
//! starts serving. Handlers running on the server thread look
//! connections up by alias.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::errors::{LiveServerError, Result};

/// A named resource transplanted into the server thread.
///
/// Implementations report whether their backing store lives only in the
/// memory of the thread that created it; such stores cannot be shared
/// across the two threads and are rejected before the server starts.
pub trait DataConnection: Send {
    /// True when the backing store is process-memory local to its
    /// creating thread (e.g. an in-memory database).
    fn is_in_memory_only(&self) -> bool;

    fn as_any(&self) -> &dyn Any;
}

pub type ConnectionMap = HashMap<String, Box<dyn DataConnection>>;

thread_local! {
    static THREAD_CONNECTIONS: RefCell<ConnectionMap> = RefCell::new(HashMap::new());
}

/// Installs `overrides` as this thread's connection registry, replacing
/// any previous contents. Called once by the server thread, before
/// serving begins.
pub fn install_connections(overrides: ConnectionMap) {
    tracing::debug!(count = overrides.len(), "installing handed-off connections");
    THREAD_CONNECTIONS.with(|registry| {
        *registry.borrow_mut() = overrides;
    });
}

/// Runs `body` with the connection registered under `alias` on the
/// current thread, or `None` when no such connection was installed.
pub fn with_connection<R>(alias: &str, body: impl FnOnce(Option<&dyn DataConnection>) -> R) -> R {
    THREAD_CONNECTIONS.with(|registry| {
        let registry = registry.borrow();
        body(registry.get(alias).map(|conn| &**conn))
    })
}

/// Rejects hand-off maps containing a connection whose backing store is
/// in-memory only. Sharing such a store across threads silently yields
/// inconsistent results, so the configuration fails instead.
pub fn ensure_shareable(connections: &ConnectionMap) -> Result<()> {
    for (alias, connection) in connections {
        if connection.is_in_memory_only() {
            return Err(LiveServerError::UnsupportedBackingStore(alias.clone()));
        }
    }
    Ok(())
}
