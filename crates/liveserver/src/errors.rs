use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LiveServerError>;

/// Boxed error type used at the request-handler boundary.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum LiveServerError {
    #[error("invalid live server address {0:?}: expected \"host:port\"")]
    InvalidAddress(String),

    #[error("live server failed to start on {addr}: {source}")]
    Startup {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("data connection {0:?} is backed by an in-memory store which cannot be shared with the server thread")]
    UnsupportedBackingStore(String),

    #[error("failed to shut down the live server in {0:?}: the server might be stuck or generating a slow response")]
    ShutdownTimeout(Duration),
}
