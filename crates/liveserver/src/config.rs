use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{LiveServerError, Result};

/// Environment variable the integration layer reads the listen address from.
pub const ADDRESS_ENV_VAR: &str = "LIVE_TEST_SERVER_ADDRESS";

/// Address used when [`ADDRESS_ENV_VAR`] is absent.
pub const DEFAULT_ADDRESS: &str = "localhost:8081";

/// Root directories and base URLs consulted by the file-serving handlers.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AssetSettings {
    pub static_root: PathBuf,
    pub static_url: String,
    pub media_root: PathBuf,
    pub media_url: String,
}

/// Splits a textual `host:port` address spec.
///
/// The split must yield exactly two parts and the port must parse;
/// anything else is a configuration error, surfaced before any thread
/// starts.
pub fn parse_address(spec: &str) -> Result<(String, u16)> {
    let mut parts = spec.split(':');
    let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(LiveServerError::InvalidAddress(spec.to_string()));
    };
    if host.is_empty() {
        return Err(LiveServerError::InvalidAddress(spec.to_string()));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| LiveServerError::InvalidAddress(spec.to_string()))?;
    Ok((host.to_string(), port))
}

/// Reads the address spec from [`ADDRESS_ENV_VAR`], falling back to
/// [`DEFAULT_ADDRESS`], and parses it.
pub fn address_from_env() -> Result<(String, u16)> {
    let spec = env::var(ADDRESS_ENV_VAR).unwrap_or_else(|_| DEFAULT_ADDRESS.to_string());
    parse_address(&spec)
}
