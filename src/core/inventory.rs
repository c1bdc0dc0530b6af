//! Remote endpoint inventory.
//!
//! The server list is a JSON array of endpoint records. It is fetched with
//! `curl` from an HTTP(S) URL, or read from a local file for offline use.

use std::path::PathBuf;

use tracing::debug;

use crate::constants;
use crate::error::{Error, Result};
use crate::state::Endpoint;

/// Source of endpoint records. Fetching may be slow.
pub trait Inventory: Send + Sync {
    /// # Errors
    ///
    /// [`Error::FetchFailed`] when the list cannot be retrieved or parsed.
    fn fetch(&self) -> Result<Vec<Endpoint>>;
}

/// Where the inventory document lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteInventory {
    Url(String),
    File(PathBuf),
}

impl RemoteInventory {
    /// URLs starting with `http://` or `https://` are downloaded; anything else is a path.
    #[must_use]
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            Self::Url(source.to_string())
        } else {
            Self::File(PathBuf::from(source))
        }
    }
}

impl Inventory for RemoteInventory {
    fn fetch(&self) -> Result<Vec<Endpoint>> {
        let body = match self {
            Self::Url(url) => download(url)?,
            Self::File(path) => std::fs::read_to_string(path)
                .map_err(|e| Error::FetchFailed(format!("{}: {e}", path.display())))?,
        };
        let endpoints = parse_inventory(&body)?;
        debug!(count = endpoints.len(), "inventory fetched");
        Ok(endpoints)
    }
}

fn download(url: &str) -> Result<String> {
    let timeout = constants::INVENTORY_TIMEOUT_SECS.to_string();
    let output = std::process::Command::new("curl")
        .args(["-s", "-f", "--max-time", &timeout, url])
        .output()
        .map_err(|e| Error::FetchFailed(format!("curl: {e}")))?;

    if !output.status.success() {
        return Err(Error::FetchFailed(format!(
            "curl exited with {} for {url}",
            output.status
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses the inventory document.
///
/// # Errors
///
/// [`Error::FetchFailed`] if the document is not a JSON array of endpoints.
pub fn parse_inventory(body: &str) -> Result<Vec<Endpoint>> {
    serde_json::from_str(body).map_err(|e| Error::FetchFailed(format!("bad inventory: {e}")))
}

/// Fixed list, for tests and for callers that already hold the records.
#[derive(Clone, Debug, Default)]
pub struct StaticInventory(pub Vec<Endpoint>);

impl Inventory for StaticInventory {
    fn fetch(&self) -> Result<Vec<Endpoint>> {
        Ok(self.0.clone())
    }
}
