//! Error type shared by the orchestration core.

use thiserror::Error;

use crate::state::EncryptionMode;

/// Errors reported synchronously by the core, or asynchronously to observers
/// when the owner thread rejects a queued request.
#[derive(Debug, Error)]
pub enum Error {
    /// The selection is missing an endpoint or protocol, references an
    /// endpoint absent from the catalog, or pairs an endpoint with a protocol
    /// it cannot serve.
    #[error("select a location and a protocol first")]
    InvalidSelection,

    /// A setting failed validation. Carries the store key.
    #[error("invalid value for setting '{0}'")]
    InvalidConfig(&'static str),

    /// The key is not an editable setting.
    #[error("unknown setting '{0}'")]
    UnknownSetting(String),

    /// A connection to the same target is already in progress or established.
    #[error("already connected to this location")]
    AlreadyConnected,

    /// The supervisor still owns a live subprocess.
    #[error("VPN process is already running")]
    AlreadyRunning,

    /// The VPN binary could not be started.
    #[error("failed to start VPN process: {0}")]
    ProcessSpawnFailed(String),

    /// The endpoint inventory could not be fetched or parsed.
    #[error("failed to fetch server list: {0}")]
    FetchFailed(String),

    /// Switching needs at least two usable endpoints.
    #[error("no other location available")]
    NoAlternativeEndpoint,

    /// The request does not apply to the current connection status.
    #[error("cannot {0} in the current state")]
    InvalidState(&'static str),

    /// An obfuscation mode was chosen but its helper tool is missing.
    #[error("obfsproxy is required for {0} but is not available")]
    HelperUnavailable(EncryptionMode),

    /// The settings store could not be read or written.
    #[error("settings store error: {0}")]
    Store(String),

    /// An underlying I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The owner thread has shut down.
    #[error("orchestrator is no longer running")]
    OwnerGone,
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
