//! VPN connection state types.

use super::endpoint::EndpointId;
use super::killswitch::KillSwitchState;

/// Identifier of one connection attempt.
///
/// Strictly increasing for the lifetime of the process. Every subprocess event
/// carries the attempt it belongs to, so events from a superseded attempt can
/// be told apart from current ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttemptId(pub u64);

impl AttemptId {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt-{}", self.0)
    }
}

/// Why a connection ended in [`ConnectionStatus::Failed`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailReason {
    /// The server rejected the credentials.
    AuthFailed,
    /// The server could not be reached.
    NetworkUnreachable,
    /// Auto-reconnect tried every eligible location without success.
    AllEndpointsExhausted,
    /// The VPN binary is missing or could not be executed.
    ProcessSpawnFailed,
    /// The VPN process died while the tunnel was up.
    ProcessCrashed,
    /// The VPN process exited before the tunnel came up.
    ProcessExited,
}

impl FailReason {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            FailReason::AuthFailed => "auth-failed",
            FailReason::NetworkUnreachable => "network-unreachable",
            FailReason::AllEndpointsExhausted => "all-endpoints-exhausted",
            FailReason::ProcessSpawnFailed => "process-spawn-failed",
            FailReason::ProcessCrashed => "process-crashed",
            FailReason::ProcessExited => "process-exited",
        }
    }

    /// Whether auto-reconnect may try another location after this failure.
    ///
    /// A broken install fails the same way everywhere, and exhaustion is
    /// already the end of a retry round.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(
            self,
            FailReason::ProcessSpawnFailed | FailReason::AllEndpointsExhausted
        )
    }
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            FailReason::AuthFailed => "authentication failed",
            FailReason::NetworkUnreachable => "server unreachable",
            FailReason::AllEndpointsExhausted => "no location could be reached",
            FailReason::ProcessSpawnFailed => "VPN binary could not be started",
            FailReason::ProcessCrashed => "VPN process stopped unexpectedly",
            FailReason::ProcessExited => "VPN process exited before connecting",
        };
        write!(f, "{}: {message}", self.code())
    }
}

/// VPN connection state machine.
///
/// Exactly one live value exists, owned by the orchestrator. Observers only
/// ever see copies delivered in a [`StatusUpdate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No VPN process and nothing pending.
    Idle,
    /// Process started, waiting for the tunnel.
    Connecting,
    /// Tunnel established.
    Connected,
    /// Process being stopped.
    Disconnecting,
    /// Last attempt failed.
    Failed(FailReason),
}

impl ConnectionStatus {
    /// Connecting or connected.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Failed(reason) => write!(f, "Failed({reason})"),
        }
    }
}

/// One published transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    /// The new status.
    pub status: ConnectionStatus,
    /// Attempt the status refers to.
    pub attempt: AttemptId,
    /// Location of that attempt, if any.
    pub endpoint: Option<EndpointId>,
    /// A `Connecting` status entered automatically after the previous location
    /// failed. The failure itself is never published while a retry follows.
    pub retrying: bool,
    /// What the network layer should do with non-VPN traffic.
    pub killswitch: KillSwitchState,
}
