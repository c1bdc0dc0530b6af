//! Kill switch state types.
//!
//! The kill switch prevents traffic leakage when the VPN connection drops
//! unexpectedly. The orchestrator only decides the state; firewall rules are
//! the network layer's job.

/// Current kill switch operational state.
///
/// Represents what the network layer is being asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KillSwitchState {
    /// Block-on-disconnect is off.
    #[default]
    Disabled,
    /// Policy is on, nothing to block right now.
    Armed,
    /// Block all non-VPN traffic.
    Blocking,
}

impl KillSwitchState {
    /// Derive the state from the policy flag and whether an unexpected drop
    /// is still unresolved.
    #[must_use]
    pub const fn resolve(policy: bool, dropped: bool) -> Self {
        match (policy, dropped) {
            (false, _) => Self::Disabled,
            (true, false) => Self::Armed,
            (true, true) => Self::Blocking,
        }
    }

    /// Check if currently blocking traffic
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Blocking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        assert_eq!(KillSwitchState::resolve(false, true), KillSwitchState::Disabled);
        assert_eq!(KillSwitchState::resolve(true, false), KillSwitchState::Armed);
        assert_eq!(KillSwitchState::resolve(true, true), KillSwitchState::Blocking);
    }

    #[test]
    fn test_state_is_blocking() {
        assert!(!KillSwitchState::Disabled.is_blocking());
        assert!(!KillSwitchState::Armed.is_blocking());
        assert!(KillSwitchState::Blocking.is_blocking());
    }
}
