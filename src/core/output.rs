//! `OpenVPN` log line classification.

use crate::constants;

/// What a single output line tells us about the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// The tunnel is up.
    Connected,
    /// The server rejected our credentials.
    AuthFailed,
    /// The server could not be reached.
    NetworkUnreachable,
    /// Anything else; kept for the log.
    Log(String),
}

/// Classify one line of subprocess output.
#[must_use]
pub fn parse_line(line: &str) -> OutputEvent {
    let contains_any = |markers: &[&str]| markers.iter().any(|m| line.contains(m));

    if contains_any(&constants::MARKERS_CONNECTED) {
        OutputEvent::Connected
    } else if contains_any(&constants::MARKERS_AUTH_FAILED) {
        OutputEvent::AuthFailed
    } else if contains_any(&constants::MARKERS_UNREACHABLE) {
        OutputEvent::NetworkUnreachable
    } else {
        OutputEvent::Log(line.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_marker() {
        assert_eq!(
            parse_line("Tue Mar 3 10:00:00 2026 Initialization Sequence Completed"),
            OutputEvent::Connected
        );
    }

    #[test]
    fn test_completed_with_errors_still_counts_as_up() {
        // openvpn keeps the tunnel running when only route setup failed
        assert_eq!(
            parse_line("Initialization Sequence Completed With Errors ( see http://openvpn.net/faq.html#dhcpclientserv )"),
            OutputEvent::Connected
        );
    }

    #[test]
    fn test_auth_failure() {
        assert_eq!(
            parse_line("AUTH: Received control message: AUTH_FAILED"),
            OutputEvent::AuthFailed
        );
    }

    #[test]
    fn test_unreachable() {
        assert_eq!(
            parse_line("write UDP: Network is unreachable (code=101)"),
            OutputEvent::NetworkUnreachable
        );
        assert_eq!(
            parse_line("TLS Error: TLS key negotiation failed to occur within 60 seconds"),
            OutputEvent::NetworkUnreachable
        );
    }

    #[test]
    fn test_plain_log_line() {
        let event = parse_line("OpenVPN 2.6.8 x86_64-pc-linux-gnu\r\n");
        assert_eq!(
            event,
            OutputEvent::Log("OpenVPN 2.6.8 x86_64-pc-linux-gnu".to_string())
        );
    }
}
