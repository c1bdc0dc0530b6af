//! Field validators for user-edited settings.
//!
//! All functions are pure and safe to call from any thread. Callers decide
//! what visual or state feedback to give based on the result.

use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::constants::PORT_FORWARD_MAX;

/// Returns `true` for an empty string ("unset") or a well-formed IPv4/IPv6 literal.
#[must_use]
pub fn validate_ip(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text.parse::<IpAddr>().is_ok()
}

/// Returns `true` when `text` is an integer in `1..=65535`.
#[must_use]
pub fn validate_port(text: &str) -> bool {
    parse_port(text).is_some()
}

/// Parses a port number, rejecting zero.
#[must_use]
pub fn parse_port(text: &str) -> Option<u16> {
    match text.trim().parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

/// Validates a comma-separated port list.
///
/// An empty list is valid and yields an empty set. A single bad token
/// invalidates the whole list, and so does listing more than
/// [`PORT_FORWARD_MAX`] entries. Repeated entries count towards the limit
/// but collapse in the returned set, which is only populated for valid input.
#[must_use]
pub fn validate_port_list(text: &str) -> (bool, BTreeSet<u16>) {
    match parse_port_list(text) {
        Some(ports) => (true, ports),
        None => (false, BTreeSet::new()),
    }
}

/// Parses a port list, returning `None` if any token is invalid or the list is too long.
#[must_use]
pub fn parse_port_list(text: &str) -> Option<BTreeSet<u16>> {
    let mut ports = BTreeSet::new();
    if text.trim().is_empty() {
        return Some(ports);
    }

    let mut count = 0;
    for token in text.split(',') {
        ports.insert(parse_port(token)?);
        count += 1;
    }

    (count <= PORT_FORWARD_MAX).then_some(ports)
}

/// Renders a port set in canonical form: ascending, comma-separated.
#[must_use]
pub fn format_port_list(ports: &BTreeSet<u16>) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_empty_is_unset() {
        assert!(validate_ip(""));
        assert!(validate_ip("   "));
    }

    #[test]
    fn test_ip_literals() {
        assert!(validate_ip("8.8.8.8"));
        assert!(validate_ip("2001:4860:4860::8888"));
        assert!(validate_ip("::1"));
    }

    #[test]
    fn test_ip_rejects_garbage() {
        assert!(!validate_ip("256.1.1.1"));
        assert!(!validate_ip("dns.example.com"));
        assert!(!validate_ip("1.2.3"));
        assert!(!validate_ip("1.2.3.4:53"));
    }

    #[test]
    fn test_port_bounds() {
        assert!(validate_port("1"));
        assert!(validate_port("65535"));
        assert!(!validate_port("0"));
        assert!(!validate_port("65536"));
        assert!(!validate_port("-1"));
        assert!(!validate_port(""));
        assert!(!validate_port("http"));
    }

    #[test]
    fn test_port_list_duplicates_collapse() {
        let (valid, ports) = validate_port_list("80,443,80");
        assert!(valid);
        assert_eq!(ports, BTreeSet::from([80, 443]));
    }

    #[test]
    fn test_port_list_bad_token_rejects_everything() {
        let (valid, ports) = validate_port_list("80,abc");
        assert!(!valid);
        assert!(ports.is_empty());
    }

    #[test]
    fn test_port_list_empty_is_valid() {
        let (valid, ports) = validate_port_list("");
        assert!(valid);
        assert!(ports.is_empty());
    }

    #[test]
    fn test_port_list_trailing_comma_is_invalid() {
        assert!(!validate_port_list("80,").0);
        assert!(!validate_port_list(",").0);
    }

    #[test]
    fn test_port_list_tolerates_spaces() {
        let (valid, ports) = validate_port_list(" 22, 8080 ");
        assert!(valid);
        assert_eq!(ports, BTreeSet::from([22, 8080]));
    }

    #[test]
    fn test_port_list_cardinality_limit() {
        assert!(validate_port_list("1,2,3,4,5").0);
        assert!(!validate_port_list("1,2,3,4,5,6").0);
        // Every entry counts, repeated or not
        assert!(!validate_port_list("1,2,3,4,5,5,1").0);
        assert!(!validate_port_list("80,80,80,80,80,80").0);
        assert!(validate_port_list("80,80,80,80,80").0);
    }

    #[test]
    fn test_port_list_reserialization_is_order_independent() {
        let a = parse_port_list("443,80,8080").unwrap();
        let b = parse_port_list("8080,443,80,443").unwrap();
        assert_eq!(format_port_list(&a), "80,443,8080");
        assert_eq!(format_port_list(&a), format_port_list(&b));
        assert_eq!(parse_port_list(&format_port_list(&a)).unwrap(), a);
    }
}
