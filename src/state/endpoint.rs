//! Endpoint, protocol, and selection types.

use serde::{Deserialize, Serialize};

/// Stable identifier of a server location, independent of list position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(pub u32);

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport used to reach the server.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// `OpenVPN` over UDP.
    Udp,
    /// `OpenVPN` over TCP.
    Tcp,
}

impl Transport {
    /// Value for OpenVPN's `--proto` option.
    #[must_use]
    pub const fn openvpn_proto(self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp-client",
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Udp => write!(f, "UDP"),
            Transport::Tcp => write!(f, "TCP"),
        }
    }
}

/// One entry of the protocol drop-down: a transport and server port.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ProtocolOption {
    pub transport: Transport,
    pub port: u16,
}

impl ProtocolOption {
    const fn new(transport: Transport, port: u16) -> Self {
        Self { transport, port }
    }
}

impl std::fmt::Display for ProtocolOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.transport, self.port)
    }
}

/// Encryption and transport-disguise variants.
///
/// The stored `encryption-mode` setting is the index into [`EncryptionMode::ALL`].
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum EncryptionMode {
    /// RSA 4096-bit TLS.
    #[default]
    Rsa,
    /// Elliptic-curve TLS.
    Ecc,
    /// Elliptic-curve TLS with XOR-scrambled packets.
    EccXor,
    /// Tor obfs2 through the local obfsproxy helper.
    TorObfs2,
    /// Tor obfs3 through the local obfsproxy helper.
    TorObfs3,
    /// Tor ScrambleSuit through the local obfsproxy helper.
    TorScrambleSuit,
}

const RSA_PROTOCOLS: &[ProtocolOption] = &[
    ProtocolOption::new(Transport::Udp, 1194),
    ProtocolOption::new(Transport::Udp, 53),
    ProtocolOption::new(Transport::Tcp, 443),
    ProtocolOption::new(Transport::Tcp, 80),
];
const ECC_PROTOCOLS: &[ProtocolOption] = &[
    ProtocolOption::new(Transport::Udp, 1195),
    ProtocolOption::new(Transport::Tcp, 444),
];
const ECC_XOR_PROTOCOLS: &[ProtocolOption] = &[
    ProtocolOption::new(Transport::Udp, 1196),
    ProtocolOption::new(Transport::Tcp, 445),
];
const OBFS2_PROTOCOLS: &[ProtocolOption] = &[ProtocolOption::new(Transport::Tcp, 1212)];
const OBFS3_PROTOCOLS: &[ProtocolOption] = &[ProtocolOption::new(Transport::Tcp, 1213)];
const SCRAMBLESUIT_PROTOCOLS: &[ProtocolOption] = &[ProtocolOption::new(Transport::Tcp, 1214)];

impl EncryptionMode {
    /// Every mode, in stored-index order.
    pub const ALL: [EncryptionMode; 6] = [
        EncryptionMode::Rsa,
        EncryptionMode::Ecc,
        EncryptionMode::EccXor,
        EncryptionMode::TorObfs2,
        EncryptionMode::TorObfs3,
        EncryptionMode::TorScrambleSuit,
    ];

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[must_use]
    pub fn index(self) -> usize {
        Self::ALL.iter().position(|m| *m == self).unwrap_or_default()
    }

    /// Whether this mode needs the obfsproxy helper and an obfuscation-capable server.
    #[must_use]
    pub const fn is_obfuscated(self) -> bool {
        matches!(
            self,
            EncryptionMode::TorObfs2 | EncryptionMode::TorObfs3 | EncryptionMode::TorScrambleSuit
        )
    }

    /// Protocol options offered under this mode.
    #[must_use]
    pub const fn protocols(self) -> &'static [ProtocolOption] {
        match self {
            EncryptionMode::Rsa => RSA_PROTOCOLS,
            EncryptionMode::Ecc => ECC_PROTOCOLS,
            EncryptionMode::EccXor => ECC_XOR_PROTOCOLS,
            EncryptionMode::TorObfs2 => OBFS2_PROTOCOLS,
            EncryptionMode::TorObfs3 => OBFS3_PROTOCOLS,
            EncryptionMode::TorScrambleSuit => SCRAMBLESUIT_PROTOCOLS,
        }
    }
}

impl std::fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EncryptionMode::Rsa => "RSA 4096-bit",
            EncryptionMode::Ecc => "ECC (secp384r1)",
            EncryptionMode::EccXor => "ECC + XOR",
            EncryptionMode::TorObfs2 => "TOR obfs2",
            EncryptionMode::TorObfs3 => "TOR obfs3",
            EncryptionMode::TorScrambleSuit => "TOR ScrambleSuit",
        };
        write!(f, "{name}")
    }
}

/// A connectable server location.
///
/// Immutable once fetched; a repopulation replaces the whole list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Stable identifier.
    pub id: EndpointId,
    /// Display name, e.g. "Amsterdam".
    pub name: String,
    /// Hostname or IP address handed to `OpenVPN`.
    pub address: String,
    /// Transports the server accepts.
    #[serde(default = "default_transports")]
    pub transports: Vec<Transport>,
    /// Round-trip time in milliseconds, if measured.
    #[serde(default)]
    pub ping_ms: Option<u32>,
    /// Server load in percent, if known.
    #[serde(default)]
    pub load: Option<u8>,
    /// Server accepts obfsproxy-wrapped traffic.
    #[serde(default)]
    pub obfuscation: bool,
    /// Server is a hub (listed even when individual nodes are hidden).
    #[serde(default = "default_hub")]
    pub hub: bool,
}

fn default_transports() -> Vec<Transport> {
    vec![Transport::Udp, Transport::Tcp]
}

const fn default_hub() -> bool {
    true
}

impl Endpoint {
    /// Whether this endpoint can serve `option` under `mode`.
    #[must_use]
    pub fn supports(&self, option: ProtocolOption, mode: EncryptionMode) -> bool {
        self.transports.contains(&option.transport) && (!mode.is_obfuscated() || self.obfuscation)
    }

    /// Single-line label for the location list.
    #[must_use]
    pub fn label(&self) -> String {
        let ping = self
            .ping_ms
            .map_or_else(|| "--".to_string(), |ms| format!("{ms} ms"));
        let load = self
            .load
            .map_or_else(|| "--".to_string(), |pct| format!("{pct}%"));
        format!("{} ({ping}, {load})", self.name)
    }
}

/// The user's chosen endpoint and protocol index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    pub endpoint: Option<EndpointId>,
    /// Index into [`EncryptionMode::protocols`] of the configured mode.
    pub protocol: Option<usize>,
}

impl Selection {
    #[must_use]
    pub const fn new(endpoint: EndpointId, protocol: usize) -> Self {
        Self {
            endpoint: Some(endpoint),
            protocol: Some(protocol),
        }
    }
}

/// A selection resolved against the catalog and configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub endpoint: Endpoint,
    pub protocol: usize,
    pub option: ProtocolOption,
}

impl Target {
    /// Same endpoint and protocol.
    #[must_use]
    pub fn same_as(&self, other: &Target) -> bool {
        self.endpoint.id == other.endpoint.id && self.protocol == other.protocol
    }

    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection::new(self.endpoint.id, self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(obfuscation: bool, transports: Vec<Transport>) -> Endpoint {
        Endpoint {
            id: EndpointId(1),
            name: "Amsterdam".to_string(),
            address: "nl1.example.net".to_string(),
            transports,
            ping_ms: Some(12),
            load: Some(40),
            obfuscation,
            hub: true,
        }
    }

    #[test]
    fn test_mode_index_roundtrip() {
        for (i, mode) in EncryptionMode::ALL.iter().enumerate() {
            assert_eq!(mode.index(), i);
            assert_eq!(EncryptionMode::from_index(i), Some(*mode));
        }
        assert_eq!(EncryptionMode::from_index(EncryptionMode::ALL.len()), None);
    }

    #[test]
    fn test_obfuscated_modes_are_tcp_only() {
        for mode in EncryptionMode::ALL.iter().filter(|m| m.is_obfuscated()) {
            assert!(mode
                .protocols()
                .iter()
                .all(|p| p.transport == Transport::Tcp));
        }
    }

    #[test]
    fn test_supports_checks_transport_and_obfuscation() {
        let udp_only = endpoint(false, vec![Transport::Udp]);
        let udp = EncryptionMode::Rsa.protocols()[0];
        let tcp = EncryptionMode::Rsa.protocols()[2];
        assert!(udp_only.supports(udp, EncryptionMode::Rsa));
        assert!(!udp_only.supports(tcp, EncryptionMode::Rsa));

        let plain = endpoint(false, vec![Transport::Tcp]);
        let obfs = EncryptionMode::TorObfs3.protocols()[0];
        assert!(!plain.supports(obfs, EncryptionMode::TorObfs3));
        assert!(endpoint(true, vec![Transport::Tcp]).supports(obfs, EncryptionMode::TorObfs3));
    }

    #[test]
    fn test_label_with_missing_metadata() {
        let mut ep = endpoint(false, vec![Transport::Udp]);
        assert_eq!(ep.label(), "Amsterdam (12 ms, 40%)");
        ep.ping_ms = None;
        ep.load = None;
        assert_eq!(ep.label(), "Amsterdam (--, --)");
    }

    #[test]
    fn test_endpoint_json_defaults() {
        let ep: Endpoint = serde_json::from_str(
            r#"{"id": 7, "name": "Tokyo", "address": "jp1.example.net"}"#,
        )
        .unwrap();
        assert_eq!(ep.id, EndpointId(7));
        assert_eq!(ep.transports, vec![Transport::Udp, Transport::Tcp]);
        assert!(ep.hub);
        assert!(!ep.obfuscation);
    }
}
