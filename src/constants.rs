//! Application-wide constants and configuration values.
//!
//! This module defines the static policy values used throughout jumpgate,
//! including validation limits, timing intervals, default settings, OpenVPN
//! output markers, and user-facing messages.

use std::time::Duration;

// === Application Metadata ===

/// Application name (from Cargo.toml).
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

// === Validation Policy ===

/// Maximum number of distinct forwarded ports.
pub const PORT_FORWARD_MAX: usize = 5;

// === Timing Configuration ===

/// How long a graceful stop may take before the process is killed.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Poll interval while waiting for a subprocess to exit.
pub const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Session tick rate in milliseconds.
pub const DEFAULT_TICK_RATE: u64 = 250;
/// Timeout for the inventory download in seconds.
pub const INVENTORY_TIMEOUT_SECS: u8 = 10;

// === Path Configuration ===

/// Name of the settings file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// === Settings Defaults ===

/// Local port used when none has been stored.
pub const DEFAULT_LOCAL_PORT: u16 = 1194;
/// Primary resolver applied by the fix-DNS toggle.
pub const DEFAULT_DNS1: &str = "146.185.134.104";
/// Secondary resolver applied by the fix-DNS toggle.
pub const DEFAULT_DNS2: &str = "192.241.172.159";
/// OpenVPN binary looked up on PATH when none has been stored.
pub const DEFAULT_OPENVPN_PROGRAM: &str = "openvpn";
/// Local SOCKS port where the obfsproxy helper listens.
pub const OBFS_PROXY_PORT: u16 = 1050;
/// XOR mask passed to OpenVPN in ECC + XOR mode.
pub const XOR_SCRAMBLE_KEY: &str = "jumpgate";

// === Catalog Rows ===

/// Placeholder occupying row 0 of the location list.
pub const LOCATION_PLACEHOLDER: &str = "-- select location --";
/// Placeholder occupying row 0 of the protocol list.
pub const PROTOCOL_PLACEHOLDER: &str = "-- Select protocol & port --";

// === OpenVPN Output Markers ===

/// Line fragments meaning the tunnel is up.
/// Also matches the "... With Errors" variant, where the tunnel is up but some
/// routes failed.
pub const MARKERS_CONNECTED: [&str; 1] = ["Initialization Sequence Completed"];
/// Line fragments meaning the server refused our credentials.
pub const MARKERS_AUTH_FAILED: [&str; 2] = ["AUTH_FAILED", "auth-failure"];
/// Line fragments meaning the server could not be reached.
pub const MARKERS_UNREACHABLE: [&str; 5] = [
    "Network is unreachable",
    "No route to host",
    "Cannot resolve host address",
    "TLS key negotiation failed",
    "Connection refused",
];

// === Log Buffer ===

/// Number of subprocess log lines retained for inspection.
pub const MAX_LOG_LINES: usize = 1000;
/// Lines printed by the session's log key.
pub const LOG_TAIL_LINES: usize = 20;

// === Messages ===

pub const MSG_CONNECTING: &str = "Connecting to ";
pub const MSG_CONNECTED: &str = "Connected to ";
pub const MSG_DISCONNECTING: &str = "Disconnecting...";
pub const MSG_DISCONNECTED: &str = "Disconnected";
pub const MSG_RETRYING: &str = " (trying next location)";
pub const MSG_BLOCKING: &str = "Traffic blocked until the VPN reconnects";
pub const MSG_BLOCK_RELEASED: &str = "Traffic block released";
pub const MSG_SESSION_KEYS: &str = "[d] disconnect  [n] next location  [r] release block  [q] quit";
