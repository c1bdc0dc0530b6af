//! Settings storage and the validated connection configuration.
//!
//! The store itself is a flat key-value map behind [`ConfigStore`]. Every
//! write from the user goes through [`Settings`], which runs the field's
//! validator first and leaves the stored value untouched on rejection.

use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::constants;
use crate::error::{Error, Result};
use crate::state::{EncryptionMode, EndpointId, Selection};
use crate::validate;

/// Stable store keys.
pub mod keys {
    pub const LOCAL_PORT: &str = "local-port";
    pub const DNS1: &str = "dns1";
    pub const DNS2: &str = "dns2";
    pub const FORWARD_PORTS: &str = "forward-ports";
    pub const ENCRYPTION_MODE: &str = "encryption-mode";
    pub const AUTOCONNECT: &str = "autoconnect";
    pub const RECONNECT: &str = "reconnect";
    pub const BLOCK_ON_DISCONNECT: &str = "block-on-disconnect";
    pub const SHOW_NODES: &str = "show-nodes";
    pub const FIX_DNS: &str = "fix-dns";
    pub const DISABLE_IPV6: &str = "disable-ipv6";
    pub const STARTUP: &str = "startup";
    pub const DETECT_INSECURE_WIFI: &str = "detect-insecure-wifi";
    pub const LOGGING: &str = "logging";
    pub const SERVER: &str = "server";
    pub const PROTOCOL: &str = "protocol";
    pub const OPENVPN_PATH: &str = "openvpn-path";
    pub const OPENVPN_CONFIG: &str = "openvpn-config";

    /// Every key, in display order.
    pub const ALL: [&str; 18] = [
        LOCAL_PORT,
        DNS1,
        DNS2,
        FORWARD_PORTS,
        ENCRYPTION_MODE,
        AUTOCONNECT,
        RECONNECT,
        BLOCK_ON_DISCONNECT,
        SHOW_NODES,
        FIX_DNS,
        DISABLE_IPV6,
        STARTUP,
        DETECT_INSECURE_WIFI,
        LOGGING,
        SERVER,
        PROTOCOL,
        OPENVPN_PATH,
        OPENVPN_CONFIG,
    ];
}

/// Narrow interface to the persisted settings.
///
/// Implementations synchronize internally; writes are last-writer-wins per key.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// # Errors
    ///
    /// Returns [`Error::Store`] if the value could not be persisted.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory store, used by tests and as a fallback when no config directory exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::Store("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store persisted as a flat TOML table, rewritten on every `set`.
#[derive(Debug)]
pub struct TomlStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl TomlStore {
    /// Open the store at `path`. A missing file starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the file exists but is not a flat table of strings.
    pub fn open(path: &Path) -> Result<Self> {
        let values = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str::<BTreeMap<String, String>>(&content)
                .map_err(|e| Error::Store(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), keys = values.len(), "settings loaded");
        Ok(Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        })
    }

    /// `<config_dir>/jumpgate/config.toml`, if the platform has a config directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(constants::APP_NAME)
                .join(constants::CONFIG_FILE_NAME)
        })
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(values).map_err(|e| Error::Store(e.to_string()))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl ConfigStore for TomlStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| Error::Store("settings lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}

/// External capability check for the obfuscation helper.
pub trait HelperTools: Send + Sync {
    fn obfsproxy_installed(&self) -> bool;

    /// Try to install the helper. Returns `false` when the platform has no way to.
    fn install_obfsproxy(&self) -> bool {
        false
    }
}

/// Looks for `obfsproxy` on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHelpers;

impl HelperTools for SystemHelpers {
    fn obfsproxy_installed(&self) -> bool {
        std::process::Command::new("obfsproxy")
            .arg("--version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .is_ok()
    }
}

/// Boolean settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    AutoConnect,
    Reconnect,
    BlockOnDisconnect,
    ShowNodes,
    FixDns,
    DisableIpv6,
    Startup,
    DetectInsecureWifi,
    Logging,
}

impl Flag {
    pub const ALL: [Flag; 9] = [
        Flag::AutoConnect,
        Flag::Reconnect,
        Flag::BlockOnDisconnect,
        Flag::ShowNodes,
        Flag::FixDns,
        Flag::DisableIpv6,
        Flag::Startup,
        Flag::DetectInsecureWifi,
        Flag::Logging,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Flag::AutoConnect => keys::AUTOCONNECT,
            Flag::Reconnect => keys::RECONNECT,
            Flag::BlockOnDisconnect => keys::BLOCK_ON_DISCONNECT,
            Flag::ShowNodes => keys::SHOW_NODES,
            Flag::FixDns => keys::FIX_DNS,
            Flag::DisableIpv6 => keys::DISABLE_IPV6,
            Flag::Startup => keys::STARTUP,
            Flag::DetectInsecureWifi => keys::DETECT_INSECURE_WIFI,
            Flag::Logging => keys::LOGGING,
        }
    }

    /// Value assumed when the key has never been written.
    #[must_use]
    pub const fn default_value(self) -> bool {
        matches!(self, Flag::Reconnect | Flag::Logging)
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|flag| flag.key() == key)
    }
}

/// Validated connection parameters, loaded fresh for every connect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub local_port: u16,
    pub forward_ports: BTreeSet<u16>,
    pub dns1: Option<IpAddr>,
    pub dns2: Option<IpAddr>,
    pub encryption: EncryptionMode,
    pub auto_reconnect: bool,
    pub block_on_disconnect: bool,
    pub disable_ipv6: bool,
    pub autoconnect: bool,
    pub openvpn_program: PathBuf,
    pub openvpn_config: Option<PathBuf>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            local_port: constants::DEFAULT_LOCAL_PORT,
            forward_ports: BTreeSet::new(),
            dns1: None,
            dns2: None,
            encryption: EncryptionMode::default(),
            auto_reconnect: Flag::Reconnect.default_value(),
            block_on_disconnect: Flag::BlockOnDisconnect.default_value(),
            disable_ipv6: Flag::DisableIpv6.default_value(),
            autoconnect: Flag::AutoConnect.default_value(),
            openvpn_program: PathBuf::from(constants::DEFAULT_OPENVPN_PROGRAM),
            openvpn_config: None,
        }
    }
}

/// Validating facade over a [`ConfigStore`]. Cheap to clone.
#[derive(Clone)]
pub struct Settings {
    store: Arc<dyn ConfigStore>,
}

impl Settings {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Settings over a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.store.get(key)
    }

    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `text` is not a port number.
    pub fn set_local_port(&self, text: &str) -> Result<()> {
        let port = validate::parse_port(text).ok_or(Error::InvalidConfig(keys::LOCAL_PORT))?;
        self.store.set(keys::LOCAL_PORT, &port.to_string())
    }

    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `text` is neither empty nor an IP literal.
    pub fn set_dns1(&self, text: &str) -> Result<()> {
        self.set_ip(keys::DNS1, text)
    }

    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `text` is neither empty nor an IP literal.
    pub fn set_dns2(&self, text: &str) -> Result<()> {
        self.set_ip(keys::DNS2, text)
    }

    fn set_ip(&self, key: &'static str, text: &str) -> Result<()> {
        if !validate::validate_ip(text) {
            return Err(Error::InvalidConfig(key));
        }
        self.store.set(key, text.trim())
    }

    /// Stores the list in canonical form and returns the parsed set.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if any token is bad or the list is too long.
    pub fn set_forward_ports(&self, text: &str) -> Result<BTreeSet<u16>> {
        let ports =
            validate::parse_port_list(text).ok_or(Error::InvalidConfig(keys::FORWARD_PORTS))?;
        self.store
            .set(keys::FORWARD_PORTS, &validate::format_port_list(&ports))?;
        Ok(ports)
    }

    /// Obfuscation modes need the obfsproxy helper: try to install it when
    /// missing, and refuse the change if it is still unavailable.
    ///
    /// # Errors
    ///
    /// [`Error::HelperUnavailable`] when an obfuscation mode cannot be served.
    pub fn set_encryption(&self, mode: EncryptionMode, helpers: &dyn HelperTools) -> Result<()> {
        if mode.is_obfuscated() && !helpers.obfsproxy_installed() {
            info!(%mode, "obfsproxy missing, attempting install");
            if !(helpers.install_obfsproxy() && helpers.obfsproxy_installed()) {
                warn!(%mode, "obfsproxy unavailable, keeping previous encryption");
                return Err(Error::HelperUnavailable(mode));
            }
        }
        self.store
            .set(keys::ENCRYPTION_MODE, &mode.index().to_string())
    }

    /// Writes a boolean setting.
    ///
    /// Turning fix-DNS on fills empty DNS fields with the default resolvers;
    /// turning it off clears both.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn set_flag(&self, flag: Flag, on: bool) -> Result<()> {
        self.store.set(flag.key(), if on { "true" } else { "false" })?;
        if flag == Flag::FixDns {
            if on {
                for (key, default) in [
                    (keys::DNS1, constants::DEFAULT_DNS1),
                    (keys::DNS2, constants::DEFAULT_DNS2),
                ] {
                    if self.get(key).unwrap_or_default().trim().is_empty() {
                        self.store.set(key, default)?;
                    }
                }
            } else {
                self.store.set(keys::DNS1, "")?;
                self.store.set(keys::DNS2, "")?;
            }
        }
        Ok(())
    }

    /// Generic validated write, dispatching on the key.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownSetting`] for keys that cannot be edited this way,
    /// [`Error::InvalidConfig`] for values failing validation.
    pub fn apply(&self, key: &str, value: &str, helpers: &dyn HelperTools) -> Result<()> {
        match key {
            keys::LOCAL_PORT => self.set_local_port(value),
            keys::DNS1 => self.set_dns1(value),
            keys::DNS2 => self.set_dns2(value),
            keys::FORWARD_PORTS => self.set_forward_ports(value).map(|_| ()),
            keys::ENCRYPTION_MODE => {
                let mode = value
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(EncryptionMode::from_index)
                    .ok_or(Error::InvalidConfig(keys::ENCRYPTION_MODE))?;
                self.set_encryption(mode, helpers)
            }
            keys::OPENVPN_PATH | keys::OPENVPN_CONFIG => self.store.set(key, value.trim()),
            _ => {
                let flag =
                    Flag::from_key(key).ok_or_else(|| Error::UnknownSetting(key.to_string()))?;
                let on = parse_bool(value).ok_or(Error::InvalidConfig(flag.key()))?;
                self.set_flag(flag, on)
            }
        }
    }

    /// Read a boolean setting, falling back to its default when unset.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the stored text is not a boolean.
    pub fn flag(&self, flag: Flag) -> Result<bool> {
        match self.get(flag.key()) {
            None => Ok(flag.default_value()),
            Some(text) if text.trim().is_empty() => Ok(flag.default_value()),
            Some(text) => parse_bool(&text).ok_or(Error::InvalidConfig(flag.key())),
        }
    }

    /// Encryption mode, `Rsa` when unset.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the stored index is out of range.
    pub fn encryption(&self) -> Result<EncryptionMode> {
        match self.get(keys::ENCRYPTION_MODE) {
            None => Ok(EncryptionMode::default()),
            Some(text) => text
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(EncryptionMode::from_index)
                .ok_or(Error::InvalidConfig(keys::ENCRYPTION_MODE)),
        }
    }

    /// Builds the connection configuration, validating every stored field.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] naming the first field that fails validation.
    pub fn load(&self) -> Result<ConnectionConfig> {
        let local_port = match self.get(keys::LOCAL_PORT) {
            None => constants::DEFAULT_LOCAL_PORT,
            Some(text) => {
                validate::parse_port(&text).ok_or(Error::InvalidConfig(keys::LOCAL_PORT))?
            }
        };
        let forward_ports =
            validate::parse_port_list(&self.get(keys::FORWARD_PORTS).unwrap_or_default())
                .ok_or(Error::InvalidConfig(keys::FORWARD_PORTS))?;

        Ok(ConnectionConfig {
            local_port,
            forward_ports,
            dns1: self.dns(keys::DNS1)?,
            dns2: self.dns(keys::DNS2)?,
            encryption: self.encryption()?,
            auto_reconnect: self.flag(Flag::Reconnect)?,
            block_on_disconnect: self.flag(Flag::BlockOnDisconnect)?,
            disable_ipv6: self.flag(Flag::DisableIpv6)?,
            autoconnect: self.flag(Flag::AutoConnect)?,
            openvpn_program: self
                .get(keys::OPENVPN_PATH)
                .filter(|p| !p.trim().is_empty())
                .map_or_else(
                    || PathBuf::from(constants::DEFAULT_OPENVPN_PROGRAM),
                    PathBuf::from,
                ),
            openvpn_config: self
                .get(keys::OPENVPN_CONFIG)
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    fn dns(&self, key: &'static str) -> Result<Option<IpAddr>> {
        let text = self.get(key).unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        text.parse().map(Some).map_err(|_| Error::InvalidConfig(key))
    }

    /// The last saved selection. Unparseable values read as "none".
    #[must_use]
    pub fn selection(&self) -> Selection {
        Selection {
            endpoint: self
                .get(keys::SERVER)
                .and_then(|s| s.trim().parse().ok())
                .map(EndpointId),
            protocol: self.get(keys::PROTOCOL).and_then(|s| s.trim().parse().ok()),
        }
    }

    /// # Errors
    ///
    /// Propagates store failures.
    pub fn save_selection(&self, selection: Selection) -> Result<()> {
        let server = selection.endpoint.map(|id| id.0.to_string()).unwrap_or_default();
        let protocol = selection.protocol.map(|p| p.to_string()).unwrap_or_default();
        self.store.set(keys::SERVER, &server)?;
        self.store.set(keys::PROTOCOL, &protocol)
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
