//! `OpenVPN` command line resolution.

use std::net::IpAddr;
use std::path::PathBuf;

use crate::config::ConnectionConfig;
use crate::constants;
use crate::state::{EncryptionMode, Target};
use crate::validate;

/// Program and arguments for one connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Shell-style rendering for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Build the `OpenVPN` invocation for `target` under `config`.
#[must_use]
pub fn launch_spec(target: &Target, config: &ConnectionConfig) -> LaunchSpec {
    let mut args: Vec<String> = Vec::new();
    let mut push = |items: &[&str]| args.extend(items.iter().map(|s| (*s).to_string()));

    if let Some(base) = &config.openvpn_config {
        push(&["--config", base.display().to_string().as_str()]);
    }

    let port = target.option.port.to_string();
    let local_port = config.local_port.to_string();
    push(&["--client", "--dev", "tun"]);
    push(&["--remote", target.endpoint.address.as_str(), port.as_str()]);
    push(&["--proto", target.option.transport.openvpn_proto()]);
    push(&["--lport", local_port.as_str()]);
    push(&["--verb", "3"]);
    // Credential problems must surface as AUTH_FAILED instead of a prompt loop
    push(&["--auth-retry", "none", "--auth-nocache"]);

    for dns in [config.dns1, config.dns2].into_iter().flatten() {
        push(&["--dhcp-option", dns_kind(dns), dns.to_string().as_str()]);
    }

    if config.encryption.is_obfuscated() {
        push(&[
            "--socks-proxy",
            "127.0.0.1",
            constants::OBFS_PROXY_PORT.to_string().as_str(),
        ]);
    }
    if config.encryption == EncryptionMode::EccXor {
        push(&["--scramble", "xormask", constants::XOR_SCRAMBLE_KEY]);
    }

    if config.disable_ipv6 {
        push(&["--pull-filter", "ignore", "route-ipv6"]);
        push(&["--pull-filter", "ignore", "ifconfig-ipv6"]);
    }

    if !config.forward_ports.is_empty() {
        push(&[
            "--setenv",
            "UV_FORWARD_PORTS",
            validate::format_port_list(&config.forward_ports).as_str(),
        ]);
        push(&["--push-peer-info"]);
    }

    LaunchSpec {
        program: config.openvpn_program.clone(),
        args,
    }
}

fn dns_kind(addr: IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => "DNS",
        IpAddr::V6(_) => "DNS6",
    }
}
