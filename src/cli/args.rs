//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Jumpgate - OpenVPN connection manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server inventory: an http(s) URL or a path to a JSON file
    #[arg(long, env = "JUMPGATE_INVENTORY", global = true)]
    pub inventory: Option<String>,

    /// Settings file (default: <config dir>/jumpgate/config.toml)
    #[arg(long, env = "JUMPGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List locations in display order
    Servers {
        /// Shuffle instead of ranking by ping
        #[arg(long)]
        random: bool,
    },
    /// List protocol options for the configured encryption mode
    Protocols,
    /// Change a setting; invalid values are rejected and not stored
    Set {
        /// Setting key, e.g. local-port, forward-ports, reconnect
        key: String,
        /// New value
        value: String,
    },
    /// Show stored settings
    Show,
    /// Connect and stay in an interactive session
    Connect {
        /// Location row as listed by `servers` (1-based)
        #[arg(long)]
        server: Option<usize>,
        /// Protocol row as listed by `protocols` (1-based)
        #[arg(long)]
        protocol: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_rows() {
        let args = Args::try_parse_from(["jumpgate", "connect", "--server", "2", "--protocol", "1"])
            .unwrap();
        assert_eq!(
            args.command,
            Some(Commands::Connect {
                server: Some(2),
                protocol: Some(1),
            })
        );
    }

    #[test]
    fn test_global_inventory_after_subcommand() {
        let args =
            Args::try_parse_from(["jumpgate", "servers", "--random", "--inventory", "servers.json"])
                .unwrap();
        assert_eq!(args.inventory.as_deref(), Some("servers.json"));
        assert_eq!(args.command, Some(Commands::Servers { random: true }));
    }

    #[test]
    fn test_set_requires_value() {
        assert!(Args::try_parse_from(["jumpgate", "set", "local-port"]).is_err());
    }
}
