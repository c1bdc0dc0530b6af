//! One-shot commands and the interactive session.

use std::sync::Arc;

use color_eyre::eyre::{eyre, Result, WrapErr};
use crossterm::terminal;
use tracing::info;

use jumpgate::catalog::Catalog;
use jumpgate::config::{keys, Flag, Settings, SystemHelpers};
use jumpgate::constants;
use jumpgate::core::{Handle, LogBuffer, Notifier, Orchestrator, RemoteInventory, StaticInventory};
use jumpgate::event::{Event, EventHandler, UserCommand};

use super::args::Commands;
use super::console::ConsoleObserver;

/// What to do when no subcommand is given: connect straight away when
/// autoconnect is on, otherwise list the locations.
///
/// # Errors
///
/// Returns an error if the stored autoconnect flag is malformed.
pub fn default_command(settings: &Settings) -> Result<Commands> {
    if settings.flag(Flag::AutoConnect)? {
        Ok(Commands::Connect {
            server: None,
            protocol: None,
        })
    } else {
        Ok(Commands::Servers { random: false })
    }
}

/// Execute a parsed command.
///
/// # Errors
///
/// Returns an error if the command fails; validation errors carry the offending key.
pub fn run(command: Commands, settings: &Settings, inventory: Option<&str>) -> Result<()> {
    match command {
        Commands::Servers { random } => {
            servers(&open_catalog(settings, inventory, random)?);
            Ok(())
        }
        Commands::Protocols => {
            protocols(settings);
            Ok(())
        }
        Commands::Set { key, value } => set(settings, &key, &value),
        Commands::Show => {
            show(settings);
            Ok(())
        }
        Commands::Connect { server, protocol } => {
            let catalog = open_catalog(settings, inventory, false)?;
            if let Some(row) = server {
                catalog
                    .select_endpoint(row)
                    .ok_or_else(|| eyre!("no location at row {row}; see `jumpgate servers`"))?;
            }
            if let Some(row) = protocol {
                catalog
                    .select_protocol(row)
                    .ok_or_else(|| eyre!("no protocol at row {row}; see `jumpgate protocols`"))?;
            }
            session(catalog, settings)
        }
    }
}

fn open_catalog(settings: &Settings, inventory: Option<&str>, random: bool) -> Result<Catalog> {
    let source = inventory
        .ok_or_else(|| eyre!("no server inventory; pass --inventory or set JUMPGATE_INVENTORY"))?;
    let catalog = Catalog::new(RemoteInventory::parse(source), settings.clone());
    catalog
        .repopulate(random)
        .wrap_err("could not load the server list")?;
    Ok(catalog)
}

fn servers(catalog: &Catalog) {
    let current = catalog.current_endpoint();
    for (row, label) in catalog.rows().iter().enumerate().skip(1) {
        let marker = if current.is_some() && catalog.endpoint_at_row(row) == current {
            '*'
        } else {
            ' '
        };
        println!("{marker} {row:>3}  {label}");
    }
}

fn protocols(settings: &Settings) {
    // Protocol rows depend only on the settings, so no inventory is needed
    let catalog = Catalog::new(StaticInventory::default(), settings.clone());
    let current = catalog.current_protocol_index();
    for (row, label) in catalog.protocol_rows().iter().enumerate().skip(1) {
        let marker = if current == Some(row - 1) { '*' } else { ' ' };
        println!("{marker} {row:>3}  {label}");
    }
}

fn set(settings: &Settings, key: &str, value: &str) -> Result<()> {
    settings.apply(key, value, &SystemHelpers)?;
    info!(key, "setting updated");
    println!("{key} = {}", settings.get(key).unwrap_or_default());
    Ok(())
}

fn show(settings: &Settings) {
    for key in keys::ALL {
        let value = if let Some(flag) = Flag::from_key(key) {
            settings
                .flag(flag)
                .map_or_else(|e| format!("<{e}>"), |on| on.to_string())
        } else if key == keys::ENCRYPTION_MODE {
            settings
                .encryption()
                .map_or_else(|e| format!("<{e}>"), |mode| format!("{} ({mode})", mode.index()))
        } else {
            settings
                .get(key)
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "(unset)".to_string())
        };
        println!("{key:<22} {value}");
    }
}

fn session(catalog: Catalog, settings: &Settings) -> Result<()> {
    let notifier = Arc::new(Notifier::new());
    notifier.subscribe(Arc::new(ConsoleObserver::new(catalog.clone())));
    let log = Arc::new(LogBuffer::new());
    notifier.subscribe(log.clone());

    let orchestrator = Orchestrator::with_supervisor(catalog, settings.clone(), notifier)?;
    let handle = orchestrator.handle();
    handle.connect_selected().wrap_err("cannot connect")?;
    println!("{}", constants::MSG_SESSION_KEYS);

    terminal::enable_raw_mode()?;
    let result = drive(&handle, &log);
    terminal::disable_raw_mode()?;

    // Stops the VPN process before returning
    drop(orchestrator);
    result
}

fn drive(handle: &Handle, log: &LogBuffer) -> Result<()> {
    let events = EventHandler::new(constants::DEFAULT_TICK_RATE);
    loop {
        match events.next()? {
            Event::Command(UserCommand::Quit) => return Ok(()),
            Event::Command(UserCommand::Disconnect) => handle.disconnect()?,
            Event::Command(UserCommand::NextLocation) => handle.switch_to_next_node()?,
            Event::Command(UserCommand::ReleaseBlock) => handle.release_block()?,
            Event::Command(UserCommand::ShowLog) => {
                let lines = log.lines();
                let start = lines.len().saturating_sub(constants::LOG_TAIL_LINES);
                for line in &lines[start..] {
                    print!("{line}\r\n");
                }
            }
            Event::Tick => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_follows_autoconnect() {
        let settings = Settings::in_memory();
        assert_eq!(
            default_command(&settings).unwrap(),
            Commands::Servers { random: false }
        );
        settings.set_flag(Flag::AutoConnect, true).unwrap();
        assert_eq!(
            default_command(&settings).unwrap(),
            Commands::Connect {
                server: None,
                protocol: None,
            }
        );
    }

    #[test]
    fn test_set_rejects_invalid_value() {
        let settings = Settings::in_memory();
        assert!(set(&settings, keys::LOCAL_PORT, "70000").is_err());
        assert_eq!(settings.get(keys::LOCAL_PORT), None);
        set(&settings, keys::LOCAL_PORT, "4000").unwrap();
        assert_eq!(settings.get(keys::LOCAL_PORT).as_deref(), Some("4000"));
    }

    #[test]
    fn test_missing_inventory_is_reported() {
        let settings = Settings::in_memory();
        let err = run(Commands::Servers { random: false }, &settings, None).unwrap_err();
        assert!(err.to_string().contains("--inventory"));
    }
}
