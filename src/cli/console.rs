//! Status lines for the interactive session.

use std::io::Write;

use jumpgate::catalog::Catalog;
use jumpgate::constants;
use jumpgate::core::Observer;
use jumpgate::state::{ConnectionStatus, KillSwitchState, StatusUpdate};
use jumpgate::Error;

/// Prints every transition. Lines end in `\r\n` because the terminal is in raw mode.
pub struct ConsoleObserver {
    catalog: Catalog,
}

impl ConsoleObserver {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    fn location(&self, update: &StatusUpdate) -> String {
        let Some(id) = update.endpoint else {
            return String::new();
        };
        self.catalog
            .snapshot()
            .get(id)
            .map_or_else(|| id.to_string(), |e| e.name.clone())
    }
}

fn emit(line: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{line}\r\n");
    let _ = stdout.flush();
}

/// One human-readable line for `update`.
pub fn describe(update: &StatusUpdate, location: &str) -> String {
    let mut line = match update.status {
        ConnectionStatus::Connecting => format!("{}{location}", constants::MSG_CONNECTING),
        ConnectionStatus::Connected => format!("{}{location}", constants::MSG_CONNECTED),
        ConnectionStatus::Disconnecting => constants::MSG_DISCONNECTING.to_string(),
        ConnectionStatus::Idle => constants::MSG_DISCONNECTED.to_string(),
        ConnectionStatus::Failed(reason) => format!("Failed ({reason})"),
    };
    if update.retrying {
        line.push_str(constants::MSG_RETRYING);
    }
    if update.killswitch.is_blocking() {
        line.push_str(" | ");
        line.push_str(constants::MSG_BLOCKING);
    }
    line
}

impl Observer for ConsoleObserver {
    fn on_status_changed(&self, update: &StatusUpdate) {
        emit(&describe(update, &self.location(update)));
    }

    fn on_killswitch_changed(&self, state: KillSwitchState) {
        if !state.is_blocking() {
            emit(constants::MSG_BLOCK_RELEASED);
        }
    }

    fn on_rejected(&self, error: &Error) {
        emit(&format!("error: {error}"));
    }
}
