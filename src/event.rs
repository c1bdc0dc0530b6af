//! Terminal event handling for the interactive session.
//!
//! Key presses are read on a background thread, translated into
//! [`UserCommand`]s, and delivered through a channel together with periodic
//! ticks. Translation is a pure function so it can be tested without a
//! terminal.

use color_eyre::Result;
use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// What the user asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserCommand {
    Disconnect,
    NextLocation,
    ReleaseBlock,
    ShowLog,
    Quit,
}

/// Events that drive the session loop.
#[derive(Debug)]
pub enum Event {
    /// A recognised key press.
    Command(UserCommand),
    /// Periodic tick.
    Tick,
}

/// Map a key press to a command. Unbound keys and key releases map to nothing.
#[must_use]
pub fn map_key(key: KeyEvent) -> Option<UserCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(UserCommand::Quit);
    }
    match key.code {
        KeyCode::Char('d') => Some(UserCommand::Disconnect),
        KeyCode::Char('n') => Some(UserCommand::NextLocation),
        KeyCode::Char('r') => Some(UserCommand::ReleaseBlock),
        KeyCode::Char('l') => Some(UserCommand::ShowLog),
        KeyCode::Char('q') | KeyCode::Esc => Some(UserCommand::Quit),
        _ => None,
    }
}

/// Handles terminal events in a background thread.
///
/// The thread exits on its own once the receiving side is dropped.
pub struct EventHandler {
    receiver: mpsc::Receiver<Event>,
    #[allow(dead_code)]
    handler: thread::JoinHandle<()>,
}

impl EventHandler {
    /// Creates a new event handler with the specified tick rate.
    pub fn new(tick_rate_ms: u64) -> Self {
        let tick_rate = Duration::from_millis(tick_rate_ms);
        let (sender, receiver) = mpsc::channel();

        let handler = thread::spawn(move || {
            let mut last_tick = Instant::now();
            loop {
                let timeout = tick_rate
                    .checked_sub(last_tick.elapsed())
                    .unwrap_or(Duration::ZERO);

                if event::poll(timeout).unwrap_or(false) {
                    if let Ok(CrosstermEvent::Key(key)) = event::read() {
                        if let Some(command) = map_key(key) {
                            if sender.send(Event::Command(command)).is_err() {
                                return;
                            }
                        }
                    }
                }

                if last_tick.elapsed() >= tick_rate {
                    if sender.send(Event::Tick).is_err() {
                        return;
                    }
                    last_tick = Instant::now();
                }
            }
        });

        Self { receiver, handler }
    }

    /// Blocks until the next event is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the event channel is disconnected.
    pub fn next(&self) -> Result<Event> {
        Ok(self.receiver.recv()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_bound_keys() {
        assert_eq!(map_key(press(KeyCode::Char('d'))), Some(UserCommand::Disconnect));
        assert_eq!(map_key(press(KeyCode::Char('n'))), Some(UserCommand::NextLocation));
        assert_eq!(map_key(press(KeyCode::Char('r'))), Some(UserCommand::ReleaseBlock));
        assert_eq!(map_key(press(KeyCode::Char('l'))), Some(UserCommand::ShowLog));
        assert_eq!(map_key(press(KeyCode::Char('q'))), Some(UserCommand::Quit));
        assert_eq!(map_key(press(KeyCode::Esc)), Some(UserCommand::Quit));
    }

    #[test]
    fn test_ctrl_c_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(key), Some(UserCommand::Quit));
        assert_eq!(map_key(press(KeyCode::Char('c'))), None);
    }

    #[test]
    fn test_unbound_and_release_ignored() {
        assert_eq!(map_key(press(KeyCode::Char('x'))), None);
        assert_eq!(map_key(press(KeyCode::Enter)), None);

        let mut release = press(KeyCode::Char('d'));
        release.kind = KeyEventKind::Release;
        assert_eq!(map_key(release), None);
    }
}
