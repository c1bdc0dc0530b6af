//! Owner thread and request handle.
//!
//! One [`Orchestrator`] is built at startup. It moves the [`Machine`] onto a
//! dedicated thread that drains a single queue, so requests from every view
//! and reports from the subprocess readers are applied strictly in arrival
//! order. Consumers hold a cloneable [`Handle`]; nothing reaches the machine
//! any other way.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{info, warn};

use super::machine::Machine;
use super::message::Message;
use super::notify::Notifier;
use super::supervisor::{Supervisor, VpnProcess};
use crate::catalog::Catalog;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::state::Selection;

/// Owns the orchestration thread. Dropping it stops any live connection.
pub struct Orchestrator {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Start the owner thread with a process built by `process`, which gets
    /// the queue sender to report through.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn spawn<F>(
        catalog: Catalog,
        settings: Settings,
        notifier: Arc<Notifier>,
        process: F,
    ) -> Result<Self>
    where
        F: FnOnce(Sender<Message>) -> Box<dyn VpnProcess>,
    {
        let (tx, rx) = mpsc::channel();
        let mut machine = Machine::new(
            catalog.clone(),
            settings.clone(),
            Arc::clone(&notifier),
            process(tx.clone()),
        );
        let thread = thread::Builder::new()
            .name("orchestrator".to_string())
            .spawn(move || run(&mut machine, &rx, &notifier))?;

        Ok(Self {
            handle: Handle {
                tx,
                catalog,
                settings,
            },
            thread: Some(thread),
        })
    }

    /// Start the owner thread supervising a real `OpenVPN` process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn with_supervisor(
        catalog: Catalog,
        settings: Settings,
        notifier: Arc<Notifier>,
    ) -> Result<Self> {
        Self::spawn(catalog, settings, notifier, |tx| {
            Box::new(Supervisor::new(tx))
        })
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Message::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("orchestrator thread panicked");
            }
        }
    }
}

fn run(machine: &mut Machine, rx: &Receiver<Message>, notifier: &Notifier) {
    info!("orchestrator started");
    while let Ok(message) = rx.recv() {
        let shutdown = message == Message::Shutdown;
        if let Err(e) = machine.handle(message) {
            warn!(error = %e, "request rejected");
            notifier.reject(&e);
        }
        if shutdown {
            break;
        }
    }
    info!("orchestrator stopped");
}

/// Request side of the orchestrator. Every call returns without waiting for
/// the transition; outcomes arrive through observers.
#[derive(Clone)]
pub struct Handle {
    tx: Sender<Message>,
    catalog: Catalog,
    settings: Settings,
}

impl Handle {
    /// Queue a connect after validating the selection and stored settings.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] or [`Error::InvalidSelection`] without
    /// queueing anything, [`Error::OwnerGone`] after shutdown. Whether the
    /// target is already connected is decided on the owner thread and
    /// reported through [`crate::core::Observer::on_rejected`].
    pub fn connect(&self, selection: Selection) -> Result<()> {
        let config = self.settings.load()?;
        self.catalog.snapshot().resolve(selection, &config)?;
        self.send(Message::Connect(selection))
    }

    /// Connect to whatever the catalog currently has selected.
    ///
    /// # Errors
    ///
    /// As [`Handle::connect`].
    pub fn connect_selected(&self) -> Result<()> {
        self.connect(self.catalog.selection())
    }

    /// # Errors
    ///
    /// [`Error::OwnerGone`] after shutdown.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Message::Disconnect)
    }

    /// # Errors
    ///
    /// [`Error::OwnerGone`] after shutdown.
    pub fn switch_to_next_node(&self) -> Result<()> {
        self.send(Message::SwitchToNextNode)
    }

    /// # Errors
    ///
    /// [`Error::OwnerGone`] after shutdown.
    pub fn release_block(&self) -> Result<()> {
        self.send(Message::ReleaseBlock)
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::OwnerGone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::endpoint;
    use crate::config::keys;
    use crate::core::inventory::StaticInventory;
    use crate::core::message::{ProcessEvent, ProcessReport};
    use crate::core::notify::{Observer, StatusHistory};
    use crate::core::output::OutputEvent;
    use crate::core::supervisor::{Phase, StopOutcome};
    use crate::state::{AttemptId, ConnectionStatus, EndpointId, FailReason, StatusUpdate};
    use crate::vpn::LaunchSpec;
    use std::sync::Mutex;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    /// Reports the tunnel up through the queue as soon as it is started.
    struct InstantTunnel {
        tx: Sender<Message>,
        phase: Phase,
    }

    impl VpnProcess for InstantTunnel {
        fn start(&mut self, attempt: AttemptId, _launch: &LaunchSpec) -> Result<()> {
            self.phase = Phase::Starting;
            let line = "Initialization Sequence Completed".to_string();
            let _ = self.tx.send(Message::Process(ProcessReport {
                attempt,
                event: ProcessEvent::Output {
                    line,
                    event: OutputEvent::Connected,
                },
            }));
            Ok(())
        }

        fn stop(&mut self, _timeout: Duration) -> StopOutcome {
            self.phase = Phase::Stopped;
            StopOutcome::Exited
        }

        fn phase(&self) -> Phase {
            self.phase
        }

        fn observe(&mut self, _attempt: AttemptId, _event: &ProcessEvent) {}
    }

    #[derive(Default)]
    struct Rejections(Mutex<Vec<String>>);

    impl Observer for Rejections {
        fn on_status_changed(&self, _update: &StatusUpdate) {}

        fn on_rejected(&self, error: &Error) {
            self.0.lock().unwrap().push(error.to_string());
        }
    }

    fn setup(settings: &Settings) -> (Catalog, Arc<Notifier>, Arc<StatusHistory>) {
        let catalog = Catalog::new(
            StaticInventory(vec![endpoint(1, Some(10)), endpoint(2, Some(20))]),
            settings.clone(),
        );
        catalog.repopulate(false).unwrap();
        let notifier = Arc::new(Notifier::new());
        let history = Arc::new(StatusHistory::new());
        notifier.subscribe(history.clone());
        (catalog, notifier, history)
    }

    #[test]
    fn test_requests_flow_through_owner_thread() {
        let settings = Settings::in_memory();
        let (catalog, notifier, history) = setup(&settings);
        let rejections = Arc::new(Rejections::default());
        notifier.subscribe(rejections.clone());

        let orchestrator = Orchestrator::spawn(catalog, settings, notifier, |tx| {
            Box::new(InstantTunnel {
                tx,
                phase: Phase::NotStarted,
            })
        })
        .unwrap();
        let handle = orchestrator.handle();

        handle.connect(Selection::new(EndpointId(1), 0)).unwrap();
        assert_eq!(
            history.wait_for(2, WAIT),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );

        // Validation happens before anything is queued
        assert!(matches!(
            handle.connect(Selection::default()),
            Err(Error::InvalidSelection)
        ));

        // Same target passes validation but is refused by the owner
        handle.connect(Selection::new(EndpointId(1), 0)).unwrap();
        handle.switch_to_next_node().unwrap();
        let statuses = history.wait_for(6, WAIT);
        assert_eq!(
            statuses[2..],
            [
                ConnectionStatus::Disconnecting,
                ConnectionStatus::Idle,
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
            ]
        );
        assert_eq!(
            *rejections.0.lock().unwrap(),
            vec![Error::AlreadyConnected.to_string()]
        );

        drop(orchestrator);
        let statuses = history.statuses();
        assert_eq!(
            statuses[statuses.len() - 2..],
            [ConnectionStatus::Disconnecting, ConnectionStatus::Idle]
        );
        assert!(matches!(handle.disconnect(), Err(Error::OwnerGone)));
    }

    #[test]
    fn test_missing_binary_reports_spawn_failure() {
        let settings = Settings::in_memory();
        settings
            .apply(keys::OPENVPN_PATH, "/nonexistent/openvpn", &crate::config::SystemHelpers)
            .unwrap();
        let (catalog, notifier, history) = setup(&settings);
        let orchestrator = Orchestrator::with_supervisor(catalog, settings, notifier).unwrap();

        orchestrator
            .handle()
            .connect(Selection::new(EndpointId(2), 0))
            .unwrap();
        assert_eq!(
            history.wait_for(2, WAIT),
            vec![
                ConnectionStatus::Connecting,
                ConnectionStatus::Failed(FailReason::ProcessSpawnFailed),
            ]
        );
    }
}
