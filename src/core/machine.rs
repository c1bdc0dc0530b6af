//! Connection state machine.
//!
//! [`Machine`] is plain synchronous state: it never spawns threads or waits on
//! channels itself. The orchestrator feeds it one [`Message`] at a time on the
//! owner thread, which is what makes every transition atomic with respect to
//! the others. Tests drive it directly with a fake [`VpnProcess`].

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::message::{Message, ProcessEvent, ProcessReport};
use super::notify::Notifier;
use super::output::OutputEvent;
use super::supervisor::{Phase, VpnProcess};
use crate::catalog::Catalog;
use crate::config::{ConnectionConfig, Flag, Settings};
use crate::constants;
use crate::error::{Error, Result};
use crate::state::{
    AttemptId, ConnectionStatus, EndpointId, FailReason, KillSwitchState, Selection, StatusUpdate,
    Target,
};
use crate::vpn;

/// Endpoints tried since the last user connect or successful connection.
#[derive(Debug, Default)]
struct Round {
    tried: HashSet<EndpointId>,
    retried: bool,
}

pub struct Machine {
    catalog: Catalog,
    settings: Settings,
    notifier: Arc<Notifier>,
    process: Box<dyn VpnProcess>,
    status: ConnectionStatus,
    last_attempt: AttemptId,
    active: Option<AttemptId>,
    current: Option<Target>,
    config: ConnectionConfig,
    round: Round,
    /// The tunnel dropped without the user asking; cleared by reconnecting,
    /// disconnecting, or an explicit release.
    dropped: bool,
}

impl Machine {
    pub fn new(
        catalog: Catalog,
        settings: Settings,
        notifier: Arc<Notifier>,
        process: Box<dyn VpnProcess>,
    ) -> Self {
        Self {
            catalog,
            settings,
            notifier,
            process,
            status: ConnectionStatus::Idle,
            last_attempt: AttemptId::default(),
            active: None,
            current: None,
            config: ConnectionConfig::default(),
            round: Round::default(),
            dropped: false,
        }
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// The attempt whose process events are currently honoured.
    #[must_use]
    pub fn active_attempt(&self) -> Option<AttemptId> {
        self.active
    }

    #[must_use]
    pub fn current_target(&self) -> Option<&Target> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn killswitch(&self) -> KillSwitchState {
        KillSwitchState::resolve(self.block_policy(), self.dropped)
    }

    /// Apply one queued message.
    ///
    /// # Errors
    ///
    /// Whatever the corresponding request reports; state is unchanged on error.
    pub fn handle(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Connect(selection) => self.connect(selection),
            Message::Disconnect => {
                self.disconnect();
                Ok(())
            }
            Message::SwitchToNextNode => self.switch_to_next_node(),
            Message::ReleaseBlock => {
                self.release_block();
                Ok(())
            }
            Message::Process(report) => {
                self.on_process(report);
                Ok(())
            }
            Message::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    /// Connect to `selection`, replacing any other live connection.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if a stored setting fails validation
    /// - [`Error::InvalidSelection`] if the selection does not resolve
    /// - [`Error::AlreadyConnected`] if already connecting or connected to the same target
    pub fn connect(&mut self, selection: Selection) -> Result<()> {
        let config = self.settings.load()?;
        let target = self.catalog.snapshot().resolve(selection, &config)?;

        if self.status.is_active() {
            if self.current.as_ref().is_some_and(|c| c.same_as(&target)) {
                return Err(Error::AlreadyConnected);
            }
            info!(from = ?self.current.as_ref().map(|t| t.endpoint.id), to = %target.endpoint.id, "switching location");
            self.teardown();
        }

        self.config = config;
        self.round = Round::default();
        self.launch(target, false);
        Ok(())
    }

    /// Stop the connection. A no-op when idle; dismisses a failure.
    pub fn disconnect(&mut self) {
        match self.status {
            ConnectionStatus::Idle => debug!("disconnect ignored while idle"),
            ConnectionStatus::Failed(_) => {
                self.halt();
                self.active = None;
                self.dropped = false;
                self.set_status(ConnectionStatus::Idle, false);
            }
            ConnectionStatus::Connecting
            | ConnectionStatus::Connected
            | ConnectionStatus::Disconnecting => {
                self.dropped = false;
                self.teardown();
            }
        }
    }

    /// Reconnect to the next eligible location after the current one.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless connected or failed
    /// - [`Error::NoAlternativeEndpoint`] if no other location can serve the protocol
    /// - anything [`Machine::connect`] reports
    pub fn switch_to_next_node(&mut self) -> Result<()> {
        const ACTION: &str = "switch location";
        if !matches!(
            self.status,
            ConnectionStatus::Connected | ConnectionStatus::Failed(_)
        ) {
            return Err(Error::InvalidState(ACTION));
        }
        let current = self.current.clone().ok_or(Error::InvalidState(ACTION))?;
        let encryption = self.settings.encryption()?;
        let option = encryption
            .protocols()
            .get(current.protocol)
            .copied()
            .ok_or(Error::InvalidSelection)?;

        let snapshot = self.catalog.snapshot();
        let next = snapshot
            .next_after(current.endpoint.id, option, encryption, |_| false)
            .ok_or(Error::NoAlternativeEndpoint)?;
        self.connect(Selection::new(next.id, current.protocol))
    }

    /// Lift a traffic block caused by an unexpected drop.
    pub fn release_block(&mut self) {
        if !self.dropped {
            debug!("no traffic block to release");
            return;
        }
        info!("traffic block released by user");
        self.dropped = false;
        self.notifier.killswitch(self.killswitch());
    }

    /// React to something the VPN process did.
    pub fn on_process(&mut self, report: ProcessReport) {
        if let ProcessEvent::Output { line, .. } = &report.event {
            self.notifier.log_line(line);
        }
        if self.active != Some(report.attempt) {
            debug!(attempt = %report.attempt, "discarding event from superseded attempt");
            return;
        }
        self.process.observe(report.attempt, &report.event);

        match (self.status, report.event) {
            (
                ConnectionStatus::Connecting,
                ProcessEvent::Output {
                    event: OutputEvent::Connected,
                    ..
                },
            ) => {
                self.dropped = false;
                self.round = Round::default();
                self.set_status(ConnectionStatus::Connected, false);
            }
            (
                ConnectionStatus::Connecting,
                ProcessEvent::Output {
                    event: OutputEvent::AuthFailed,
                    ..
                },
            ) => self.fail(FailReason::AuthFailed),
            (
                ConnectionStatus::Connecting,
                ProcessEvent::Output {
                    event: OutputEvent::NetworkUnreachable,
                    ..
                },
            ) => self.fail(FailReason::NetworkUnreachable),
            (ConnectionStatus::Connecting, ProcessEvent::Exited { code }) => {
                debug!(?code, "vpn process exited while connecting");
                self.fail(FailReason::ProcessExited);
            }
            (ConnectionStatus::Connected, ProcessEvent::Exited { code }) => {
                warn!(?code, "vpn process exited unexpectedly");
                if self.block_policy() {
                    self.dropped = true;
                }
                self.fail(FailReason::ProcessCrashed);
            }
            _ => {}
        }
    }

    /// Stop any live connection before the owner thread exits.
    pub fn shutdown(&mut self) {
        if self.status.is_active() {
            self.teardown();
        } else {
            self.halt();
        }
    }

    /// Start a fresh attempt. `retrying` marks an automatic move to the next
    /// location after a failure.
    fn launch(&mut self, target: Target, retrying: bool) {
        self.halt();

        let attempt = self.last_attempt.next();
        self.last_attempt = attempt;
        self.active = Some(attempt);
        self.round.tried.insert(target.endpoint.id);

        let launch = vpn::launch_spec(&target, &self.config);
        info!(%attempt, endpoint = %target.endpoint.id, option = %target.option, "connecting");
        self.current = Some(target);
        self.set_status(ConnectionStatus::Connecting, retrying);

        if let Err(e) = self.process.start(attempt, &launch) {
            warn!(%attempt, error = %e, "vpn process failed to start");
            self.fail(FailReason::ProcessSpawnFailed);
        }
    }

    fn fail(&mut self, reason: FailReason) {
        self.halt();

        if let Some(next) = self.retry_target(reason) {
            warn!(%reason, next = %next.endpoint.id, "attempt failed, trying next location");
            self.round.retried = true;
            self.launch(next, true);
            return;
        }

        let reason = if reason.is_retryable() && self.round.retried {
            FailReason::AllEndpointsExhausted
        } else {
            reason
        };
        self.set_status(ConnectionStatus::Failed(reason), false);
    }

    fn retry_target(&self, reason: FailReason) -> Option<Target> {
        if !self.config.auto_reconnect || !reason.is_retryable() {
            return None;
        }
        let current = self.current.as_ref()?;
        let snapshot = self.catalog.snapshot();
        let next = snapshot.next_after(
            current.endpoint.id,
            current.option,
            self.config.encryption,
            |id| self.round.tried.contains(&id),
        )?;
        Some(Target {
            endpoint: next.clone(),
            protocol: current.protocol,
            option: current.option,
        })
    }

    fn teardown(&mut self) {
        self.set_status(ConnectionStatus::Disconnecting, false);
        self.halt();
        self.active = None;
        self.set_status(ConnectionStatus::Idle, false);
    }

    fn halt(&mut self) {
        if matches!(self.process.phase(), Phase::NotStarted | Phase::Stopped) {
            return;
        }
        let outcome = self.process.stop(constants::STOP_TIMEOUT);
        debug!(?outcome, "vpn process halted");
    }

    fn block_policy(&self) -> bool {
        self.settings
            .flag(Flag::BlockOnDisconnect)
            .unwrap_or(self.config.block_on_disconnect)
    }

    fn set_status(&mut self, status: ConnectionStatus, retrying: bool) {
        self.status = status;
        let update = StatusUpdate {
            status,
            attempt: self.active.unwrap_or(self.last_attempt),
            endpoint: self.current.as_ref().map(|t| t.endpoint.id),
            retrying,
            killswitch: self.killswitch(),
        };
        info!(
            %status,
            attempt = %update.attempt,
            endpoint = ?update.endpoint,
            retrying,
            killswitch = ?update.killswitch,
            "connection status changed"
        );
        self.notifier.publish(&update);
    }
}
