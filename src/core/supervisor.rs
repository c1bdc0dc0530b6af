//! VPN subprocess supervision.
//!
//! The supervisor owns at most one `OpenVPN` child. Output is streamed by
//! reader threads into the owner queue, each line tagged with the attempt
//! that started the process. The supervisor reports what the process did;
//! deciding what that means for the connection is the state machine's job.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::message::{Message, ProcessEvent, ProcessReport};
use super::output::{self, OutputEvent};
use crate::constants;
use crate::error::{Error, Result};
use crate::state::AttemptId;
use crate::vpn::LaunchSpec;

/// Subprocess lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// Exited without being asked to.
    Crashed,
}

/// How a stop request ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// There was no live process.
    NotRunning,
    /// Exited within the grace period.
    Exited,
    /// Had to be killed after the grace period.
    Killed,
    /// Could not be killed; abandoned.
    Unkillable(String),
}

/// The state machine's view of the VPN process.
pub trait VpnProcess: Send {
    /// Launch a new process for `attempt`.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] unless the previous process is stopped,
    /// [`Error::ProcessSpawnFailed`] if the binary cannot be executed.
    fn start(&mut self, attempt: AttemptId, launch: &LaunchSpec) -> Result<()>;

    /// Terminate the process, escalating to a kill after `timeout`. Blocks.
    fn stop(&mut self, timeout: Duration) -> StopOutcome;

    fn phase(&self) -> Phase;

    /// Feed back an event the reader threads reported.
    fn observe(&mut self, attempt: AttemptId, event: &ProcessEvent);
}

/// Supervises a real `OpenVPN` subprocess.
pub struct Supervisor {
    tx: Sender<Message>,
    phase: Phase,
    attempt: Option<AttemptId>,
    child: Option<Arc<Mutex<Child>>>,
}

impl Supervisor {
    /// Reports go to `tx`, normally the owner queue.
    #[must_use]
    pub fn new(tx: Sender<Message>) -> Self {
        Self {
            tx,
            phase: Phase::NotStarted,
            attempt: None,
            child: None,
        }
    }
}

impl VpnProcess for Supervisor {
    fn start(&mut self, attempt: AttemptId, launch: &LaunchSpec) -> Result<()> {
        if !matches!(self.phase, Phase::NotStarted | Phase::Stopped) {
            return Err(Error::AlreadyRunning);
        }

        info!(%attempt, command = %launch.command_line(), "starting vpn process");
        let mut child = Command::new(&launch.program)
            .args(&launch.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::ProcessSpawnFailed(format!("{}: {e}", launch.program.display())))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let child = Arc::new(Mutex::new(child));

        let stderr_reader = stderr.map(|pipe| {
            let tx = self.tx.clone();
            thread::spawn(move || forward_lines(pipe, attempt, &tx))
        });

        let watched = Arc::clone(&child);
        let tx = self.tx.clone();
        let watcher = thread::Builder::new()
            .name(format!("vpn-{}", attempt.0))
            .spawn(move || {
                if let Some(pipe) = stdout {
                    forward_lines(pipe, attempt, &tx);
                }
                if let Some(reader) = stderr_reader {
                    let _ = reader.join();
                }
                let code = wait_for_exit(&watched);
                debug!(%attempt, ?code, "vpn process exited");
                let _ = tx.send(Message::Process(ProcessReport {
                    attempt,
                    event: ProcessEvent::Exited { code },
                }));
            });

        if let Err(e) = watcher {
            if let Ok(mut child) = child.lock() {
                let _ = child.kill();
                let _ = child.wait();
            }
            return Err(Error::ProcessSpawnFailed(format!("watcher thread: {e}")));
        }

        self.child = Some(child);
        self.attempt = Some(attempt);
        self.phase = Phase::Starting;
        Ok(())
    }

    fn stop(&mut self, timeout: Duration) -> StopOutcome {
        let Some(child) = self.child.take() else {
            if self.phase != Phase::NotStarted {
                self.phase = Phase::Stopped;
            }
            return StopOutcome::NotRunning;
        };

        self.phase = Phase::Stopping;
        let outcome = terminate(&child, timeout);
        match &outcome {
            StopOutcome::Unkillable(reason) => {
                warn!(attempt = ?self.attempt, %reason, "vpn process could not be killed, abandoning it");
            }
            other => debug!(attempt = ?self.attempt, ?other, "vpn process stopped"),
        }
        self.phase = Phase::Stopped;
        outcome
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn observe(&mut self, attempt: AttemptId, event: &ProcessEvent) {
        if self.attempt != Some(attempt) {
            return;
        }
        match event {
            ProcessEvent::Output {
                event: OutputEvent::Connected,
                ..
            } if self.phase == Phase::Starting => self.phase = Phase::Running,
            ProcessEvent::Exited { .. } => {
                if matches!(self.phase, Phase::Starting | Phase::Running) {
                    self.child = None;
                    self.phase = Phase::Crashed;
                }
            }
            ProcessEvent::Output { .. } => {}
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if self.child.is_some() {
            self.stop(constants::STOP_TIMEOUT);
        }
    }
}

fn forward_lines(pipe: impl Read, attempt: AttemptId, tx: &Sender<Message>) {
    for line in BufReader::new(pipe).lines() {
        let Ok(line) = line else { break };
        let event = output::parse_line(&line);
        let report = ProcessReport {
            attempt,
            event: ProcessEvent::Output { line, event },
        };
        if tx.send(Message::Process(report)).is_err() {
            break;
        }
    }
}

fn wait_for_exit(child: &Mutex<Child>) -> Option<i32> {
    loop {
        if let Ok(mut child) = child.lock() {
            match child.try_wait() {
                Ok(Some(status)) => return status.code(),
                Ok(None) => {}
                Err(_) => return None,
            }
        } else {
            return None;
        }
        thread::sleep(constants::EXIT_POLL_INTERVAL);
    }
}

fn terminate(child: &Mutex<Child>, timeout: Duration) -> StopOutcome {
    let Ok(mut child) = child.lock() else {
        return StopOutcome::Unkillable("process handle poisoned".to_string());
    };
    if let Ok(Some(_)) = child.try_wait() {
        return StopOutcome::Exited;
    }

    signal_terminate(&child);
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return StopOutcome::Exited,
            Ok(None) => thread::sleep(constants::EXIT_POLL_INTERVAL),
            Err(e) => return StopOutcome::Unkillable(e.to_string()),
        }
    }

    warn!(pid = child.id(), "vpn process ignored SIGTERM, killing it");
    if let Err(e) = child.kill() {
        return StopOutcome::Unkillable(e.to_string());
    }
    match child.wait() {
        Ok(_) => StopOutcome::Killed,
        Err(e) => StopOutcome::Unkillable(e.to_string()),
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_terminate(child: &Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers; the pid is our unreaped child.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn signal_terminate(_child: &Child) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::mpsc::{self, Receiver};

    const WAIT: Duration = Duration::from_secs(5);

    fn sh(script: &str) -> LaunchSpec {
        LaunchSpec {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    fn next_report(rx: &Receiver<Message>) -> ProcessReport {
        match rx.recv_timeout(WAIT).unwrap() {
            Message::Process(report) => report,
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_connected_marker_moves_to_running() {
        let (tx, rx) = mpsc::channel();
        let mut supervisor = Supervisor::new(tx);
        let attempt = AttemptId(1);
        supervisor
            .start(attempt, &sh("echo 'Initialization Sequence Completed'; exec sleep 30"))
            .unwrap();
        assert_eq!(supervisor.phase(), Phase::Starting);

        let report = next_report(&rx);
        assert_eq!(report.attempt, attempt);
        assert!(matches!(
            report.event,
            ProcessEvent::Output {
                event: OutputEvent::Connected,
                ..
            }
        ));
        supervisor.observe(report.attempt, &report.event);
        assert_eq!(supervisor.phase(), Phase::Running);

        assert!(matches!(
            supervisor.start(AttemptId(2), &sh("true")),
            Err(Error::AlreadyRunning)
        ));

        assert_eq!(supervisor.stop(WAIT), StopOutcome::Exited);
        assert_eq!(supervisor.phase(), Phase::Stopped);
    }

    #[test]
    fn test_stop_escalates_to_kill() {
        let (tx, rx) = mpsc::channel();
        let mut supervisor = Supervisor::new(tx);
        supervisor
            .start(AttemptId(1), &sh("trap '' TERM; echo ready; exec sleep 30"))
            .unwrap();
        // The trap is installed once the script prints
        next_report(&rx);

        let started = Instant::now();
        assert_eq!(
            supervisor.stop(Duration::from_millis(200)),
            StopOutcome::Killed
        );
        assert!(started.elapsed() < WAIT);
        assert_eq!(supervisor.phase(), Phase::Stopped);
    }

    #[test]
    fn test_unexpected_exit_is_crash() {
        let (tx, rx) = mpsc::channel();
        let mut supervisor = Supervisor::new(tx);
        let attempt = AttemptId(3);
        supervisor
            .start(attempt, &sh("echo hello; echo AUTH_FAILED >&2; exit 3"))
            .unwrap();

        let mut events = Vec::new();
        loop {
            let report = next_report(&rx);
            supervisor.observe(report.attempt, &report.event);
            let done = matches!(report.event, ProcessEvent::Exited { .. });
            events.push(report.event);
            if done {
                break;
            }
        }

        assert!(events.contains(&ProcessEvent::Output {
            line: "hello".to_string(),
            event: OutputEvent::Log("hello".to_string()),
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            ProcessEvent::Output {
                event: OutputEvent::AuthFailed,
                ..
            }
        )));
        assert_eq!(events.last(), Some(&ProcessEvent::Exited { code: Some(3) }));
        assert_eq!(supervisor.phase(), Phase::Crashed);

        assert_eq!(supervisor.stop(WAIT), StopOutcome::NotRunning);
        assert_eq!(supervisor.phase(), Phase::Stopped);
        supervisor.start(AttemptId(4), &sh("true")).unwrap();
    }

    #[test]
    fn test_events_from_other_attempts_ignored() {
        let (tx, _rx) = mpsc::channel();
        let mut supervisor = Supervisor::new(tx);
        supervisor.start(AttemptId(5), &sh("exec sleep 30")).unwrap();
        supervisor.observe(AttemptId(4), &ProcessEvent::Exited { code: Some(0) });
        assert_eq!(supervisor.phase(), Phase::Starting);
        supervisor.stop(WAIT);
    }

    #[test]
    fn test_missing_binary_fails_to_spawn() {
        let (tx, _rx) = mpsc::channel();
        let mut supervisor = Supervisor::new(tx);
        let launch = LaunchSpec {
            program: PathBuf::from("/nonexistent/openvpn"),
            args: Vec::new(),
        };
        assert!(matches!(
            supervisor.start(AttemptId(1), &launch),
            Err(Error::ProcessSpawnFailed(_))
        ));
        assert_eq!(supervisor.phase(), Phase::NotStarted);
        assert_eq!(supervisor.stop(WAIT), StopOutcome::NotRunning);
    }
}
