//! Requests and reports drained by the owner thread.

use super::output::OutputEvent;
use crate::state::{AttemptId, Selection};

/// Something the subprocess did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A line of stdout or stderr, with its classification.
    Output { line: String, event: OutputEvent },
    /// The process exited on its own or after a stop request.
    Exited { code: Option<i32> },
}

/// A [`ProcessEvent`] tagged with the attempt that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessReport {
    pub attempt: AttemptId,
    pub event: ProcessEvent,
}

/// Everything the owner thread reacts to, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Connect(Selection),
    Disconnect,
    SwitchToNextNode,
    ReleaseBlock,
    Process(ProcessReport),
    Shutdown,
}
