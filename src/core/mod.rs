//! Orchestration core: inventory, subprocess supervision, the connection
//! state machine, and status fan-out.

pub mod inventory;
pub mod machine;
pub mod message;
pub mod notify;
pub mod orchestrator;
pub mod output;
pub mod supervisor;

pub use inventory::{Inventory, RemoteInventory, StaticInventory};
pub use machine::Machine;
pub use message::{Message, ProcessEvent, ProcessReport};
pub use notify::{LogBuffer, Notifier, Observer, StatusHistory};
pub use orchestrator::{Handle, Orchestrator};
pub use output::{parse_line, OutputEvent};
pub use supervisor::{Phase, StopOutcome, Supervisor, VpnProcess};
