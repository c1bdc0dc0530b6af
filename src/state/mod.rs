//! Plain data types shared by the catalog, the state machine, and observers.

pub mod connection;
pub mod endpoint;
pub mod killswitch;

pub use connection::{AttemptId, ConnectionStatus, FailReason, StatusUpdate};
pub use endpoint::{
    EncryptionMode, Endpoint, EndpointId, ProtocolOption, Selection, Target, Transport,
};
pub use killswitch::KillSwitchState;
