//! Connection orchestration for an `OpenVPN` desktop client.
//!
//! Views never touch the connection directly. They hold a
//! [`crate::core::Handle`] to request transitions and subscribe a
//! [`crate::core::Observer`] to learn about them; a single owner thread applies
//! every request in arrival order.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod event;
pub mod state;
pub mod validate;
pub mod vpn;

pub use error::{Error, Result};
