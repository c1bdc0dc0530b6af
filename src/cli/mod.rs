//! Command-line interface module.
//!
//! Provides argument parsing, one-shot commands, and the interactive session.

pub mod args;
pub mod commands;
pub mod console;
