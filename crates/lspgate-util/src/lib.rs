//! Shared utilities for the lspgate workspace.
//!
//! Small, dependency-light helpers used by the gateway crates:
//! prefixed identifier generation, logging setup, and a bounded-depth
//! file locator for launcher artifacts.

pub mod id;
pub mod locate;
pub mod log;

pub use id::{IdPrefix, Identifier};
pub use locate::locate_file;
pub use log::{init_logging, LogConfig, LogLevel};
