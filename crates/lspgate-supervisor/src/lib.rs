//! Language server process supervision for lspgate.
//!
//! This crate owns every live language-server subprocess:
//! - [`LaunchSpec`] describes how to start (and, when missing, install) a
//!   server binary for one language, including its process-sharing policy.
//! - [`LanguageServerProcess`] wraps one spawned server: a writer task for
//!   stdin, a reader task decoding stdout frames, an exit watcher, and a
//!   [`RequestCorrelator`] matching gateway-originated requests to their
//!   responses with per-method timeouts.
//! - [`ProcessRegistry`] is the acquire/release surface the session router
//!   talks to. It reference-counts shared processes, deduplicates
//!   concurrent spawns for the same key, and removes a process from its
//!   table when its [`ExitEvent`] arrives, so a dead handle is never
//!   handed out.

pub mod config;
pub mod correlator;
pub mod error;
pub mod process;
pub mod registry;

pub use config::{default_specs, LaunchSpec, LauncherJar};
pub use correlator::RequestCorrelator;
pub use error::{SupervisorError, SupervisorResult};
pub use process::{ExitEvent, LanguageServerProcess, ProcessState};
pub use registry::ProcessRegistry;
