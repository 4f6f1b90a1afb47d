//! # pipexec
//!
//! Runs a command through a shell, feeds it a byte string on stdin and captures
//! everything it writes to stdout, without the classic pipe deadlock.
//!
//! The entry point is [`system::executor::exec`]. The lower-level building blocks
//! (buffer, pump, cancellation gate, child handle) live in [`core`] and [`system`].

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// A shared flag that, once set, asks any in-flight exec session to unwind.
pub type CancellationToken = Arc<AtomicBool>;

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;

pub use models::{ErrorPolicy, ExecConfig, ExecOutcome, ExitInfo, Termination};
pub use system::executor::{ErrorKind, ExecSession, ExecutionError, exec};
