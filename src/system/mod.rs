//! # System Interaction Layer
//!
//! This module provides abstractions for interacting with the underlying operating system.
//! It is the boundary between the pipe-pumping logic in `core` and the specifics of
//! process management, signals and raw descriptors.
//!
//! ## Modules
//!
//! - **`executor`**: The exec session orchestrator and the public `exec` entry point.
//!   It composes spawn, pump, cancellation and reap, and guarantees the child is
//!   reaped exactly once on every path.
//! - **`process`**: Owns a spawned child and the parent's ends of its pipes.
//! - **`shell`**: Decides which shell binary runs the command.
//! - **`signals`**: SIGPIPE suppression and wiring termination signals to a
//!   cancellation token.
//! - **`sys`**: Checked wrappers over `fcntl`, `poll`, `kill` and `sigaction`.

pub mod executor;
pub mod process;
pub mod shell;
pub mod signals;
pub mod sys;
