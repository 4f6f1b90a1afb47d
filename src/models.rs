// src/models.rs

use crate::constants::{
    INITIAL_BUFFER_CAPACITY, POLL_INTERVAL_MS, READ_CHUNK_SIZE, SIGNALED_STATUS,
    TERMINATE_GRACE_MS,
};
use crate::core::buffer::CapturedOutput;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// --- EXIT STATUS MODELS ---

/// How a child process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
    /// The child called `exit` (or returned from `main`).
    Exited,
    /// The child was killed by a signal, or the run was interrupted.
    Signaled,
}

/// The decoded termination status of a reaped child. Produced once and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// The exit code for `Exited`, or the configured sentinel for `Signaled`.
    pub status: i32,
    pub termination: Termination,
    /// The signal that killed the child, when known.
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn exited(code: i32) -> Self {
        Self {
            status: code,
            termination: Termination::Exited,
            signal: None,
        }
    }

    pub fn signaled(sentinel: i32, signal: Option<i32>) -> Self {
        Self {
            status: sentinel,
            termination: Termination::Signaled,
            signal,
        }
    }

    /// True only for a normal exit with code 0.
    pub fn success(&self) -> bool {
        self.termination == Termination::Exited && self.status == 0
    }

    /// The status to hand to `std::process::exit`.
    ///
    /// The OS keeps only the low 8 bits, so a signal death whose sentinel does not
    /// fit in 1..=255 is reported as `128 + signal` (or 1 if the signal is unknown).
    /// A killed child therefore never exits 0.
    pub fn process_exit_code(&self) -> i32 {
        match self.termination {
            Termination::Exited => self.status,
            Termination::Signaled if (1..=255).contains(&self.status) => self.status,
            Termination::Signaled => match self.signal {
                Some(sig) if (1..128).contains(&sig) => 128 + sig,
                _ => 1,
            },
        }
    }
}

impl fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.termination, self.signal) {
            (Termination::Exited, _) => write!(f, "exited with status {}", self.status),
            (Termination::Signaled, Some(sig)) => {
                write!(f, "killed by signal {} (status {})", sig, self.status)
            }
            (Termination::Signaled, None) => write!(f, "interrupted (status {})", self.status),
        }
    }
}

/// What a completed `exec` call hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// The captured stdout, or `None` if the run was interrupted.
    pub output: Option<CapturedOutput>,
    pub exit: ExitInfo,
    /// The pid of the shell that ran the command, if one was spawned.
    pub pid: Option<u32>,
}

// --- PUMP STATE ---

/// The next action the pipe pump will prioritize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Writing,
    Reading,
    Finished,
}

impl Phase {
    /// Derives the phase from the two completion flags. `Finished` iff both are done.
    pub fn from_flags(write_done: bool, read_done: bool) -> Self {
        match (write_done, read_done) {
            (true, true) => Self::Finished,
            (false, _) => Self::Writing,
            (true, false) => Self::Reading,
        }
    }
}

// --- CONFIGURATION MODELS (FOR TOML) ---

/// What `exec` does when the engine itself fails (as opposed to the command failing).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Return the error to the caller.
    #[default]
    Propagate,
    /// Swallow the error (after logging it) and return an absent result.
    Sentinel,
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(Self::Propagate),
            "sentinel" => Ok(Self::Sentinel),
            other => Err(format!(
                "unknown error policy '{}' (expected 'propagate' or 'sentinel')",
                other
            )),
        }
    }
}

/// Tunables for one exec call. Every field has a sensible default, so an empty
/// `config.toml` (or `ExecConfig::default()`) is valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecConfig {
    /// Explicit shell binary. `~` and `$VAR` are expanded.
    pub shell: Option<String>,
    /// Whether `$SHELL` is consulted when `shell` is not set.
    pub honor_shell_env: bool,
    /// Status reported for signal deaths and interrupted runs.
    pub signaled_status: i32,
    pub read_chunk_size: usize,
    pub initial_capacity: usize,
    pub poll_interval_ms: u64,
    pub terminate_grace_ms: u64,
    pub error_policy: ErrorPolicy,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: None,
            honor_shell_env: true,
            signaled_status: SIGNALED_STATUS,
            read_chunk_size: READ_CHUNK_SIZE,
            initial_capacity: INITIAL_BUFFER_CAPACITY,
            poll_interval_ms: POLL_INTERVAL_MS,
            terminate_grace_ms: TERMINATE_GRACE_MS,
            error_policy: ErrorPolicy::Propagate,
        }
    }
}

impl ExecConfig {
    /// Shorthand for a default config pinned to a specific shell.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: Some(shell.into()),
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}
