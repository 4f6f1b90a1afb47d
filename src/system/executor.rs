// src/system/executor.rs

use crate::{
    CancellationToken,
    core::{
        buffer::{AllocError, ByteAllocator, CapturedOutput, GrowableByteBuffer, SystemAllocator},
        cancellation::{CancellationGate, Cancelled},
        pump::PipePump,
    },
    models::{ErrorPolicy, ExecConfig, ExecOutcome, ExitInfo},
    system::{
        process::{ChildProcessHandle, ProcessError},
        shell::{self, Environment, ProcessEnv, ShellError},
        signals::BrokenPipeGuard,
    },
};
use scopeguard::ScopeGuard;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Operation was cancelled before the command finished.")]
    Interrupted { pid: Option<u32> },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("Could not determine which shell to use: {0}")]
    Shell(#[from] ShellError),
    #[error("I/O failure while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("Ran out of memory capturing output ({requested} bytes requested).")]
    OutOfMemory { requested: usize },
    #[error("Internal error: {0}")]
    IllegalState(String),
}

/// The coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Interrupted,
    IoError,
    OutOfMemory,
    IllegalState,
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Interrupted { .. } => ErrorKind::Interrupted,
            Self::Process(_) | Self::Shell(_) | Self::Io { .. } => ErrorKind::IoError,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::IllegalState(_) => ErrorKind::IllegalState,
        }
    }

    fn with_pid(self, pid: u32) -> Self {
        match self {
            Self::Interrupted { pid: None } => Self::Interrupted { pid: Some(pid) },
            other => other,
        }
    }
}

impl From<Cancelled> for ExecutionError {
    fn from(_: Cancelled) -> Self {
        Self::Interrupted { pid: None }
    }
}

impl From<AllocError> for ExecutionError {
    fn from(e: AllocError) -> Self {
        Self::OutOfMemory {
            requested: e.requested,
        }
    }
}

/// The result of a session that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutput {
    pub output: CapturedOutput,
    pub exit: ExitInfo,
    pub pid: u32,
}

/// One invocation: a command, its input, and everything needed to run it once.
///
/// Sessions share nothing; concurrent calls each build their own.
pub struct ExecSession<'a, A: ByteAllocator = SystemAllocator> {
    command: &'a str,
    input: &'a [u8],
    config: &'a ExecConfig,
    env: &'a dyn Environment,
    allocator: A,
}

impl<A: ByteAllocator> std::fmt::Debug for ExecSession<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecSession")
            .field("command", &self.command)
            .field("input_len", &self.input.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> ExecSession<'a, SystemAllocator> {
    pub fn new(command: &'a str, input: &'a [u8], config: &'a ExecConfig) -> Self {
        Self {
            command,
            input,
            config,
            env: &ProcessEnv,
            allocator: SystemAllocator,
        }
    }
}

impl<'a, A: ByteAllocator> ExecSession<'a, A> {
    /// Replaces the allocator used to grow the output buffer.
    pub fn with_allocator<B: ByteAllocator>(self, allocator: B) -> ExecSession<'a, B> {
        ExecSession {
            command: self.command,
            input: self.input,
            config: self.config,
            env: self.env,
            allocator,
        }
    }

    /// Replaces where `$SHELL` (and variables in the configured shell path) are looked up.
    pub fn with_environment(mut self, env: &'a dyn Environment) -> Self {
        self.env = env;
        self
    }

    /// Spawns the child, pumps its pipes under `gate`, reaps it and finalizes the output.
    ///
    /// Once spawned, the child is reaped exactly once on every path. On success it
    /// gets an ordinary blocking reap; on any error (including cancellation) it is
    /// sent SIGTERM and reaped by the scope guard, and the partial output is dropped.
    pub fn run(self, gate: &CancellationGate) -> Result<SessionOutput, ExecutionError> {
        gate.checkpoint()?;

        let shell_path = shell::resolve_shell(self.config, self.env)?;
        let child = ChildProcessHandle::spawn(self.command, &shell_path)?;
        let pid = child.pid();

        let grace = self.config.terminate_grace();
        let sentinel = self.config.signaled_status;
        let mut child = scopeguard::guard(child, move |child| {
            reap_abandoned(child, grace, sentinel);
        });

        let buffer = GrowableByteBuffer::new(self.allocator, self.config.initial_capacity)?;
        let mut pump = PipePump::new(self.input, buffer, self.config.read_chunk_size)?;
        if let Err(e) = pump.run(&mut child, gate) {
            log::debug!(
                "Pump for child {} stopped after {} bytes in / {} bytes out: {}",
                pid,
                pump.bytes_written(),
                pump.bytes_read(),
                e
            );
            return Err(e.with_pid(pid));
        }

        let exit = ScopeGuard::into_inner(child).reap(sentinel)?;
        let output = pump.into_output().finalize();
        Ok(SessionOutput { output, exit, pid })
    }
}

/// Error-path cleanup: terminate, then reap within a bounded wait.
fn reap_abandoned(child: ChildProcessHandle, grace: Duration, sentinel: i32) {
    let pid = child.pid();
    match child.reap_after_terminate(grace, sentinel) {
        Ok(info) => log::debug!("Cleaned up child {} ({})", pid, info),
        Err(e) => log::warn!("Failed to reap child {} during cleanup: {}", pid, e),
    }
}

/// Runs `command` through the configured shell with `input` on its stdin and
/// returns everything it wrote to stdout.
///
/// * The command ran (whatever its status): `Ok(Some(outcome))` with `output` set.
/// * `token` was set before the child finished: `Ok(Some(outcome))` with no output
///   and a `Signaled` exit carrying `config.signaled_status`.
/// * The engine itself failed: `Err(e)`, or `Ok(None)` under [`ErrorPolicy::Sentinel`].
///
/// SIGPIPE is ignored for the duration of the call and restored afterwards.
pub fn exec(
    command: &str,
    input: &[u8],
    config: &ExecConfig,
    token: &CancellationToken,
) -> Result<Option<ExecOutcome>, ExecutionError> {
    let gate = CancellationGate::new(token.clone(), config.poll_interval());

    let result = match BrokenPipeGuard::install() {
        Ok(_pipe_guard) => ExecSession::new(command, input, config).run(&gate),
        Err(source) => Err(ExecutionError::Io {
            context: "ignoring SIGPIPE",
            source,
        }),
    };

    match result {
        Ok(done) => Ok(Some(ExecOutcome {
            output: Some(done.output),
            exit: done.exit,
            pid: Some(done.pid),
        })),
        Err(ExecutionError::Interrupted { pid }) => {
            log::debug!("Execution of {:?} was interrupted", command);
            Ok(Some(ExecOutcome {
                output: None,
                exit: ExitInfo::signaled(config.signaled_status, None),
                pid,
            }))
        }
        Err(e) => match config.error_policy {
            ErrorPolicy::Propagate => Err(e),
            ErrorPolicy::Sentinel => {
                log::error!("Execution of {:?} failed: {}", command, e);
                Ok(None)
            }
        },
    }
}
