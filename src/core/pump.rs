// src/core/pump.rs

//! The non-blocking pipe pump.
//!
//! Writing a child's stdin to completion before reading its stdout deadlocks as
//! soon as the child fills its stdout pipe: it blocks writing, we block writing,
//! nobody reads. The pump avoids that by registering interest in both directions
//! with `poll(2)` and servicing whichever side is ready, every iteration, until
//! stdin has been fully delivered (or refused) and stdout has reached EOF.

use crate::core::buffer::{AllocError, ByteAllocator, GrowableByteBuffer};
use crate::core::cancellation::CancellationGate;
use crate::models::Phase;
use crate::system::executor::ExecutionError;
use crate::system::process::ChildProcessHandle;
use crate::system::sys::{self, Interest, Readiness};
use std::io::{self, ErrorKind, Read, Write};

/// Drives one child's stdin and stdout until both directions are complete.
#[derive(Debug)]
pub struct PipePump<'a, A: ByteAllocator> {
    input: &'a [u8],
    /// Offset of the first byte of `input` not yet accepted by the child.
    cursor: usize,
    output: GrowableByteBuffer<A>,
    chunk: Vec<u8>,
    write_done: bool,
    read_done: bool,
    phase: Phase,
}

impl<'a, A: ByteAllocator> PipePump<'a, A> {
    /// Fails with `AllocError` if the read scratch space cannot be allocated.
    pub fn new(
        input: &'a [u8],
        output: GrowableByteBuffer<A>,
        chunk_size: usize,
    ) -> Result<Self, AllocError> {
        let chunk_size = chunk_size.max(1);
        let mut chunk = Vec::new();
        chunk
            .try_reserve_exact(chunk_size)
            .map_err(|_| AllocError {
                requested: chunk_size,
            })?;
        chunk.resize(chunk_size, 0);
        Ok(Self {
            input,
            cursor: 0,
            output,
            chunk,
            write_done: false,
            read_done: false,
            phase: Phase::Writing,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn bytes_written(&self) -> usize {
        self.cursor
    }

    pub fn bytes_read(&self) -> usize {
        self.output.len()
    }

    /// Hands back the output accumulated so far.
    pub fn into_output(self) -> GrowableByteBuffer<A> {
        self.output
    }

    /// Runs the readiness loop to completion.
    ///
    /// Returns `Interrupted` as soon as the gate reports cancellation; the caller
    /// owns the cleanup (terminating and reaping the child). On any error the
    /// pump's partial output should be discarded.
    pub fn run(
        &mut self,
        child: &mut ChildProcessHandle,
        gate: &CancellationGate,
    ) -> Result<(), ExecutionError> {
        if self.cursor >= self.input.len() && !self.write_done {
            child.close_stdin();
            self.write_done = true;
        }

        loop {
            self.phase = Phase::from_flags(self.write_done, self.read_done);
            if self.phase == Phase::Finished {
                log::debug!(
                    "Pump finished for child {}: {} bytes in, {} bytes out",
                    child.pid(),
                    self.cursor,
                    self.output.len()
                );
                return Ok(());
            }

            gate.checkpoint()?;

            let mut registrations = Vec::with_capacity(2);
            let write_slot = if self.write_done {
                None
            } else {
                let fd = child.stdin_fd().ok_or_else(|| {
                    illegal_state("stdin was closed before all input was delivered")
                })?;
                registrations.push((fd, Interest::Writable));
                Some(registrations.len() - 1)
            };
            let read_slot = if self.read_done {
                None
            } else {
                let fd = child.stdout_fd().ok_or_else(|| {
                    illegal_state("stdout was closed before end-of-stream was reached")
                })?;
                registrations.push((fd, Interest::Readable));
                Some(registrations.len() - 1)
            };

            let readiness = match sys::poll(&registrations, gate.wait_slice()) {
                Ok(readiness) => readiness,
                Err(e) if e.kind() == ErrorKind::Interrupted => {
                    // A signal woke us up. The checkpoint at the top of the loop
                    // decides whether it was a cancellation.
                    log::trace!("poll interrupted by a signal; re-checking gate");
                    continue;
                }
                Err(source) => {
                    return Err(ExecutionError::Io {
                        context: "waiting for pipe readiness",
                        source,
                    });
                }
            };

            gate.checkpoint()?;

            if let Some(ready) = slot_readiness(&readiness, write_slot)? {
                self.write_pending(child)?;
                log::trace!("stdin ready ({:?}); {} bytes sent", ready, self.cursor);
            }
            if slot_readiness(&readiness, read_slot)?.is_some() {
                self.drain(child)?;
            }
        }
    }

    /// Offers all unsent input to the child in a single `write`.
    fn write_pending(&mut self, child: &mut ChildProcessHandle) -> Result<(), ExecutionError> {
        let remaining = self.input.get(self.cursor..).unwrap_or_default();
        let stdin = child
            .stdin_mut()
            .ok_or_else(|| illegal_state("stdin is closed but input remains"))?;

        match stdin.write(remaining) {
            Ok(0) => Err(ExecutionError::Io {
                context: "writing to child stdin",
                source: io::Error::from(ErrorKind::WriteZero),
            }),
            Ok(written) => {
                self.cursor += written;
                if self.cursor >= self.input.len() {
                    child.close_stdin();
                    self.write_done = true;
                }
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                log::debug!(
                    "Child {} stopped reading stdin; discarding {} unsent bytes",
                    child.pid(),
                    remaining.len()
                );
                child.close_stdin();
                self.write_done = true;
                Ok(())
            }
            Err(source) => Err(ExecutionError::Io {
                context: "writing to child stdin",
                source,
            }),
        }
    }

    /// Reads until the pipe would block or reports end-of-stream.
    fn drain(&mut self, child: &mut ChildProcessHandle) -> Result<(), ExecutionError> {
        loop {
            let stdout = child
                .stdout_mut()
                .ok_or_else(|| illegal_state("stdout is closed but end-of-stream was not seen"))?;

            match stdout.read(&mut self.chunk) {
                Ok(0) => {
                    log::debug!("End of stream on stdout of child {}", child.pid());
                    child.close_stdout();
                    self.read_done = true;
                    return Ok(());
                }
                Ok(n) => {
                    let bytes = self
                        .chunk
                        .get(..n)
                        .ok_or_else(|| illegal_state("read reported more bytes than requested"))?;
                    self.output.append(bytes)?;
                    log::trace!("Read {} bytes from child {}", n, child.pid());
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(ExecutionError::Io {
                        context: "reading child stdout",
                        source,
                    });
                }
            }
        }
    }
}

/// Looks up the readiness of one registration, treating `POLLNVAL` as a defect.
fn slot_readiness(
    readiness: &[Readiness],
    slot: Option<usize>,
) -> Result<Option<Readiness>, ExecutionError> {
    let Some(ready) = slot.and_then(|i| readiness.get(i).copied()) else {
        return Ok(None);
    };
    if ready.invalid {
        return Err(illegal_state("poll reported a closed descriptor"));
    }
    Ok(ready.is_ready().then_some(ready))
}

fn illegal_state(message: &str) -> ExecutionError {
    ExecutionError::IllegalState(message.to_string())
}
