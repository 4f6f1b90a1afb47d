// src/system/process.rs

use crate::models::ExitInfo;
use crate::system::sys;
use std::io;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Could not launch shell '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: io::Error,
    },
    #[error("Could not switch the child's {stream} pipe to non-blocking mode: {source}")]
    NonBlocking {
        stream: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("Waiting for child {pid} failed: {source}")]
    Wait {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("Child {pid} stopped with an undecodable wait status {raw}.")]
    UnknownStatus { pid: u32, raw: i32 },
}

/// Owns one spawned child: its pid and the parent's ends of its stdin/stdout pipes.
///
/// Pipe ends are held in `Option`s; `take()`-then-drop is the only way they get
/// closed, so closing twice is impossible. The child is reaped exactly once,
/// either by [`reap`](Self::reap) / [`reap_after_terminate`](Self::reap_after_terminate)
/// (which consume the handle) or, as a last resort, by `Drop`.
#[derive(Debug)]
pub struct ChildProcessHandle {
    child: Option<Child>,
    pid: u32,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
}

impl ChildProcessHandle {
    /// Launches `shell -c command` with piped stdin/stdout and inherited stderr,
    /// then puts both parent-side pipe ends into non-blocking mode.
    ///
    /// `std::process::Command` creates both pipes, wires them onto the child's fd 0/1,
    /// closes every other pipe end in the child (close-on-exec) and reports a failed
    /// `exec` back to us as a spawn error, so the child never runs parent logic.
    /// If a later step fails, the child is terminated and reaped before returning.
    pub fn spawn(command: &str, shell: &Path) -> Result<Self, ProcessError> {
        let mut child = Command::new(shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                shell: shell.display().to_string(),
                source,
            })?;

        let pid = child.id();
        log::debug!("Spawned '{}' -c {:?} as pid {}", shell.display(), command, pid);

        let mut handle = Self {
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            child: Some(child),
            pid,
        };

        // Both ends are always present after a piped spawn; check anyway rather than panic.
        if handle.stdin.is_none() || handle.stdout.is_none() {
            handle.abandon();
            return Err(ProcessError::Spawn {
                shell: shell.display().to_string(),
                source: io::Error::other("child pipes were not created"),
            });
        }

        if let Err(source) = handle.configure_nonblocking() {
            handle.abandon();
            return Err(source);
        }

        Ok(handle)
    }

    fn configure_nonblocking(&self) -> Result<(), ProcessError> {
        if let Some(stdin) = &self.stdin {
            sys::set_nonblocking(stdin.as_fd()).map_err(|source| ProcessError::NonBlocking {
                stream: "stdin",
                source,
            })?;
        }
        if let Some(stdout) = &self.stdout {
            sys::set_nonblocking(stdout.as_fd()).map_err(|source| {
                ProcessError::NonBlocking {
                    stream: "stdout",
                    source,
                }
            })?;
        }
        Ok(())
    }

    /// Cleanup for a half-built handle: close pipes, SIGTERM, reap.
    fn abandon(&mut self) {
        self.close_stdin();
        self.close_stdout();
        self.terminate();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.wait() {
                log::warn!("Failed to reap abandoned child {}: {}", self.pid, e);
            }
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn stdin_mut(&mut self) -> Option<&mut ChildStdin> {
        self.stdin.as_mut()
    }

    pub fn stdout_mut(&mut self) -> Option<&mut ChildStdout> {
        self.stdout.as_mut()
    }

    pub fn stdin_fd(&self) -> Option<RawFd> {
        self.stdin.as_ref().map(AsRawFd::as_raw_fd)
    }

    pub fn stdout_fd(&self) -> Option<RawFd> {
        self.stdout.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Closes the parent's write end, delivering EOF to the child. Idempotent.
    pub fn close_stdin(&mut self) {
        if self.stdin.take().is_some() {
            log::debug!("Closed stdin of child {}", self.pid);
        }
    }

    /// Closes the parent's read end. Idempotent.
    pub fn close_stdout(&mut self) {
        if self.stdout.take().is_some() {
            log::debug!("Closed stdout of child {}", self.pid);
        }
    }

    /// Best-effort SIGTERM. Never blocks and never reaps.
    pub fn terminate(&self) {
        if self.child.is_none() {
            return;
        }
        if let Err(e) = sys::send_signal(self.pid, libc::SIGTERM) {
            log::warn!("Failed to send SIGTERM to child {}: {}", self.pid, e);
        }
    }

    /// Closes both pipe ends, blocks until the child exits, and decodes its status.
    pub fn reap(mut self, signaled_status: i32) -> Result<ExitInfo, ProcessError> {
        self.close_stdin();
        self.close_stdout();
        let pid = self.pid;
        let mut child = self.child.take().ok_or(ProcessError::Wait {
            pid,
            source: io::Error::other("child was already reaped"),
        })?;
        let status = child
            .wait()
            .map_err(|source| ProcessError::Wait { pid, source })?;
        let info = classify(pid, status, signaled_status)?;
        log::debug!("Reaped child {}: {}", pid, info);
        Ok(info)
    }

    /// Reap used on the error and cancellation paths: closes pipes, sends SIGTERM,
    /// waits up to `grace`, then escalates to SIGKILL so the wait stays bounded.
    pub fn reap_after_terminate(
        mut self,
        grace: Duration,
        signaled_status: i32,
    ) -> Result<ExitInfo, ProcessError> {
        self.close_stdin();
        self.close_stdout();
        self.terminate();
        let pid = self.pid;
        let mut child = self.child.take().ok_or(ProcessError::Wait {
            pid,
            source: io::Error::other("child was already reaped"),
        })?;

        let deadline = Instant::now() + grace;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(10));
                }
                Ok(None) => {
                    log::debug!("Child {} ignored SIGTERM; sending SIGKILL", pid);
                    if let Err(e) = child.kill() {
                        log::warn!("Failed to kill child {}: {}", pid, e);
                    }
                    break child
                        .wait()
                        .map_err(|source| ProcessError::Wait { pid, source })?;
                }
                Err(source) => return Err(ProcessError::Wait { pid, source }),
            }
        };
        let info = classify(pid, status, signaled_status)?;
        log::debug!("Reaped terminated child {}: {}", pid, info);
        Ok(info)
    }
}

impl Drop for ChildProcessHandle {
    fn drop(&mut self) {
        self.close_stdin();
        self.close_stdout();
        if let Some(mut child) = self.child.take() {
            log::warn!("Child {} dropped without being reaped; killing it", self.pid);
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill dropped child {}: {}", self.pid, e);
            }
            if let Err(e) = child.wait() {
                log::warn!("Failed to reap dropped child {}: {}", self.pid, e);
            }
        }
    }
}

/// Maps a wait status onto `ExitInfo`: normal exit keeps its code, a signal death
/// gets the sentinel, anything else (stopped, continued) is an error.
fn classify(pid: u32, status: ExitStatus, signaled_status: i32) -> Result<ExitInfo, ProcessError> {
    if let Some(code) = status.code() {
        Ok(ExitInfo::exited(code))
    } else if let Some(signal) = status.signal() {
        Ok(ExitInfo::signaled(signaled_status, Some(signal)))
    } else {
        Err(ProcessError::UnknownStatus {
            pid,
            raw: status.into_raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Termination;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    const SH: &str = "/bin/sh";

    #[test]
    fn test_spawn_sets_both_pipes_nonblocking() {
        let handle = ChildProcessHandle::spawn("cat", Path::new(SH)).unwrap();
        let stdin = handle.stdin.as_ref().unwrap();
        let stdout = handle.stdout.as_ref().unwrap();
        assert!(sys::is_nonblocking(stdin.as_fd()).unwrap());
        assert!(sys::is_nonblocking(stdout.as_fd()).unwrap());
        handle.reap(140).unwrap();
    }

    #[test]
    fn test_reap_decodes_exit_code() {
        let handle = ChildProcessHandle::spawn("exit 7", Path::new(SH)).unwrap();
        let info = handle.reap(140).unwrap();
        assert_eq!(info, ExitInfo::exited(7));
    }

    #[test]
    fn test_reap_maps_signal_death_to_sentinel() {
        let handle = ChildProcessHandle::spawn("kill -TERM $$", Path::new(SH)).unwrap();
        let info = handle.reap(140).unwrap();
        assert_eq!(info.termination, Termination::Signaled);
        assert_eq!(info.status, 140);
        assert_eq!(info.signal, Some(libc::SIGTERM));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut handle = ChildProcessHandle::spawn("cat", Path::new(SH)).unwrap();
        handle.close_stdin();
        handle.close_stdin();
        assert!(handle.stdin_fd().is_none());
        let info = handle.reap(140).unwrap();
        assert!(info.success());
    }

    #[test]
    fn test_missing_shell_is_a_spawn_error() {
        let result = ChildProcessHandle::spawn("true", Path::new("/nonexistent/shell"));
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }

    #[test]
    fn test_reap_after_terminate_escalates_past_ignored_sigterm() {
        // --- Setup ---
        let mut handle =
            ChildProcessHandle::spawn("trap '' TERM; echo ready; sleep 30", Path::new(SH))
                .unwrap();
        // Wait until the trap is installed before signaling.
        let mut ready = [0u8; 6];
        let stdout = handle.stdout_mut().unwrap();
        let mut filled = 0;
        let start = Instant::now();
        while filled < ready.len() && start.elapsed() < Duration::from_secs(5) {
            match stdout.read(&mut ready[filled..]) {
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(5))
                }
                Err(e) => panic!("read failed: {e}"),
            }
        }

        // --- Execute ---
        let info = handle
            .reap_after_terminate(Duration::from_millis(100), 140)
            .unwrap();

        // --- Assert ---
        assert_eq!(info.termination, Termination::Signaled);
        assert_eq!(info.signal, Some(libc::SIGKILL));
    }
}
