// src/system/sys.rs

//! Thin, checked wrappers over the few raw syscalls `std` does not expose.
//! This is the only module in the crate allowed to use `unsafe`.
#![allow(unsafe_code)]

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

/// Converts a `-1` syscall return into the thread's `errno`.
fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Puts the descriptor into `O_NONBLOCK` mode, keeping its other status flags.
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: `raw` is borrowed from a live descriptor; F_GETFL takes no pointer arguments.
    let flags = cvt(unsafe { libc::fcntl(raw, libc::F_GETFL) })?;
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }
    // SAFETY: as above; F_SETFL takes an int flag set.
    cvt(unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn is_nonblocking(fd: BorrowedFd<'_>) -> io::Result<bool> {
    // SAFETY: the descriptor is live for the duration of the borrow.
    let flags = cvt(unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) })?;
    Ok(flags & libc::O_NONBLOCK != 0)
}

/// Which readiness a caller wants reported for a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// What `poll` reported for one registered descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub hangup: bool,
    pub error: bool,
    /// The descriptor was not open. Always a logic error on our side.
    pub invalid: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.readable || self.writable || self.hangup || self.error || self.invalid
    }

    fn from_revents(revents: libc::c_short) -> Self {
        Self {
            readable: revents & libc::POLLIN != 0,
            writable: revents & libc::POLLOUT != 0,
            hangup: revents & libc::POLLHUP != 0,
            error: revents & libc::POLLERR != 0,
            invalid: revents & libc::POLLNVAL != 0,
        }
    }
}

/// Blocks until at least one registration is ready or `timeout` passes.
///
/// Returns one `Readiness` per registration, in order. A wait interrupted by a
/// signal surfaces as `ErrorKind::Interrupted`; callers decide whether to retry.
pub fn poll(registrations: &[(RawFd, Interest)], timeout: Duration) -> io::Result<Vec<Readiness>> {
    let mut fds: Vec<libc::pollfd> = registrations
        .iter()
        .map(|&(fd, interest)| libc::pollfd {
            fd,
            events: match interest {
                Interest::Readable => libc::POLLIN,
                Interest::Writable => libc::POLLOUT,
            },
            revents: 0,
        })
        .collect();
    let nfds = libc::nfds_t::try_from(fds.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many descriptors"))?;
    let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);

    // SAFETY: `fds` is a valid, exclusively borrowed array of `nfds` pollfd structs.
    cvt(unsafe { libc::poll(fds.as_mut_ptr(), nfds, timeout_ms) })?;

    Ok(fds
        .iter()
        .map(|pfd| Readiness::from_revents(pfd.revents))
        .collect())
}

/// Sends `signal` to `pid`. A process that is already gone (ESRCH) is not an error.
pub fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) takes plain integers; a positive pid targets exactly one process.
    match cvt(unsafe { libc::kill(pid, signal) }) {
        Ok(_) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc::ESRCH) => Ok(()),
        Err(e) => Err(e),
    }
}

/// The opaque previous disposition of a signal, as returned by [`ignore_signal`].
#[derive(Clone, Copy)]
pub struct SavedDisposition {
    signal: libc::c_int,
    action: libc::sigaction,
}

impl std::fmt::Debug for SavedDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedDisposition")
            .field("signal", &self.signal)
            .field("handler", &self.action.sa_sigaction)
            .finish()
    }
}

#[cfg(test)]
impl SavedDisposition {
    pub(crate) fn is_ignore(&self) -> bool {
        self.action.sa_sigaction == libc::SIG_IGN
    }
}

/// Sets `signal` to `SIG_IGN`, returning the disposition it replaced.
pub fn ignore_signal(signal: libc::c_int) -> io::Result<SavedDisposition> {
    // SAFETY: a zeroed sigaction is a valid "default, no flags, empty mask" value.
    let mut new_action: libc::sigaction = unsafe { std::mem::zeroed() };
    new_action.sa_sigaction = libc::SIG_IGN;
    new_action.sa_flags = libc::SA_RESTART;
    // SAFETY: `sa_mask` is a valid sigset_t owned by `new_action`.
    cvt(unsafe { libc::sigemptyset(&mut new_action.sa_mask) })?;

    // SAFETY: as above.
    let mut old_action: libc::sigaction = unsafe { std::mem::zeroed() };
    // SAFETY: both pointers reference live, properly initialized sigaction structs.
    cvt(unsafe { libc::sigaction(signal, &new_action, &mut old_action) })?;
    Ok(SavedDisposition {
        signal,
        action: old_action,
    })
}

/// Reinstalls a disposition previously returned by [`ignore_signal`].
pub fn restore_signal(saved: &SavedDisposition) -> io::Result<()> {
    // SAFETY: `saved.action` was filled in by the kernel in `ignore_signal`.
    cvt(unsafe { libc::sigaction(saved.signal, &saved.action, std::ptr::null_mut()) })?;
    Ok(())
}

/// Reads the current disposition of `signal` without changing it.
#[cfg(test)]
pub(crate) fn current_disposition(signal: libc::c_int) -> io::Result<SavedDisposition> {
    // SAFETY: a zeroed sigaction is a valid out-parameter.
    let mut old_action: libc::sigaction = unsafe { std::mem::zeroed() };
    // SAFETY: a null `act` only queries; `oldact` points to a live struct.
    cvt(unsafe { libc::sigaction(signal, std::ptr::null(), &mut old_action) })?;
    Ok(SavedDisposition {
        signal,
        action: old_action,
    })
}

/// The calling thread, as a target for [`signal_thread`].
#[cfg(test)]
pub(crate) fn current_thread() -> libc::pthread_t {
    // SAFETY: pthread_self has no preconditions.
    unsafe { libc::pthread_self() }
}

/// Delivers `signal` to one specific thread of this process.
///
/// The target thread must still be running when this is called.
#[cfg(test)]
pub(crate) fn signal_thread(thread: libc::pthread_t, signal: libc::c_int) -> io::Result<()> {
    // SAFETY: the caller guarantees `thread` is alive.
    match unsafe { libc::pthread_kill(thread, signal) } {
        0 => Ok(()),
        rc => Err(io::Error::from_raw_os_error(rc)),
    }
}
