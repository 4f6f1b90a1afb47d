// src/system/signals.rs

use crate::CancellationToken;
use crate::system::sys::{self, SavedDisposition};
use signal_hook::SigId;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::io;
use std::sync::{Mutex, PoisonError};

/// Process-wide SIGPIPE bookkeeping: how many guards are alive and the
/// disposition to put back when the last one goes away.
static PIPE_GUARDS: Mutex<Option<(usize, SavedDisposition)>> = Mutex::new(None);

/// Ignores SIGPIPE for as long as it is alive, then restores whatever disposition
/// was installed before.
///
/// With SIGPIPE ignored, writing to a child that has stopped reading fails with
/// `BrokenPipe` instead of killing the whole process. Dispositions are process
/// global, so overlapping guards (concurrent exec calls) share one override and
/// only the last guard dropped restores the original.
#[derive(Debug)]
pub struct BrokenPipeGuard {
    _private: (),
}

impl BrokenPipeGuard {
    pub fn install() -> io::Result<Self> {
        let mut state = PIPE_GUARDS.lock().unwrap_or_else(PoisonError::into_inner);
        match state.as_mut() {
            Some((count, _)) => *count += 1,
            None => {
                let saved = sys::ignore_signal(libc::SIGPIPE)?;
                log::trace!("SIGPIPE ignored for the duration of the exec call");
                *state = Some((1, saved));
            }
        }
        Ok(Self { _private: () })
    }
}

impl Drop for BrokenPipeGuard {
    fn drop(&mut self) {
        let mut state = PIPE_GUARDS.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((count, saved)) = state.as_mut() else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        if let Err(e) = sys::restore_signal(saved) {
            log::warn!("Failed to restore SIGPIPE disposition: {}", e);
        }
        *state = None;
    }
}

/// Wires SIGINT and SIGTERM to set `token`, so a running exec unwinds instead of
/// the process dying mid-operation. Returns the registrations so callers can
/// undo them with [`unregister`].
pub fn register_termination_signals(token: &CancellationToken) -> io::Result<Vec<SigId>> {
    [SIGINT, SIGTERM]
        .into_iter()
        .map(|signal| signal_hook::flag::register(signal, token.clone()))
        .collect()
}

pub fn unregister(ids: Vec<SigId>) {
    for id in ids {
        signal_hook::low_level::unregister(id);
    }
}
