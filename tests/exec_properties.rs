// tests/exec_properties.rs

use pipexec::{CancellationToken, ExecConfig, ExecOutcome, Termination, exec};
use pretty_assertions::assert_eq;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

// --- Helpers ---

fn sh() -> ExecConfig {
    ExecConfig::with_shell("/bin/sh")
}

fn token() -> CancellationToken {
    Arc::new(AtomicBool::new(false))
}

fn run(command: &str, input: &[u8]) -> ExecOutcome {
    exec(command, input, &sh(), &token())
        .expect("engine failure")
        .expect("sentinel result under propagate policy")
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| u8::try_from(i * 31 % 256).unwrap()).collect()
}

// --- Data integrity ---

#[test]
fn test_cat_echoes_input_of_any_size() {
    for len in [0, 1, 1023, 1024, 1025, 65_536, 65_537, 3 * 1024 * 1024] {
        let input = patterned(len);
        let outcome = run("cat", &input);
        let output = outcome.output.unwrap();
        assert!(output.as_bytes() == input.as_slice(), "mismatch for {} bytes", len);
        assert_eq!(output.as_bytes_with_terminator().last(), Some(&0u8));
        assert!(outcome.exit.success());
    }
}

#[test]
fn test_binary_input_with_nul_bytes_is_verbatim() {
    let input = b"a\0b\r\n\xff\0".to_vec();
    let outcome = run("cat", &input);
    assert_eq!(outcome.output.unwrap().as_bytes(), input.as_slice());
}

#[test]
fn test_output_only_after_full_consumption_never_deadlocks() {
    for len in [0, 10, 1024 * 1024, 4 * 1024 * 1024] {
        let outcome = run("cat >/dev/null; echo done", &patterned(len));
        assert_eq!(outcome.output.unwrap().as_bytes(), b"done\n");
    }
}

#[test]
fn test_output_larger_than_pipe_buffer_before_reading_input() {
    // The child floods stdout before touching stdin: a write-then-read parent would hang.
    let input = patterned(1024 * 1024);
    let outcome = run("head -c 2000000 /dev/zero; cat >/dev/null; echo end", &input);
    let output = outcome.output.unwrap();
    assert_eq!(output.len(), 2_000_000 + 4);
    assert!(output.as_bytes().ends_with(b"end\n"));
}

// --- Status classification ---

#[test]
fn test_exit_code_is_reported() {
    let outcome = run("exit 7", b"");
    assert_eq!(outcome.exit.status, 7);
    assert_eq!(outcome.exit.termination, Termination::Exited);
}

#[test]
fn test_signal_death_uses_sentinel() {
    let outcome = run("kill -TERM $$", b"");
    assert_eq!(outcome.exit.termination, Termination::Signaled);
    assert_eq!(outcome.exit.status, 140);
}

#[test]
fn test_degenerate_commands_do_not_crash() {
    let empty = run("", b"");
    assert!(empty.exit.success());
    assert_eq!(empty.output.unwrap().as_bytes(), b"");

    let whitespace = run("   ", b"ignored input");
    assert_eq!(whitespace.exit.termination, Termination::Exited);
}

#[test]
fn test_shell_syntax_error_is_a_nonzero_exit_not_an_engine_error() {
    let outcome = run("if then fi (", b"");
    assert_eq!(outcome.exit.termination, Termination::Exited);
    assert_ne!(outcome.exit.status, 0);
}

#[test]
fn test_unknown_command_exits_127() {
    let outcome = run("pipexec-definitely-not-a-command", b"");
    assert_eq!(outcome.exit.status, 127);
}

// --- Cancellation ---

#[test]
fn test_cancellation_mid_run_reaps_child_and_discards_output() {
    // --- Setup ---
    let token = token();
    let remote = token.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        remote.store(true, Ordering::SeqCst);
    });

    // --- Execute ---
    let started = Instant::now();
    let outcome = exec("echo partial; sleep 30", b"", &sh(), &token)
        .unwrap()
        .unwrap();
    canceller.join().unwrap();

    // --- Assert ---
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(outcome.output, None);
    assert_eq!(outcome.exit.termination, Termination::Signaled);
    assert_eq!(outcome.exit.status, 140);
    let pid = outcome.pid.expect("child was spawned");
    assert_not_zombie(pid);
}

#[test]
fn test_cancellation_while_stdin_is_still_being_sent() {
    let token = token();
    let remote = token.clone();
    // `sleep` never reads, so the 4 MiB input can never be fully delivered.
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(150));
        remote.store(true, Ordering::SeqCst);
    });

    let outcome = exec("sleep 30", &patterned(4 * 1024 * 1024), &sh(), &token)
        .unwrap()
        .unwrap();
    canceller.join().unwrap();

    assert_eq!(outcome.output, None);
    assert_not_zombie(outcome.pid.unwrap());
}

#[cfg(target_os = "linux")]
fn assert_not_zombie(pid: u32) {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid));
    // Either gone entirely, or (if the pid was recycled) not in zombie state.
    if let Ok(stat) = stat {
        let state = stat.rsplit(')').next().unwrap_or("").trim_start();
        assert!(!state.starts_with('Z'), "pid {} is a zombie: {}", pid, stat);
    }
}

#[cfg(not(target_os = "linux"))]
fn assert_not_zombie(_pid: u32) {}

// --- Independence of sessions ---

#[test]
fn test_concurrent_sessions_do_not_share_state() {
    let results: Vec<(usize, Vec<u8>)> = (0..16usize)
        .into_par_iter()
        .map(|i| {
            let input = format!("session-{}\n", i).repeat(10_000).into_bytes();
            let outcome = run("cat", &input);
            (i, outcome.output.unwrap().into_bytes())
        })
        .collect();

    for (i, output) in results {
        assert_eq!(output, format!("session-{}\n", i).repeat(10_000).into_bytes());
    }
}
