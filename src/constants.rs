// src/constants.rs

/// The shell used when neither the configuration nor `$SHELL` names one.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// The environment variable consulted for a user-preferred shell.
pub const SHELL_ENV_VAR: &str = "SHELL";

/// The status reported for children killed by a signal (and for interrupted runs).
/// Chosen above the 0-255 range a shell can report via `exit`, mirroring 128+SIGTERM-ish codes.
pub const SIGNALED_STATUS: i32 = 140;

/// How many bytes are pulled from the child's stdout per `read` call.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Largest `read_chunk_size` a configuration file may ask for.
pub const MAX_READ_CHUNK_SIZE: usize = 1024 * 1024;

/// Initial capacity of the output buffer, including room for the terminator.
pub const INITIAL_BUFFER_CAPACITY: usize = 1;

/// Upper bound on a single multiplexer wait, so cancellation flags set from
/// another thread are noticed even if no signal interrupts the wait.
pub const POLL_INTERVAL_MS: u64 = 100;

/// How long a terminated child gets to exit before it is sent SIGKILL.
pub const TERMINATE_GRACE_MS: u64 = 2000;

/// Byte appended to captured output by `finalize`.
pub const OUTPUT_TERMINATOR: u8 = b'\0';

/// The name of the directory holding pipexec configuration (inside the system config dir).
pub const CONFIG_DIR_NAME: &str = "pipexec";

/// The name of the configuration file (inside the pipexec config dir).
pub const CONFIG_FILENAME: &str = "config.toml";

/// Overrides the configured shell path.
pub const ENV_SHELL_OVERRIDE: &str = "PIPEXEC_SHELL";
/// Overrides `signaled_status`. Must parse as an `i32`.
pub const ENV_SIGNALED_STATUS_OVERRIDE: &str = "PIPEXEC_SIGNALED_STATUS";
/// Overrides `error_policy` (`propagate` or `sentinel`).
pub const ENV_ERROR_POLICY_OVERRIDE: &str = "PIPEXEC_ERROR_POLICY";
