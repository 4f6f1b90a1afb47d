// src/system/shell.rs

use crate::constants::{DEFAULT_SHELL, SHELL_ENV_VAR};
use crate::models::ExecConfig;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("Could not expand shell path '{path}': {message}")]
    Expansion { path: String, message: String },
    #[error("The configured shell path is empty.")]
    EmptyShell,
}

/// Read access to environment variables. Lets callers (and tests) decide where
/// `$SHELL` and friends come from instead of always reading the process env.
pub trait Environment {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for std::collections::HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Picks the shell binary for `-c` execution.
///
/// Order: explicit `config.shell` (with `~` and `$VAR` expanded), then `$SHELL`
/// if `honor_shell_env` is set and the variable is non-empty, then `/bin/sh`.
pub fn resolve_shell(config: &ExecConfig, env: &dyn Environment) -> Result<PathBuf, ShellError> {
    if let Some(explicit) = &config.shell {
        let trimmed = explicit.trim();
        if trimmed.is_empty() {
            return Err(ShellError::EmptyShell);
        }
        let expanded = shellexpand::full_with_context_no_errors(
            trimmed,
            || dirs::home_dir().map(|p| p.to_string_lossy().into_owned()),
            |name| env.var(name),
        );
        if expanded.trim().is_empty() {
            return Err(ShellError::Expansion {
                path: trimmed.to_string(),
                message: "expanded to an empty string".to_string(),
            });
        }
        log::debug!("Using configured shell: {}", expanded);
        return Ok(PathBuf::from(expanded.into_owned()));
    }

    if config.honor_shell_env {
        if let Some(shell) = env.var(SHELL_ENV_VAR).filter(|s| !s.trim().is_empty()) {
            log::debug!("Using ${} shell: {}", SHELL_ENV_VAR, shell);
            return Ok(PathBuf::from(shell));
        }
    }

    log::debug!("Falling back to default shell: {}", DEFAULT_SHELL);
    Ok(PathBuf::from(DEFAULT_SHELL))
}
