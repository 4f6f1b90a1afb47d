//! # Config Loader
//!
//! Builds the [`ExecConfig`] used by the CLI from three layers, lowest priority first:
//! built-in defaults, a TOML file (`~/.config/pipexec/config.toml` or an explicit
//! `--config` path), and `PIPEXEC_*` environment variables.
use crate::{
    constants::{
        ENV_ERROR_POLICY_OVERRIDE, ENV_SHELL_OVERRIDE, ENV_SIGNALED_STATUS_OVERRIDE,
        MAX_READ_CHUNK_SIZE,
    },
    core::paths::{self, PathError},
    models::{ErrorPolicy, ExecConfig},
    system::shell::Environment,
};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("Could not read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value '{value}' for ${var}: {message}")]
    InvalidOverride {
        var: &'static str,
        value: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Loads the effective configuration.
///
/// # Arguments
/// * `explicit` - A config file the user asked for. It must exist.
/// * `env` - Where `PIPEXEC_*` overrides are read from.
///
/// When `explicit` is `None`, the default config file is used if present; a
/// missing default file (or config dir) just means built-in defaults.
pub fn load_config(explicit: Option<&Path>, env: &dyn Environment) -> Result<ExecConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => read_config_file(path)?,
        None => match paths::get_default_config_path() {
            Ok(path) if path.is_file() => read_config_file(&path)?,
            Ok(path) => {
                log::debug!("No config file at {}; using defaults", path.display());
                ExecConfig::default()
            }
            Err(e) => {
                log::debug!("{}; using defaults", e);
                ExecConfig::default()
            }
        },
    };

    apply_env_overrides(&mut config, env)?;
    validate(&config)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<ExecConfig, ConfigError> {
    log::debug!("Loading config from {}", path.display());
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn apply_env_overrides(config: &mut ExecConfig, env: &dyn Environment) -> Result<(), ConfigError> {
    if let Some(shell) = env.var(ENV_SHELL_OVERRIDE).filter(|s| !s.trim().is_empty()) {
        log::debug!("${} overrides shell: {}", ENV_SHELL_OVERRIDE, shell);
        config.shell = Some(shell);
    }

    if let Some(raw) = env.var(ENV_SIGNALED_STATUS_OVERRIDE) {
        config.signaled_status =
            raw.trim()
                .parse::<i32>()
                .map_err(|e| ConfigError::InvalidOverride {
                    var: ENV_SIGNALED_STATUS_OVERRIDE,
                    value: raw.clone(),
                    message: e.to_string(),
                })?;
    }

    if let Some(raw) = env.var(ENV_ERROR_POLICY_OVERRIDE) {
        config.error_policy =
            raw.parse::<ErrorPolicy>()
                .map_err(|message| ConfigError::InvalidOverride {
                    var: ENV_ERROR_POLICY_OVERRIDE,
                    value: raw.clone(),
                    message,
                })?;
    }

    Ok(())
}

fn validate(config: &ExecConfig) -> Result<(), ConfigError> {
    if config.read_chunk_size == 0 {
        return Err(ConfigError::Invalid(
            "read_chunk_size must be at least 1".to_string(),
        ));
    }
    if config.read_chunk_size > MAX_READ_CHUNK_SIZE {
        return Err(ConfigError::Invalid(format!(
            "read_chunk_size {} exceeds the maximum of {} bytes",
            config.read_chunk_size, MAX_READ_CHUNK_SIZE
        )));
    }
    if (0..=255).contains(&config.signaled_status) {
        log::warn!(
            "signaled_status {} overlaps ordinary exit codes; signal deaths will be indistinguishable",
            config.signaled_status
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_explicit_file() {
        // --- Setup ---
        let file = write_config(
            r#"
shell = "/bin/dash"
signaled_status = 200
read_chunk_size = 4096
error_policy = "sentinel"
"#,
        );

        // --- Execute ---
        let config = load_config(Some(file.path()), &HashMap::new()).unwrap();

        // --- Assert ---
        assert_eq!(config.shell.as_deref(), Some("/bin/dash"));
        assert_eq!(config.signaled_status, 200);
        assert_eq!(config.read_chunk_size, 4096);
        assert_eq!(config.error_policy, ErrorPolicy::Sentinel);
        assert_eq!(config.poll_interval_ms, ExecConfig::default().poll_interval_ms);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let file = write_config("shell = \"/bin/dash\"\nsignaled_status = 200\n");
        let env: HashMap<String, String> = [
            ("PIPEXEC_SHELL", "/bin/bash"),
            ("PIPEXEC_SIGNALED_STATUS", "999"),
            ("PIPEXEC_ERROR_POLICY", "sentinel"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = load_config(Some(file.path()), &env).unwrap();

        assert_eq!(config.shell.as_deref(), Some("/bin/bash"));
        assert_eq!(config.signaled_status, 999);
        assert_eq!(config.error_policy, ErrorPolicy::Sentinel);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = load_config(
            Some(Path::new("/nonexistent/pipexec/config.toml")),
            &HashMap::new(),
        );
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let file = write_config("shel = \"/bin/sh\"\n");
        let result = load_config(Some(file.path()), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_zero_chunk_size_is_invalid() {
        let file = write_config("read_chunk_size = 0\n");
        let result = load_config(Some(file.path()), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_oversized_chunk_size_is_invalid() {
        let file = write_config(&format!("read_chunk_size = {}\n", MAX_READ_CHUNK_SIZE + 1));
        let result = load_config(Some(file.path()), &HashMap::new());
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("maximum")));

        let at_limit = write_config(&format!("read_chunk_size = {}\n", MAX_READ_CHUNK_SIZE));
        assert!(load_config(Some(at_limit.path()), &HashMap::new()).is_ok());
    }

    #[test]
    fn test_bad_override_is_reported() {
        let file = write_config("");
        let env: HashMap<String, String> =
            [("PIPEXEC_SIGNALED_STATUS".to_string(), "lots".to_string())]
                .into_iter()
                .collect();
        let err = load_config(Some(file.path()), &env).unwrap_err();
        assert!(err.to_string().contains("PIPEXEC_SIGNALED_STATUS"));
    }
}
