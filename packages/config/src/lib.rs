// ABOUTME: Host-side configuration for vbox, built once by the entry point
// ABOUTME: Resolves config, SSH and template paths from the home directory and env overrides

pub mod constants;

use std::env;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use constants::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the home directory")]
    NoHomeDir,
    #[error("Invalid value for {name}: {source}")]
    InvalidNumber {
        name: &'static str,
        #[source]
        source: ParseIntError,
    },
    #[error("{name} must be greater than zero")]
    ZeroAttempts { name: &'static str },
}

/// Paths and tunables every vbox component is constructed from.
///
/// There is no global instance; the binary builds one with [`AppConfig::from_env`]
/// and hands references to the components that need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub config_dir: PathBuf,
    pub ssh_dir: PathBuf,
    pub ssh_config_path: PathBuf,
    pub templates_dir: PathBuf,
    /// The user's primary SSH config that receives the `Include` line
    pub user_ssh_config: PathBuf,
    pub ssh_host: String,
    pub port_attempts: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Self::from_lookup(&home, |name| env::var(name).ok())
    }

    /// Resolve the configuration against `home`, reading overrides through `lookup`.
    pub fn from_lookup<F>(home: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let config_dir = non_empty(VBOX_CONFIG_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".config").join(CONFIG_DIR_NAME));

        let templates_dir = non_empty(VBOX_TEMPLATES_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| config_dir.join(TEMPLATES_DIR_NAME));

        let user_ssh_config = non_empty(VBOX_USER_SSH_CONFIG)
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".ssh").join("config"));

        let ssh_host = non_empty(VBOX_SSH_HOST).unwrap_or_else(|| DEFAULT_SSH_HOST.to_string());

        let port_attempts = match non_empty(VBOX_PORT_ATTEMPTS) {
            Some(raw) => {
                let parsed = raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|source| ConfigError::InvalidNumber {
                        name: VBOX_PORT_ATTEMPTS,
                        source,
                    })?;
                if parsed == 0 {
                    return Err(ConfigError::ZeroAttempts {
                        name: VBOX_PORT_ATTEMPTS,
                    });
                }
                parsed
            }
            None => DEFAULT_PORT_ATTEMPTS,
        };

        let ssh_dir = config_dir.join(SSH_DIR_NAME);
        let config = Self {
            ssh_config_path: ssh_dir.join(SSH_CONFIG_FILE_NAME),
            ssh_dir,
            config_dir,
            templates_dir,
            user_ssh_config,
            ssh_host,
            port_attempts,
        };

        debug!("Resolved vbox config: {:?}", config);
        Ok(config)
    }

    /// Self-contained layout rooted at `root`, used by tests.
    pub fn with_root(root: &Path) -> Self {
        let config_dir = root.join(CONFIG_DIR_NAME);
        let ssh_dir = config_dir.join(SSH_DIR_NAME);
        Self {
            ssh_config_path: ssh_dir.join(SSH_CONFIG_FILE_NAME),
            ssh_dir,
            templates_dir: config_dir.join(TEMPLATES_DIR_NAME),
            user_ssh_config: root.join(".ssh").join("config"),
            config_dir,
            ssh_host: DEFAULT_SSH_HOST.to_string(),
            port_attempts: DEFAULT_PORT_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_follow_home_layout() {
        let home = Path::new("/home/alice");
        let config = AppConfig::from_lookup(home, lookup_from(&[])).unwrap();

        assert_eq!(config.config_dir, PathBuf::from("/home/alice/.config/vbox"));
        assert_eq!(config.ssh_dir, PathBuf::from("/home/alice/.config/vbox/ssh"));
        assert_eq!(
            config.ssh_config_path,
            PathBuf::from("/home/alice/.config/vbox/ssh/config")
        );
        assert_eq!(config.templates_dir, PathBuf::from("/home/alice/.config/vbox/env"));
        assert_eq!(config.user_ssh_config, PathBuf::from("/home/alice/.ssh/config"));
        assert_eq!(config.ssh_host, "localhost");
        assert_eq!(config.port_attempts, 100);
    }

    #[test]
    fn test_overrides_are_applied() {
        let home = Path::new("/home/alice");
        let config = AppConfig::from_lookup(
            home,
            lookup_from(&[
                (VBOX_CONFIG_DIR, "/srv/vbox"),
                (VBOX_SSH_HOST, "127.0.0.1"),
                (VBOX_PORT_ATTEMPTS, "7"),
            ]),
        )
        .unwrap();

        assert_eq!(config.ssh_config_path, PathBuf::from("/srv/vbox/ssh/config"));
        assert_eq!(config.templates_dir, PathBuf::from("/srv/vbox/env"));
        assert_eq!(config.ssh_host, "127.0.0.1");
        assert_eq!(config.port_attempts, 7);
    }

    #[test]
    fn test_invalid_attempts_rejected() {
        let home = Path::new("/home/alice");
        let err = AppConfig::from_lookup(home, lookup_from(&[(VBOX_PORT_ATTEMPTS, "many")]));
        assert!(matches!(err, Err(ConfigError::InvalidNumber { .. })));

        let err = AppConfig::from_lookup(home, lookup_from(&[(VBOX_PORT_ATTEMPTS, "0")]));
        assert!(matches!(err, Err(ConfigError::ZeroAttempts { .. })));
    }

    #[test]
    fn test_with_root_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::with_root(dir.path());
        assert!(config.ssh_config_path.starts_with(dir.path()));
        assert!(config.user_ssh_config.starts_with(dir.path()));
    }
}
