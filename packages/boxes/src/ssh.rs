// ABOUTME: Managed SSH config file mapping box aliases to connection parameters
// ABOUTME: Owns per-alias key files, atomic rewrites and the Include line in the user's SSH config

use crate::credentials::Credential;
use crate::error::{BoxError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use vbox_config::constants::SSH_KEYS_DIR_NAME;
use vbox_config::AppConfig;

const DEFAULT_PORT: u16 = 22;

/// One `Host` block of the managed SSH config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshHostEntry {
    pub alias: String,
    pub host_name: String,
    pub port: u16,
    pub user: String,
    pub identity_file: PathBuf,
    pub identities_only: bool,
    pub strict_host_key_checking: bool,
}

impl SshHostEntry {
    fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            host_name: String::new(),
            port: DEFAULT_PORT,
            user: String::new(),
            identity_file: PathBuf::new(),
            identities_only: true,
            strict_host_key_checking: false,
        }
    }

    fn render(&self) -> String {
        format!(
            "Host {}\n    HostName {}\n    Port {}\n    User {}\n    IdentityFile {}\n    IdentitiesOnly {}\n    StrictHostKeyChecking {}\n",
            self.alias,
            self.host_name,
            self.port,
            self.user,
            quote_if_needed(&self.identity_file.display().to_string()),
            yes_no(self.identities_only),
            yes_no(self.strict_host_key_checking),
        )
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn quote_if_needed(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Parse the managed config. Comments, blank lines, directives outside a
/// `Host` block and unknown directives are skipped.
pub fn parse(contents: &str) -> Vec<SshHostEntry> {
    let mut entries: Vec<SshHostEntry> = Vec::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once(char::is_whitespace) else {
            continue;
        };
        let value = unquote(value.trim());

        if key.eq_ignore_ascii_case("host") {
            entries.push(SshHostEntry::new(value));
            continue;
        }

        let Some(entry) = entries.last_mut() else {
            continue;
        };

        match key.to_ascii_lowercase().as_str() {
            "hostname" => entry.host_name = value.to_string(),
            "port" => match value.parse() {
                Ok(port) => entry.port = port,
                Err(_) => warn!(
                    "Ignoring invalid Port '{}' for SSH host {}",
                    value, entry.alias
                ),
            },
            "user" => entry.user = value.to_string(),
            "identityfile" => entry.identity_file = PathBuf::from(value),
            "identitiesonly" => entry.identities_only = value.eq_ignore_ascii_case("yes"),
            "stricthostkeychecking" => {
                entry.strict_host_key_checking = value.eq_ignore_ascii_case("yes")
            }
            _ => {}
        }
    }

    entries
}

/// Render entries back into config text, one blank line between blocks.
pub fn render(entries: &[SshHostEntry]) -> String {
    entries
        .iter()
        .map(SshHostEntry::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<key>.pub` next to a private key file
pub fn public_key_path(identity_file: &Path) -> PathBuf {
    let mut path = identity_file.as_os_str().to_owned();
    path.push(".pub");
    PathBuf::from(path)
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| BoxError::io(path, e))
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        fs::create_dir_all(path).map_err(|e| BoxError::io(path, e))?;
        set_permissions(path, 0o700)?;
    }
    Ok(())
}

/// Write to a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BoxError::io(dir, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| BoxError::io(tmp.path(), e))?;
    set_permissions(tmp.path(), mode)?;
    tmp.persist(path).map_err(|e| BoxError::io(path, e.error))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BoxError::io(path, e)),
    }
}

/// The managed SSH config and the key files it references.
#[derive(Debug, Clone)]
pub struct SshConfigStore {
    ssh_dir: PathBuf,
    config_path: PathBuf,
    user_config_path: PathBuf,
    host: String,
}

impl SshConfigStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            ssh_dir: config.ssh_dir.clone(),
            config_path: config.ssh_config_path.clone(),
            user_config_path: config.user_ssh_config.clone(),
            host: config.ssh_host.clone(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn keys_dir(&self) -> PathBuf {
        self.ssh_dir.join(SSH_KEYS_DIR_NAME)
    }

    /// Where the private key for `alias` lives. Keys sit in their own
    /// directory so no alias can name the managed config file.
    pub fn key_path(&self, alias: &str) -> PathBuf {
        self.keys_dir().join(alias)
    }

    /// Entry for a box reachable on the configured host at `port`.
    pub fn entry_for(&self, alias: &str, port: u16, user: &str) -> SshHostEntry {
        SshHostEntry {
            alias: alias.to_string(),
            host_name: self.host.clone(),
            port,
            user: user.to_string(),
            identity_file: self.key_path(alias),
            identities_only: true,
            strict_host_key_checking: false,
        }
    }

    fn include_line(&self) -> String {
        format!(
            "Include {}",
            quote_if_needed(&self.config_path.display().to_string())
        )
    }

    /// Create the managed config and make the user's SSH config include it.
    /// Safe to call repeatedly.
    pub fn bootstrap(&self) -> Result<()> {
        ensure_dir(&self.ssh_dir)?;
        if !self.config_path.exists() {
            write_atomic(&self.config_path, b"", 0o600)?;
        }

        if let Some(parent) = self.user_config_path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }

        // Rewrite the link target, not the link, when the user config is symlinked
        let target =
            fs::canonicalize(&self.user_config_path).unwrap_or_else(|_| self.user_config_path.clone());

        let existing = match fs::read_to_string(&target) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(BoxError::io(&target, e)),
        };

        let include = self.include_line();
        if existing.lines().any(|line| line.trim() == include) {
            return Ok(());
        }

        info!("Adding '{}' to {}", include, target.display());
        let updated = format!("{}\n{}", include, existing);
        write_atomic(&target, updated.as_bytes(), 0o600)
    }

    pub fn list(&self) -> Result<Vec<SshHostEntry>> {
        match fs::read_to_string(&self.config_path) {
            Ok(contents) => Ok(parse(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(BoxError::io(&self.config_path, e)),
        }
    }

    pub fn get(&self, alias: &str) -> Result<SshHostEntry> {
        self.list()?
            .into_iter()
            .find(|e| e.alias == alias)
            .ok_or_else(|| BoxError::NotFound(format!("SSH host '{}'", alias)))
    }

    fn save(&self, entries: &[SshHostEntry]) -> Result<()> {
        write_atomic(&self.config_path, render(entries).as_bytes(), 0o600)
    }

    /// Write the key pair for `entry`, then insert or replace its block in place.
    /// Returns the public key path.
    pub fn upsert(&self, entry: &SshHostEntry, credential: &Credential) -> Result<PathBuf> {
        self.bootstrap()?;
        if let Some(parent) = entry.identity_file.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }

        let public_path = public_key_path(&entry.identity_file);
        write_atomic(&entry.identity_file, credential.private_key.as_bytes(), 0o600)?;
        write_atomic(
            &public_path,
            format!("{}\n", credential.public_key.trim_end()).as_bytes(),
            // Mounted into the box, where it must be readable by the login user
            0o644,
        )?;

        let mut entries = self.list()?;
        match entries.iter_mut().find(|e| e.alias == entry.alias) {
            Some(existing) => *existing = entry.clone(),
            None => entries.push(entry.clone()),
        }
        self.save(&entries)?;

        debug!("Saved SSH host {} -> {}:{}", entry.alias, entry.host_name, entry.port);
        Ok(public_path)
    }

    /// Drop `alias`. Its key files go too unless another entry still uses them.
    pub fn remove(&self, alias: &str) -> Result<()> {
        let mut entries = self.list()?;
        let position = entries
            .iter()
            .position(|e| e.alias == alias)
            .ok_or_else(|| BoxError::NotFound(format!("SSH host '{}'", alias)))?;

        let removed = entries.remove(position);
        self.save(&entries)?;

        let key = &removed.identity_file;
        if key.as_os_str().is_empty() || entries.iter().any(|e| &e.identity_file == key) {
            debug!("Keeping {} for remaining SSH hosts", key.display());
            return Ok(());
        }

        remove_if_exists(key)?;
        remove_if_exists(&public_key_path(key))?;
        info!("Removed SSH host {} and its keys", alias);
        Ok(())
    }
}
