//! Daemon configuration management.
//!
//! Configuration is stored as TOML at `$MEDIADROP_CONFIG`, or by default:
//! - Linux: `~/.config/mediadrop/daemon.toml`
//! - Windows: `%APPDATA%/mediadrop/daemon.toml`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use mediadrop_pipeline::{Credential, StaticCredentials, UserId};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the config file location.
const CONFIG_ENV: &str = "MEDIADROP_CONFIG";

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Instance name used in logs (hostname by default).
    #[serde(default = "default_name")]
    pub name: String,

    /// Directory holding source media, addressed by source reference.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: PathBuf,

    /// Directory for in-flight temp files.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Root of the per-user storage namespaces.
    #[serde(default = "default_drive_root")]
    pub drive_root: PathBuf,

    /// Prefix of shareable links.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Bytes moved between two cancellation checks.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Minimum spacing between two progress edits, in milliseconds.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Users allowed to cancel any job.
    #[serde(default)]
    pub operators: Vec<i64>,

    /// Users with storage credentials.
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// An authorized user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub id: i64,

    /// RFC 3339 timestamp after which the user must authenticate again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "mediadrop".into())
}

fn data_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home).join(".local").join("share").join("mediadrop")
}

fn default_spool_dir() -> PathBuf {
    data_dir().join("spool")
}

fn default_staging_dir() -> PathBuf {
    data_dir().join("staging")
}

fn default_drive_root() -> PathBuf {
    data_dir().join("drive")
}

fn default_public_base_url() -> String {
    "http://localhost:8080/drive".into()
}

fn default_chunk_size() -> usize {
    mediadrop_transfer::DEFAULT_CHUNK_SIZE
}

fn default_progress_interval_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: default_name(),
            spool_dir: default_spool_dir(),
            staging_dir: default_staging_dir(),
            drive_root: default_drive_root(),
            public_base_url: default_public_base_url(),
            chunk_size: default_chunk_size(),
            progress_interval_ms: default_progress_interval_ms(),
            operators: Vec::new(),
            users: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        let mut seen = HashSet::new();
        for user in &self.users {
            if !seen.insert(user.id) {
                bail!("user {} is listed more than once", user.id);
            }
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Builds the credential registry from `users` and `operators`.
    pub fn credentials(&self) -> StaticCredentials {
        let credentials = self
            .operators
            .iter()
            .fold(StaticCredentials::new(), |c, id| c.with_operator(UserId(*id)));
        for user in &self.users {
            credentials.grant(
                UserId(user.id),
                Credential {
                    expires_at: user.expires_at,
                },
            );
        }
        credentials
    }
}

/// Returns the configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("mediadrop")
            .join("daemon.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("mediadrop").join("daemon.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/mediadrop/daemon.toml"))
    }
}
