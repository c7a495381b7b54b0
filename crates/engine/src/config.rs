//! Engine configuration via `ranchvault.toml`
//!
//! Every field has a default, so an empty file (or no file) is valid.

use crate::error::{VaultError, VaultResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file name looked up by the CLI
pub const CONFIG_FILE_NAME: &str = "ranchvault.toml";

/// What missing-mode restore does when an archived animal id is already live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// Skip the archived animal and all its subordinate records
    #[default]
    Skip,
    /// Update the live animal's fields and attach archived subordinates
    Overwrite,
    /// Refuse the restore before any mutation
    Fail,
}

impl CollisionPolicy {
    /// Name used in config files
    pub fn as_str(self) -> &'static str {
        match self {
            CollisionPolicy::Skip => "skip",
            CollisionPolicy::Overwrite => "overwrite",
            CollisionPolicy::Fail => "fail",
        }
    }
}

impl FromStr for CollisionPolicy {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(CollisionPolicy::Skip),
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            "fail" => Ok(CollisionPolicy::Fail),
            other => Err(VaultError::config(format!(
                "Invalid collision policy '{}'. Expected \"skip\", \"overwrite\" or \"fail\".",
                other
            ))),
        }
    }
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backoff for store calls and media uploads
///
/// The `[retry]` table of `ranchvault.toml`. Store reads and writes retry
/// only transient errors; media uploads reuse the same delays between their
/// `media_upload_attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first failed store call
    pub max_retries: usize,
    /// Pause before the first retry, doubled for each one after
    pub base_delay_ms: u64,
    /// Ceiling for any single pause
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Default retry count without any pauses
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Set the retry count
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Pause before retry number `retry`, counting from zero
    pub(crate) fn backoff(&self, retry: usize) -> Duration {
        let factor = u32::try_from(retry)
            .ok()
            .and_then(|shift| 1u64.checked_shl(shift))
            .unwrap_or(u64::MAX);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Engine configuration loaded from `ranchvault.toml`
///
/// # Example
///
/// ```toml
/// compression_level = 3
/// page_size = 500
/// collision_policy = "skip"
///
/// [retry]
/// max_retries = 3
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Zstd level for new archives
    pub compression_level: i32,
    /// Records per store page, and per archive batch
    pub page_size: usize,
    /// Emit throttled progress at most once per this many records
    pub progress_every_records: u64,
    /// ...or once per this many milliseconds, whichever comes first
    pub progress_interval_ms: u64,
    /// Media objects above this size are exported as missing
    pub max_media_bytes: u64,
    /// `"skip"`, `"overwrite"` or `"fail"`
    pub collision_policy: String,
    /// Directory for cross-process restore lock files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,
    /// Upload attempts per media object during restore
    pub media_upload_attempts: usize,
    /// Retry policy for store reads and writes
    pub retry: RetryConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            compression_level: 3,
            page_size: 500,
            progress_every_records: 1000,
            progress_interval_ms: 500,
            max_media_bytes: 1024 * 1024 * 1024,
            collision_policy: CollisionPolicy::Skip.as_str().to_string(),
            lock_dir: None,
            media_upload_attempts: 3,
            retry: RetryConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Parse the collision policy string
    ///
    /// # Errors
    ///
    /// Returns `VaultError::Config` for anything but `skip`, `overwrite`, `fail`.
    pub fn collision_policy(&self) -> VaultResult<CollisionPolicy> {
        self.collision_policy.parse()
    }

    /// Set the collision policy
    pub fn with_collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = policy.as_str().to_string();
        self
    }

    /// Set the page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the lock directory
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Check every value that serde alone cannot
    pub fn validate(&self) -> VaultResult<()> {
        self.collision_policy()?;
        if self.page_size == 0 {
            return Err(VaultError::config("page_size must be at least 1"));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(VaultError::config(format!(
                "compression_level must be between 1 and 22, got {}",
                self.compression_level
            )));
        }
        if self.media_upload_attempts == 0 {
            return Err(VaultError::config("media_upload_attempts must be at least 1"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# RanchVault configuration
#
# Zstd compression level for new archives (1-22, default: 3)
compression_level = 3

# Records read per store page; each page becomes one archive batch (default: 500)
page_size = 500

# Progress during long phases is reported every N records
# or every M milliseconds, whichever comes first
progress_every_records = 1000
progress_interval_ms = 500

# Media objects larger than this are exported as missing (default: 1 GiB)
max_media_bytes = 1073741824

# Missing-mode restore when an archived animal id already exists:
#   "skip"      = keep the live animal, skip the archived one and its records (default)
#   "overwrite" = update the live animal, attach the archived records
#   "fail"      = refuse the restore before changing anything
collision_policy = "skip"

# Upload attempts per media object during restore (default: 3)
media_upload_attempts = 3

# Directory for cross-process restore lock files (default: in-process only)
# lock_dir = "/var/lock/ranchvault"

# Retry policy for transient store errors
[retry]
max_retries = 3
base_delay_ms = 10
max_delay_ms = 100
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> VaultResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VaultError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: VaultConfig = toml::from_str(&content).map_err(|e| {
            VaultError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the config file if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> VaultResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `true` when the file was created.
    pub fn write_default_if_missing(path: &Path) -> VaultResult<bool> {
        if path.exists() {
            return Ok(false);
        }
        std::fs::write(path, Self::default_toml()).map_err(|e| {
            VaultError::config(format!(
                "Failed to write default config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(true)
    }

    /// Interval between time-throttled progress reports
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
