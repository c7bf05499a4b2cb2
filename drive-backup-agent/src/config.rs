//! Configuration management for the backup agent.
//!
//! Loads configuration from an optional TOML file with environment variable
//! overrides, then resolves it into the validated [`RunSettings`] a pass uses.

use crate::remote::auth::Credentials;
use crate::remote::drive::{DEFAULT_API_BASE, DEFAULT_UPLOAD_BASE};
use crate::transfer::upload::UploadOptions;
use crate::utils::{parse_size, AgentError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backup: BackupConfig,
    pub drive: DriveConfig,
    pub upload: UploadConfig,
    pub retention: RetentionConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Root whose immediate subdirectories are backed up
    pub source_dir: PathBuf,

    /// Working directory for in-flight archives and parts
    pub temp_dir: PathBuf,

    /// IANA zone used for archive timestamps (UTC when unset)
    pub timezone: Option<String>,

    /// Replace `:` with `-` in archive timestamps
    pub filename_safe_timestamp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Destination folder or shared drive ID
    pub folder_id: String,

    /// Service account key used when no bearer token is given
    pub credentials_file: PathBuf,

    /// User to impersonate through domain-wide delegation
    pub impersonate_subject: Option<String>,

    /// OAuth bearer token, obtained outside the agent; overrides the key
    pub access_token: Option<String>,

    /// File holding the bearer token (read when `access_token` is unset)
    pub access_token_file: Option<PathBuf>,

    pub api_base: String,
    pub upload_base: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Bytes per upload request, e.g. "8MB"
    pub chunk_size: Option<String>,

    /// Archives above this size are split into parts, e.g. "1GB"
    pub split_size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Backups older than this many days are deleted; 0 deletes all
    pub days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Force debug output regardless of `level`
    pub debug: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("/backup"),
            temp_dir: PathBuf::from("/app/backup/tmp"),
            timezone: None,
            filename_safe_timestamp: false,
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            folder_id: "root".to_string(),
            credentials_file: PathBuf::from("/creds/credentials.json"),
            impersonate_subject: None,
            access_token: None,
            access_token_file: None,
            api_base: DEFAULT_API_BASE.to_string(),
            upload_base: DEFAULT_UPLOAD_BASE.to_string(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 30 }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            debug: false,
        }
    }
}

/// Validated values handed to a backup pass
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub source_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub timezone: Tz,
    pub filename_safe: bool,
    pub folder_id: String,
    pub retention_days: u32,
    pub upload: UploadOptions,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| AgentError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`. Empty values are treated as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = var("BACKUP_SOURCE_DIR") {
            self.backup.source_dir = PathBuf::from(v);
        }
        if let Some(v) = var("BACKUP_TMP_DIR") {
            self.backup.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = var("TZ") {
            self.backup.timezone = Some(v);
        }
        if let Some(v) = var("FILENAME_SAFE_TIMESTAMP") {
            self.backup.filename_safe_timestamp = v == "true";
        }
        if let Some(v) = var("GDRIVE_FOLDER_ID") {
            self.drive.folder_id = v;
        }
        if let Some(v) = var("GOOGLE_CREDENTIALS") {
            self.drive.credentials_file = PathBuf::from(v);
        }
        if let Some(v) = var("GDRIVE_IMPERSONATE_SUBJECT") {
            self.drive.impersonate_subject = Some(v);
        }
        if let Some(v) = var("GDRIVE_ACCESS_TOKEN") {
            self.drive.access_token = Some(v);
        }
        if let Some(v) = var("GDRIVE_ACCESS_TOKEN_FILE") {
            self.drive.access_token_file = Some(PathBuf::from(v));
        }
        if let Some(v) = var("UPLOAD_CHUNK_SIZE") {
            self.upload.chunk_size = Some(v);
        }
        if let Some(v) = var("UPLOAD_SPLIT_SIZE") {
            self.upload.split_size = Some(v);
        }
        if let Some(days) = var("RETENTION_DAYS").and_then(|v| v.trim().parse::<u32>().ok()) {
            self.retention.days = days;
        }
        if var("DEBUG").is_some() {
            self.log.debug = true;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log.level = v;
        }
    }

    /// Fixed bearer token, if one is configured inline or in a file.
    pub fn access_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.drive.access_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(Some(token.to_string()));
        }
        let Some(path) = self.drive.access_token_file.as_ref() else {
            return Ok(None);
        };
        let token = std::fs::read_to_string(path)?.trim().to_string();
        if token.is_empty() {
            return Err(AgentError::Config(format!("access token file {} is empty", path.display())));
        }
        Ok(Some(token))
    }

    /// Drive credentials: a fixed token when configured, otherwise the
    /// service account key.
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(token) = self.access_token()? {
            info!("Using configured access token");
            return Ok(Credentials::Static(token));
        }

        let subject = self
            .drive
            .impersonate_subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        info!(key_file = %self.drive.credentials_file.display(), "Using service account credentials");
        Credentials::service_account(&self.drive.credentials_file, subject)
    }

    /// Validate into [`RunSettings`]. Bad size strings disable their feature
    /// and an unknown timezone falls back to UTC; both are logged.
    pub fn resolve(&self) -> RunSettings {
        let split_size = resolve_size("split size", self.upload.split_size.as_deref());
        let chunk_size = resolve_size("chunk size", self.upload.chunk_size.as_deref());

        let folder_id = match self.drive.folder_id.trim() {
            "" => "root".to_string(),
            id => id.to_string(),
        };

        RunSettings {
            source_dir: self.backup.source_dir.clone(),
            temp_dir: self.backup.temp_dir.clone(),
            timezone: resolve_timezone(self.backup.timezone.as_deref()),
            filename_safe: self.backup.filename_safe_timestamp,
            folder_id,
            retention_days: self.retention.days,
            upload: UploadOptions {
                split_size,
                chunk_size,
                temp_dir: self.backup.temp_dir.clone(),
            },
        }
    }
}

fn resolve_size(what: &str, raw: Option<&str>) -> Option<u64> {
    let raw = raw.filter(|v| !v.trim().is_empty())?;
    match parse_size(raw) {
        Ok(bytes) => {
            info!(setting = what, bytes, raw = %raw, "Size configured");
            Some(bytes)
        }
        Err(e) => {
            warn!(setting = what, raw = %raw, error = %e, "Invalid size, feature disabled");
            None
        }
    }
}

fn resolve_timezone(name: Option<&str>) -> Tz {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Tz::UTC;
    };
    match name.parse::<Tz>() {
        Ok(tz) => {
            info!(timezone = %name, "Using timezone");
            tz
        }
        Err(e) => {
            warn!(timezone = %name, error = %e, "Could not load timezone, using UTC");
            Tz::UTC
        }
    }
}
