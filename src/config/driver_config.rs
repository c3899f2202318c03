use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{path::Path, time::Duration};
use thiserror::Error;
use tokio::fs;

use super::address::AddressError;
use super::types::{ConnectionMode, LogLevel};
use crate::charset::Charset;

// -----------------------------------------------------------------------------
// ----- Defaults --------------------------------------------------------------

pub const DEFAULT_GENERAL_POOL_SIZE: usize = 10;
pub const DEFAULT_DOWNLOAD_POOL_SIZE: usize = 5;
pub const DEFAULT_ROOT_FOLDER_PATH: &str = "/";
pub const DEFAULT_ENCODING: &str = "UTF-8";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// -----------------------------------------------------------------------------
// ----- DriverConfig ----------------------------------------------------------

/// Driver settings. Fixed once the driver is initialized.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub address: String,
    pub username: String,
    pub password: SecretString,

    pub encoding: String,
    pub charset: Charset,
    pub root_folder_path: String,

    pub general_pool_size: usize,
    pub download_pool_size: usize,
    pub connection_mode: ConnectionMode,

    pub connect_timeout: Duration,
    pub borrow_timeout: Option<Duration>,

    pub log_level: LogLevel,
}

// -----------------------------------------------------------------------------
// ----- DriverConfig: Static --------------------------------------------------

impl DriverConfig {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password: String = password.into();
        Self {
            address: address.into(),
            username: username.into(),
            password: SecretString::new(password.into_boxed_str()),
            encoding: DEFAULT_ENCODING.to_string(),
            charset: Charset::utf8(),
            root_folder_path: DEFAULT_ROOT_FOLDER_PATH.to_string(),
            general_pool_size: DEFAULT_GENERAL_POOL_SIZE,
            download_pool_size: DEFAULT_DOWNLOAD_POOL_SIZE,
            connection_mode: ConnectionMode::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            borrow_timeout: None,
            log_level: LogLevel::default(),
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).await.map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let doc: DriverConfigFile =
            toml::from_str(raw).map_err(|e| ConfigError::Toml { source: e })?;
        Self::from_file_entry(doc)
    }
}

// -----------------------------------------------------------------------------
// ----- DriverConfig: Builder -------------------------------------------------

impl DriverConfig {
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self.charset = Charset::from_label(&self.encoding);
        self
    }

    pub fn with_root_folder_path(mut self, path: impl Into<String>) -> Self {
        self.root_folder_path = path.into();
        self
    }

    /// Non-positive sizes keep the default.
    pub fn with_pool_sizes(mut self, general: i64, download: i64) -> Self {
        self.general_pool_size = size_or_default(general, DEFAULT_GENERAL_POOL_SIZE);
        self.download_pool_size = size_or_default(download, DEFAULT_DOWNLOAD_POOL_SIZE);
        self
    }

    pub fn with_connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.connection_mode = mode;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_borrow_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.borrow_timeout = timeout;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }
}

// -----------------------------------------------------------------------------
// ----- DriverConfig: Public --------------------------------------------------

impl DriverConfig {
    pub fn password_exposed(&self) -> &str {
        self.password.expose_secret()
    }

    /// Field checks that need no network access.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::MissingField("address"));
        }
        if self.username.trim().is_empty() {
            return Err(ConfigError::MissingField("username"));
        }
        if !self.root_folder_path.starts_with('/') {
            return Err(ConfigError::InvalidField {
                field: "root_folder_path",
                reason: "must be an absolute path".into(),
            });
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidField {
                field: "connect_timeout",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- DriverConfig: Private -------------------------------------------------

impl DriverConfig {
    fn from_file_entry(doc: DriverConfigFile) -> Result<Self, ConfigError> {
        let connect_timeout = match doc.connect_timeout.as_deref() {
            Some(raw) => parse_duration("connect_timeout", raw)?,
            None => DEFAULT_CONNECT_TIMEOUT,
        };
        let borrow_timeout = doc
            .borrow_timeout
            .as_deref()
            .map(|raw| parse_duration("borrow_timeout", raw))
            .transpose()?;

        let cfg = Self::new(doc.address, doc.username, doc.password)
            .with_encoding(doc.encoding)
            .with_root_folder_path(doc.root_folder_path)
            .with_pool_sizes(doc.general_pool_size, doc.download_pool_size)
            .with_connection_mode(doc.connection_mode)
            .with_connect_timeout(connect_timeout)
            .with_borrow_timeout(borrow_timeout)
            .with_log_level(doc.log_level);

        cfg.validate()?;
        Ok(cfg)
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct DriverConfigFile {
    address: String,
    username: String,

    #[serde(default)]
    password: String,

    #[serde(default = "default_encoding")]
    encoding: String,

    #[serde(default = "default_root_folder_path")]
    root_folder_path: String,

    #[serde(default)]
    general_pool_size: i64,

    #[serde(default)]
    download_pool_size: i64,

    #[serde(default)]
    connection_mode: ConnectionMode,

    // humantime, e.g. "30s", "1m 30s"
    #[serde(default)]
    connect_timeout: Option<String>,

    #[serde(default)]
    borrow_timeout: Option<String>,

    #[serde(default)]
    log_level: LogLevel,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}

fn default_root_folder_path() -> String {
    DEFAULT_ROOT_FOLDER_PATH.to_string()
}

fn size_or_default(size: i64, default: usize) -> usize {
    if size > 0 {
        usize::try_from(size).unwrap_or(default)
    } else {
        default
    }
}

fn parse_duration(field: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim())
        .map_err(|source| ConfigError::InvalidDuration { field, source })
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("invalid duration for '{field}': {source}")]
    InvalidDuration {
        field: &'static str,
        source: humantime::DurationError,
    },

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
