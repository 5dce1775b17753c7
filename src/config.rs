// ABOUTME: File-backed configuration for the attendance shipper
// ABOUTME: Loads the six connection/auth keys and writes back single keys (AccessToken)

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use toml::{Table, Value};

use crate::error::SyncError;

/// Name of the table holding the attendance keys inside the document.
pub const SECTION: &str = "attendance";

/// Interval used when the document has no usable `TimerInterval`.
pub const DEFAULT_TIMER_INTERVAL: Duration = Duration::from_millis(60_000);

pub const ACCESS_TOKEN: &str = "AccessToken";
pub const BASE_ADDRESS: &str = "BaseAddress";
pub const CONNECTION_STRING: &str = "ConnectionString";
pub const LOGIN: &str = "Login";
pub const PASSWORD: &str = "Password";
pub const TIMER_INTERVAL: &str = "TimerInterval";

/// Connection and authentication parameters, built once at startup and handed
/// to the components that need them.
#[derive(Clone, PartialEq, Eq)]
pub struct Configuration {
    pub access_token: String,
    pub base_address: String,
    pub connection_string: String,
    pub login: String,
    pub password: String,
    pub timer_interval: Duration,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            base_address: String::new(),
            connection_string: String::new(),
            login: String::new(),
            password: String::new(),
            timer_interval: DEFAULT_TIMER_INTERVAL,
        }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("access_token", &redact(&self.access_token))
            .field("base_address", &self.base_address)
            .field("connection_string", &redact(&self.connection_string))
            .field("login", &self.login)
            .field("password", &redact(&self.password))
            .field("timer_interval", &self.timer_interval)
            .finish()
    }
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "***"
    }
}

/// The on-disk TOML document.
///
/// ```toml
/// [attendance]
/// AccessToken = ""
/// BaseAddress = "https://api.example.com/v1/"
/// ConnectionString = "sqlite:/var/lib/attendance/logs.db"
/// Login = "device@example.com"
/// Password = "secret"
/// TimerInterval = 60000
/// ```
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `~/.attendance-sync/configurations.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".attendance-sync").join("configurations.toml"))
    }

    /// Read all six keys. Keys missing from the document keep their defaults.
    pub fn load(&self) -> Result<Configuration, SyncError> {
        let document = self
            .read_document()
            .map_err(|e| SyncError::Config(format!("{:#}", e)))?;
        let section = document
            .get(SECTION)
            .and_then(Value::as_table)
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "{} has no [{}] table",
                    self.path.display(),
                    SECTION
                ))
            })?;

        let mut config = Configuration::default();
        let mut missing = Vec::new();
        for (key, slot) in [
            (ACCESS_TOKEN, &mut config.access_token),
            (BASE_ADDRESS, &mut config.base_address),
            (CONNECTION_STRING, &mut config.connection_string),
            (LOGIN, &mut config.login),
            (PASSWORD, &mut config.password),
        ] {
            match section.get(key).and_then(Value::as_str) {
                Some(value) => *slot = value.trim().to_string(),
                None => missing.push(key),
            }
        }

        match section.get(TIMER_INTERVAL).and_then(interval_from_value) {
            Some(interval) => config.timer_interval = interval,
            None => missing.push(TIMER_INTERVAL),
        }

        if !missing.is_empty() {
            tracing::warn!(
                "{} is missing or has invalid keys {:?}, defaults used",
                self.path.display(),
                missing
            );
        }

        Ok(config)
    }

    /// Write a single key back, keeping the rest of the document intact.
    pub fn save(&self, key: &str, value: &str) -> Result<(), SyncError> {
        self.write_key(key, value)
            .map_err(|e| SyncError::Config(format!("{:#}", e)))
    }

    fn write_key(&self, key: &str, value: &str) -> Result<()> {
        let mut document = if self.path.exists() {
            self.read_document()?
        } else {
            Table::new()
        };

        let section = document
            .entry(SECTION)
            .or_insert(Value::Table(Table::new()));
        let section = section
            .as_table_mut()
            .ok_or_else(|| anyhow!("[{}] in {} is not a table", SECTION, self.path.display()))?;
        section.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory {:?}", parent))?;
            }
        }
        let contents =
            toml::to_string_pretty(&document).context("Failed to serialize configuration")?;
        fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write configuration to {:?}", self.path))?;
        Ok(())
    }

    fn read_document(&self) -> Result<Table> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read configuration from {:?}", self.path))?;
        contents
            .parse::<Table>()
            .with_context(|| format!("Failed to parse configuration from {:?}", self.path))
    }
}

fn interval_from_value(value: &Value) -> Option<Duration> {
    let millis = match value {
        Value::Integer(ms) => *ms as f64,
        Value::Float(ms) => *ms,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if millis.is_finite() && millis >= 1.0 {
        Some(Duration::from_millis(millis as u64))
    } else {
        None
    }
}
