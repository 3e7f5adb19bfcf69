use crate::core::{Result, StoreError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reachability probes give up after this long unless configured otherwise.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STATEMENT_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration structure parsed from a TOML file.
///
/// The `[AWS_MYSQL_CONFIG]` section name is accepted for files carried over
/// from older INI configs, but the file must still be valid TOML: string
/// values need quotes (`host = "db.internal"`, not `host = db.internal`)
/// and `port` must be an unquoted integer.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(alias = "AWS_MYSQL_CONFIG")]
    pub mysql: ConnectionConfig,
}

/// Where and how to connect. All five connection keys are required; the
/// timeouts are optional.
#[derive(Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub port: u16,
    pub connect_timeout_secs: Option<u64>,
    pub statement_timeout_secs: Option<u64>,
    pub probe_timeout_secs: Option<u64>,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        port: u16,
    ) -> Self {
        ConnectionConfig {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            database: database.into(),
            port,
            connect_timeout_secs: None,
            statement_timeout_secs: None,
            probe_timeout_secs: None,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        secs_or(self.probe_timeout_secs, DEFAULT_PROBE_TIMEOUT_SECS)
    }

    pub fn connect_timeout(&self) -> Duration {
        secs_or(self.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS)
    }

    /// Read and write deadline applied to every statement.
    pub fn statement_timeout(&self) -> Duration {
        secs_or(self.statement_timeout_secs, DEFAULT_STATEMENT_TIMEOUT_SECS)
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(StoreError::Config("host must not be empty".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(StoreError::Config("user must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(StoreError::Config("port must not be 0".to_string()));
        }
        Ok(())
    }
}

// Zero would disable the deadline in the driver and make TcpStream error.
fn secs_or(value: Option<u64>, default: u64) -> Duration {
    Duration::from_secs(value.filter(|s| *s > 0).unwrap_or(default))
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("port", &self.port)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .finish()
    }
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    config.mysql.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = rdstore::config::load_config("rdstore.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// `<user config dir>/rdstore/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rdstore").join("config.toml"))
}
