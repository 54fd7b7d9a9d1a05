use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::DEFAULT_LOOKUP_URL;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Viewer bundle; served only when the directory exists
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Events buffered per viewer before a slow viewer starts skipping
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("database.db")
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_lookup_url() -> String {
    DEFAULT_LOOKUP_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_dir: default_public_dir(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            lookup_url: default_lookup_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Load configuration: TOML file if given, then process environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply `PORT`, `WATCH_INTERVAL` and the `IPWATCH_*` overrides
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = parse_var::<u16>(&var, "PORT")? {
            self.api.listen.set_port(port);
        }
        if let Some(interval_ms) = parse_var::<u64>(&var, "WATCH_INTERVAL")? {
            self.watcher.interval_ms = interval_ms;
        }
        if let Some(db_path) = var("IPWATCH_DB") {
            self.store.db_path = PathBuf::from(db_path);
        }
        if let Some(url) = var("IPWATCH_LOOKUP_URL") {
            self.watcher.lookup_url = url;
        }
        if let Some(dir) = var("IPWATCH_PUBLIC_DIR") {
            self.api.public_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.watcher.interval_ms == 0 {
            bail!("watcher.interval_ms must be greater than zero");
        }
        if self.watcher.request_timeout_ms == 0 {
            bail!("watcher.request_timeout_ms must be greater than zero");
        }
        if self.realtime.channel_capacity == 0 {
            bail!("realtime.channel_capacity must be greater than zero");
        }
        Ok(())
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}
