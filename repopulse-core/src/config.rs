//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/repopulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/repopulse/` (~/.config/repopulse/)
//! - State/Logs: `$XDG_STATE_HOME/repopulse/` (~/.local/state/repopulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Event feed connection
    #[serde(default)]
    pub feed: FeedConfig,

    /// Burst smoothing
    #[serde(default)]
    pub smoother: SmootherConfig,

    /// Category ranking
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Event-kind activity window
    #[serde(default)]
    pub activity: ActivityConfig,

    /// Recent item feed
    #[serde(default)]
    pub recent: RecentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the feed delivers batches
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedMode {
    /// WebSocket push
    #[default]
    Socket,
    /// HTTP polling
    Poll,
    /// One HTTP fetch, drained through the smoother
    ///
    /// For static endpoints such as `/commits` or `/files`, where polling
    /// again would only replay the same items.
    Stream,
}

impl FeedMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedMode::Socket => "socket",
            FeedMode::Poll => "poll",
            FeedMode::Stream => "stream",
        }
    }
}

impl std::str::FromStr for FeedMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "socket" | "ws" => Ok(FeedMode::Socket),
            "poll" | "http" => Ok(FeedMode::Poll),
            "stream" | "once" => Ok(FeedMode::Stream),
            _ => Err(format!("unknown feed mode: {}", s)),
        }
    }
}

/// Event feed configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// Feed endpoint (`ws://localhost:5001/` or `http://localhost:9022/commits`)
    pub url: Option<String>,

    /// Push (socket), repeated pull (poll), or a single pull (stream)
    #[serde(default)]
    pub mode: FeedMode,

    /// JSON key naming the category in count and duration messages
    #[serde(default = "default_category_key")]
    pub category_key: String,

    /// Milliseconds between polls (poll mode only)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// HTTP request timeout in seconds
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient failures
    #[serde(default = "default_feed_max_retries")]
    pub max_retries: usize,

    /// Text frame sent once the socket opens
    #[serde(default = "default_start_message")]
    pub start_message: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            mode: FeedMode::default(),
            category_key: default_category_key(),
            poll_interval_ms: default_poll_interval(),
            timeout_secs: default_feed_timeout(),
            max_retries: default_feed_max_retries(),
            start_message: default_start_message(),
        }
    }
}

impl FeedConfig {
    /// Returns the configured URL or a config error.
    pub fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .ok_or_else(|| Error::Config("feed.url is required".to_string()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_category_key() -> String {
    "language".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_feed_timeout() -> u64 {
    30
}

fn default_feed_max_retries() -> usize {
    3
}

fn default_start_message() -> String {
    "StartStream".to_string()
}

/// Rate smoother configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SmootherConfig {
    /// Time budget for draining one burst, in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
        }
    }
}

impl SmootherConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

fn default_window_ms() -> u64 {
    10_000
}

/// Ranking configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    /// Number of categories included in a snapshot
    #[serde(default = "default_display_limit")]
    pub display_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            display_limit: default_display_limit(),
        }
    }
}

fn default_display_limit() -> usize {
    30
}

/// Activity window configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ActivityConfig {
    /// Points kept per event kind
    #[serde(default = "default_points_to_show")]
    pub points_to_show: usize,

    /// Width of the x-domain before the window fills, in milliseconds
    #[serde(default = "default_retention_ms")]
    pub retention_ms: i64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            points_to_show: default_points_to_show(),
            retention_ms: default_retention_ms(),
        }
    }
}

fn default_points_to_show() -> usize {
    25
}

fn default_retention_ms() -> i64 {
    60 * 1000
}

/// Recent item feed configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RecentConfig {
    /// Items kept before the oldest is evicted
    #[serde(default = "default_recent_capacity")]
    pub capacity: usize,
}

impl Default for RecentConfig {
    fn default() -> Self {
        Self {
            capacity: default_recent_capacity(),
        }
    }
}

fn default_recent_capacity() -> usize {
    50
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning an error for unusable values
    pub fn validate(&self) -> Result<()> {
        if self.smoother.window_ms == 0 {
            return Err(Error::Config(
                "smoother.window_ms must be greater than 0".to_string(),
            ));
        }
        if self.ranking.display_limit == 0 {
            return Err(Error::Config(
                "ranking.display_limit must be greater than 0".to_string(),
            ));
        }
        if self.activity.points_to_show < 2 {
            return Err(Error::Config(
                "activity.points_to_show must be at least 2".to_string(),
            ));
        }
        if self.activity.retention_ms < 0 {
            return Err(Error::Config(
                "activity.retention_ms must not be negative".to_string(),
            ));
        }
        if self.recent.capacity == 0 {
            return Err(Error::Config(
                "recent.capacity must be greater than 0".to_string(),
            ));
        }
        if self.feed.category_key.is_empty() {
            return Err(Error::Config(
                "feed.category_key must not be empty".to_string(),
            ));
        }
        if self.feed.mode == FeedMode::Poll && self.feed.poll_interval_ms == 0 {
            return Err(Error::Config(
                "feed.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/repopulse/config.toml` (~/.config/repopulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("repopulse").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/repopulse/` (~/.local/state/repopulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("repopulse")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("repopulse.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.feed.url.is_none());
        assert_eq!(config.feed.mode, FeedMode::Socket);
        assert_eq!(config.feed.category_key, "language");
        assert_eq!(config.smoother.window_ms, 10_000);
        assert_eq!(config.ranking.display_limit, 30);
        assert_eq!(config.activity.points_to_show, 25);
        assert_eq!(config.activity.retention_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[feed]
url = "http://localhost:9022/files"
mode = "poll"
category_key = "extension"
poll_interval_ms = 250

[smoother]
window_ms = 4000

[ranking]
display_limit = 10

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.feed.url.as_deref(),
            Some("http://localhost:9022/files")
        );
        assert_eq!(config.feed.mode, FeedMode::Poll);
        assert_eq!(config.feed.category_key, "extension");
        assert_eq!(config.feed.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.smoother.window(), Duration::from_secs(4));
        assert_eq!(config.ranking.display_limit, 10);
        assert_eq!(config.logging.level, "debug");
        // Untouched sections keep their defaults
        assert_eq!(config.recent.capacity, 50);
    }

    #[test]
    fn test_validation_rejects_zero_window() {
        let mut config = Config::default();
        config.smoother.window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ranking.display_limit = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.activity.points_to_show = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_negative_retention() {
        let mut config = Config::default();
        config.activity.retention_ms = -1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.activity.retention_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_allows_missing_url() {
        // Only `watch` needs a feed; it checks with `require_url`
        let config = Config::default();
        assert!(config.feed.url.is_none());
        assert!(config.validate().is_ok());
        assert!(matches!(config.feed.require_url(), Err(Error::Config(_))));
    }

    #[test]
    fn test_require_url() {
        let feed = FeedConfig::default();
        assert!(feed.require_url().is_err());

        let feed = FeedConfig {
            url: Some("ws://localhost:5001/".to_string()),
            ..Default::default()
        };
        assert_eq!(feed.require_url().unwrap(), "ws://localhost:5001/");
    }

    #[test]
    fn test_feed_mode_from_str() {
        assert_eq!("socket".parse::<FeedMode>().unwrap(), FeedMode::Socket);
        assert_eq!("poll".parse::<FeedMode>().unwrap(), FeedMode::Poll);
        assert_eq!("once".parse::<FeedMode>().unwrap(), FeedMode::Stream);
        assert_eq!(FeedMode::Stream.as_str(), "stream");
        assert!("carrier-pigeon".parse::<FeedMode>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[smoother]\nwindow_ms = 500").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.smoother.window_ms, 500);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[smoother]\nwindow_ms = 0").unwrap();

        assert!(matches!(
            Config::load_from(file.path()),
            Err(Error::Config(_))
        ));
    }
}
