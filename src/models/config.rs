//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Smallest accepted non-zero update interval.
pub const MIN_INTERVAL_SECS: u64 = 3600;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Update cadence and fetch behavior
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Download worker pool settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Notification dispatch settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Shared HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Enabled notification channels
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, falling back to defaults when the file is missing.
    ///
    /// A file that exists but does not parse is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("Config file {:?} not found. Using defaults.", path);
            return Ok(Self::default());
        }
        Self::load(path).map_err(|e| AppError::config(format!("{}: {}", path.display(), e)))
    }

    /// Validate configuration values. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        let interval = self.scheduler.interval_secs;
        if interval != 0 && interval < MIN_INTERVAL_SECS {
            return Err(AppError::config(format!(
                "scheduler.interval_secs must be 0 (disabled) or >= {}, got {}",
                MIN_INTERVAL_SECS, interval
            )));
        }
        if self.scheduler.fetch_concurrency == 0 {
            return Err(AppError::config("scheduler.fetch_concurrency must be > 0"));
        }
        if self.scheduler.fetch_timeout_secs == 0 {
            return Err(AppError::config("scheduler.fetch_timeout_secs must be > 0"));
        }
        if self.download.workers == 0 {
            return Err(AppError::config("download.workers must be > 0"));
        }
        if self.download.queue_capacity == 0 {
            return Err(AppError::config("download.queue_capacity must be > 0"));
        }
        if self.download.max_attempts == 0 {
            return Err(AppError::config("download.max_attempts must be > 0"));
        }
        if self.download.timeout_secs == 0 {
            return Err(AppError::config("download.timeout_secs must be > 0"));
        }
        if self.notify.timeout_secs == 0 {
            return Err(AppError::config("notify.timeout_secs must be > 0"));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }

        for (name, path) in [
            ("paths.plugin_dir", &self.paths.plugin_dir),
            ("paths.download_dir", &self.paths.download_dir),
            ("paths.state_dir", &self.paths.state_dir),
        ] {
            if !path.is_absolute() {
                return Err(AppError::config(format!(
                    "{} must be an absolute path, got {}",
                    name,
                    path.display()
                )));
            }
        }

        for notifier in &self.notifiers {
            notifier.validate()?;
        }
        Ok(())
    }
}

/// Scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between cycles; 0 disables periodic checks
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    /// Queue new chapters for download
    #[serde(default)]
    pub auto_download: bool,

    /// Maximum concurrent source fetches
    #[serde(default = "defaults::fetch_concurrency")]
    pub fetch_concurrency: usize,

    /// Timeout per source fetch in seconds
    #[serde(default = "defaults::fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            auto_download: false,
            fetch_concurrency: defaults::fetch_concurrency(),
            fetch_timeout_secs: defaults::fetch_timeout(),
        }
    }
}

/// Download coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Jobs buffered before `enqueue` starts waiting
    #[serde(default = "defaults::queue_capacity")]
    pub queue_capacity: usize,

    /// Total attempts per chapter, including the first
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "defaults::base_backoff")]
    pub base_backoff_ms: u64,

    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_ms: u64,

    /// Timeout per download attempt in seconds
    #[serde(default = "defaults::download_timeout")]
    pub timeout_secs: u64,
}

impl DownloadConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: defaults::workers(),
            queue_capacity: defaults::queue_capacity(),
            max_attempts: defaults::max_attempts(),
            base_backoff_ms: defaults::base_backoff(),
            max_backoff_ms: defaults::max_backoff(),
            timeout_secs: defaults::download_timeout(),
        }
    }
}

/// Notification dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Timeout per channel send in seconds
    #[serde(default = "defaults::notify_timeout")]
    pub timeout_secs: u64,
}

impl NotifyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::notify_timeout(),
        }
    }
}

/// Filesystem locations. All must be absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory scanned for source manifests
    #[serde(default = "defaults::plugin_dir")]
    pub plugin_dir: PathBuf,

    /// Destination for downloaded chapters
    #[serde(default = "defaults::download_dir")]
    pub download_dir: PathBuf,

    /// Directory holding tracked manga state
    #[serde(default = "defaults::state_dir")]
    pub state_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            plugin_dir: defaults::plugin_dir(),
            download_dir: defaults::download_dir(),
            state_dir: defaults::state_dir(),
        }
    }
}

/// HTTP client settings shared by sources, downloader and notifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::http_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::http_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// A configured notification channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NotifierConfig {
    /// Telegram bot message
    Telegram { token: String, chat_id: i64 },

    /// Pushover push notification
    Pushover { token: String, user_key: String },

    /// Gotify server push
    Gotify {
        base_url: String,
        token: String,
        #[serde(default = "defaults::gotify_priority")]
        priority: u8,
    },
}

impl NotifierConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            NotifierConfig::Telegram { .. } => "telegram",
            NotifierConfig::Pushover { .. } => "pushover",
            NotifierConfig::Gotify { .. } => "gotify",
        }
    }

    fn validate(&self) -> Result<()> {
        let empty = |field: &str| {
            AppError::config(format!("notifier {}: {} is empty", self.kind(), field))
        };
        match self {
            NotifierConfig::Telegram { token, .. } => {
                if token.trim().is_empty() {
                    return Err(empty("token"));
                }
            }
            NotifierConfig::Pushover { token, user_key } => {
                if token.trim().is_empty() {
                    return Err(empty("token"));
                }
                if user_key.trim().is_empty() {
                    return Err(empty("user_key"));
                }
            }
            NotifierConfig::Gotify {
                base_url, token, ..
            } => {
                if token.trim().is_empty() {
                    return Err(empty("token"));
                }
                url::Url::parse(base_url).map_err(|e| {
                    AppError::config(format!("notifier gotify: bad base_url {}: {}", base_url, e))
                })?;
            }
        }
        Ok(())
    }
}

mod defaults {
    use std::path::PathBuf;

    // Scheduler defaults
    pub fn interval() -> u64 {
        super::MIN_INTERVAL_SECS
    }
    pub fn fetch_concurrency() -> usize {
        4
    }
    pub fn fetch_timeout() -> u64 {
        30
    }

    // Download defaults
    pub fn workers() -> usize {
        4
    }
    pub fn queue_capacity() -> usize {
        256
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn base_backoff() -> u64 {
        1_000
    }
    pub fn max_backoff() -> u64 {
        30_000
    }
    pub fn download_timeout() -> u64 {
        300
    }

    pub fn notify_timeout() -> u64 {
        15
    }
    pub fn gotify_priority() -> u8 {
        5
    }

    // Path defaults
    pub fn plugin_dir() -> PathBuf {
        PathBuf::from("/var/lib/mangawatch/plugins")
    }
    pub fn download_dir() -> PathBuf {
        PathBuf::from("/var/lib/mangawatch/downloads")
    }
    pub fn state_dir() -> PathBuf {
        PathBuf::from("/var/lib/mangawatch/state")
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; mangawatch/0.1)".into()
    }
    pub fn http_timeout() -> u64 {
        30
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_accepts_disabled_interval() {
        let mut config = Config::default();
        config.scheduler.interval_secs = 0;
        assert!(config.validate().is_ok());
        assert!(config.scheduler.interval().is_none());
    }

    #[test]
    fn validate_rejects_short_interval() {
        let mut config = Config::default();
        config.scheduler.interval_secs = 60;
        assert!(matches!(
            config.validate(),
            Err(AppError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn validate_rejects_relative_paths() {
        let mut config = Config::default();
        config.paths.download_dir = PathBuf::from("downloads");
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.download.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_credentials() {
        let mut config = Config::default();
        config.notifiers.push(NotifierConfig::Pushover {
            token: "app".into(),
            user_key: " ".into(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_tagged_notifiers() {
        let config: Config = toml::from_str(
            r#"
            [scheduler]
            interval_secs = 7200
            auto_download = true

            [[notifiers]]
            kind = "telegram"
            token = "123:abc"
            chat_id = 42

            [[notifiers]]
            kind = "gotify"
            base_url = "https://push.example.com"
            token = "tok"
            "#,
        )
        .unwrap();

        assert!(config.scheduler.auto_download);
        assert_eq!(config.scheduler.fetch_concurrency, 4);
        assert_eq!(config.notifiers.len(), 2);
        assert_eq!(config.notifiers[0].kind(), "telegram");
        assert!(matches!(
            config.notifiers[1],
            NotifierConfig::Gotify { priority: 5, .. }
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let download = DownloadConfig {
            base_backoff_ms: 100,
            max_backoff_ms: 350,
            ..DownloadConfig::default()
        };
        assert_eq!(download.backoff(1), Duration::from_millis(100));
        assert_eq!(download.backoff(2), Duration::from_millis(200));
        assert_eq!(download.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/mangawatch.toml").unwrap();
        assert_eq!(config.scheduler.interval_secs, MIN_INTERVAL_SECS);
    }
}
