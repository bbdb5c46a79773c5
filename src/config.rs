//! Configuration for the browser pool.
//!
//! Settings are plain data with serde support so they can be loaded from a
//! config file, plus an environment-variable loader for the common
//! deployment path where the service is configured through its container
//! environment.

use crate::error::PoolError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool configuration.
///
/// # Examples
///
/// ```rust
/// use headless_pool::PoolConfig;
/// use std::time::Duration;
///
/// // Defaults: 2 browsers, 5 minute idle timeout
/// let config = PoolConfig::default();
///
/// let config = PoolConfig {
///     max_browsers: 4,
///     idle_timeout: Duration::from_secs(120),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Maximum number of browsers checked out simultaneously (default: 2)
    ///
    /// This is the admission-gate capacity. Browsers are launched lazily,
    /// so it is also the upper bound on how many Chromium processes the
    /// pool will ever hold at once.
    pub max_browsers: usize,

    /// How long a browser may sit idle before it is reclaimed (default: 300s)
    pub idle_timeout: Duration,

    /// Interval between idle-reclamation sweeps (default: 60s)
    pub reap_interval: Duration,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Custom User-Agent string for launched browsers (default: Chrome default)
    pub user_agent: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_browsers: 2,
            idle_timeout: Duration::from_secs(300),
            reap_interval: Duration::from_secs(60),
            chrome_path: None,
            user_agent: None,
        }
    }
}

impl PoolConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset.
    ///
    /// Recognized variables:
    ///
    /// | variable | effect |
    /// |----------|--------|
    /// | `SCRAPER_MAX_BROWSERS` | max simultaneous checkouts |
    /// | `SCRAPER_IDLE_TIMEOUT_SECS` | idle seconds before reclamation |
    /// | `SCRAPER_REAP_INTERVAL_SECS` | seconds between reclamation sweeps |
    /// | `SCRAPER_CHROME_PATH` | Chromium executable override |
    pub fn from_env() -> Result<Self, PoolError> {
        let mut config = Self::default();

        if let Some(value) = read_env("SCRAPER_MAX_BROWSERS")? {
            config.max_browsers = value;
        }
        if let Some(secs) = read_env("SCRAPER_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_env("SCRAPER_REAP_INTERVAL_SECS")? {
            config.reap_interval = Duration::from_secs(secs);
        }
        if let Ok(path) = std::env::var("SCRAPER_CHROME_PATH") {
            if !path.is_empty() {
                config.chrome_path = Some(path);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_browsers == 0 {
            return Err(PoolError::Configuration(
                "max_browsers must be greater than 0".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(PoolError::Configuration(
                "idle_timeout must be greater than 0".to_string(),
            ));
        }
        if self.reap_interval.is_zero() {
            return Err(PoolError::Configuration(
                "reap_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, PoolError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map(Some)
            .map_err(|_| PoolError::Configuration(format!("invalid value for {name}: {value:?}"))),
        _ => Ok(None),
    }
}

/// Chromium command-line arguments for a pooled scraping browser.
///
/// Headless with GPU, throttling, and extension machinery disabled so each
/// instance stays as small as possible while pages still render and run
/// scripts.
pub fn get_chrome_args(config: &PoolConfig) -> Vec<String> {
    let mut args = vec![
        "--disable-gpu".to_string(),
        "--disable-software-rasterizer".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-component-extensions-with-background-pages".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-audio-output".to_string(),
        "--no-sandbox".to_string(),
        "--disable-web-security".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-first-run".to_string(),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

/// Build the `chromiumoxide` launch configuration for one pool browser.
pub fn create_browser_config(
    config: &PoolConfig,
) -> Result<chromiumoxide::BrowserConfig, PoolError> {
    use chromiumoxide::BrowserConfig;

    let mut builder = BrowserConfig::builder().args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(PoolError::Configuration)
}
