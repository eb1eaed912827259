//! Environment-driven application configuration.
//!
//! Every field maps to an environment variable of the same name in upper
//! case. A `.env` file is honored in development (loaded in `main`).

use std::path::PathBuf;
use std::time::Duration;

use custom_debug_derive::Debug as CustomDebug;
use figment::{Figment, providers::Env};
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};

#[derive(Clone, CustomDebug, Deserialize)]
pub struct Config {
    /// Telegram bot API token.
    #[debug(with = "crate::fmt::masked")]
    pub bot_token: String,
    /// Comma-separated Telegram ids allowed into the admin panel.
    #[serde(default)]
    pub admin_ids: String,
    /// Admin who receives scraper auth-code prompts.
    pub admin_telegram_id: i64,
    pub database_url: String,
    /// Webhook server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seller account phone number used for scraper logins.
    #[serde(default)]
    pub wb_phone: String,
    #[serde(default = "default_true")]
    pub wb_headless: bool,
    #[serde(default = "default_state_file")]
    pub wb_state_file: PathBuf,
    #[serde(default = "default_downloads_path")]
    pub wb_downloads_path: PathBuf,
    /// How often the browser session state is persisted to disk.
    #[serde(
        default = "default_state_save_interval",
        deserialize_with = "de_duration"
    )]
    pub wb_state_save_interval: Duration,
    /// WebDriver endpoint of the geckodriver sidecar.
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default)]
    pub yookassa_shop_id: String,
    #[debug(with = "crate::fmt::masked")]
    #[serde(default)]
    pub yookassa_secret_key: String,
    /// Where YooKassa redirects the user after checkout.
    #[serde(default)]
    pub yookassa_return_url: String,
    /// Receipt customer email (fiscalization requires one).
    #[serde(default)]
    pub yookassa_receipt_email: String,

    #[serde(default = "default_shutdown_timeout", deserialize_with = "de_duration")]
    pub shutdown_timeout: Duration,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Config, figment::Error> {
        Figment::new().merge(Env::raw()).extract()
    }

    pub fn admin_id_list(&self) -> Vec<i64> {
        self.admin_ids
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect()
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_id_list().contains(&user_id)
    }
}

/// Parse a human duration ("300", "90s", "5m") with seconds as the bare unit.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let parsed = DurationParser::with_all_time_units()
        .parse(raw.trim())
        .map_err(|e| e.to_string())?;
    Duration::try_from(parsed).map_err(|e| e.to_string())
}

fn de_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_state_file() -> PathBuf {
    PathBuf::from("storage/state.json")
}

fn default_downloads_path() -> PathBuf {
    PathBuf::from("storage/downloads")
}

fn default_state_save_interval() -> Duration {
    Duration::from_secs(300)
}

fn default_webdriver_url() -> String {
    "http://127.0.0.1:4444".to_string()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_required(jail: &mut figment::Jail) {
        jail.set_env("BOT_TOKEN", "12345:test-token");
        jail.set_env("ADMIN_TELEGRAM_ID", "42");
        jail.set_env("DATABASE_URL", "postgres://localhost/cardcompare");
    }

    #[test]
    fn loads_with_defaults() {
        figment::Jail::expect_with(|jail| {
            set_required(jail);
            let config = Config::load().expect("config should load");
            assert!(config.wb_headless);
            assert_eq!(config.wb_state_file, PathBuf::from("storage/state.json"));
            assert_eq!(config.wb_state_save_interval, Duration::from_secs(300));
            assert_eq!(config.webdriver_url, "http://127.0.0.1:4444");
            Ok(())
        });
    }

    #[test]
    fn parses_durations_with_units() {
        figment::Jail::expect_with(|jail| {
            set_required(jail);
            jail.set_env("WB_STATE_SAVE_INTERVAL", "5m");
            jail.set_env("SHUTDOWN_TIMEOUT", "45");
            let config = Config::load().expect("config should load");
            assert_eq!(config.wb_state_save_interval, Duration::from_secs(300));
            assert_eq!(config.shutdown_timeout, Duration::from_secs(45));
            Ok(())
        });
    }

    #[test]
    fn admin_id_list_ignores_junk() {
        figment::Jail::expect_with(|jail| {
            set_required(jail);
            jail.set_env("ADMIN_IDS", "10, 20,notanumber, 30");
            let config = Config::load().expect("config should load");
            assert_eq!(config.admin_id_list(), vec![10, 20, 30]);
            assert!(config.is_admin(20));
            assert!(!config.is_admin(99));
            Ok(())
        });
    }

    #[test]
    fn debug_masks_secrets() {
        figment::Jail::expect_with(|jail| {
            set_required(jail);
            jail.set_env("YOOKASSA_SECRET_KEY", "live_supersecretvalue");
            let config = Config::load().expect("config should load");
            let dump = format!("{config:?}");
            assert!(!dump.contains("supersecretvalue"));
            assert!(!dump.contains("test-token"));
            Ok(())
        });
    }
}
