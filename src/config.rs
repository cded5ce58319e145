//! Validated runtime configuration.

use crate::cli::Cli;
use crate::error::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

const PLACEHOLDER_TOKEN: &str = "YOUR_BOT_TOKEN_HERE";
const PLACEHOLDER_CHANNEL: &str = "@your_channel";

/// Chat-model settings, present only when AI translation is enabled.
#[derive(Clone, PartialEq, Eq)]
pub struct TranslationSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl fmt::Debug for TranslationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub telegram_token: String,
    pub channel_id: String,
    pub translation: Option<TranslationSettings>,
    pub target_lang: String,
    pub check_interval: Duration,
    pub send_delay: Duration,
    pub data_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub blob_dir: Option<PathBuf>,
    pub cache_file: PathBuf,
    pub delete_daily_files: bool,
    pub once: bool,
}

impl Config {
    /// Check credentials and fill derived defaults.
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let telegram_token = required(cli.telegram_bot_token, "TELEGRAM_BOT_TOKEN", PLACEHOLDER_TOKEN)?;
        let channel_id = required(cli.telegram_channel_id, "TELEGRAM_CHANNEL_ID", PLACEHOLDER_CHANNEL)?;

        let translation = if cli.enable_ai_translation {
            let api_key = cli
                .openai_api_key
                .filter(|k| !k.trim().is_empty())
                .ok_or(ConfigError::TranslationKeyMissing)?;
            Some(TranslationSettings {
                api_key,
                base_url: cli.openai_base_url,
                model: cli.openai_model,
            })
        } else {
            None
        };

        let archive_dir = cli
            .archive_dir
            .unwrap_or_else(|| cli.data_dir.join("archive"));

        Ok(Self {
            telegram_token,
            channel_id,
            translation,
            target_lang: cli.translation_target_lang,
            check_interval: Duration::from_secs(cli.check_interval),
            send_delay: Duration::from_secs(cli.send_delay),
            data_dir: cli.data_dir,
            archive_dir,
            blob_dir: cli.blob_dir,
            cache_file: cli.cache_file,
            delete_daily_files: cli.delete_daily_files,
            once: cli.once,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("channel_id", &self.channel_id)
            .field("translation", &self.translation)
            .field("target_lang", &self.target_lang)
            .field("check_interval", &self.check_interval)
            .field("send_delay", &self.send_delay)
            .field("data_dir", &self.data_dir)
            .field("archive_dir", &self.archive_dir)
            .field("blob_dir", &self.blob_dir)
            .field("cache_file", &self.cache_file)
            .field("delete_daily_files", &self.delete_daily_files)
            .field("once", &self.once)
            .finish_non_exhaustive()
    }
}

fn required(
    value: Option<String>,
    name: &'static str,
    placeholder: &str,
) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != placeholder)
        .ok_or(ConfigError::Missing(name))
}
