//! Command-line interface definitions for the papers bot.
//!
//! Every option can also be supplied through the environment variable named
//! next to it; the parsed [`Cli`] is turned into a validated
//! [`Config`](crate::config::Config) before anything starts.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the HuggingFace papers bot.
///
/// # Examples
///
/// ```sh
/// # Post to a channel every hour, keeping data under ./data
/// hf_papers_bot --telegram-bot-token 123:abc --telegram-channel-id @papers
///
/// # One cycle with Chinese summaries, copying monthly archives to a mount
/// ENABLE_AI_TRANSLATION=true OPENAI_API_KEY=sk-... \
///   hf_papers_bot --blob-dir /mnt/archive --once
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    pub telegram_bot_token: Option<String>,

    /// Target channel, e.g. `@my_channel` or a numeric chat id
    #[arg(long, env = "TELEGRAM_CHANNEL_ID")]
    pub telegram_channel_id: Option<String>,

    /// Summarize and translate abstracts with a chat model
    #[arg(long, env = "ENABLE_AI_TRANSLATION", value_parser = parse_flag)]
    pub enable_ai_translation: bool,

    /// API key for the OpenAI-compatible endpoint
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    /// Language abstracts are translated into
    #[arg(long, env = "TRANSLATION_TARGET_LANG", default_value = "Chinese")]
    pub translation_target_lang: String,

    /// Seconds between cycles
    #[arg(long, env = "CHECK_INTERVAL", default_value_t = 3600)]
    pub check_interval: u64,

    /// Seconds between consecutive channel posts
    #[arg(long, env = "SEND_DELAY", default_value_t = 2)]
    pub send_delay: u64,

    /// Root of the daily partition tree
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Monthly archive directory (defaults to `<data-dir>/archive`)
    #[arg(long, env = "ARCHIVE_DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Long-term copy destination for monthly archives
    #[arg(long, env = "ARCHIVE_BLOB_DIR")]
    pub blob_dir: Option<PathBuf>,

    /// Membership cache snapshot
    #[arg(long, env = "CACHE_FILE", default_value = "papers_cache.json")]
    pub cache_file: PathBuf,

    /// Remove daily partitions once their month is archived
    #[arg(long, env = "DELETE_DAILY_FILES", value_parser = parse_flag)]
    pub delete_daily_files: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

/// Boolean environment value: any casing of `true` enables, anything else
/// disables.
fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

/// The command with every environment fallback detached.
#[cfg(test)]
pub(crate) fn command_without_env() -> clap::Command {
    use clap::CommandFactory;

    let mut command = Cli::command();
    let ids = command
        .get_arguments()
        .map(|arg| arg.get_id().to_string())
        .collect::<Vec<_>>();
    for id in ids {
        command = command.mut_arg(id, |arg| arg.env(None::<&'static str>));
    }
    command
}

/// Parse `args` as if no environment variables were set.
#[cfg(test)]
pub(crate) fn parse_without_env(args: &[&str]) -> Cli {
    use clap::FromArgMatches;

    Cli::from_arg_matches(&command_without_env().get_matches_from(args)).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = parse_without_env(&[
            "hf_papers_bot",
            "--telegram-bot-token",
            "123:abc",
            "--telegram-channel-id",
            "@papers",
            "--data-dir",
            "/tmp/data",
            "--once",
        ]);

        assert_eq!(cli.telegram_bot_token.as_deref(), Some("123:abc"));
        assert_eq!(cli.telegram_channel_id.as_deref(), Some("@papers"));
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/data"));
        assert!(cli.once);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = parse_without_env(&["hf_papers_bot"]);

        assert_eq!(cli.openai_base_url, "https://api.openai.com/v1");
        assert_eq!(cli.openai_model, "gpt-4o-mini");
        assert_eq!(cli.translation_target_lang, "Chinese");
        assert_eq!(cli.check_interval, 3600);
        assert_eq!(cli.send_delay, 2);
        assert_eq!(cli.cache_file, PathBuf::from("papers_cache.json"));
        assert!(cli.archive_dir.is_none());
        assert!(!cli.once);
    }

    #[test]
    fn test_cli_translation_flags() {
        let cli = parse_without_env(&[
            "hf_papers_bot",
            "--enable-ai-translation",
            "--openai-api-key",
            "sk-test",
            "--translation-target-lang",
            "Japanese",
            "--delete-daily-files",
        ]);

        assert!(cli.enable_ai_translation);
        assert_eq!(cli.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(cli.translation_target_lang, "Japanese");
        assert!(cli.delete_daily_files);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("true"), Ok(true));
        assert_eq!(parse_flag("True"), Ok(true));
        assert_eq!(parse_flag(" TRUE "), Ok(true));
        assert_eq!(parse_flag("false"), Ok(false));
        assert_eq!(parse_flag("1"), Ok(false));
        assert_eq!(parse_flag("yes"), Ok(false));
        assert_eq!(parse_flag(""), Ok(false));
    }

    #[test]
    fn test_env_flags_accept_any_case_of_true() {
        use clap::FromArgMatches;

        let command = command_without_env()
            .mut_arg("enable_ai_translation", |arg| arg.env("HF_PAPERS_BOT_TEST_ENABLE_AI"))
            .mut_arg("delete_daily_files", |arg| arg.env("HF_PAPERS_BOT_TEST_DELETE_DAILY"));
        // SAFETY: these variable names are read by this test only.
        unsafe {
            std::env::set_var("HF_PAPERS_BOT_TEST_ENABLE_AI", "True");
            std::env::set_var("HF_PAPERS_BOT_TEST_DELETE_DAILY", "1");
        }

        let matches = command.try_get_matches_from(["hf_papers_bot"]).unwrap();
        let cli = Cli::from_arg_matches(&matches).unwrap();

        assert!(cli.enable_ai_translation);
        assert!(!cli.delete_daily_files);
    }

    #[test]
    fn test_flag_on_command_line_still_enables() {
        let cli = parse_without_env(&["hf_papers_bot", "--enable-ai-translation"]);
        assert!(cli.enable_ai_translation);
        assert!(!cli.delete_daily_files);
    }
}
