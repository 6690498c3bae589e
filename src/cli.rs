use clap::Parser;

use crate::settings::SETTINGS_FILE;

#[derive(Parser, Debug)]
#[command(name = "slack-emoji-counter")]
#[command(about = "Tally emoji usage across public Slack channels and list unused custom emoji")]
pub struct Cli {
    /// Slack API token, falls back to the SLACK_TOKEN environment variable
    #[arg(short, long)]
    pub token: Option<String>,

    /// Output file for per-emoji usage statistics
    #[arg(long, default_value = "emoji_usage.csv")]
    pub usage_output: String,

    /// Output file for custom emoji that were never used
    #[arg(long, default_value = "unused_emoji.csv")]
    pub unused_output: String,

    /// Settings file path
    #[arg(short, long, default_value = SETTINGS_FILE)]
    pub settings: String,
}
