use clap::Parser;
use slack_emoji_counter::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slack_emoji_counter=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = slack_emoji_counter::commands::run_emoji_report(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
