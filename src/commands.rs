use std::path::Path;

use tracing::{info, warn};

use crate::cli::Cli;
use crate::error::Result;
use crate::load_token;
use crate::report::{ReportSummary, write_report};
use crate::settings::Settings;
use crate::slack::{HttpTransport, SlackClient, Transport};
use crate::walker::count_emoji;

/// Collects channels and the emoji catalog, counts every message and writes
/// both report files. Each stage hands its result to the next one.
pub async fn generate_report<T: Transport>(
    client: &SlackClient<T>,
    usage_path: &Path,
    unused_path: &Path,
) -> Result<ReportSummary> {
    client.verify_token().await?;

    let channels = client.fetch_channels().await;
    if !channels.complete {
        warn!("channel list is incomplete, some channels will be skipped");
    }
    info!("public channels: {}", channels.items.len());

    let catalog = client.fetch_emoji_catalog().await;
    info!(
        "custom emoji: {} ({} aliases)",
        catalog.custom_count(),
        catalog.alias_count()
    );

    let (stats, walk) = count_emoji(client, &channels.items, &catalog).await;
    info!(
        "scanned {} messages in {} channels",
        walk.messages, walk.channels
    );
    if !walk.incomplete_channels.is_empty() {
        warn!(
            "incomplete data for {} channels: {}",
            walk.incomplete_channels.len(),
            walk.incomplete_channels.join(", ")
        );
    }

    let summary = write_report(&stats, catalog.into_custom(), usage_path, unused_path)?;
    info!("unused custom emoji: {}", summary.unused);

    Ok(summary)
}

pub async fn run_emoji_report(cli: Cli) -> Result<()> {
    let token = match cli.token {
        Some(token) if !token.trim().is_empty() => token,
        _ => load_token()?,
    };
    let settings = Settings::load(Path::new(&cli.settings))?;

    let transport = HttpTransport::new(settings.api.base_url()?, &token)?;
    let client = SlackClient::new(
        transport,
        settings.api.retry_policy(),
        settings.api.page_limit,
    );

    println!("Counting emoji usage...");

    let summary = generate_report(
        &client,
        Path::new(&cli.usage_output),
        Path::new(&cli.unused_output),
    )
    .await?;

    println!(
        "Report completed! {} emoji used ({} custom), written to {}",
        summary.used, summary.custom_used, cli.usage_output
    );
    println!(
        "{} unused custom emoji written to {}",
        summary.unused, cli.unused_output
    );
    Ok(())
}
