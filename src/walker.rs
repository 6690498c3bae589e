use tracing::{info, warn};

use crate::emoji::{EmojiCatalog, EmojiStats};
use crate::slack::{SlackClient, Transport};
use crate::types::{Channel, Message};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub channels: usize,
    pub messages: usize,
    /// Channels whose history or threads could not be read completely.
    pub incomplete_channels: Vec<String>,
}

/// Messages of a thread to scan in place of its parent. Falls back to the
/// parent alone when the replies could not be fetched.
async fn thread_messages<T: Transport>(
    client: &SlackClient<T>,
    channel: &Channel,
    parent: Message,
) -> (Vec<Message>, bool) {
    let thread = client.fetch_replies(&channel.id, &parent.ts).await;

    if thread.items.is_empty() {
        warn!(
            "#{}: replies for thread {} unavailable, counting the parent only",
            channel.name, parent.ts
        );
        return (vec![parent], false);
    }

    (thread.items, thread.complete)
}

/// Counts every message of one channel, expanding threads. Returns the
/// number of messages scanned and whether everything could be read.
pub async fn count_channel<T: Transport>(
    client: &SlackClient<T>,
    channel: &Channel,
    catalog: &EmojiCatalog,
    stats: &mut EmojiStats,
) -> (usize, bool) {
    let history = client.fetch_history(&channel.id).await;
    let mut complete = history.complete;
    let mut scanned = 0;

    info!("#{}: {} messages", channel.name, history.items.len());

    for parent in history.items {
        // counted where it appears inside its thread
        if parent.is_thread_broadcast() {
            continue;
        }

        let messages = if parent.has_replies() {
            let (messages, thread_complete) = thread_messages(client, channel, parent).await;
            complete &= thread_complete;
            messages
        } else {
            vec![parent]
        };

        for message in &messages {
            stats.count_message(catalog, message);
        }
        scanned += messages.len();
    }

    (scanned, complete)
}

pub async fn count_emoji<T: Transport>(
    client: &SlackClient<T>,
    channels: &[Channel],
    catalog: &EmojiCatalog,
) -> (EmojiStats, WalkSummary) {
    let mut stats = EmojiStats::new();
    let mut summary = WalkSummary::default();
    let total = channels.len();

    for (idx, channel) in channels.iter().enumerate() {
        info!("[{}/{}] #{} started", idx + 1, total, channel.name);

        let (scanned, complete) = count_channel(client, channel, catalog, &mut stats).await;

        summary.channels += 1;
        summary.messages += scanned;
        if !complete {
            summary.incomplete_channels.push(channel.name.clone());
        }
    }

    (stats, summary)
}
