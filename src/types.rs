use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

const ALIAS_MARKER: &str = "alias:";
const THREAD_BROADCAST: &str = "thread_broadcast";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// A message as returned by `conversations.history` or `conversations.replies`.
/// Only the fields the counter reads are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub ts: String,
    pub text: Option<String>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    pub reply_count: Option<u64>,
    pub subtype: Option<String>,
}

impl Message {
    /// A reply that was also sent to the channel. The copy in the channel
    /// timeline duplicates the one inside the thread.
    pub fn is_thread_broadcast(&self) -> bool {
        self.subtype.as_deref() == Some(THREAD_BROADCAST)
    }

    pub fn has_replies(&self) -> bool {
        self.reply_count.is_some_and(|count| count > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reaction {
    pub name: String,
    #[serde(default)]
    pub count: u64,
}

/// Target of an `emoji.list` entry: either an uploaded image or an alias of
/// another emoji, marked by the `alias:` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum EmojiRef {
    Image(String),
    Alias(String),
}

impl From<String> for EmojiRef {
    fn from(value: String) -> Self {
        match value.strip_prefix(ALIAS_MARKER) {
            Some(target) => EmojiRef::Alias(target.to_string()),
            None => EmojiRef::Image(value),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMetadata {
    pub next_cursor: Option<String>,
}

/// A page of a cursor-paginated list endpoint.
pub trait Paginated: serde::de::DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

fn next_cursor(metadata: Option<ResponseMetadata>) -> Option<String> {
    metadata
        .and_then(|m| m.next_cursor)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct ChannelsPage {
    #[serde(default)]
    pub channels: Vec<Channel>,
    pub response_metadata: Option<ResponseMetadata>,
}

impl Paginated for ChannelsPage {
    type Item = Channel;

    fn into_parts(self) -> (Vec<Channel>, Option<String>) {
        (self.channels, next_cursor(self.response_metadata))
    }
}

/// Messages are kept raw until the page is split so one malformed message
/// does not discard the rest of the page.
#[derive(Debug, Deserialize)]
pub struct MessagesPage {
    #[serde(default)]
    pub messages: Vec<Value>,
    pub response_metadata: Option<ResponseMetadata>,
}

impl Paginated for MessagesPage {
    type Item = Message;

    fn into_parts(self) -> (Vec<Message>, Option<String>) {
        let messages = self
            .messages
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Message>(raw) {
                Ok(message) => Some(message),
                Err(e) => {
                    warn!("skipping malformed message: {}", e);
                    None
                }
            })
            .collect();

        (messages, next_cursor(self.response_metadata))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmojiListResponse {
    #[serde(default)]
    pub emoji: std::collections::HashMap<String, EmojiRef>,
}
