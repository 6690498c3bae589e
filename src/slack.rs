use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::emoji::EmojiCatalog;
use crate::types::{Channel, ChannelsPage, EmojiListResponse, Message, MessagesPage, Paginated};
use crate::{AppError, Result};

const RATE_LIMITED: &str = "ratelimited";
const HTTP_TOO_MANY_REQUESTS: u16 = 429;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ConversationsList,
    ConversationsHistory,
    ConversationsReplies,
    EmojiList,
}

impl Endpoint {
    pub fn method(self) -> &'static str {
        match self {
            Endpoint::ConversationsList => "conversations.list",
            Endpoint::ConversationsHistory => "conversations.history",
            Endpoint::ConversationsReplies => "conversations.replies",
            Endpoint::EmojiList => "emoji.list",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// Outcome of a single Slack Web API request.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply {
    Ok(Value),
    RateLimited,
    Failed(String),
}

impl ApiReply {
    /// Classifies a raw response. Slack reports most failures with HTTP 200
    /// and `"ok": false`, so the body decides unless the status is 429.
    pub fn classify(status: u16, body: &str) -> Self {
        let payload: Option<Value> = serde_json::from_str(body).ok();
        let error_code = payload
            .as_ref()
            .and_then(|p| p.get("error"))
            .and_then(|e| e.as_str())
            .map(str::to_string);

        if status == HTTP_TOO_MANY_REQUESTS || error_code.as_deref() == Some(RATE_LIMITED) {
            return ApiReply::RateLimited;
        }

        match payload {
            Some(p) if p.get("ok") == Some(&Value::Bool(true)) => ApiReply::Ok(p),
            Some(_) => ApiReply::Failed(error_code.unwrap_or_else(|| "unknown_error".to_string())),
            None => ApiReply::Failed(format!("invalid_response (HTTP {})", status)),
        }
    }
}

/// Sends one authenticated GET to a Slack Web API method.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<ApiReply>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: Url, token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AppError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            token: token.to_string(),
        })
    }

    fn endpoint_url(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(endpoint.method())
            .map_err(|e| AppError::InvalidUrl(e.to_string()))?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }
}

impl Transport for HttpTransport {
    async fn get(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<ApiReply> {
        let url = self.endpoint_url(endpoint, params)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AppError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Http(e.to_string()))?;

        Ok(ApiReply::classify(status, &body))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 100,
            delay: Duration::from_secs(5),
        }
    }
}

/// Items drained from a paginated endpoint. `complete` is false when a page
/// failed and the remaining pages were never fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub complete: bool,
}

pub struct SlackClient<T> {
    transport: T,
    retry: RetryPolicy,
    page_limit: u32,
}

impl<T: Transport> SlackClient<T> {
    pub fn new(transport: T, retry: RetryPolicy, page_limit: u32) -> Self {
        Self {
            transport,
            retry,
            page_limit,
        }
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Calls `endpoint`, sleeping and retrying while Slack answers
    /// `ratelimited`. Any other failure is returned on the first attempt.
    pub async fn call(&self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<Value> {
        let max_attempts = self.retry.max_attempts;

        for attempt in 1..=max_attempts {
            match self.transport.get(endpoint, params).await {
                Ok(ApiReply::Ok(payload)) => return Ok(payload),
                Ok(ApiReply::RateLimited) => {
                    warn!(
                        "{} rate limited, waiting {}s ({}/{})",
                        endpoint,
                        self.retry.delay.as_secs(),
                        attempt,
                        max_attempts
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
                Ok(ApiReply::Failed(code)) => {
                    warn!("{} failed: {}", endpoint, code);
                    return Err(AppError::SlackApi {
                        endpoint: endpoint.to_string(),
                        code,
                    });
                }
                Err(e) => {
                    warn!("{} failed: {}", endpoint, e);
                    return Err(e);
                }
            }
        }

        Err(AppError::SlackRateLimit {
            endpoint: endpoint.to_string(),
            attempts: max_attempts,
        })
    }

    /// Checks the token against the two workspace-wide methods the report
    /// depends on. Runs before any data is collected.
    pub async fn verify_token(&self) -> Result<()> {
        let checks: [(Endpoint, Vec<(&str, String)>); 2] = [
            (Endpoint::ConversationsList, vec![("limit", "1".to_string())]),
            (Endpoint::EmojiList, Vec::new()),
        ];

        for (endpoint, params) in checks {
            match self.call(endpoint, &params).await {
                Ok(_) => {}
                Err(AppError::SlackApi { code, .. }) => return Err(AppError::InvalidToken(code)),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    async fn paginate<P: Paginated>(
        &self,
        endpoint: Endpoint,
        params: Vec<(&'static str, String)>,
    ) -> Listing<P::Item> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut page_params = params.clone();
            if let Some(c) = &cursor {
                page_params.push(("cursor", c.clone()));
            }

            let page = self.call(endpoint, &page_params).await.and_then(|payload| {
                serde_json::from_value::<P>(payload).map_err(|e| AppError::JsonParse(e.to_string()))
            });

            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "{} pagination stopped after {} items: {}",
                        endpoint,
                        items.len(),
                        e
                    );
                    return Listing {
                        items,
                        complete: false,
                    };
                }
            };

            let (page_items, next_cursor) = page.into_parts();
            debug!("{}: {} items on page", endpoint, page_items.len());
            items.extend(page_items);

            match next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Listing {
            items,
            complete: true,
        }
    }

    pub async fn fetch_channels(&self) -> Listing<Channel> {
        self.paginate::<ChannelsPage>(
            Endpoint::ConversationsList,
            vec![
                ("types", "public_channel".to_string()),
                ("limit", self.page_limit.to_string()),
            ],
        )
        .await
    }

    pub async fn fetch_history(&self, channel_id: &str) -> Listing<Message> {
        self.paginate::<MessagesPage>(
            Endpoint::ConversationsHistory,
            vec![
                ("channel", channel_id.to_string()),
                ("limit", self.page_limit.to_string()),
            ],
        )
        .await
    }

    /// Fetches a whole thread. The first message returned is the parent.
    /// Slack repeats the parent at the top of every page, so each message
    /// is kept once by `ts`.
    pub async fn fetch_replies(&self, channel_id: &str, ts: &str) -> Listing<Message> {
        let mut listing = self
            .paginate::<MessagesPage>(
                Endpoint::ConversationsReplies,
                vec![
                    ("channel", channel_id.to_string()),
                    ("ts", ts.to_string()),
                    ("limit", self.page_limit.to_string()),
                ],
            )
            .await;

        let mut seen = HashSet::new();
        listing.items.retain(|message| seen.insert(message.ts.clone()));
        listing
    }

    /// Builds the custom emoji catalog. A failed call yields an empty
    /// catalog so counting can still proceed.
    pub async fn fetch_emoji_catalog(&self) -> EmojiCatalog {
        let response = self.call(Endpoint::EmojiList, &[]).await.and_then(|payload| {
            serde_json::from_value::<EmojiListResponse>(payload)
                .map_err(|e| AppError::JsonParse(e.to_string()))
        });

        match response {
            Ok(response) => EmojiCatalog::from_entries(response.emoji),
            Err(e) => {
                warn!("custom emoji list unavailable, counting without it: {}", e);
                EmojiCatalog::default()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{FakeSlack, client};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_endpoint_methods() {
        assert_eq!(Endpoint::ConversationsList.method(), "conversations.list");
        assert_eq!(Endpoint::ConversationsHistory.to_string(), "conversations.history");
        assert_eq!(Endpoint::ConversationsReplies.method(), "conversations.replies");
        assert_eq!(Endpoint::EmojiList.method(), "emoji.list");
    }

    #[test]
    fn test_classify_ok() {
        let reply = ApiReply::classify(200, r#"{"ok":true,"channels":[]}"#);
        assert_eq!(reply, ApiReply::Ok(json!({"ok": true, "channels": []})));
    }

    #[test]
    fn test_classify_ratelimited_body() {
        let reply = ApiReply::classify(200, r#"{"ok":false,"error":"ratelimited"}"#);
        assert_eq!(reply, ApiReply::RateLimited);
    }

    #[test]
    fn test_classify_http_429_without_body() {
        assert_eq!(ApiReply::classify(429, ""), ApiReply::RateLimited);
    }

    #[test]
    fn test_classify_api_error() {
        let reply = ApiReply::classify(200, r#"{"ok":false,"error":"invalid_auth"}"#);
        assert_eq!(reply, ApiReply::Failed("invalid_auth".to_string()));
    }

    #[test]
    fn test_classify_error_without_code() {
        let reply = ApiReply::classify(200, r#"{"ok":false}"#);
        assert_eq!(reply, ApiReply::Failed("unknown_error".to_string()));
    }

    #[test]
    fn test_classify_non_json() {
        let reply = ApiReply::classify(502, "<html>Bad Gateway</html>");
        assert_eq!(
            reply,
            ApiReply::Failed("invalid_response (HTTP 502)".to_string())
        );
    }

    #[tokio::test]
    async fn test_call_retries_rate_limit_then_succeeds() {
        let fake = FakeSlack::new();
        fake.reply(Endpoint::EmojiList, "", ApiReply::RateLimited)
            .reply(Endpoint::EmojiList, "", ApiReply::RateLimited)
            .ok(Endpoint::EmojiList, "", json!({"ok": true, "emoji": {}}));
        let client = client(fake);

        let payload = client.call(Endpoint::EmojiList, &[]).await.unwrap();

        assert_eq!(payload, json!({"ok": true, "emoji": {}}));
        assert_eq!(client.transport().call_count(Endpoint::EmojiList), 3);
    }

    #[tokio::test]
    async fn test_call_gives_up_after_max_attempts() {
        let fake = FakeSlack::new();
        for _ in 0..5 {
            fake.reply(Endpoint::EmojiList, "", ApiReply::RateLimited);
        }
        let client = client(fake);

        let result = client.call(Endpoint::EmojiList, &[]).await;

        assert!(matches!(
            result,
            Err(AppError::SlackRateLimit { attempts: 3, .. })
        ));
        assert_eq!(client.transport().call_count(Endpoint::EmojiList), 3);
    }

    #[tokio::test]
    async fn test_call_does_not_retry_other_errors() {
        let fake = FakeSlack::new();
        fake.reply(
            Endpoint::EmojiList,
            "",
            ApiReply::Failed("missing_scope".to_string()),
        )
        .ok(Endpoint::EmojiList, "", json!({"ok": true}));
        let client = client(fake);

        let result = client.call(Endpoint::EmojiList, &[]).await;

        assert!(matches!(
            result,
            Err(AppError::SlackApi { ref endpoint, ref code })
                if endpoint == "emoji.list" && code == "missing_scope"
        ));
        assert_eq!(client.transport().call_count(Endpoint::EmojiList), 1);
    }

    #[tokio::test]
    async fn test_call_does_not_retry_transport_errors() {
        let fake = FakeSlack::new();
        fake.push(
            Endpoint::EmojiList,
            "",
            Err(AppError::Http("connection reset".to_string())),
        );
        let client = client(fake);

        let result = client.call(Endpoint::EmojiList, &[]).await;

        assert!(matches!(result, Err(AppError::Http(_))));
        assert_eq!(client.transport().call_count(Endpoint::EmojiList), 1);
    }

    #[tokio::test]
    async fn test_verify_token_ok() {
        let fake = FakeSlack::new();
        fake.ok(Endpoint::ConversationsList, "", json!({"ok": true, "channels": []}))
            .ok(Endpoint::EmojiList, "", json!({"ok": true, "emoji": {}}));
        let client = client(fake);

        assert!(client.verify_token().await.is_ok());
    }

    #[tokio::test]
    async fn test_verify_token_invalid() {
        let fake = FakeSlack::new();
        fake.reply(
            Endpoint::ConversationsList,
            "",
            ApiReply::Failed("invalid_auth".to_string()),
        );
        let client = client(fake);

        let result = client.verify_token().await;

        assert!(matches!(result, Err(AppError::InvalidToken(code)) if code == "invalid_auth"));
        assert_eq!(client.transport().call_count(Endpoint::EmojiList), 0);
    }

    #[tokio::test]
    async fn test_fetch_channels_drains_all_pages() {
        let fake = FakeSlack::new();
        fake.ok(
            Endpoint::ConversationsList,
            "",
            json!({
                "ok": true,
                "channels": [{"id": "C1", "name": "general"}, {"id": "C2", "name": "random"}],
                "response_metadata": {"next_cursor": "page2"}
            }),
        )
        .ok(
            Endpoint::ConversationsList,
            "cursor=page2",
            json!({
                "ok": true,
                "channels": [{"id": "C3", "name": "dev"}],
                "response_metadata": {"next_cursor": "page3"}
            }),
        )
        .ok(
            Endpoint::ConversationsList,
            "cursor=page3",
            json!({
                "ok": true,
                "channels": [{"id": "C4", "name": "ops"}],
                "response_metadata": {"next_cursor": ""}
            }),
        );
        let client = client(fake);

        let listing = client.fetch_channels().await;

        assert!(listing.complete);
        let ids: Vec<&str> = listing.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2", "C3", "C4"]);
        assert_eq!(client.transport().call_count(Endpoint::ConversationsList), 3);
    }

    #[tokio::test]
    async fn test_pagination_failure_returns_partial_listing() {
        let fake = FakeSlack::new();
        fake.ok(
            Endpoint::ConversationsHistory,
            "channel=C1",
            json!({
                "ok": true,
                "messages": [{"ts": "1.0"}, {"ts": "2.0"}],
                "response_metadata": {"next_cursor": "next"}
            }),
        )
        .reply(
            Endpoint::ConversationsHistory,
            "channel=C1&cursor=next",
            ApiReply::Failed("internal_error".to_string()),
        );
        let client = client(fake);

        let listing = client.fetch_history("C1").await;

        assert!(!listing.complete);
        assert_eq!(listing.items.len(), 2);
        assert_eq!(client.transport().call_count(Endpoint::ConversationsHistory), 2);
    }

    #[tokio::test]
    async fn test_pagination_survives_rate_limit_mid_stream() {
        let fake = FakeSlack::new();
        fake.ok(
            Endpoint::ConversationsHistory,
            "channel=C1",
            json!({
                "ok": true,
                "messages": [{"ts": "1.0"}],
                "response_metadata": {"next_cursor": "next"}
            }),
        )
        .reply(
            Endpoint::ConversationsHistory,
            "channel=C1&cursor=next",
            ApiReply::RateLimited,
        )
        .ok(
            Endpoint::ConversationsHistory,
            "channel=C1&cursor=next",
            json!({"ok": true, "messages": [{"ts": "2.0"}]}),
        );
        let client = client(fake);

        let listing = client.fetch_history("C1").await;

        assert!(listing.complete);
        let ts: Vec<&str> = listing.items.iter().map(|m| m.ts.as_str()).collect();
        assert_eq!(ts, vec!["1.0", "2.0"]);
    }

    #[tokio::test]
    async fn test_fetch_replies_sends_thread_ts() {
        let fake = FakeSlack::new();
        fake.ok(
            Endpoint::ConversationsReplies,
            "channel=C1&ts=10.0",
            json!({"ok": true, "messages": [{"ts": "10.0"}, {"ts": "11.0"}]}),
        );
        let client = client(fake);

        let listing = client.fetch_replies("C1", "10.0").await;

        assert!(listing.complete);
        assert_eq!(listing.items.len(), 2);
        assert_eq!(
            client.transport().calls(),
            vec![(Endpoint::ConversationsReplies, "channel=C1&ts=10.0".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fetch_replies_keeps_repeated_parent_once() {
        let fake = FakeSlack::new();
        fake.ok(
            Endpoint::ConversationsReplies,
            "channel=C1&ts=10.0",
            json!({
                "ok": true,
                "messages": [{"ts": "10.0", "text": ":wave:"}, {"ts": "11.0"}],
                "response_metadata": {"next_cursor": "p2"}
            }),
        )
        .ok(
            Endpoint::ConversationsReplies,
            "channel=C1&ts=10.0&cursor=p2",
            json!({
                "ok": true,
                "messages": [{"ts": "10.0", "text": ":wave:"}, {"ts": "12.0"}]
            }),
        );
        let client = client(fake);

        let listing = client.fetch_replies("C1", "10.0").await;

        assert!(listing.complete);
        let ts: Vec<&str> = listing.items.iter().map(|m| m.ts.as_str()).collect();
        assert_eq!(ts, vec!["10.0", "11.0", "12.0"]);
    }

    #[tokio::test]
    async fn test_fetch_emoji_catalog_splits_aliases() {
        let fake = FakeSlack::new();
        fake.ok(
            Endpoint::EmojiList,
            "",
            json!({
                "ok": true,
                "emoji": {
                    "partyparrot": "https://emoji.slack-edge.com/T1/partyparrot/1.gif",
                    "pp": "alias:partyparrot",
                    "shipit": "https://emoji.slack-edge.com/T1/shipit/2.png"
                }
            }),
        );
        let client = client(fake);

        let catalog = client.fetch_emoji_catalog().await;

        assert_eq!(catalog.custom_count(), 2);
        assert_eq!(catalog.alias_count(), 1);
        assert!(catalog.is_custom("partyparrot"));
        assert!(!catalog.is_custom("pp"));
        assert_eq!(catalog.canonical_name("pp"), "partyparrot");
    }

    #[tokio::test]
    async fn test_fetch_emoji_catalog_failure_is_empty() {
        let client = client(FakeSlack::new());

        let catalog = client.fetch_emoji_catalog().await;

        assert_eq!(catalog.custom_count(), 0);
        assert_eq!(catalog.alias_count(), 0);
    }

    #[tokio::test]
    async fn test_http_transport_sends_bearer_and_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/conversations.history")
            .match_header("authorization", "Bearer xoxb-test")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("channel".into(), "C1".into()),
                mockito::Matcher::UrlEncoded("limit".into(), "200".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"messages":[]}"#)
            .create_async()
            .await;
        let base = Url::parse(&format!("{}/api/", server.url())).unwrap();
        let transport = HttpTransport::new(base, "xoxb-test").unwrap();

        let reply = transport
            .get(
                Endpoint::ConversationsHistory,
                &[("channel", "C1".to_string()), ("limit", "200".to_string())],
            )
            .await
            .unwrap();

        assert_eq!(reply, ApiReply::Ok(json!({"ok": true, "messages": []})));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_transport_maps_429_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/emoji.list")
            .with_status(429)
            .with_header("retry-after", "5")
            .create_async()
            .await;
        let base = Url::parse(&format!("{}/api/", server.url())).unwrap();
        let transport = HttpTransport::new(base, "xoxb-test").unwrap();

        let reply = transport.get(Endpoint::EmojiList, &[]).await.unwrap();

        assert_eq!(reply, ApiReply::RateLimited);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_transport_and_client_retry_together() {
        let mut server = mockito::Server::new_async().await;
        let limited = server
            .mock("GET", "/api/emoji.list")
            .with_status(200)
            .with_body(r#"{"ok":false,"error":"ratelimited"}"#)
            .expect(1)
            .create_async()
            .await;
        let base = Url::parse(&format!("{}/api/", server.url())).unwrap();
        let transport = HttpTransport::new(base, "xoxb-test").unwrap();
        let client = SlackClient::new(
            transport,
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::ZERO,
            },
            200,
        );

        let result = client.call(Endpoint::EmojiList, &[]).await;

        assert!(matches!(result, Err(AppError::SlackRateLimit { .. })));
        limited.assert_async().await;
    }
}
