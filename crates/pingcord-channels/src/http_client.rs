//! Discord REST client with a run-wide rate-limit gate.
//!
//! Every outbound call goes through the same composition, in this order:
//!
//! 1. take the gate (`tokio::sync::Mutex<()>`, FIFO), so at most one call is
//!    in flight for the whole client
//! 2. issue the call; if the body carries `retry_after`, sleep that long
//!    *while still holding the gate* and issue the same call once more
//! 3. log any error payload and hand the response back to the caller
//!
//! A second `retry_after` is not retried: it is the call's final result.
//! Error payloads are observational; only transport failures are `Err`.
//!
//! The underlying `reqwest::Client` is created on first use and released by
//! `close()`. After `close()`, in-flight and future calls fail with
//! `SendError::Transport`.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use pingcord_core::config::DiscordConfig;
use pingcord_core::Recipient;

use crate::dm_cache::DmChannelCache;
use crate::error::SendError;

// ─────────────────────────────────────────────
// ApiResponse
// ─────────────────────────────────────────────

/// A decoded platform response: HTTP status plus the JSON body.
///
/// A body that is empty or not JSON decodes to `Value::Null`.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn from_text(status: u16, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text).unwrap_or_else(|e| {
                warn!(status, error = %e, "discord response body is not JSON");
                Value::Null
            })
        };
        Self { status, body }
    }

    /// Wait requested by a rate-limit rejection. Negative values count as no
    /// wait; values too large for a `Duration` saturate at `Duration::MAX`.
    pub fn retry_after(&self) -> Option<Duration> {
        let secs = self.body.get("retry_after")?.as_f64()?;
        if secs.is_nan() || secs <= 0.0 {
            return Some(Duration::ZERO);
        }
        Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
    }

    /// Object id (message or channel) if the platform returned one.
    pub fn id(&self) -> Option<String> {
        match self.body.get("id")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Human-readable error description, if this response carries one.
    pub fn error_summary(&self) -> Option<String> {
        let errors = self.body.get("errors");
        let is_error_status = self.status >= 400 && self.body.get("retry_after").is_none();
        if errors.is_none() && !is_error_status {
            return None;
        }

        let message = self
            .body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("request failed");
        let mut summary = format!("HTTP {}: {}", self.status, message);
        if let Some(code) = self.body.get("code") {
            summary.push_str(&format!(" (code {code})"));
        }
        if let Some(errors) = errors {
            summary.push_str(&format!(" {errors}"));
        }
        Some(summary)
    }
}

// ─────────────────────────────────────────────
// DiscordHttpClient
// ─────────────────────────────────────────────

enum Session {
    Idle,
    Open(reqwest::Client),
    Closed,
}

/// Single point of contact with the Discord REST API.
pub struct DiscordHttpClient {
    /// Versioned API root, e.g. `https://discord.com/api/v10`.
    api_url: String,
    token: String,
    user_agent: String,
    timeout: Duration,
    max_message_len: usize,
    /// Lazily created HTTP session.
    session: Mutex<Session>,
    /// Rate-limit gate shared by every outbound call.
    gate: tokio::sync::Mutex<()>,
    /// Wakes in-flight calls when the client is closed.
    closed: Notify,
    dm_channels: DmChannelCache,
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("api_url", &self.api_url)
            .field("user_agent", &self.user_agent)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl DiscordHttpClient {
    /// Create a client. No connection is made until the first call.
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            api_url: config.api_url(),
            token: config.token.clone(),
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_message_len: config.max_message_len,
            session: Mutex::new(Session::Idle),
            gate: tokio::sync::Mutex::new(()),
            closed: Notify::new(),
            dm_channels: DmChannelCache::new(),
        }
    }

    /// Longest content a single message may carry.
    pub fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    pub fn dm_channels(&self) -> &DmChannelCache {
        &self.dm_channels
    }

    fn endpoint(&self, route: &str) -> String {
        format!("{}/{}", self.api_url, route)
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the HTTP session, creating it on first use.
    fn session(&self) -> Result<reqwest::Client, SendError> {
        let mut session = self.lock_session();
        match &*session {
            Session::Open(client) => return Ok(client.clone()),
            Session::Closed => {
                return Err(SendError::Transport("discord client is closed".into()));
            }
            Session::Idle => {}
        }

        let client = self.build_http()?;
        debug!(api_url = %self.api_url, "opened discord http session");
        *session = Session::Open(client.clone());
        Ok(client)
    }

    fn build_http(&self) -> Result<reqwest::Client, SendError> {
        let mut auth = HeaderValue::from_str(&format!("Bot {}", self.token))
            .map_err(|e| SendError::Transport(format!("invalid bot token header: {e}")))?;
        auth.set_sensitive(true);
        let agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| SendError::Transport(format!("invalid user agent header: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(USER_AGENT, agent);

        Ok(reqwest::Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()?)
    }

    /// Release the HTTP session. Idempotent; safe if no session was opened.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.lock_session(), Session::Closed);
        self.closed.notify_waiters();
        if let Session::Open(_) = previous {
            info!("discord http session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.lock_session(), Session::Closed)
    }

    // ── dispatch ──

    /// Gate → call → one wait-and-retry → log.
    async fn dispatch(&self, op: &'static str, url: &str, body: &Value) -> Result<ApiResponse, SendError> {
        let _gate = self.gate.lock().await;

        let mut response = self.execute(op, url, body).await?;
        if let Some(wait) = response.retry_after() {
            warn!(
                op,
                retry_after_s = wait.as_secs_f64(),
                "discord rate limited, retrying once"
            );
            self.pause(wait).await?;
            response = self.execute(op, url, body).await?;
            if let Some(wait) = response.retry_after() {
                warn!(
                    op,
                    retry_after_s = wait.as_secs_f64(),
                    "discord rate limited again, giving up on this call"
                );
            }
        }

        if let Some(summary) = response.error_summary() {
            warn!(op, error = %summary, "discord api returned an error payload");
        }
        Ok(response)
    }

    /// Issue one HTTP call, aborting if the client is closed meanwhile.
    async fn execute(&self, op: &'static str, url: &str, body: &Value) -> Result<ApiResponse, SendError> {
        let closed = self.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();

        let http = self.session()?;
        debug!(op, url, "discord api call");

        let call = async {
            let resp = http.post(url).json(body).send().await?;
            let status = resp.status().as_u16();
            let text = resp.text().await?;
            Ok::<_, SendError>(ApiResponse::from_text(status, &text))
        };

        tokio::select! {
            result = call => result,
            _ = closed => Err(SendError::Transport(format!("discord client closed during {op}"))),
        }
    }

    /// Sleep out a retry interval; the gate stays held by the caller.
    async fn pause(&self, wait: Duration) -> Result<(), SendError> {
        let closed = self.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();

        if self.is_closed() {
            return Err(SendError::Transport("discord client is closed".into()));
        }

        tokio::select! {
            _ = tokio::time::sleep(wait) => Ok(()),
            _ = closed => Err(SendError::Transport("discord client closed during rate-limit wait".into())),
        }
    }

    // ── platform operations ──

    /// Create (or fetch) the DM channel with a user.
    ///
    /// <https://discord.com/developers/docs/resources/user#create-dm>
    pub async fn create_dm(&self, user_id: &str) -> Result<ApiResponse, SendError> {
        let url = self.endpoint("users/@me/channels");
        self.dispatch("create_dm", &url, &json!({ "recipient_id": user_id }))
            .await
    }

    /// Post a text message to a channel.
    ///
    /// <https://discord.com/developers/docs/resources/channel#create-message>
    pub async fn create_message(&self, channel_id: &str, content: &str) -> Result<ApiResponse, SendError> {
        let url = self.endpoint(&format!("channels/{channel_id}/messages"));
        self.dispatch("create_message", &url, &json!({ "content": content }))
            .await
    }

    /// Resolve a user's DM channel, hitting the API at most once per user.
    ///
    /// `Ok(None)` means the platform refused; that outcome is cached too.
    pub async fn resolve_channel(&self, user_id: &str) -> Result<Option<String>, SendError> {
        self.dm_channels
            .get_or_resolve(user_id, move || async move {
                Ok(self.create_dm(user_id).await?.id())
            })
            .await
    }

    /// Post `content` to `channel_id`. True only if the platform returned a
    /// message id.
    pub async fn post_message(&self, channel_id: &str, content: &str) -> Result<bool, SendError> {
        let response = self.create_message(channel_id, content).await?;
        Ok(response.id().is_some())
    }

    /// Deliver `content` to a recipient, resolving a DM channel for users.
    pub async fn send_to(&self, recipient: &Recipient, content: &str) -> Result<bool, SendError> {
        let channel_id = if recipient.is_user() {
            match self.resolve_channel(recipient.id()).await? {
                Some(id) => id,
                None => {
                    debug!(recipient = %recipient, "no dm channel, message not sent");
                    return Ok(false);
                }
            }
        } else {
            recipient.id().to_string()
        };

        let delivered = self.post_message(&channel_id, content).await?;
        if !delivered {
            warn!(recipient = %recipient, channel_id = %channel_id, "discord did not accept message");
        }
        Ok(delivered)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> DiscordHttpClient {
        let config = DiscordConfig {
            api_base: server.uri(),
            api_version: String::new(),
            ..DiscordConfig::with_token("test-token")
        };
        DiscordHttpClient::new(&config)
    }

    fn ok_message(id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "id": id, "content": "x" }))
    }

    fn rate_limited(secs: f64) -> ResponseTemplate {
        ResponseTemplate::new(429).set_body_json(json!({
            "message": "You are being rate limited.",
            "retry_after": secs,
            "global": false
        }))
    }

    // ── ApiResponse ──

    #[test]
    fn test_response_id_string_or_number() {
        assert_eq!(ApiResponse::new(200, json!({"id": "123"})).id().as_deref(), Some("123"));
        assert_eq!(ApiResponse::new(200, json!({"id": 123})).id().as_deref(), Some("123"));
        assert_eq!(ApiResponse::new(200, json!({"id": ""})).id(), None);
        assert_eq!(ApiResponse::new(200, json!({})).id(), None);
        assert_eq!(ApiResponse::new(200, Value::Null).id(), None);
    }

    #[test]
    fn test_response_retry_after() {
        let r = ApiResponse::new(429, json!({"retry_after": 0.5}));
        assert_eq!(r.retry_after(), Some(Duration::from_millis(500)));
        let r = ApiResponse::new(429, json!({"retry_after": -3}));
        assert_eq!(r.retry_after(), Some(Duration::ZERO));
        assert_eq!(ApiResponse::new(200, json!({"id": "1"})).retry_after(), None);
    }

    #[test]
    fn test_response_huge_retry_after_saturates() {
        let r = ApiResponse::new(429, json!({"retry_after": 1e20}));
        assert_eq!(r.retry_after(), Some(Duration::MAX));
        let r = ApiResponse::new(429, json!({"retry_after": f64::MAX}));
        assert_eq!(r.retry_after(), Some(Duration::MAX));
    }

    #[test]
    fn test_response_error_summary() {
        let r = ApiResponse::new(
            400,
            json!({"message": "Invalid Form Body", "code": 50035, "errors": {"content": {}}}),
        );
        let summary = r.error_summary().unwrap();
        assert!(summary.contains("Invalid Form Body"));
        assert!(summary.contains("50035"));
        assert!(ApiResponse::new(200, json!({"id": "1"})).error_summary().is_none());
        assert!(ApiResponse::new(429, json!({"retry_after": 1.0})).error_summary().is_none());
    }

    #[test]
    fn test_response_non_json_body() {
        let r = ApiResponse::from_text(502, "<html>bad gateway</html>");
        assert_eq!(r.body, Value::Null);
        assert!(r.id().is_none());
    }

    // ── HTTP behavior ──

    #[tokio::test]
    async fn test_post_message_success_sends_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/C1/messages"))
            .and(header("authorization", "Bot test-token"))
            .and(header("user-agent", DiscordConfig::default().user_agent.as_str()))
            .and(body_json(json!({ "content": "hello" })))
            .respond_with(ok_message("m1"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert!(client.post_message("C1", "hello").await.unwrap());
    }

    #[tokio::test]
    async fn test_post_message_error_payload_is_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/C1/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Invalid Form Body",
                "code": 50035,
                "errors": { "content": { "_errors": [{ "code": "BASE_TYPE_MAX_LENGTH" }] } }
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert!(!client.post_message("C1", "hello").await.unwrap());
    }

    #[tokio::test]
    async fn test_retry_after_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/C1/messages"))
            .respond_with(rate_limited(0.5))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/C1/messages"))
            .respond_with(ok_message("123"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let start = Instant::now();
        assert!(client.post_message("C1", "hi").await.unwrap());
        assert!(start.elapsed() >= Duration::from_millis(500));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn test_second_rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/C1/messages"))
            .respond_with(rate_limited(0.05))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert!(!client.post_message("C1", "hi").await.unwrap());
    }

    #[tokio::test]
    async fn test_gate_serializes_concurrent_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok_message("m").set_delay(Duration::from_millis(150)))
            .expect(3)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let start = Instant::now();
        let (a, b, c) = tokio::join!(
            client.post_message("A", "1"),
            client.post_message("B", "2"),
            client.post_message("C", "3"),
        );
        assert!(a.unwrap() && b.unwrap() && c.unwrap());
        // Overlapping calls would finish in ~150ms.
        assert!(start.elapsed() >= Duration::from_millis(450));

        let paths: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(
            paths,
            vec!["/channels/A/messages", "/channels/B/messages", "/channels/C/messages"]
        );
    }

    #[tokio::test]
    async fn test_gate_held_during_retry_wait() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/A/messages"))
            .respond_with(rate_limited(0.4))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ok_message("m"))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let start = Instant::now();
        let (a, b_done) = tokio::join!(client.post_message("A", "1"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let ok = client.post_message("B", "2").await.unwrap();
            (ok, start.elapsed())
        });

        assert!(a.unwrap());
        assert!(b_done.0);
        // B waited for A's rate-limit sleep and retry.
        assert!(b_done.1 >= Duration::from_millis(400));

        let paths: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(
            paths,
            vec!["/channels/A/messages", "/channels/A/messages", "/channels/B/messages"]
        );
    }

    #[tokio::test]
    async fn test_close_interrupts_saturated_retry_wait() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rate_limited(1e20))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let (result, _) = tokio::join!(client.post_message("C1", "hi"), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            client.close();
        });
        assert!(result.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_resolve_channel_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .and(body_json(json!({ "recipient_id": "U1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "DM1", "type": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert_eq!(client.resolve_channel("U1").await.unwrap().as_deref(), Some("DM1"));
        assert_eq!(client.resolve_channel("U1").await.unwrap().as_deref(), Some("DM1"));
    }

    #[tokio::test]
    async fn test_concurrent_resolve_issues_one_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "DM1" }))
                    .set_delay(Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let (a, b) = tokio::join!(client.resolve_channel("U1"), client.resolve_channel("U1"));
        assert_eq!(a.unwrap().as_deref(), Some("DM1"));
        assert_eq!(b.unwrap().as_deref(), Some("DM1"));
    }

    #[tokio::test]
    async fn test_failed_resolution_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Cannot send messages to this user",
                "code": 50007
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let user = Recipient::user("U9");
        assert!(!client.send_to(&user, "a").await.unwrap());
        assert!(!client.send_to(&user, "b").await.unwrap());
    }

    #[tokio::test]
    async fn test_send_to_user_resolves_then_posts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/@me/channels"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "DM1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/DM1/messages"))
            .respond_with(ok_message("m1"))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server);
        let user = Recipient::user("U1");
        assert!(client.send_to(&user, "one").await.unwrap());
        assert!(client.send_to(&user, "two").await.unwrap());
    }

    #[tokio::test]
    async fn test_send_to_channel_posts_directly() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/C7/messages"))
            .respond_with(ok_message("m1"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert!(client.send_to(&Recipient::channel("C7"), "hi").await.unwrap());
        assert!(client.dm_channels().is_empty().await);
    }

    #[tokio::test]
    async fn test_network_error_is_transport() {
        let config = DiscordConfig {
            api_base: "http://127.0.0.1:1".into(),
            api_version: String::new(),
            timeout_secs: 2,
            ..DiscordConfig::with_token("t")
        };
        let client = DiscordHttpClient::new(&config);
        let err = client.post_message("C1", "hi").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_fails_later_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok_message("m"))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.close();
        client.close();
        assert!(client.is_closed());

        let err = client.post_message("C1", "hi").await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_close_interrupts_rate_limit_wait() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rate_limited(30.0))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let start = Instant::now();
        let (result, _) = tokio::join!(client.post_message("C1", "hi"), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            client.close();
        });
        assert!(result.unwrap_err().is_transport());
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
