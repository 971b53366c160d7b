use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{debug, warn};

use crate::{
    auth::{IssuedToken, TokenCache},
    config::{BotConfig, Credentials},
    domain::{ChatId, Group, ImageSource, MessageId, MessagePayload, SendResult, UserInfo},
    errors::{Error, TOKEN_INVALID_CODE},
    selector::GroupSelector,
    transport::{RawResponse, ReqwestTransport, Transport},
    Result,
};

const AUTH_ENDPOINT: &str = "/auth/v3/app_access_token/internal/";
const GROUP_LIST_ENDPOINT: &str = "/chat/v4/list";
const USER_BATCH_GET_ENDPOINT: &str = "/contact/v1/user/batch_get";
const IMAGE_UPLOAD_ENDPOINT: &str = "/image/v4/put/";
const MESSAGE_SEND_ENDPOINT: &str = "/message/v4/send/";

struct CacheEntry<T> {
    data: T,
    at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(data: T) -> Self {
        Self {
            data,
            at: Instant::now(),
        }
    }

    fn fresh(&self, ttl: Duration) -> bool {
        !ttl.is_zero() && self.at.elapsed() < ttl
    }
}

/// Client for a Feishu bot app.
///
/// Owns the credentials, the access-token cache and the advisory
/// group/user caches. Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct FeishuBot {
    inner: Arc<Inner>,
}

struct Inner {
    credentials: Credentials,
    config: BotConfig,
    transport: Arc<dyn Transport>,
    token: TokenCache,
    groups: Mutex<Option<CacheEntry<Vec<Group>>>>,
    users: Mutex<HashMap<String, CacheEntry<UserInfo>>>,
}

#[derive(Deserialize)]
struct AuthResponse {
    tenant_access_token: String,
    #[serde(default = "default_expire")]
    expire: u64,
}

fn default_expire() -> u64 {
    7200
}

#[derive(Deserialize)]
struct GroupPage {
    #[serde(default)]
    groups: Vec<Group>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    page_token: Option<String>,
}

impl FeishuBot {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self::with_config(Credentials::new(app_id, app_secret), BotConfig::default())
    }

    pub fn with_config(credentials: Credentials, config: BotConfig) -> Self {
        let transport = Arc::new(ReqwestTransport::new(config.http_timeout));
        Self::with_transport(credentials, config, transport)
    }

    /// Construction seam for custom transports (and test fakes).
    pub fn with_transport(
        credentials: Credentials,
        config: BotConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let token = TokenCache::new(config.token_margin);
        Self {
            inner: Arc::new(Inner {
                credentials,
                config,
                transport,
                token,
                groups: Mutex::new(None),
                users: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// All groups the bot has joined, in API order, following the
    /// pagination cursor until exhausted. Also refreshes the advisory
    /// cache used for broadcast sends.
    pub async fn get_groups(&self) -> Result<Vec<Group>> {
        let mut groups: Vec<Group> = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![(
                "page_size".to_string(),
                self.inner.config.page_size.to_string(),
            )];
            if let Some(t) = page_token.as_ref() {
                query.push(("page_token".to_string(), t.clone()));
            }
            let resp = self
                .authed(Method::GET, GROUP_LIST_ENDPOINT, &query, None)
                .await?;
            let page: GroupPage = serde_json::from_value(data_field(resp)?)?;
            groups.extend(page.groups);
            page_token = page.page_token.filter(|t| !t.is_empty());
            if !page.has_more || page_token.is_none() {
                break;
            }
        }
        debug!(count = groups.len(), "listed joined groups");

        *self.inner.groups.lock().await = Some(CacheEntry::new(groups.clone()));
        Ok(groups)
    }

    /// User details for one open_id, cached per id.
    pub async fn get_user(&self, open_id: &str) -> Result<UserInfo> {
        if open_id.trim().is_empty() {
            return Err(Error::Validation("empty open_id".to_string()));
        }
        {
            let users = self.inner.users.lock().await;
            if let Some(entry) = users.get(open_id) {
                if entry.fresh(self.inner.config.user_cache_ttl) {
                    return Ok(entry.data.clone());
                }
            }
        }

        let query = vec![("open_ids".to_string(), open_id.to_string())];
        let resp = self
            .authed(Method::GET, USER_BATCH_GET_ENDPOINT, &query, None)
            .await?;

        #[derive(Deserialize)]
        struct UserData {
            #[serde(default)]
            user_infos: Vec<UserInfo>,
        }
        let data: UserData = serde_json::from_value(data_field(resp)?)?;
        let user = data.user_infos.into_iter().next().ok_or_else(|| Error::Api {
            status: 200,
            code: 0,
            msg: format!("no user info for {open_id}"),
        })?;

        self.inner
            .users
            .lock()
            .await
            .insert(open_id.to_string(), CacheEntry::new(user.clone()));
        Ok(user)
    }

    /// Upload an image (from a URL or raw bytes) to the media
    /// endpoint; the returned `image_key` is referenced by
    /// [`send_image`](Self::send_image).
    pub async fn upload_image(&self, source: impl Into<ImageSource>) -> Result<String> {
        let bytes = match source.into() {
            ImageSource::Bytes(bytes) => bytes,
            ImageSource::Url(url) => self.fetch_image(&url).await?,
        };
        if bytes.is_empty() {
            return Err(Error::Validation("empty image payload".to_string()));
        }

        let url = self.url(IMAGE_UPLOAD_ENDPOINT);
        let resp = RetryIf::spawn(
            self.retry_strategy(),
            || self.upload_attempt(&url, &bytes),
            |e: &Error| e.is_retryable(),
        )
        .await?;

        #[derive(Deserialize)]
        struct UploadData {
            image_key: String,
        }
        let data: UploadData = serde_json::from_value(data_field(resp)?)?;
        debug!(image_key = %data.image_key, "uploaded image");
        Ok(data.image_key)
    }

    /// Send plain text to the selected groups.
    pub async fn send_text(
        &self,
        text: &str,
        groups: impl Into<GroupSelector>,
    ) -> Result<Vec<SendResult>> {
        self.dispatch(MessagePayload::text(text), groups.into()).await
    }

    /// Send a previously uploaded image to the selected groups.
    pub async fn send_image(
        &self,
        image_key: &str,
        groups: impl Into<GroupSelector>,
    ) -> Result<Vec<SendResult>> {
        if image_key.trim().is_empty() {
            return Err(Error::Validation("empty image_key".to_string()));
        }
        self.dispatch(MessagePayload::image(image_key), groups.into())
            .await
    }

    /// Send a rich post (title + content blocks) to the selected
    /// groups.
    pub async fn send_post(
        &self,
        title: &str,
        content: Value,
        groups: impl Into<GroupSelector>,
    ) -> Result<Vec<SendResult>> {
        self.dispatch(
            MessagePayload::Post {
                title: title.to_string(),
                content,
            },
            groups.into(),
        )
        .await
    }

    /// Send an interactive card to the selected groups. `is_shared`
    /// maps to the API's `update_multi` flag.
    pub async fn send_card(
        &self,
        card: Value,
        is_shared: bool,
        groups: impl Into<GroupSelector>,
    ) -> Result<Vec<SendResult>> {
        if !card.is_object() {
            return Err(Error::Validation("card must be a JSON object".to_string()));
        }
        self.dispatch(
            MessagePayload::Card {
                card,
                update_multi: is_shared,
            },
            groups.into(),
        )
        .await
    }

    async fn dispatch(
        &self,
        payload: MessagePayload,
        selector: GroupSelector,
    ) -> Result<Vec<SendResult>> {
        let targets = match selector.explicit_targets() {
            Some(resolved) => resolved?,
            None => self.broadcast_targets().await?,
        };
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        // One up-front token fetch: a dead credential fails the whole
        // call before any per-target attempt.
        self.token().await?;

        let mut handles = Vec::with_capacity(targets.len());
        for chat_id in &targets {
            let bot = self.clone();
            let chat_id = chat_id.clone();
            let payload = payload.clone();
            handles.push(tokio::spawn(async move {
                bot.send_payload(&chat_id, &payload).await
            }));
        }

        let mut results = Vec::with_capacity(targets.len());
        for (chat_id, handle) in targets.into_iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(err) => Err(Error::Transport(format!("send task aborted: {err}"))),
            };
            if let Err(err) = &outcome {
                warn!(chat_id = %chat_id.0, error = %err, "send failed");
            }
            results.push(SendResult { chat_id, outcome });
        }
        Ok(results)
    }

    async fn send_payload(&self, chat_id: &ChatId, payload: &MessagePayload) -> Result<MessageId> {
        let body = payload.to_body(chat_id);
        let resp = self
            .authed(Method::POST, MESSAGE_SEND_ENDPOINT, &[], Some(&body))
            .await?;

        #[derive(Deserialize)]
        struct SendData {
            message_id: MessageId,
        }
        let data: SendData = serde_json::from_value(data_field(resp)?)?;
        Ok(data.message_id)
    }

    /// Broadcast target list: the advisory cache when fresh, otherwise
    /// a live listing. The cache is never authoritative for
    /// `get_groups` itself.
    async fn broadcast_targets(&self) -> Result<Vec<ChatId>> {
        {
            let cache = self.inner.groups.lock().await;
            if let Some(entry) = cache.as_ref() {
                if entry.fresh(self.inner.config.group_cache_ttl) {
                    return Ok(entry.data.iter().map(|g| g.chat_id.clone()).collect());
                }
            }
        }
        Ok(self
            .get_groups()
            .await?
            .into_iter()
            .map(|g| g.chat_id)
            .collect())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let (status, bytes) =
            self.inner
                .transport
                .fetch_bytes(url)
                .await
                .map_err(|e| Error::Fetch {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        if !(200..300).contains(&status) {
            return Err(Error::Fetch {
                url: url.to_string(),
                reason: format!("http status {status}"),
            });
        }
        Ok(bytes)
    }

    async fn token(&self) -> Result<String> {
        self.inner.token.get_or_refresh(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<IssuedToken> {
        let url = self.url(AUTH_ENDPOINT);
        let body = json!({
            "app_id": self.inner.credentials.app_id,
            "app_secret": self.inner.credentials.app_secret,
        });
        let resp = RetryIf::spawn(
            self.retry_strategy(),
            || self.auth_attempt(&url, &body),
            |e: &Error| e.is_retryable(),
        )
        .await
        .map_err(|e| Error::Auth(e.to_string()))?;

        let auth: AuthResponse = serde_json::from_value(resp)
            .map_err(|e| Error::Auth(format!("malformed auth response: {e}")))?;
        Ok(IssuedToken {
            value: auth.tenant_access_token,
            ttl: Duration::from_secs(auth.expire),
        })
    }

    async fn auth_attempt(&self, url: &str, body: &Value) -> Result<Value> {
        let raw = self
            .inner
            .transport
            .request_json(Method::POST, url, None, &[], Some(body))
            .await?;
        // No decode_authed here: the auth call runs while the token
        // slot is locked, and it carries no token to invalidate.
        decode(raw)
    }

    async fn authed(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        RetryIf::spawn(
            self.retry_strategy(),
            || self.authed_attempt(method.clone(), endpoint, query, body),
            |e: &Error| e.is_retryable(),
        )
        .await
    }

    async fn authed_attempt(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let token = self.token().await?;
        let url = self.url(endpoint);
        let raw = self
            .inner
            .transport
            .request_json(method, &url, Some(&token), query, body)
            .await?;
        self.decode_authed(raw).await
    }

    /// Decode an authorized call's response. The token-invalid
    /// envelope code additionally drops the cached token so the
    /// bounded retry re-authenticates.
    async fn decode_authed(&self, raw: RawResponse) -> Result<Value> {
        let decoded = decode(raw);
        if let Err(Error::Api {
            code: TOKEN_INVALID_CODE,
            ..
        }) = &decoded
        {
            self.inner.token.invalidate().await;
        }
        decoded
    }

    async fn upload_attempt(&self, url: &str, bytes: &[u8]) -> Result<Value> {
        let token = self.token().await?;
        let raw = self
            .inner
            .transport
            .upload_image(url, &token, bytes.to_vec())
            .await?;
        self.decode_authed(raw).await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.inner.config.base_url, endpoint)
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        FixedInterval::new(self.inner.config.retry_wait).take(self.inner.config.retry_attempts)
    }
}

/// Decode the fixed `{code, msg, data}` envelope; any non-success
/// HTTP status or `code != 0` is an [`Error::Api`].
fn decode(raw: RawResponse) -> Result<Value> {
    let code = raw.body.get("code").and_then(Value::as_i64).unwrap_or(0);
    let mut msg = raw
        .body
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    if !(200..300).contains(&raw.status) {
        if msg.is_empty() {
            msg = format!("http status {}", raw.status);
        }
        return Err(Error::Api {
            status: raw.status,
            code,
            msg,
        });
    }
    if code != 0 {
        return Err(Error::Api {
            status: raw.status,
            code,
            msg,
        });
    }
    if !raw.body.is_object() {
        return Err(Error::Api {
            status: raw.status,
            code: 0,
            msg: "malformed response envelope".to_string(),
        });
    }
    Ok(raw.body)
}

fn data_field(mut resp: Value) -> Result<Value> {
    resp.get_mut("data").map(Value::take).ok_or_else(|| Error::Api {
        status: 200,
        code: 0,
        msg: "response envelope missing data".to_string(),
    })
}
