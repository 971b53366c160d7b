use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::Result;

/// Feishu chat id (opaque string, e.g. `oc_...`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

/// Feishu message id issued by the send endpoint (e.g. `om_...`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// A group chat the bot has joined, as returned by the list endpoint.
///
/// Snapshots are advisory: membership can change between calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    pub chat_id: ChatId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub owner_open_id: Option<String>,
}

/// User details from the contact batch-get endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub open_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Where the bytes of an image to upload come from.
#[derive(Clone, Debug)]
pub enum ImageSource {
    Url(String),
    Bytes(Vec<u8>),
}

impl From<&str> for ImageSource {
    fn from(url: &str) -> Self {
        ImageSource::Url(url.to_string())
    }
}

impl From<String> for ImageSource {
    fn from(url: String) -> Self {
        ImageSource::Url(url)
    }
}

impl From<Vec<u8>> for ImageSource {
    fn from(bytes: Vec<u8>) -> Self {
        ImageSource::Bytes(bytes)
    }
}

impl From<&[u8]> for ImageSource {
    fn from(bytes: &[u8]) -> Self {
        ImageSource::Bytes(bytes.to_vec())
    }
}

/// Message body for the send endpoint.
///
/// The wire shape is fixed by the API: `msg_type` plus either a
/// `content` object or, for interactive cards, a `card` object with
/// `update_multi`.
#[derive(Clone, Debug)]
pub enum MessagePayload {
    Text { text: String },
    Image { image_key: String },
    Post { title: String, content: Value },
    Card { card: Value, update_multi: bool },
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePayload::Text { text: text.into() }
    }

    pub fn image(image_key: impl Into<String>) -> Self {
        MessagePayload::Image {
            image_key: image_key.into(),
        }
    }

    pub fn msg_type(&self) -> &'static str {
        match self {
            MessagePayload::Text { .. } => "text",
            MessagePayload::Image { .. } => "image",
            MessagePayload::Post { .. } => "post",
            MessagePayload::Card { .. } => "interactive",
        }
    }

    /// Full request body for one target chat.
    pub(crate) fn to_body(&self, chat_id: &ChatId) -> Value {
        let mut body = serde_json::Map::new();
        body.insert("chat_id".to_string(), json!(chat_id.0));
        body.insert("msg_type".to_string(), json!(self.msg_type()));
        match self {
            MessagePayload::Text { text } => {
                body.insert("content".to_string(), json!({ "text": text }));
            }
            MessagePayload::Image { image_key } => {
                body.insert("content".to_string(), json!({ "image_key": image_key }));
            }
            MessagePayload::Post { title, content } => {
                body.insert(
                    "content".to_string(),
                    json!({ "post": { "zh_cn": { "title": title, "content": content } } }),
                );
            }
            MessagePayload::Card { card, update_multi } => {
                body.insert("card".to_string(), card.clone());
                body.insert("update_multi".to_string(), json!(update_multi));
            }
        }
        Value::Object(body)
    }
}

/// Outcome of one send attempt. Order matches the resolved target
/// list, and one failed target never aborts the others.
#[derive(Debug)]
pub struct SendResult {
    pub chat_id: ChatId,
    pub outcome: Result<MessageId>,
}

impl SendResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}
