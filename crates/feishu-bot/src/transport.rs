use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::{errors::Error, Result};

/// A response before envelope decoding: HTTP status plus the parsed
/// JSON body (`Value::Null` when the body is not JSON, which only
/// happens on error pages).
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub body: Value,
}

/// Port to the remote HTTP API.
///
/// The production implementation is [`ReqwestTransport`]; tests supply
/// fakes so the client's envelope, caching and dispatch logic can be
/// exercised without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    /// JSON request against an API endpoint.
    async fn request_json(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<RawResponse>;

    /// Multipart upload for the media endpoint (`image_type=message`).
    async fn upload_image(&self, url: &str, bearer: &str, image: Vec<u8>) -> Result<RawResponse>;

    /// Plain byte fetch for externally hosted images.
    async fn fetch_bytes(&self, url: &str) -> Result<(u16, Vec<u8>)>;
}

/// reqwest-backed transport used outside of tests.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("feishu-bot-rs/0.1")
            .build()
            .expect("reqwest client build");
        Self { http }
    }

    async fn into_raw(resp: reqwest::Response) -> Result<RawResponse> {
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(transport_err)?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        Ok(RawResponse { status, body })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn request_json(
        &self,
        method: Method,
        url: &str,
        bearer: Option<&str>,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let mut req = self.http.request(method, url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(json) = body {
            req = req.json(json);
        }
        let resp = req.send().await.map_err(transport_err)?;
        Self::into_raw(resp).await
    }

    async fn upload_image(&self, url: &str, bearer: &str, image: Vec<u8>) -> Result<RawResponse> {
        let part = reqwest::multipart::Part::bytes(image)
            .file_name("image")
            .mime_str("application/octet-stream")
            .map_err(|e| Error::Transport(format!("multipart error: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("image_type", "message")
            .part("image", part);

        let resp = self
            .http
            .post(url)
            .bearer_auth(bearer)
            .multipart(form)
            .send()
            .await
            .map_err(transport_err)?;
        Self::into_raw(resp).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<(u16, Vec<u8>)> {
        let resp = self.http.get(url).send().await.map_err(transport_err)?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(transport_err)?;
        Ok((status, bytes.to_vec()))
    }
}

fn transport_err(e: reqwest::Error) -> Error {
    Error::Transport(e.to_string())
}
