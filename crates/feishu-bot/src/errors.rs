/// Feishu envelope code reported when the tenant access token has been
/// invalidated server-side. The cache drops the token and the request
/// is retried once with a fresh one.
pub(crate) const TOKEN_INVALID_CODE: i64 = 99991663;

/// Error type for the Feishu bot client.
///
/// Validation errors are raised before any network call and are never
/// retried; per-target send failures are reported through `SendResult`
/// rather than through this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("auth failed: {0}")]
    Auth(String),

    #[error("api error: {msg} (status={status} code={code})")]
    Api { status: u16, code: i64, msg: String },

    #[error("fetch failed: {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether a failed request may be re-issued: server-side errors,
    /// plain transport failures, and the invalidated-token envelope
    /// code (the retry picks up a fresh token).
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Api { status, code, .. } => *status >= 500 || *code == TOKEN_INVALID_CODE,
            Error::Transport(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_token_invalidation_are_retryable() {
        let e = Error::Api {
            status: 502,
            code: 0,
            msg: "bad gateway".to_string(),
        };
        assert!(e.is_retryable());

        let e = Error::Api {
            status: 200,
            code: TOKEN_INVALID_CODE,
            msg: "tenant access token invalid".to_string(),
        };
        assert!(e.is_retryable());

        assert!(Error::Transport("connection reset".to_string()).is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let e = Error::Api {
            status: 400,
            code: 10002,
            msg: "invalid chat_id".to_string(),
        };
        assert!(!e.is_retryable());
        assert!(!Error::Validation("empty image_key".to_string()).is_retryable());
        assert!(!Error::Auth("app_secret rejected".to_string()).is_retryable());
    }
}
