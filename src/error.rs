use thiserror::Error;

/// Coarse classification of an [`ApiError`], for views picking a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Status,
    Unauthorized,
    NotFound,
    Decode,
    Cancelled,
    Transport,
    Config,
    Cache,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("not authorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("socket error: {0}")]
    Transport(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(#[from] rusqlite::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Status { .. } => ErrorKind::Status,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Decode(_) => ErrorKind::Decode,
            ApiError::Cancelled => ErrorKind::Cancelled,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::InvalidUrl(_) | ApiError::Config(_) => ErrorKind::Config,
            ApiError::Cache(_) => ErrorKind::Cache,
        }
    }

    /// Worth offering a manual "Retry" for.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Text for an error banner. Server-provided messages are passed through.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { body, status } => server_message(body)
                .unwrap_or_else(|| format!("Request failed with status {status}")),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".into(),
            ApiError::Network(_) => "Could not reach the server. Check your connection.".into(),
            other => other.to_string(),
        }
    }
}

fn server_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    json.get("message")
        .or_else(|| json.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Fallback policies for views that would rather degrade than show an error.
pub trait ApiResultExt<T> {
    /// Logs the error and returns `fallback`. Cancellation is logged at debug.
    fn or_fallback(self, what: &str, fallback: T) -> T;
}

impl<T> ApiResultExt<T> for ApiResult<T> {
    fn or_fallback(self, what: &str, fallback: T) -> T {
        match self {
            Ok(v) => v,
            Err(ApiError::Cancelled) => {
                log::debug!("{what}: cancelled, using fallback");
                fallback
            }
            Err(e) => {
                log::warn!("{what}: {e}; using fallback");
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_surface_server_message() {
        let err = ApiError::Status {
            status: 422,
            body: r#"{"message":"Place not found"}"#.into(),
        };
        assert_eq!(err.user_message(), "Place not found");
        assert_eq!(err.kind(), ErrorKind::Status);
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = ApiError::Status { status: 503, body: String::new() };
        assert!(err.is_retryable());
        assert_eq!(err.user_message(), "Request failed with status 503");
    }

    #[test]
    fn fallback_replaces_errors() {
        let res: ApiResult<Vec<u32>> = Err(ApiError::NotFound("settings".into()));
        assert_eq!(res.or_fallback("settings", vec![1]), vec![1]);
        let res: ApiResult<Vec<u32>> = Ok(vec![2]);
        assert_eq!(res.or_fallback("settings", vec![1]), vec![2]);
    }
}
