use std::sync::{Mutex, MutexGuard};
use url::Url;

use crate::error::ApiResult;

const API_SUFFIX: &str = "/api/v1";

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Ensures the REST base ends in `/api/v1`.
pub fn api_base(base_url: &str) -> String {
    let trimmed = normalize_url(base_url);
    if trimmed.ends_with(API_SUFFIX) { trimmed } else { format!("{}{}", trimmed, API_SUFFIX) }
}

/// Socket server root: the API base with its `/api/v1` suffix stripped.
pub fn socket_base_url(api_base_url: &str) -> String {
    let trimmed = normalize_url(api_base_url);
    match trimmed.strip_suffix(API_SUFFIX) {
        Some(root) => root.to_string(),
        None => trimmed,
    }
}

/// Engine.IO websocket endpoint for a socket server root.
pub fn socket_endpoint(base: &str) -> ApiResult<Url> {
    let mut url = Url::parse(&normalize_url(base))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    // http(s) -> ws(s) is always a permitted scheme change
    let _ = url.set_scheme(scheme);
    url.set_path("/socket.io/");
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}

/// Locks shared view state. A panic inside a listener must not wedge the
/// view, so poisoning is ignored.
pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
