use url::Url;

use crate::error::ApiResult;
use crate::utils::normalize_url;

const STATIC_PREFIXES: &[&str] = &["/_next/", "/static/", "/favicon", "/images/"];

/// Public page that renders the chat widget for a config id.
pub fn embed_url(app_url: &str, widget_id: &str) -> ApiResult<Url> {
    let mut url = Url::parse(&normalize_url(app_url))?;
    url.set_path("/widget");
    url.query_pairs_mut().clear().append_pair("id", widget_id);
    Ok(url)
}

pub fn iframe_snippet(app_url: &str, widget_id: &str) -> ApiResult<String> {
    let src = embed_url(app_url, widget_id)?;
    Ok(format!(
        r#"<iframe src="{}" style="position:fixed;bottom:20px;right:20px;width:380px;height:600px;border:none;z-index:9999" allow="clipboard-write"></iframe>"#,
        src
    ))
}

/// Paths reachable without a session.
pub fn is_public_route(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path == "/widget"
        || path.starts_with("/widget/")
        || STATIC_PREFIXES.iter().any(|p| path.starts_with(p))
}
