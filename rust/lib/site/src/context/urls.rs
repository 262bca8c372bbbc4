//! URL building and redirects relative to the mount prefix.

use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use openerp_core::humanize;

use super::Context;

const X_LOCATION: HeaderName = HeaderName::from_static("x-location");
const X_REQUESTED_WITH: &str = "X-Requested-With";

/// Join path parts with single slashes. The first part keeps its leading
/// slash (or scheme) as given.
fn join_parts(parts: &[&str]) -> String {
    let mut out = String::new();
    for (i, p) in parts.iter().enumerate() {
        if p.is_empty() {
            continue;
        }
        if i == 0 || out.is_empty() {
            out.push_str(p.trim_end_matches('/'));
            if out.is_empty() {
                out.push('/');
            }
            continue;
        }
        let p = p.trim_matches('/');
        if p.is_empty() {
            continue;
        }
        if !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(p);
    }
    out
}

fn is_external(p: &str) -> bool {
    p.starts_with("//") || p.contains("://")
}

/// Resolve `parts` under `prefix`: external URLs are returned unchanged,
/// absolute paths replace the prefix, relative paths are joined under it.
pub fn join_url(prefix: &str, parts: &[&str]) -> String {
    let p = join_parts(parts);
    if is_external(&p) || p.starts_with('/') {
        return p;
    }
    let prefix = prefix.trim_end_matches('/');
    if p.is_empty() {
        return if prefix.is_empty() { "/".to_string() } else { prefix.to_string() };
    }
    format!("{prefix}/{p}")
}

impl Context {
    /// URL under this mount's prefix.
    pub fn gen_url(&self, parts: &[&str]) -> String {
        join_url(self.prefix(), parts)
    }

    /// URL under this mount's static prefix.
    pub fn gen_static_url(&self, parts: &[&str]) -> String {
        join_url(self.static_prefix(), parts)
    }

    /// URL under the top frame's prefix.
    pub fn gen_global_url(&self, parts: &[&str]) -> String {
        join_url(self.top_frame().prefix(), parts)
    }

    /// Redirect to `url`. XHR callers get the target in `X-Location` with
    /// `status` and no redirect.
    pub fn redirect(&self, url: &str, status: StatusCode) -> Response {
        if self.header(X_REQUESTED_WITH).is_some() {
            self.response.insert(X_LOCATION, url);
            return status.into_response();
        }
        let status = if status.is_redirection() { status } else { StatusCode::SEE_OTHER };
        (status, [(header::LOCATION, url.to_string())]).into_response()
    }

    /// Public URL of `key` in a site storage, honouring the per-storage
    /// endpoint override header.
    pub fn storage_url(&self, storage: &str, key: &str) -> Option<String> {
        let site = self.site.as_ref()?;
        let store = site.storage_or_default(storage)?;

        let header_name = format!(
            "X-Ecletus-Oss-Storage-Endpoint-{}-{}-Host",
            humanize(site.name()),
            humanize(storage)
        )
        .replace(' ', "-");

        match self.header(&header_name).filter(|h| !h.is_empty()) {
            Some(host) => {
                let scheme = match self.header("X-Forwarded-Proto") {
                    Some(proto) => proto.to_string(),
                    None => self
                        .original_url()
                        .map(|u| u.scheme().to_string())
                        .unwrap_or_else(|| "http".to_string()),
                };
                Some(store.url_with_endpoint(&scheme, host, key))
            }
            None => Some(store.url(key)),
        }
    }
}
