use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use tracing::warn;

/// Headers produced while handling a request (cookies, `X-Location`).
///
/// Shared by every clone and child of a context; the HTTP layer copies
/// them onto the outgoing response.
#[derive(Clone, Default)]
pub struct ResponseSink {
    headers: Arc<Mutex<HeaderMap>>,
}

impl ResponseSink {
    pub fn append(&self, name: HeaderName, value: &str) {
        let Ok(value) = HeaderValue::from_str(value) else {
            warn!(header = %name, "dropping invalid header value");
            return;
        };
        if let Ok(mut headers) = self.headers.lock() {
            headers.append(name, value);
        }
    }

    pub fn insert(&self, name: HeaderName, value: &str) {
        let Ok(value) = HeaderValue::from_str(value) else {
            warn!(header = %name, "dropping invalid header value");
            return;
        };
        if let Ok(mut headers) = self.headers.lock() {
            headers.insert(name, value);
        }
    }

    pub fn set_cookie(&self, cookie: &str) {
        self.append(header::SET_COOKIE, cookie);
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }

    /// Snapshot of the collected headers.
    pub fn headers(&self) -> HeaderMap {
        self.headers.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Append the collected headers to `target`.
    pub fn apply_to(&self, target: &mut HeaderMap) {
        for (name, value) in self.headers().iter() {
            target.append(name.clone(), value.clone());
        }
    }
}
