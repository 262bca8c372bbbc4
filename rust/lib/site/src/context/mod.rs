//! Request context.
//!
//! A [`Context`] carries everything a handler needs about the current
//! request: the owning site and DB, the caller, locale and time zone,
//! and the mount frame chain used to build URLs. Cloning is shallow;
//! [`Context::new_child`] mounts a sub-application under a prefix.

mod frame;
mod locale;
mod response;
mod urls;

use std::sync::{Arc, OnceLock};

use axum::http::{Extensions, HeaderMap, Method, Uri, uri::PathAndQuery};
use openerp_core::Identity;
use tokio_util::sync::CancellationToken;

use crate::db::Db;
use crate::site::Site;
use crate::translator::{SessionManager, Translator};
use crate::tz::TimeZone;

pub use frame::Frame;
pub use locale::{DEFAULT_LOCALE, LOCALE_COOKIE, LOCALE_HEADER};
pub use response::ResponseSink;
pub use urls::join_url;

/// The request as seen at this mount level.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestInfo {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self { method, uri, headers }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        let query = self.uri.query()?;
        ::url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(axum::http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string())
    }

    /// Copy with `prefix` stripped from the URI path.
    fn strip_prefix(&self, prefix: &str) -> RequestInfo {
        let mut out = self.clone();
        out.uri = strip_uri_prefix(&self.uri, prefix);
        out
    }
}

fn strip_uri_prefix(uri: &Uri, prefix: &str) -> Uri {
    if prefix.is_empty() {
        return uri.clone();
    }
    let path = uri.path();
    let rest = match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => return uri.clone(),
    };
    let mut new_path = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
    if let Some(q) = uri.query() {
        new_path.push('?');
        new_path.push_str(q);
    }
    let mut parts = uri.clone().into_parts();
    match PathAndQuery::try_from(new_path) {
        Ok(pq) => parts.path_and_query = Some(pq),
        Err(_) => return uri.clone(),
    }
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}

/// Normalize a mount prefix to `/segment[/segment]`, or empty.
fn mount_path(prefix: &str) -> String {
    let p = prefix.trim_matches('/');
    if p.is_empty() { String::new() } else { format!("/{p}") }
}

#[derive(Clone)]
pub struct Context {
    frame: Arc<Frame>,
    request: Option<RequestInfo>,
    response: ResponseSink,
    site: Option<Arc<Site>>,
    db: Option<Arc<Db>>,
    user: Option<Identity>,
    roles: Vec<String>,
    locale: OnceLock<String>,
    default_locale: Option<String>,
    time_zone: OnceLock<TimeZone>,
    translator: Option<Arc<dyn Translator>>,
    session: Option<Arc<dyn SessionManager>>,
    resource_id: Option<String>,
    parent_resource_ids: Vec<String>,
    extensions: Extensions,
    cancel: CancellationToken,
}

impl Default for Context {
    fn default() -> Self {
        Self::new_top(None)
    }
}

impl Context {
    /// A top context with an empty prefix.
    pub fn new_top(original_url: Option<::url::Url>) -> Self {
        Self {
            frame: Frame::root(original_url, "", ""),
            request: None,
            response: ResponseSink::default(),
            site: None,
            db: None,
            user: None,
            roles: Vec::new(),
            locale: OnceLock::new(),
            default_locale: None,
            time_zone: OnceLock::new(),
            translator: None,
            session: None,
            resource_id: None,
            parent_resource_ids: Vec::new(),
            extensions: Extensions::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Child context mounted at `prefix`. The child's request path has the
    /// prefix stripped; the parent is left untouched.
    pub fn new_child(&self, prefix: &str) -> Context {
        let path = mount_path(prefix);
        let mut child = self.clone();
        child.frame = self.frame.child(&path);
        child.request = self.request.as_ref().map(|r| r.strip_prefix(&path));
        child.cancel = self.cancel.child_token();
        child
    }

    /// Copy flagged as top of its chain.
    pub fn as_top(&self) -> Context {
        let mut c = self.clone();
        c.frame = self.frame.with_top(true);
        c
    }

    pub fn set_top(&mut self, is_top: bool) {
        self.frame = self.frame.with_top(is_top);
    }

    /// Replace this level's URL prefix and static URL prefix.
    pub fn set_prefix(&mut self, prefix: &str, static_url: &str) {
        self.frame = self.frame.with_prefix(prefix, static_url);
    }

    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    pub fn is_top(&self) -> bool {
        self.frame.is_top()
    }

    pub fn top_frame(&self) -> Arc<Frame> {
        self.frame.top()
    }

    pub fn prefix(&self) -> &str {
        self.frame.prefix()
    }

    pub fn static_prefix(&self) -> &str {
        self.frame.static_url()
    }

    pub fn original_url(&self) -> Option<&::url::Url> {
        self.frame.original_url()
    }

    // ── Request / response ──

    pub fn set_request(&mut self, request: RequestInfo) {
        self.request = Some(request);
    }

    pub fn request(&self) -> Option<&RequestInfo> {
        self.request.as_ref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.as_ref()?.header(name)
    }

    /// Request path at this mount level.
    pub fn path(&self) -> &str {
        self.request.as_ref().map(|r| r.path()).unwrap_or("/")
    }

    pub fn response(&self) -> &ResponseSink {
        &self.response
    }

    // ── Site / DB ──

    /// Bind the site and its system DB.
    pub fn with_site(mut self, site: Arc<Site>) -> Self {
        self.set_site(site);
        self
    }

    pub fn set_site(&mut self, site: Arc<Site>) {
        self.db = site.get_system_db();
        self.site = Some(site);
    }

    pub fn site(&self) -> Option<&Arc<Site>> {
        self.site.as_ref()
    }

    pub fn db(&self) -> Option<&Arc<Db>> {
        self.db.as_ref()
    }

    pub fn set_db(&mut self, db: Arc<Db>) {
        self.db = Some(db);
    }

    // ── Caller ──

    /// Set the caller; the selected roles become the caller's roles.
    pub fn set_user(&mut self, user: Identity) {
        self.roles = user.roles.clone();
        self.user = Some(user);
        self.time_zone = OnceLock::new();
    }

    pub fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn set_roles(&mut self, roles: Vec<String>) {
        self.roles = roles;
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    // ── Collaborators ──

    pub fn set_translator(&mut self, translator: Arc<dyn Translator>) {
        self.translator = Some(translator);
    }

    pub fn translator(&self) -> Option<&Arc<dyn Translator>> {
        self.translator.as_ref()
    }

    pub fn set_session_manager(&mut self, session: Arc<dyn SessionManager>) {
        self.session = Some(session);
    }

    pub fn session_manager(&self) -> Option<&Arc<dyn SessionManager>> {
        self.session.as_ref()
    }

    // ── Resource path ──

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn set_resource_id(&mut self, id: impl Into<String>) {
        self.resource_id = Some(id.into());
    }

    pub fn clear_resource_id(&mut self) {
        self.resource_id = None;
    }

    /// ID of the parent resource at `level` (0 is the outermost).
    pub fn parent_resource_id(&self, level: usize) -> Option<&str> {
        self.parent_resource_ids.get(level).map(|s| s.as_str())
    }

    pub fn push_parent_resource_id(&mut self, id: impl Into<String>) {
        self.parent_resource_ids.push(id.into());
    }

    // ── Extensions ──

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn extension_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.extensions.get_mut::<T>()
    }

    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    // ── Cancellation ──

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this context and every child made from it afterwards or before.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("prefix", &self.prefix())
            .field("is_top", &self.is_top())
            .field("site", &self.site.as_ref().map(|s| s.name().to_string()))
            .field("user", &self.user.as_ref().map(|u| u.id.clone()))
            .field("roles", &self.roles)
            .finish()
    }
}
