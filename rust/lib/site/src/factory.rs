//! Builds request contexts from inbound HTTP requests.

use std::sync::Arc;

use axum::http::{Request, header};
use openerp_core::Identity;
use url::Url;

use crate::context::{Context, RequestInfo};
use crate::site::Site;
use crate::translator::Translator;

/// Hook run on every context the factory creates.
pub type AfterCreateHook = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Route state shared by handlers of one request; inserted on the request
/// when no router put one there first.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    pub pattern: Option<String>,
    pub params: Vec<(String, String)>,
}

#[derive(Clone, Default)]
pub struct ContextFactory {
    translator: Option<Arc<dyn Translator>>,
    default_locale: Option<String>,
    after_create: Vec<AfterCreateHook>,
}

impl ContextFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_default_locale(mut self, locale: &str) -> Self {
        self.default_locale = Some(locale.to_string());
        self
    }

    pub fn after_create(&mut self, hook: AfterCreateHook) {
        self.after_create.push(hook);
    }

    fn prepare(&self, ctx: &mut Context) {
        if let Some(t) = &self.translator {
            ctx.set_translator(t.clone());
        }
        if let Some(l) = &self.default_locale {
            ctx.set_default_locale(l);
        }
    }

    fn run_hooks(&self, ctx: &mut Context) {
        for hook in &self.after_create {
            hook(ctx);
        }
    }

    /// Top context for a site, outside any request.
    pub fn new_site_context(&self, site: &Arc<Site>) -> Context {
        let mut ctx = site.new_context();
        self.prepare(&mut ctx);
        self.run_hooks(&mut ctx);
        ctx
    }

    /// Context for `req`, mounted at `prefix`.
    ///
    /// A context already attached to the request becomes the parent and
    /// the new one is its child. Otherwise a top context is created from
    /// the request. The request URI is rewritten to the child's path and
    /// the new context replaces the attached one.
    pub fn new_context_for_request<B>(&self, req: &mut Request<B>, prefix: Option<&str>) -> Context {
        let mut ctx = self.context_for(req, prefix);
        self.attach(req, &mut ctx);
        ctx
    }

    /// Like [`new_context_for_request`](Self::new_context_for_request),
    /// with `site` and `caller` bound before the after-create hooks run.
    pub fn new_site_context_for_request<B>(
        &self,
        req: &mut Request<B>,
        site: &Arc<Site>,
        prefix: Option<&str>,
        caller: Option<Identity>,
    ) -> Context {
        let mut ctx = self.context_for(req, prefix);
        ctx.set_site(site.clone());
        if let Some(identity) = caller {
            ctx.set_user(identity);
        }
        self.attach(req, &mut ctx);
        ctx
    }

    fn context_for<B>(&self, req: &mut Request<B>, prefix: Option<&str>) -> Context {
        let ctx = match req.extensions().get::<Context>() {
            Some(parent) => parent.new_child(prefix.unwrap_or("")),
            None => {
                let mut top = Context::new_top(original_url(req));
                self.prepare(&mut top);
                top.set_request(RequestInfo::new(
                    req.method().clone(),
                    req.uri().clone(),
                    req.headers().clone(),
                ));
                match prefix {
                    Some(p) => top.new_child(p),
                    None => top,
                }
            }
        };

        if let Some(info) = ctx.request() {
            *req.uri_mut() = info.uri.clone();
        }
        if req.extensions().get::<RouteContext>().is_none() {
            req.extensions_mut().insert(RouteContext::default());
        }
        ctx
    }

    fn attach<B>(&self, req: &mut Request<B>, ctx: &mut Context) {
        self.run_hooks(ctx);
        req.extensions_mut().insert(ctx.clone());
    }

    /// The context attached to `req`, or a new top one.
    pub fn get_or_new_context<B>(&self, req: &mut Request<B>) -> Context {
        match req.extensions().get::<Context>() {
            Some(ctx) => ctx.clone(),
            None => self.new_context_for_request(req, None),
        }
    }
}

/// Absolute URL of the request as received.
fn original_url<B>(req: &Request<B>) -> Option<Url> {
    let uri = req.uri();
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string()).ok();
    }
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let scheme = req
        .headers()
        .get("X-Forwarded-Proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Url::parse(&format!("{scheme}://{host}{path}")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::StaticTranslator;
    use axum::body::Body;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("host", "shop.example.com")
            .header("X-Forwarded-Proto", "https")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn top_then_child_from_same_request() {
        let factory = ContextFactory::new();
        let mut req = request("/admin/orders/5?x=1");

        let top = factory.new_context_for_request(&mut req, Some("/admin"));
        assert_eq!(top.prefix(), "/admin");
        assert_eq!(req.uri().path(), "/orders/5");
        assert_eq!(
            top.original_url().map(|u| u.as_str()),
            Some("https://shop.example.com/admin/orders/5?x=1")
        );
        assert!(req.extensions().get::<RouteContext>().is_some());

        let child = factory.new_context_for_request(&mut req, Some("orders"));
        assert_eq!(child.prefix(), "/admin/orders");
        assert_eq!(child.path(), "/5");
        assert_eq!(req.uri().path(), "/5");
        assert_eq!(req.uri().query(), Some("x=1"));
        assert_eq!(child.original_url(), top.original_url());
    }

    #[test]
    fn hooks_and_translator() {
        let t = StaticTranslator::new();
        t.insert("en-GB", "hello", "Hello");
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();

        let mut factory = ContextFactory::new()
            .with_translator(Arc::new(t))
            .with_default_locale("en-GB");
        factory.after_create(Arc::new(move |ctx: &mut Context| {
            c.fetch_add(1, Ordering::SeqCst);
            ctx.set_roles(vec!["viewer".into()]);
        }));

        let mut req = request("/");
        let ctx = factory.new_context_for_request(&mut req, None);
        assert_eq!(ctx.t("hello", "?"), "Hello");
        assert!(ctx.has_role("viewer"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let again = factory.get_or_new_context(&mut req);
        assert!(again.has_role("viewer"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn hooks_see_site_and_caller() {
        let dir = tempfile::tempdir().unwrap();
        let mut site = Site::new("shop", crate::config::SiteConfig::default(), &crate::site::SiteOptions::new(dir.path()));
        site.init().unwrap();
        let site = Arc::new(site);

        let seen = Arc::new(std::sync::Mutex::new(None));
        let s = seen.clone();
        let mut factory = ContextFactory::new();
        factory.after_create(Arc::new(move |ctx: &mut Context| {
            let site = ctx.site().map(|s| s.name().to_string());
            *s.lock().unwrap() = Some((site, ctx.has_role("editor")));
        }));

        let caller = Identity {
            roles: vec!["editor".into()],
            ..Default::default()
        };
        let mut req = request("/shop/pages");
        let ctx = factory.new_site_context_for_request(&mut req, &site, Some("/shop"), Some(caller));

        assert_eq!(*seen.lock().unwrap(), Some((Some("shop".to_string()), true)));
        assert_eq!(req.uri().path(), "/pages");
        assert!(ctx.db().is_some());
        assert!(req.extensions().get::<Context>().is_some());
    }
}
