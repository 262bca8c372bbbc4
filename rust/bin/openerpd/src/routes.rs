//! Route registration: site dispatch in front of every module, plus the
//! system endpoints.
//!
//! A request is bound to a site by its `Host` header, else by the longest
//! registered path prefix, else to the only site in alone mode. The
//! dispatcher builds the request context, strips the site's mount path,
//! and attaches the caller; modules then see site-relative paths.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use openerp_core::{Authenticator, Module, ServiceError};
use openerp_site::{ContextFactory, Site, SiteRegistry};
use tracing::{Instrument, debug};

/// Application shared state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SiteRegistry>,
    pub factory: ContextFactory,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Site serving `req` and the path it is mounted at, if any.
    fn resolve(&self, req: &Request) -> Option<(Arc<Site>, Option<String>)> {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h));
        if let Some(site) = host.and_then(|h| self.registry.get_by_host(h).ok()) {
            return Some((site, None));
        }
        if let Some((site, mount)) = self.registry.match_path(req.uri().path()) {
            let mount = (mount != "/").then_some(mount);
            return Some((site, mount));
        }
        self.registry.site().map(|site| (site, None))
    }
}

/// Build the complete router: modules under `/{module_name}` behind the
/// site dispatcher, system endpoints outside it.
pub fn build_router(state: AppState, modules: &[Box<dyn Module>]) -> Router {
    let mut sites: Router = Router::new();
    for m in modules {
        sites = sites.nest(&format!("/{}", m.name()), m.routes());
    }

    // The dispatcher wraps the fallback service, so its URI rewrite happens
    // before the module routes are matched.
    Router::new()
        .fallback_service(sites)
        .layer(middleware::from_fn_with_state(state, dispatch))
        .route("/health", get(health))
        .route("/version", get(version))
}

async fn dispatch(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some((site, mount)) = state.resolve(&req) else {
        return ServiceError::NotFound(format!("no site serves {}", req.uri().path())).into_response();
    };

    let caller = match state.auth.authenticate(req.headers()) {
        Ok(caller) => caller,
        Err(e) => return e.into_response(),
    };

    let ctx = state
        .factory
        .new_site_context_for_request(&mut req, &site, mount.as_deref(), caller);
    debug!(site = %site.name(), path = %req.uri().path(), roles = ?ctx.roles(), "dispatch");

    let mut resp = next.run(req).instrument(site.span()).await;
    ctx.response().apply_to(resp.headers_mut());
    resp
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": "openerpd",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
