//! Admin router: CRUD routes for one resource under `/{param}`.
//!
//! The request [`Context`] comes from the request extensions (installed by
//! the site dispatcher); roles on it drive every permission check. Bodies
//! may be urlencoded, multipart or JSON.

use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::routing::get;
use axum::{Json, Router};
use openerp_core::{ListParams, Module, ServiceError};
use openerp_site::Context;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::convert::{form_to_meta_values, json_to_meta_values};
use crate::error::ResourceError;
use crate::form_tree::{DEFAULT_PREFIX, FormTree, strip_prefix};
use crate::meta_value::{FileHeader, MetaValues};
use crate::resource::{DEFAULT_LAYOUT, Record, Resource};
use crate::schema::MetaSchema;

const BODY_LIMIT: usize = 16 * 1024 * 1024;

struct AdminState<T: Record> {
    resource: Arc<Resource<T>>,
}

#[derive(Debug, Deserialize)]
struct AdminQuery {
    limit: Option<usize>,
    #[serde(default)]
    offset: usize,
    layout: Option<String>,
}

impl AdminQuery {
    fn layout(&self) -> &str {
        self.layout.as_deref().unwrap_or(DEFAULT_LAYOUT)
    }

    fn list_params(&self) -> ListParams {
        ListParams {
            limit: self.limit.unwrap_or(ListParams::default().limit),
            offset: self.offset,
        }
    }
}

/// Routes:
///   GET    /{param}          list
///   POST   /{param}          create
///   GET    /{param}/@count   count
///   GET    /{param}/{id}     read
///   PUT    /{param}/{id}     update
///   DELETE /{param}/{id}     delete
pub fn admin_router<T: Record>(resource: Arc<Resource<T>>) -> Router {
    let list_path = format!("/{}", resource.param());
    let count_path = format!("/{}/@count", resource.param());
    let item_path = format!("/{}/{{id}}", resource.param());
    let state = Arc::new(AdminState { resource });

    Router::new()
        .route(&list_path, get(list_handler::<T>).post(create_handler::<T>))
        .route(&count_path, get(count_handler::<T>))
        .route(
            &item_path,
            get(get_handler::<T>)
                .put(update_handler::<T>)
                .delete(delete_handler::<T>),
        )
        .with_state(state)
}

fn request_context(req: &Request) -> Context {
    req.extensions()
        .get::<Context>()
        .cloned()
        .unwrap_or_else(|| Context::new_top(None))
}

async fn read_values<T: Record>(resource: &Resource<T>, req: Request) -> Result<MetaValues, ResourceError> {
    let schema: &dyn MetaSchema = resource;
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| ResourceError::Body(e.to_string()))?;
        let mut tree = FormTree::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ResourceError::Body(e.to_string()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let key = strip_prefix(&name, DEFAULT_PREFIX).to_string();
            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await.map_err(|e| ResourceError::Body(e.to_string()))?;
                    tree.add_files(&key, vec![FileHeader::new(filename, content_type, data.to_vec())])?;
                }
                None => {
                    let text = field.text().await.map_err(|e| ResourceError::Body(e.to_string()))?;
                    tree.add_strings(&key, vec![text])?;
                }
            }
        }
        return form_to_meta_values(&tree, Some(schema));
    }

    let body = to_bytes(req.into_body(), BODY_LIMIT)
        .await
        .map_err(|e| ResourceError::Body(e.to_string()))?;
    if content_type.starts_with("application/json") {
        let doc: Value = serde_json::from_slice(&body)?;
        return json_to_meta_values(&doc, Some(schema));
    }
    let tree = FormTree::from_urlencoded(&body, DEFAULT_PREFIX)?;
    form_to_meta_values(&tree, Some(schema))
}

async fn list_handler<T: Record>(
    State(state): State<Arc<AdminState<T>>>,
    Query(query): Query<AdminQuery>,
    req: Request,
) -> Result<Json<Value>, ServiceError> {
    let ctx = request_context(&req);
    let res = &state.resource;
    let page = res.crud(&ctx)?.find_many(&query.list_params())?;
    let items = page
        .items
        .iter()
        .map(|r| res.render(r, &ctx, query.layout()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(json!({ "items": items, "total": page.total })))
}

async fn count_handler<T: Record>(
    State(state): State<Arc<AdminState<T>>>,
    req: Request,
) -> Result<Json<Value>, ServiceError> {
    let ctx = request_context(&req);
    let count = state.resource.crud(&ctx)?.count()?;
    Ok(Json(json!({ "count": count })))
}

async fn get_handler<T: Record>(
    State(state): State<Arc<AdminState<T>>>,
    Path(id): Path<String>,
    Query(query): Query<AdminQuery>,
    req: Request,
) -> Result<Json<Value>, ServiceError> {
    let mut ctx = request_context(&req);
    ctx.set_resource_id(id.clone());
    let record = state.resource.crud(&ctx)?.find_one(&id)?;
    Ok(Json(state.resource.render(&record, &ctx, query.layout())?))
}

async fn create_handler<T: Record>(
    State(state): State<Arc<AdminState<T>>>,
    Query(query): Query<AdminQuery>,
    req: Request,
) -> Result<Json<Value>, ServiceError> {
    let ctx = request_context(&req);
    let values = read_values(&state.resource, req).await?;
    let record = state.resource.crud(&ctx)?.create(&values)?;
    debug!(resource = %state.resource.name(), id = %state.resource.render_id(&record), "created via admin");
    Ok(Json(state.resource.render(&record, &ctx, query.layout())?))
}

async fn update_handler<T: Record>(
    State(state): State<Arc<AdminState<T>>>,
    Path(id): Path<String>,
    Query(query): Query<AdminQuery>,
    req: Request,
) -> Result<Json<Value>, ServiceError> {
    let mut ctx = request_context(&req);
    ctx.set_resource_id(id.clone());
    let values = read_values(&state.resource, req).await?;
    let record = state.resource.crud(&ctx)?.update(&id, &values)?;
    Ok(Json(state.resource.render(&record, &ctx, query.layout())?))
}

async fn delete_handler<T: Record>(
    State(state): State<Arc<AdminState<T>>>,
    Path(id): Path<String>,
    req: Request,
) -> Result<(), ServiceError> {
    let mut ctx = request_context(&req);
    ctx.set_resource_id(id.clone());
    state.resource.crud(&ctx)?.delete(&id)?;
    Ok(())
}

/// A set of admin resources mounted together under one module name.
pub struct AdminModule {
    name: String,
    router: Router,
}

impl AdminModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            router: Router::new(),
        }
    }

    pub fn resource<T: Record>(mut self, resource: Arc<Resource<T>>) -> Self {
        self.router = self.router.merge(admin_router(resource));
        self
    }
}

impl Module for AdminModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn routes(&self) -> Router {
        self.router.clone()
    }
}
