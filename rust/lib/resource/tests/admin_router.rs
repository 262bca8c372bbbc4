use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use openerp_core::{Permission, PermissionMode};
use openerp_resource::{FileHeader, Meta, Resource, SqlRecordStore, admin_router, lens};
use openerp_site::Context;
use openerp_sql::{SQLStore, SqliteStore};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower::ServiceExt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Profile {
    age: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
    profile: Profile,
    avatar: Option<FileHeader>,
}

fn users() -> Arc<Resource<User>> {
    let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let profile = Resource::<Profile>::new().meta(Meta::field("Age", lens!(Profile, age)));
    let res = Resource::new()
        .meta(Meta::field("id", lens!(User, id)))
        .meta(Meta::field("Name", lens!(User, name)))
        .meta(Meta::inline("Profile", lens!(User, profile), Arc::new(profile)))
        .meta(Meta::field("Avatar", lens!(User, avatar)))
        .permission(Arc::new(
            Permission::new().deny(PermissionMode::Update, &["guest"]),
        ))
        .label_with(|u: &User| u.name.clone())
        .with_store(Arc::new(SqlRecordStore::<User>::new(sql, "users")));
    Arc::new(res)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn form(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json_req(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn create_read_update_delete() {
    let app = admin_router(users());

    let (status, created) = send(
        &app,
        form("POST", "/users", "QorResource.Name=Alice&QorResource.Profile.Age=30"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["Name"], "Alice");
    assert_eq!(created["Profile"]["Age"], 30);
    assert_eq!(created["id"], 1);

    let (status, updated) = send(&app, json_req("PUT", "/users/1", json!({ "Name": "Alicia" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["Name"], "Alicia");
    assert_eq!(updated["Profile"]["Age"], 30);

    let (_, read) = send(&app, get("/users/1")).await;
    assert_eq!(read, updated);

    let (status, _) = send(&app, Request::builder().method("DELETE").uri("/users/1").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/users/1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn list_count_and_layouts() {
    let app = admin_router(users());
    for name in ["Alice", "Bob", "Carol"] {
        let (status, _) = send(&app, form("POST", "/users", &format!("QorResource.Name={name}"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (_, count) = send(&app, get("/users/@count")).await;
    assert_eq!(count, json!({ "count": 3 }));

    let (_, page) = send(&app, get("/users?limit=2&layout=basic")).await;
    assert_eq!(page["total"], 3);
    assert_eq!(
        page["items"],
        json!([
            { "id": "3", "label": "Carol", "icon": null },
            { "id": "2", "label": "Bob", "icon": null },
        ])
    );

    let (status, _) = send(&app, get("/users/1?layout=fancy")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn multipart_upload_lands_on_file_field() {
    let app = admin_router(users());
    let boundary = "XBOUNDARYX";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"QorResource.Name\"\r\n\r\n\
         Dana\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"QorResource.Avatar\"; filename=\"me.png\"\r\n\
         Content-Type: image/png\r\n\r\n\
         PNGDATA\r\n\
         --{boundary}--\r\n"
    );
    let req = Request::builder()
        .method("POST")
        .uri("/users")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();

    let (status, created) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["Name"], "Dana");
    assert_eq!(
        created["Avatar"],
        json!({ "filename": "me.png", "content_type": "image/png", "size": 7 })
    );
}

#[tokio::test]
async fn roles_from_request_context_gate_updates() {
    let app = admin_router(users());
    send(&app, form("POST", "/users", "QorResource.Name=Eve")).await;

    let mut ctx = Context::new_top(None);
    ctx.set_roles(vec!["guest".into()]);
    let mut req = form("PUT", "/users/1", "QorResource.Name=Mallory");
    req.extensions_mut().insert(ctx);

    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "PERMISSION_DENIED");

    let (_, read) = send(&app, get("/users/1")).await;
    assert_eq!(read["Name"], "Eve");
}

#[tokio::test]
async fn bad_key_and_bad_body_are_client_errors() {
    let app = admin_router(users());

    let (status, _) = send(&app, get("/users/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let req = Request::builder()
        .method("POST")
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("[1, 2]"))
        .unwrap();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
