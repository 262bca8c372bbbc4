use std::sync::{Arc, Mutex};

use openerp_core::{Permission, PermissionMode};
use openerp_resource::{
    CrudEvent, DEFAULT_PREFIX, FormTree, Meta, MetaSchema, MetaValues, RecordStore, Resource, ResourceError, SqlRecordStore,
    form_to_meta_values, lens,
};
use openerp_site::Context;
use openerp_sql::{SQLStore, SqliteStore};
use serde::{Deserialize, Serialize};

fn store<T>(table: &str) -> Arc<SqlRecordStore<T>> {
    let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    Arc::new(SqlRecordStore::new(sql, table))
}

fn decode<T: openerp_resource::Record>(res: &Resource<T>, body: &str) -> MetaValues {
    let tree = FormTree::from_urlencoded(body.as_bytes(), DEFAULT_PREFIX).unwrap();
    form_to_meta_values(&tree, Some(res as &dyn MetaSchema)).unwrap()
}

type Handler<T> = dyn Fn(&CrudEvent<'_>, Option<&mut T>) -> Result<(), ResourceError> + Send + Sync;

/// Handler recording every event name it sees.
fn recorder<T: 'static>() -> (Arc<Mutex<Vec<String>>>, Box<Handler<T>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let handler: Box<Handler<T>> = Box::new(move |e, _| {
        s.lock().unwrap().push(e.name());
        Ok(())
    });
    (seen, handler)
}

// ── Users with an inline profile ────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Profile {
    age: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
    profile: Profile,
}

fn users(store: Arc<dyn RecordStore<User>>) -> Resource<User> {
    let profile = Resource::<Profile>::new().meta(Meta::field("Age", lens!(Profile, age)));
    Resource::new()
        .meta(Meta::field("id", lens!(User, id)))
        .meta(Meta::field("Name", lens!(User, name)).required())
        .meta(Meta::inline("Profile", lens!(User, profile), Arc::new(profile)))
        .with_store(store)
}

#[test]
fn form_create_fires_events_and_assigns_key() {
    let (seen, record) = recorder();
    let res = users(store::<User>("users")).on_any(record);
    let ctx = Context::new_top(None);

    let values = decode(&res, "QorResource.Name=Alice&QorResource.Profile.Age=30");
    let user = res.crud(&ctx).unwrap().create(&values).unwrap();

    assert_eq!(user.name, "Alice");
    assert_eq!(user.profile.age, 30);
    assert_eq!(user.id, 1);
    assert_eq!(*seen.lock().unwrap(), vec!["beforeCreate", "create", "afterCreate"]);

    let second = res.crud(&ctx).unwrap().create(&decode(&res, "QorResource.Name=Bob")).unwrap();
    assert_eq!(second.id, 2);
    assert_eq!(res.crud(&ctx).unwrap().find_one("1").unwrap(), user);
}

#[test]
fn empty_form_reports_each_required_meta_once() {
    let res = users(store::<User>("users"));
    let err = form_to_meta_values(&FormTree::new(), Some(&res as &dyn MetaSchema)).unwrap_err();
    let errors = err.errors().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.fields().next().unwrap().field, "Name");
}

#[test]
fn decoding_twice_gives_the_same_record() {
    let res = users(store::<User>("users"));
    let ctx = Context::new_top(None);
    let values = decode(&res, "QorResource.Name=Alice&QorResource.Profile.Age=30");

    let mut once = User {
        id: 5,
        ..Default::default()
    };
    openerp_resource::Processor::new(&res, &ctx, &values).start(&mut once).unwrap();
    let mut twice = once.clone();
    openerp_resource::Processor::new(&res, &ctx, &values).start(&mut twice).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn ids_render_and_parse_back() {
    let res = users(store::<User>("users"));
    for id in [1_i64, 42, 9_000_000_000] {
        let user = User {
            id,
            ..Default::default()
        };
        let rendered = res.render_id(&user);
        assert_eq!(res.parse_id(&rendered).unwrap(), vec![id.to_string()]);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Tag {
    code: String,
    title: String,
}

#[test]
fn string_key_with_comma_stays_reachable() {
    let res = Resource::new()
        .meta(Meta::field("Code", lens!(Tag, code)))
        .meta(Meta::field("Title", lens!(Tag, title)))
        .set_primary_fields(&["Code"])
        .unwrap()
        .with_store(store::<Tag>("tags"));
    let ctx = Context::new_top(None);

    let tag = res
        .crud(&ctx)
        .unwrap()
        .create(&decode(&res, "QorResource.Code=a%2Cb&QorResource.Title=Both"))
        .unwrap();
    assert_eq!(tag.code, "a,b");

    let id = res.render_id(&tag);
    assert_eq!(res.parse_id(&id).unwrap(), vec!["a,b".to_string()]);
    assert_eq!(res.crud(&ctx).unwrap().find_one(&id).unwrap(), tag);

    res.crud(&ctx).unwrap().delete(&id).unwrap();
    assert!(matches!(res.crud(&ctx).unwrap().find_one(&id), Err(ResourceError::NotFound(_))));
}

// ── Orders with inline items ────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Item {
    id: i64,
    name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Order {
    id: i64,
    items: Vec<Item>,
}

#[test]
fn slice_update_leaves_disabled_element_alone() {
    let items = Resource::<Item>::new()
        .meta(Meta::field("id", lens!(Item, id)))
        .meta(Meta::field("Name", lens!(Item, name)));
    let backing = store::<Order>("orders");
    let res = Resource::new()
        .meta(Meta::field("id", lens!(Order, id)))
        .meta(Meta::inline_slice("Items", lens!(Order, items), Arc::new(items)))
        .with_store(backing.clone());

    let existing = Order {
        id: 1,
        items: vec![
            Item {
                id: 7,
                name: "A".into(),
            },
            Item {
                id: 8,
                name: "B".into(),
            },
        ],
    };
    backing.insert("1", None, &existing).unwrap();

    let ctx = Context::new_top(None);
    let values = decode(
        &res,
        "QorResource.Items[0].id=7&QorResource.Items[0].Name=X\
         &QorResource.Items[1].id=8&QorResource.Items[1].@enabled=false",
    );
    let order = res.crud(&ctx).unwrap().update("1", &values).unwrap();

    assert_eq!(order.items[0].name, "X");
    assert_eq!(order.items[1], existing.items[1]);
    assert_eq!(backing.get("1").unwrap().unwrap(), order);
}

// ── Posts belonging to a category ───────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Category {
    id: i64,
    name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Post {
    id: i64,
    title: String,
    category_id: i64,
    category: Option<Category>,
}

fn posts(store: Arc<dyn RecordStore<Post>>) -> Resource<Post> {
    Resource::new()
        .meta(Meta::field("id", lens!(Post, id)))
        .meta(Meta::field("Title", lens!(Post, title)))
        .meta(Meta::belongs_to("Category", lens!(Post, category_id), lens!(Post, category)))
        .with_store(store)
}

fn seeded_post(backing: &SqlRecordStore<Post>) -> Post {
    let post = Post {
        id: 1,
        title: "Hello".into(),
        category_id: 3,
        category: Some(Category {
            id: 3,
            name: "News".into(),
        }),
    };
    backing.insert("1", None, &post).unwrap();
    post
}

#[test]
fn belongs_to_is_set_by_id() {
    let backing = store::<Post>("posts");
    seeded_post(&backing);
    let res = posts(backing.clone());
    let ctx = Context::new_top(None);

    let post = res
        .crud(&ctx)
        .unwrap()
        .update("1", &decode(&res, "QorResource.Category=42"))
        .unwrap();
    assert_eq!(post.category_id, 42);
    assert_eq!(post.category, None);
    assert_eq!(post.title, "Hello");

    let unlinked = res
        .crud(&ctx)
        .unwrap()
        .update("1", &decode(&res, "QorResource.Category.@enabled=false"))
        .unwrap();
    assert_eq!(unlinked.category_id, 0);
}

#[test]
fn update_without_permission_writes_nothing() {
    let backing = store::<Post>("posts");
    let before = seeded_post(&backing);
    let (seen, record) = recorder();
    let res = posts(backing.clone())
        .permission(Arc::new(Permission::new().allow(PermissionMode::Update, &["editor"])))
        .on_any(record);
    let mut ctx = Context::new_top(None);
    ctx.set_roles(vec!["viewer".into()]);

    let err = res
        .crud(&ctx)
        .unwrap()
        .update("1", &decode(&res, "QorResource.Title=Changed"))
        .unwrap_err();
    assert!(matches!(err, ResourceError::PermissionDenied(_)));
    assert!(!seen.lock().unwrap().iter().any(|e| e == "beforeSave"));
    assert_eq!(backing.get("1").unwrap().unwrap(), before);
}

#[test]
fn destroy_on_update_deletes_the_record() {
    let backing = store::<Post>("posts");
    seeded_post(&backing);
    let (seen, record) = recorder();
    let res = posts(backing.clone()).on_any(record);
    let ctx = Context::new_top(None);

    res.crud(&ctx)
        .unwrap()
        .update("1", &decode(&res, "QorResource._destroy=1"))
        .unwrap();
    assert!(backing.get("1").unwrap().is_none());
    let seen = seen.lock().unwrap();
    assert!(seen.ends_with(&["beforeDelete".to_string(), "delete".to_string(), "afterDelete".to_string()]));
}

// ── Child resources ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Comment {
    id: i64,
    post_id: i64,
    body: String,
}

#[test]
fn child_records_take_the_parent_key_and_list_by_parent() {
    let res = Resource::new()
        .meta(Meta::field("id", lens!(Comment, id)))
        .meta(Meta::field("PostID", lens!(Comment, post_id)))
        .meta(Meta::field("Body", lens!(Comment, body)))
        .child_of("Post", "PostID", 0)
        .unwrap()
        .with_store(store::<Comment>("comments"));

    for (post, body) in [("1", "first"), ("1", "second"), ("2", "elsewhere")] {
        let mut ctx = Context::new_top(None);
        ctx.push_parent_resource_id(post);
        let comment = res
            .crud(&ctx)
            .unwrap()
            .create(&decode(&res, &format!("QorResource.Body={body}")))
            .unwrap();
        assert_eq!(comment.post_id.to_string(), post);
    }

    let mut ctx = Context::new_top(None);
    ctx.push_parent_resource_id("1");
    let page = res.crud(&ctx).unwrap().find_many(&Default::default()).unwrap();
    let bodies: Vec<&str> = page.items.iter().map(|c| c.body.as_str()).collect();
    assert_eq!(bodies, vec!["second", "first"]);
    assert_eq!(page.total, 2);
    assert_eq!(res.crud(&ctx).unwrap().count().unwrap(), 2);
}
