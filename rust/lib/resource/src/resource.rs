//! Declarative description of a persistable record type.

use std::ops::ControlFlow;
use std::sync::Arc;

use indexmap::IndexMap;
use openerp_core::{PermissionMode, Permissioner, humanize, pluralize};
use openerp_site::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ResourceError;
use crate::event::{CrudEvent, EventDispatcher};
use crate::meta::Meta;
use crate::meta_value::{MetaValue, MetaValues};
use crate::schema::{MetaInfo, MetaSchema};
use crate::store::RecordStore;

/// Anything a resource can describe.
pub trait Record: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Record for T where T: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// ID under which a singleton resource stores its only record.
pub const SINGLETON_ID: &str = "singleton";

pub const DEFAULT_LAYOUT: &str = "default";
pub const BASIC_LAYOUT: &str = "basic";

pub type Validator<T> =
    Arc<dyn Fn(&T, &MetaValues, &Context) -> Result<ControlFlow<()>, ResourceError> + Send + Sync>;
pub type ProcessorFn<T> =
    Arc<dyn Fn(&mut T, &MetaValues, &Context) -> Result<ControlFlow<()>, ResourceError> + Send + Sync>;
pub type LabelFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;
pub type LayoutFn<T> = Arc<dyn Fn(&Resource<T>, &T, &Context) -> Value + Send + Sync>;

/// Named projection of a record.
pub enum Layout<T: Record> {
    /// Object with the listed metas.
    Metas(Vec<String>),
    Custom(LayoutFn<T>),
}

impl<T: Record> Clone for Layout<T> {
    fn clone(&self) -> Self {
        match self {
            Layout::Metas(m) => Layout::Metas(m.clone()),
            Layout::Custom(f) => Layout::Custom(f.clone()),
        }
    }
}

/// How a child resource points at its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRelation {
    pub parent: String,
    /// Meta holding the parent's ID.
    pub fk_meta: String,
    /// Position of the parent's ID among the request's parent resource IDs.
    pub path_level: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

pub struct Resource<T: Record> {
    name: String,
    plural_name: String,
    param: String,
    table: String,
    i18n_prefix: String,
    metas: Vec<Meta<T>>,
    primary: Vec<String>,
    order: Order,
    validators: Vec<Validator<T>>,
    processors: Vec<ProcessorFn<T>>,
    permission: Option<Arc<dyn Permissioner>>,
    layouts: IndexMap<String, Layout<T>>,
    label_fn: Option<LabelFn<T>>,
    icon_fn: Option<LabelFn<T>>,
    parent: Option<ParentRelation>,
    events: EventDispatcher<T>,
    store: Option<Arc<dyn RecordStore<T>>>,
}

fn type_path<T>() -> (String, String) {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rsplit_once("::") {
        Some((module, name)) => (module.replace("::", "."), name.to_string()),
        None => (String::new(), base.to_string()),
    }
}

fn snake(label: &str) -> String {
    label.to_lowercase().replace(' ', "_")
}

impl<T: Record> Default for Resource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Resource<T> {
    /// Resource named after `T`.
    pub fn new() -> Self {
        let (module, type_name) = type_path::<T>();
        let name = humanize(&type_name);
        let plural_name = pluralize(&name);
        let i18n_prefix = if module.is_empty() {
            type_name.clone()
        } else {
            format!("{module}.{type_name}")
        };
        Self {
            param: snake(&plural_name).replace('_', "-"),
            table: snake(&plural_name),
            name,
            plural_name,
            i18n_prefix,
            metas: Vec::new(),
            primary: Vec::new(),
            order: Order::Desc,
            validators: Vec::new(),
            processors: Vec::new(),
            permission: None,
            layouts: IndexMap::new(),
            label_fn: None,
            icon_fn: None,
            parent: None,
            events: EventDispatcher::new(),
            store: None,
        }
    }

    // ── Builders ────────────────────────────────────────────────────

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self.plural_name = pluralize(name);
        self
    }

    /// URL path segment of the resource.
    pub fn with_param(mut self, param: &str) -> Self {
        self.param = param.to_string();
        self
    }

    pub fn with_table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// Add a meta, replacing one with the same name.
    pub fn meta(mut self, meta: Meta<T>) -> Self {
        match self.metas.iter().position(|m| m.name() == meta.name()) {
            Some(i) => self.metas[i] = meta,
            None => self.metas.push(meta),
        }
        self
    }

    /// Declare the metas keying the record, in ID order.
    pub fn set_primary_fields(mut self, names: &[&str]) -> Result<Self, ResourceError> {
        for name in names {
            if self.meta_by_name(name).is_none() {
                return Err(ResourceError::UnknownMeta(format!("{}.{name}", self.name)));
            }
        }
        self.primary = names.iter().map(|n| n.to_string()).collect();
        Ok(self)
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &MetaValues, &Context) -> Result<ControlFlow<()>, ResourceError> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(f));
        self
    }

    pub fn processor<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut T, &MetaValues, &Context) -> Result<ControlFlow<()>, ResourceError> + Send + Sync + 'static,
    {
        self.processors.push(Arc::new(f));
        self
    }

    pub fn permission(mut self, permission: Arc<dyn Permissioner>) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn layout(mut self, name: &str, layout: Layout<T>) -> Self {
        self.layouts.insert(name.to_string(), layout);
        self
    }

    pub fn label_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.label_fn = Some(Arc::new(f));
        self
    }

    pub fn icon_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.icon_fn = Some(Arc::new(f));
        self
    }

    /// Make this a child of `parent`; `fk_meta` receives the parent's ID.
    pub fn child_of(mut self, parent: &str, fk_meta: &str, path_level: usize) -> Result<Self, ResourceError> {
        if self.meta_by_name(fk_meta).is_none() {
            return Err(ResourceError::UnknownMeta(format!("{}.{fk_meta}", self.name)));
        }
        self.parent = Some(ParentRelation {
            parent: parent.to_string(),
            fk_meta: fk_meta.to_string(),
            path_level,
        });
        Ok(self)
    }

    pub fn on<F>(mut self, event: &str, f: F) -> Self
    where
        F: Fn(&CrudEvent<'_>, Option<&mut T>) -> Result<(), ResourceError> + Send + Sync + 'static,
    {
        self.events.on(event, f);
        self
    }

    pub fn on_any<F>(mut self, f: F) -> Self
    where
        F: Fn(&CrudEvent<'_>, Option<&mut T>) -> Result<(), ResourceError> + Send + Sync + 'static,
    {
        self.events.on_any(f);
        self
    }

    /// Persist through `store` instead of the context's site DB.
    pub fn with_store(mut self, store: Arc<dyn RecordStore<T>>) -> Self {
        self.store = Some(store);
        self
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plural_name(&self) -> &str {
        &self.plural_name
    }

    pub fn param(&self) -> &str {
        &self.param
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn i18n_prefix(&self) -> &str {
        &self.i18n_prefix
    }

    pub fn metas(&self) -> &[Meta<T>] {
        &self.metas
    }

    pub fn meta_by_name(&self, name: &str) -> Option<&Meta<T>> {
        self.metas.iter().find(|m| m.name() == name)
    }

    pub fn order_by(&self) -> Order {
        self.order
    }

    pub fn validators(&self) -> &[Validator<T>] {
        &self.validators
    }

    pub fn processors(&self) -> &[ProcessorFn<T>] {
        &self.processors
    }

    pub fn parent_relation(&self) -> Option<&ParentRelation> {
        self.parent.as_ref()
    }

    pub fn events(&self) -> &EventDispatcher<T> {
        &self.events
    }

    pub fn store(&self) -> Option<&Arc<dyn RecordStore<T>>> {
        self.store.as_ref()
    }

    /// `true` when no policy is installed or the policy does not deny.
    pub fn has_permission(&self, mode: PermissionMode, ctx: &Context) -> bool {
        match &self.permission {
            Some(p) => p.has_permission(mode, ctx.roles()).allowed_or_undef(),
            None => true,
        }
    }

    // ── Keys ────────────────────────────────────────────────────────

    /// Metas keying the record: the declared ones, else a meta named `ID`.
    pub fn primary_metas(&self) -> Vec<&Meta<T>> {
        if !self.primary.is_empty() {
            return self.primary.iter().filter_map(|n| self.meta_by_name(n)).collect();
        }
        self.metas
            .iter()
            .find(|m| m.name().eq_ignore_ascii_case("id"))
            .into_iter()
            .collect()
    }

    pub fn has_key(&self) -> bool {
        !self.primary_metas().is_empty()
    }

    /// Server-wide record without an ID.
    pub fn is_singleton(&self) -> bool {
        !self.has_key()
    }

    /// Keys are allocated as increasing integers.
    pub fn has_numeric_key(&self) -> bool {
        matches!(self.primary_metas().as_slice(), [m] if m.kind().is_numeric())
    }

    /// A keyed record whose key is still zero.
    pub fn is_new(&self, record: &T) -> bool {
        let primary = self.primary_metas();
        !primary.is_empty()
            && primary
                .iter()
                .all(|m| key_text(&m.field_value(record)).is_none_or(|s| s.is_empty() || s == "0"))
    }

    /// Key of `record`; compound keys are joined with `,`.
    pub fn render_id(&self, record: &T) -> String {
        let primary = self.primary_metas();
        if primary.is_empty() {
            return SINGLETON_ID.to_string();
        }
        primary
            .iter()
            .map(|m| escape_key_part(&key_text(&m.field_value(record)).unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `id` re-rendered from its parsed parts, so equal keys compare equal.
    pub fn canonical_id(&self, id: &str) -> Result<String, ResourceError> {
        Ok(self
            .parse_id(id)?
            .iter()
            .map(|p| escape_key_part(p))
            .collect::<Vec<_>>()
            .join(","))
    }

    /// Split `id` into one value per primary meta. Key parts carry `,` and
    /// `%` as `%2C` and `%25`.
    pub fn parse_id(&self, id: &str) -> Result<Vec<String>, ResourceError> {
        let primary = self.primary_metas();
        if primary.is_empty() {
            return Ok(Vec::new());
        }
        let parts = id
            .split(',')
            .map(|p| unescape_key_part(p.trim()))
            .collect::<Option<Vec<String>>>()
            .ok_or_else(|| ResourceError::InvalidId(format!("{id:?}: bad escape")))?;
        if parts.len() != primary.len() {
            return Err(ResourceError::InvalidId(format!(
                "{id:?}: {} expects {} key values",
                self.name,
                primary.len()
            )));
        }
        for (meta, part) in primary.iter().zip(&parts) {
            if part.is_empty() {
                return Err(ResourceError::InvalidId(format!("{id:?}: blank {}", meta.name())));
            }
            if meta.kind().is_numeric() && part.parse::<i64>().is_err() {
                return Err(ResourceError::InvalidId(format!("{id:?}: {} is not a number", meta.name())));
            }
        }
        Ok(parts)
    }

    /// `(meta name, value)` pairs locating the record with `id`.
    pub fn to_primary_query_params(&self, id: &str) -> Result<Vec<(String, String)>, ResourceError> {
        let parts = self.parse_id(id)?;
        Ok(self
            .primary_metas()
            .iter()
            .map(|m| m.name().to_string())
            .zip(parts)
            .collect())
    }

    /// Write `id` into the primary metas of `record`.
    pub fn set_id(&self, record: &mut T, id: &str, ctx: &Context) -> Result<(), ResourceError> {
        let parts = self.parse_id(id)?;
        for (meta, part) in self.primary_metas().into_iter().zip(parts) {
            let mv = MetaValue::leaf(meta.name(), part);
            meta.set(record, &mv, ctx).map_err(ResourceError::InvalidId)?;
        }
        Ok(())
    }

    /// Every field still holds its default.
    pub fn is_zero(&self, record: &T) -> bool {
        match (serde_json::to_value(record), serde_json::to_value(T::default())) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    // ── Layouts ─────────────────────────────────────────────────────

    pub fn layout_names(&self) -> Vec<String> {
        let mut names = vec![DEFAULT_LAYOUT.to_string(), BASIC_LAYOUT.to_string()];
        for name in self.layouts.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn record_label(&self, record: &T) -> String {
        match &self.label_fn {
            Some(f) => f(record),
            None => self.render_id(record),
        }
    }

    /// Project `record` through the named layout.
    pub fn render(&self, record: &T, ctx: &Context, layout: &str) -> Result<Value, ResourceError> {
        if let Some(l) = self.layouts.get(layout) {
            return Ok(match l {
                Layout::Metas(names) => self.project(record, ctx, names.iter().map(String::as_str)),
                Layout::Custom(f) => f(self, record, ctx),
            });
        }
        match layout {
            DEFAULT_LAYOUT => Ok(self.project(record, ctx, self.metas.iter().map(|m| m.name()))),
            BASIC_LAYOUT => Ok(serde_json::json!({
                "id": self.render_id(record),
                "label": self.record_label(record),
                "icon": self.icon_fn.as_ref().map(|f| f(record)),
            })),
            other => Err(ResourceError::NotFound(format!("layout {other:?} of {}", self.name))),
        }
    }

    fn project<'n>(&self, record: &T, ctx: &Context, names: impl Iterator<Item = &'n str>) -> Value {
        let mut out = Map::new();
        for name in names {
            let Some(meta) = self.meta_by_name(name) else {
                continue;
            };
            if meta.has_permission(PermissionMode::Read, ctx.roles()).is_deny() {
                continue;
            }
            out.insert(name.to_string(), meta.value(record, ctx));
        }
        Value::Object(out)
    }
}

fn escape_key_part(part: &str) -> String {
    part.replace('%', "%25").replace(',', "%2C")
}

fn unescape_key_part(part: &str) -> Option<String> {
    let mut out = String::with_capacity(part.len());
    let mut rest = part;
    while let Some(at) = rest.find('%') {
        out.push_str(&rest[..at]);
        let code = rest.get(at + 1..at + 3)?;
        match code.to_ascii_uppercase().as_str() {
            "25" => out.push('%'),
            "2C" => out.push(','),
            _ => return None,
        }
        rest = &rest[at + 3..];
    }
    out.push_str(rest);
    Some(out)
}

fn key_text(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl<T: Record> MetaSchema for Resource<T> {
    fn schema_name(&self) -> &str {
        &self.name
    }

    fn meta_infos(&self) -> Vec<MetaInfo> {
        self.metas.iter().map(Meta::info).collect()
    }

    fn meta_info(&self, name: &str) -> Option<MetaInfo> {
        self.meta_by_name(name).map(Meta::info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens;
    use openerp_core::Permission;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct OrderLine {
        order_id: i64,
        line: i64,
        sku: String,
        secret: String,
    }

    fn lines() -> Resource<OrderLine> {
        Resource::new()
            .meta(Meta::field("OrderID", lens!(OrderLine, order_id)))
            .meta(Meta::field("Line", lens!(OrderLine, line)))
            .meta(Meta::field("Sku", lens!(OrderLine, sku)))
            .meta(
                Meta::field("Secret", lens!(OrderLine, secret))
                    .permission(Arc::new(Permission::new().allow(PermissionMode::Read, &["admin"]))),
            )
            .set_primary_fields(&["OrderID", "Line"])
            .unwrap()
    }

    #[test]
    fn names_derive_from_type() {
        let r = lines();
        assert_eq!(r.name(), "Order Line");
        assert_eq!(r.plural_name(), "Order Lines");
        assert_eq!(r.table(), "order_lines");
        assert_eq!(r.param(), "order-lines");
        assert!(r.i18n_prefix().ends_with(".tests.OrderLine"), "{}", r.i18n_prefix());
        assert!(matches!(
            Resource::<OrderLine>::new().set_primary_fields(&["Nope"]),
            Err(ResourceError::UnknownMeta(_))
        ));
    }

    #[test]
    fn compound_ids() {
        let r = lines();
        let ctx = Context::new_top(None);
        let mut rec = OrderLine::default();
        assert!(r.is_new(&rec));

        r.set_id(&mut rec, "10, 2", &ctx).unwrap();
        assert_eq!((rec.order_id, rec.line), (10, 2));
        assert_eq!(r.render_id(&rec), "10,2");
        assert_eq!(r.parse_id(&r.render_id(&rec)).unwrap(), vec!["10", "2"]);
        assert!(!r.is_new(&rec));

        assert_eq!(
            r.to_primary_query_params("10,2").unwrap(),
            vec![("OrderID".to_string(), "10".to_string()), ("Line".to_string(), "2".to_string())]
        );
        assert!(r.parse_id("10").is_err());
        assert!(r.parse_id("10,x").is_err());
        assert!(r.parse_id("10,").is_err());
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Tag {
        code: String,
    }

    #[test]
    fn string_keys_with_commas_round_trip() {
        let r = Resource::new()
            .meta(Meta::field("Code", lens!(Tag, code)))
            .set_primary_fields(&["Code"])
            .unwrap();
        let ctx = Context::new_top(None);

        for code in ["a,b", "50%", "%2C", "plain"] {
            let rec = Tag { code: code.to_string() };
            let id = r.render_id(&rec);
            assert_eq!(r.parse_id(&id).unwrap(), vec![code.to_string()], "{id}");
            assert_eq!(r.canonical_id(&id).unwrap(), id);

            let mut back = Tag::default();
            r.set_id(&mut back, &id, &ctx).unwrap();
            assert_eq!(back, rec);
        }
        assert_eq!(r.render_id(&Tag { code: "a,b".into() }), "a%2Cb");
        assert!(r.parse_id("a%zz").is_err());
    }

    #[test]
    fn layouts_respect_read_permission() {
        let r = lines().label_with(|l: &OrderLine| l.sku.clone()).layout(
            "sku",
            Layout::Metas(vec!["Sku".into()]),
        );
        let rec = OrderLine {
            order_id: 1,
            line: 3,
            sku: "X-1".into(),
            secret: "s".into(),
        };
        let mut ctx = Context::new_top(None);

        let v = r.render(&rec, &ctx, DEFAULT_LAYOUT).unwrap();
        assert!(v.get("Secret").is_none());
        assert_eq!(v["Sku"], "X-1");

        ctx.set_roles(vec!["admin".into()]);
        assert_eq!(r.render(&rec, &ctx, DEFAULT_LAYOUT).unwrap()["Secret"], "s");

        assert_eq!(
            r.render(&rec, &ctx, BASIC_LAYOUT).unwrap(),
            serde_json::json!({"id": "1,3", "label": "X-1", "icon": null})
        );
        assert_eq!(r.render(&rec, &ctx, "sku").unwrap(), serde_json::json!({"Sku": "X-1"}));
        assert!(r.render(&rec, &ctx, "nope").is_err());
        assert_eq!(r.layout_names(), vec!["default", "basic", "sku"]);
    }

    #[test]
    fn singleton_and_permissions() {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        struct Settings {
            title: String,
        }
        let r: Resource<Settings> = Resource::new()
            .meta(Meta::field("Title", lens!(Settings, title)))
            .permission(Arc::new(Permission::new().allow(PermissionMode::Update, &["admin"])));
        assert!(r.is_singleton());
        assert_eq!(r.render_id(&Settings::default()), SINGLETON_ID);

        let mut ctx = Context::new_top(None);
        assert!(r.has_permission(PermissionMode::Read, &ctx));
        assert!(!r.has_permission(PermissionMode::Update, &ctx));
        ctx.set_roles(vec!["admin".into()]);
        assert!(r.has_permission(PermissionMode::Update, &ctx));
    }
}
