//! Typed field accessors.
//!
//! Every meta bound to a struct field carries a [`FieldAccessor`] built
//! once when the resource is declared. The accessor knows the field's
//! [`FieldKind`] and how to decode a [`MetaValue`] into it, so decoding a
//! request is a plain call through the table.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use openerp_site::{Context, TimeZone};
use serde::Serialize;
use serde_json::Value;

use crate::meta_value::{FileHeader, MetaValue, RawValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Unsigned,
    Float,
    Bool,
    OptionalBool,
    Time,
    OptionalTime,
    Strings,
    File,
    Files,
    Scanner,
    Parsed,
    BelongsTo,
    ManyToMany,
    Inline,
    InlineSlice,
    Virtual,
}

impl FieldKind {
    /// Keys of this kind are allocated as increasing integers.
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Unsigned)
    }
}

// ── Lenses ──────────────────────────────────────────────────────────

/// Borrowing accessor pair for one field of `T`, possibly nested.
pub struct Lens<T, F> {
    get: Box<dyn Fn(&T) -> &F + Send + Sync>,
    get_mut: Box<dyn Fn(&mut T) -> &mut F + Send + Sync>,
}

impl<T, F> Lens<T, F> {
    pub fn new<G, M>(get: G, get_mut: M) -> Self
    where
        G: Fn(&T) -> &F + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        Self {
            get: Box::new(get),
            get_mut: Box::new(get_mut),
        }
    }

    pub fn get<'a>(&self, record: &'a T) -> &'a F {
        (self.get)(record)
    }

    pub fn get_mut<'a>(&self, record: &'a mut T) -> &'a mut F {
        (self.get_mut)(record)
    }
}

/// Lens over a (possibly dotted) field path: `lens!(User, profile.age)`.
#[macro_export]
macro_rules! lens {
    ($t:ty, $($f:ident).+) => {
        $crate::Lens::<$t, _>::new(|r: &$t| &r.$($f).+, |r: &mut $t| &mut r.$($f).+)
    };
}

// ── Values ──────────────────────────────────────────────────────────

/// Parses posted time strings; install one as a context extension to
/// override [`parse_time`].
#[derive(Clone)]
pub struct TimeParser(pub Arc<dyn Fn(&str, &TimeZone) -> Result<DateTime<Utc>, String> + Send + Sync>);

const TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse RFC 3339, or a local date/time read in `tz`.
pub fn parse_time(s: &str, tz: &TimeZone) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    let naive = TIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| format!("invalid time {s:?}"))?;
    tz.from_local(&naive)
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| format!("nonexistent local time {s:?}"))
}

fn context_time(s: &str, ctx: &Context) -> Result<DateTime<Utc>, String> {
    let tz = ctx.time_zone();
    match ctx.extension::<TimeParser>() {
        Some(p) => (p.0)(s, &tz),
        None => parse_time(s, &tz),
    }
}

pub fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "" | "false" | "off" | "0" | "no" | "f" => Ok(false),
        "true" | "on" | "1" | "yes" | "t" => Ok(true),
        _ => Err(format!("invalid boolean {s:?}")),
    }
}

/// A field type decodable from a posted value.
pub trait FieldValue: Clone + Default + PartialEq + Serialize + Send + Sync + 'static {
    const KIND: FieldKind;

    fn decode(mv: &MetaValue, ctx: &Context) -> Result<Self, String>;
}

impl FieldValue for String {
    const KIND: FieldKind = FieldKind::Text;

    fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
        Ok(mv.first_string().trim().to_string())
    }
}

impl FieldValue for Option<String> {
    const KIND: FieldKind = FieldKind::Text;

    fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
        let s = mv.first_string().trim();
        Ok((!s.is_empty()).then(|| s.to_string()))
    }
}

macro_rules! number_field {
    ($kind:expr => $($t:ty),+) => {$(
        impl FieldValue for $t {
            const KIND: FieldKind = $kind;

            fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
                let s = mv.first_string().trim();
                if s.is_empty() {
                    return Ok(<$t>::default());
                }
                s.parse::<$t>().map_err(|e| format!("{s:?}: {e}"))
            }
        }
    )+};
}

number_field!(FieldKind::Integer => i8, i16, i32, i64);
number_field!(FieldKind::Unsigned => u8, u16, u32, u64, usize);
number_field!(FieldKind::Float => f32, f64);

impl FieldValue for Option<i64> {
    const KIND: FieldKind = FieldKind::Integer;

    fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
        let s = mv.first_string().trim();
        if s.is_empty() {
            return Ok(None);
        }
        s.parse().map(Some).map_err(|e| format!("{s:?}: {e}"))
    }
}

impl FieldValue for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
        parse_bool(mv.first_string().trim())
    }
}

impl FieldValue for Option<bool> {
    const KIND: FieldKind = FieldKind::OptionalBool;

    fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
        let s = mv.first_string().trim();
        if s.is_empty() {
            return Ok(None);
        }
        parse_bool(s).map(Some)
    }
}

impl FieldValue for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Time;

    fn decode(mv: &MetaValue, ctx: &Context) -> Result<Self, String> {
        let s = mv.first_string().trim();
        if s.is_empty() {
            return Ok(DateTime::<Utc>::default());
        }
        context_time(s, ctx)
    }
}

impl FieldValue for Option<DateTime<Utc>> {
    const KIND: FieldKind = FieldKind::OptionalTime;

    fn decode(mv: &MetaValue, ctx: &Context) -> Result<Self, String> {
        let s = mv.first_string().trim();
        if s.is_empty() {
            return Ok(None);
        }
        context_time(s, ctx).map(Some)
    }
}

impl FieldValue for Vec<String> {
    const KIND: FieldKind = FieldKind::Strings;

    fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
        Ok(mv
            .strings()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

impl FieldValue for Option<FileHeader> {
    const KIND: FieldKind = FieldKind::File;

    fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
        Ok(mv.value.files().first().cloned())
    }
}

impl FieldValue for Vec<FileHeader> {
    const KIND: FieldKind = FieldKind::Files;

    fn decode(mv: &MetaValue, _ctx: &Context) -> Result<Self, String> {
        Ok(mv.value.files().to_vec())
    }
}

// ── Scanners ────────────────────────────────────────────────────────

/// Field types that decode themselves from the whole meta value.
pub trait MetaValueScanner {
    fn scan_meta_value(&mut self, ctx: &Context, mv: &MetaValue) -> Result<(), String>;
}

/// Field types that decode themselves from the raw leaf value.
pub trait ContextScanner {
    fn context_scan(&mut self, ctx: &Context, value: &RawValue) -> Result<(), String>;
}

/// Field types that decode themselves from the posted strings.
pub trait StringsScanner {
    fn scan_strings(&mut self, values: &[String]) -> Result<(), String>;
}

// ── Accessors ───────────────────────────────────────────────────────

/// Reads and writes one field of `T`.
pub trait FieldAccessor<T>: Send + Sync {
    fn kind(&self) -> FieldKind;

    fn set(&self, record: &mut T, mv: &MetaValue, ctx: &Context) -> Result<(), String>;

    fn value(&self, record: &T) -> Value;

    fn is_zero(&self, record: &T) -> bool;

    fn clear(&self, record: &mut T);
}

pub(crate) type DecodeFn<F> = fn(&mut F, &MetaValue, &Context) -> Result<(), String>;

pub(crate) fn decode_value<F: FieldValue>(f: &mut F, mv: &MetaValue, ctx: &Context) -> Result<(), String> {
    *f = F::decode(mv, ctx)?;
    Ok(())
}

pub(crate) fn decode_scanner<F: MetaValueScanner>(f: &mut F, mv: &MetaValue, ctx: &Context) -> Result<(), String> {
    f.scan_meta_value(ctx, mv)
}

pub(crate) fn decode_context_scanner<F: ContextScanner>(
    f: &mut F,
    mv: &MetaValue,
    ctx: &Context,
) -> Result<(), String> {
    f.context_scan(ctx, &mv.value)
}

pub(crate) fn decode_strings<F: StringsScanner>(f: &mut F, mv: &MetaValue, _ctx: &Context) -> Result<(), String> {
    f.scan_strings(&mv.strings())
}

pub(crate) fn decode_parsed<F>(f: &mut F, mv: &MetaValue, _ctx: &Context) -> Result<(), String>
where
    F: FromStr + Default,
    F::Err: Display,
{
    let s = mv.first_string().trim();
    *f = if s.is_empty() {
        F::default()
    } else {
        s.parse().map_err(|e| format!("{s:?}: {e}"))?
    };
    Ok(())
}

/// Accessor for a plain field decoded by `decode`.
pub struct TypedField<T, F> {
    kind: FieldKind,
    lens: Lens<T, F>,
    decode: DecodeFn<F>,
}

impl<T, F> TypedField<T, F> {
    pub(crate) fn new(kind: FieldKind, lens: Lens<T, F>, decode: DecodeFn<F>) -> Self {
        Self { kind, lens, decode }
    }
}

impl<T, F> FieldAccessor<T> for TypedField<T, F>
where
    F: Clone + Default + PartialEq + Serialize + Send + Sync + 'static,
{
    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn set(&self, record: &mut T, mv: &MetaValue, ctx: &Context) -> Result<(), String> {
        (self.decode)(self.lens.get_mut(record), mv, ctx)
    }

    fn value(&self, record: &T) -> Value {
        serde_json::to_value(self.lens.get(record)).unwrap_or(Value::Null)
    }

    fn is_zero(&self, record: &T) -> bool {
        *self.lens.get(record) == F::default()
    }

    fn clear(&self, record: &mut T) {
        *self.lens.get_mut(record) = F::default();
    }
}

/// Foreign key plus the optional loaded referent.
pub struct BelongsTo<T, K, R> {
    fk: Lens<T, K>,
    relation: Lens<T, Option<R>>,
}

impl<T, K, R> BelongsTo<T, K, R> {
    pub fn new(fk: Lens<T, K>, relation: Lens<T, Option<R>>) -> Self {
        Self { fk, relation }
    }
}

impl<T, K, R> FieldAccessor<T> for BelongsTo<T, K, R>
where
    K: FromStr + Default + PartialEq + Serialize + Send + Sync + 'static,
    K::Err: Display,
    R: Send + Sync + 'static,
{
    fn kind(&self) -> FieldKind {
        FieldKind::BelongsTo
    }

    fn set(&self, record: &mut T, mv: &MetaValue, _ctx: &Context) -> Result<(), String> {
        if mv.is_disabled() {
            self.clear(record);
            return Ok(());
        }
        let s = mv.first_string().trim();
        let fk = if s.is_empty() {
            K::default()
        } else {
            s.parse().map_err(|e| format!("invalid ID {s:?}: {e}"))?
        };
        *self.fk.get_mut(record) = fk;
        *self.relation.get_mut(record) = None;
        Ok(())
    }

    fn value(&self, record: &T) -> Value {
        serde_json::to_value(self.fk.get(record)).unwrap_or(Value::Null)
    }

    fn is_zero(&self, record: &T) -> bool {
        *self.fk.get(record) == K::default()
    }

    fn clear(&self, record: &mut T) {
        *self.fk.get_mut(record) = K::default();
        *self.relation.get_mut(record) = None;
    }
}

/// Shell constructor for a related record known only by ID.
pub type ShellFn<R> = Box<dyn Fn(&str) -> Result<R, String> + Send + Sync>;

/// Many-to-many association stored as a list of related records.
pub struct ManyToMany<T, R> {
    lens: Lens<T, Vec<R>>,
    shell: ShellFn<R>,
}

impl<T, R> ManyToMany<T, R> {
    pub fn new(lens: Lens<T, Vec<R>>, shell: ShellFn<R>) -> Self {
        Self { lens, shell }
    }
}

impl<T, R> FieldAccessor<T> for ManyToMany<T, R>
where
    R: Serialize + Send + Sync + 'static,
{
    fn kind(&self) -> FieldKind {
        FieldKind::ManyToMany
    }

    fn set(&self, record: &mut T, mv: &MetaValue, _ctx: &Context) -> Result<(), String> {
        if mv.is_disabled() {
            self.clear(record);
            return Ok(());
        }
        let related = mv
            .strings()
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|id| (self.shell)(id))
            .collect::<Result<Vec<R>, String>>()?;
        *self.lens.get_mut(record) = related;
        Ok(())
    }

    fn value(&self, record: &T) -> Value {
        serde_json::to_value(self.lens.get(record)).unwrap_or(Value::Null)
    }

    fn is_zero(&self, record: &T) -> bool {
        self.lens.get(record).is_empty()
    }

    fn clear(&self, record: &mut T) {
        self.lens.get_mut(record).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta_value::MetaValues;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Category {
        id: i64,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Post {
        title: String,
        views: u32,
        pinned: Option<bool>,
        published_at: Option<DateTime<Utc>>,
        category_id: i64,
        category: Option<Category>,
        tags: Vec<Category>,
    }

    fn ctx() -> Context {
        Context::new_top(None)
    }

    #[test]
    fn typed_fields_decode_and_zero() {
        let title = TypedField::new(FieldKind::Text, lens!(Post, title), decode_value::<String>);
        let views = TypedField::new(FieldKind::Unsigned, lens!(Post, views), decode_value::<u32>);
        let pinned = TypedField::new(FieldKind::OptionalBool, lens!(Post, pinned), decode_value::<Option<bool>>);
        let mut post = Post::default();

        title.set(&mut post, &MetaValue::leaf("Title", "  Hi "), &ctx()).unwrap();
        views.set(&mut post, &MetaValue::leaf("Views", "12"), &ctx()).unwrap();
        pinned.set(&mut post, &MetaValue::leaf("Pinned", "on"), &ctx()).unwrap();
        assert_eq!((post.title.as_str(), post.views, post.pinned), ("Hi", 12, Some(true)));
        assert_eq!(views.value(&post), serde_json::json!(12));

        assert!(views.set(&mut post, &MetaValue::leaf("Views", "x"), &ctx()).is_err());
        views.set(&mut post, &MetaValue::leaf("Views", ""), &ctx()).unwrap();
        assert!(views.is_zero(&post));
        pinned.set(&mut post, &MetaValue::leaf("Pinned", ""), &ctx()).unwrap();
        assert_eq!(post.pinned, None);
    }

    #[test]
    fn times_read_in_context_zone() {
        let field = TypedField::new(
            FieldKind::OptionalTime,
            lens!(Post, published_at),
            decode_value::<Option<DateTime<Utc>>>,
        );
        let mut post = Post::default();
        let mut ctx = ctx();
        ctx.set_time_zone(TimeZone::from_name("America/Sao_Paulo").unwrap());
        field.set(&mut post, &MetaValue::leaf("At", "2024-01-02 10:00"), &ctx).unwrap();
        assert_eq!(post.published_at.unwrap().to_rfc3339(), "2024-01-02T13:00:00+00:00");

        ctx.insert_extension(TimeParser(Arc::new(|_: &str, _: &TimeZone| {
            Ok::<_, String>(DateTime::<Utc>::default())
        })));
        field.set(&mut post, &MetaValue::leaf("At", "whenever"), &ctx).unwrap();
        assert_eq!(post.published_at, Some(DateTime::<Utc>::default()));
    }

    #[test]
    fn belongs_to_sets_fk_and_clears_relation() {
        let rel = BelongsTo::new(lens!(Post, category_id), lens!(Post, category));
        let mut post = Post {
            category: Some(Category { id: 1 }),
            ..Post::default()
        };
        rel.set(&mut post, &MetaValue::leaf("Category", "42"), &ctx()).unwrap();
        assert_eq!(post.category_id, 42);
        assert_eq!(post.category, None);

        rel.set(&mut post, &MetaValue::with_children("Category", MetaValues::disabled()), &ctx())
            .unwrap();
        assert!(rel.is_zero(&post));
        assert!(rel.set(&mut post, &MetaValue::leaf("Category", "abc"), &ctx()).is_err());
    }

    #[test]
    fn many_to_many_builds_shells() {
        let shell: ShellFn<Category> = Box::new(|id: &str| {
            id.parse().map(|id| Category { id }).map_err(|_| format!("bad id {id}"))
        });
        let rel = ManyToMany::new(lens!(Post, tags), shell);
        let mut post = Post::default();
        let mv = MetaValue::new("Tags", RawValue::Strings(vec!["1".into(), "".into(), "3".into()]));
        rel.set(&mut post, &mv, &ctx()).unwrap();
        assert_eq!(post.tags, vec![Category { id: 1 }, Category { id: 3 }]);
    }
}
