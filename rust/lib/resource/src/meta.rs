//! Field descriptors of a resource.
//!
//! A [`Meta`] names a field, tells how to read and write it through its
//! [`Binding`], and carries the flags the decoder honours.

use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use openerp_core::{Perm, PermissionMode, Permissioner, humanize};
use openerp_site::Context;
use serde::Serialize;
use serde_json::Value;

use crate::error::ResourceError;
use crate::field::{
    BelongsTo, ContextScanner, FieldAccessor, FieldKind, FieldValue, Lens, ManyToMany, MetaValueScanner,
    StringsScanner, TypedField, decode_context_scanner, decode_parsed, decode_scanner, decode_strings,
    decode_value,
};
use crate::meta_value::MetaValue;
use crate::processor::DecodeScope;
use crate::schema::{MetaInfo, MetaSchema, SiblingsCheck};

pub type Valuer<T> = Arc<dyn Fn(&T, &Context) -> Value + Send + Sync>;
pub type Setter<T> = Arc<dyn Fn(&mut T, &MetaValue, &Context) -> Result<(), String> + Send + Sync>;
/// Loads a nested association into a persisted record before it is edited.
pub type RelatedLoader<T> = Arc<dyn Fn(&mut T, &Context) -> Result<(), String> + Send + Sync>;

/// Accessor of a nested document (inline struct or inline slice).
pub trait NestedAccessor<T>: Send + Sync {
    fn kind(&self) -> FieldKind;

    fn schema(&self) -> Arc<dyn MetaSchema>;

    /// Apply the children of `mv` to the nested value of `record`.
    fn decode(&self, record: &mut T, mv: &MetaValue, scope: &DecodeScope<'_>) -> Result<(), ResourceError>;

    fn value(&self, record: &T, ctx: &Context) -> Value;

    fn is_zero(&self, record: &T) -> bool;

    fn clear(&self, record: &mut T);
}

pub enum Binding<T> {
    Field(Arc<dyn FieldAccessor<T>>),
    Relation(Arc<dyn FieldAccessor<T>>),
    Nested(Arc<dyn NestedAccessor<T>>),
    /// Valuer and setter only.
    Virtual,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        match self {
            Binding::Field(a) => Binding::Field(a.clone()),
            Binding::Relation(a) => Binding::Relation(a.clone()),
            Binding::Nested(a) => Binding::Nested(a.clone()),
            Binding::Virtual => Binding::Virtual,
        }
    }
}

pub struct Meta<T> {
    name: String,
    label: Option<String>,
    binding: Binding<T>,
    valuer: Option<Valuer<T>>,
    setter: Option<Setter<T>>,
    required: bool,
    alone: bool,
    read_only: bool,
    proxier: bool,
    siblings_check: Option<SiblingsCheck>,
    permission: Option<Arc<dyn Permissioner>>,
    related_loader: Option<RelatedLoader<T>>,
}

impl<T> Clone for Meta<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            label: self.label.clone(),
            binding: self.binding.clone(),
            valuer: self.valuer.clone(),
            setter: self.setter.clone(),
            required: self.required,
            alone: self.alone,
            read_only: self.read_only,
            proxier: self.proxier,
            siblings_check: self.siblings_check,
            permission: self.permission.clone(),
            related_loader: self.related_loader.clone(),
        }
    }
}

impl<T: 'static> Meta<T> {
    pub fn with_binding(name: impl Into<String>, binding: Binding<T>) -> Self {
        Self {
            name: name.into(),
            label: None,
            binding,
            valuer: None,
            setter: None,
            required: false,
            alone: false,
            read_only: false,
            proxier: false,
            siblings_check: None,
            permission: None,
            related_loader: None,
        }
    }

    // ── Constructors ────────────────────────────────────────────────

    pub fn field<F: FieldValue>(name: impl Into<String>, lens: Lens<T, F>) -> Self {
        let accessor = TypedField::new(F::KIND, lens, decode_value::<F>);
        Self::with_binding(name, Binding::Field(Arc::new(accessor)))
    }

    pub fn scanner<F>(name: impl Into<String>, lens: Lens<T, F>) -> Self
    where
        F: MetaValueScanner + Clone + Default + PartialEq + Serialize + Send + Sync + 'static,
    {
        let accessor = TypedField::new(FieldKind::Scanner, lens, decode_scanner::<F>);
        Self::with_binding(name, Binding::Field(Arc::new(accessor)))
    }

    pub fn context_scanner<F>(name: impl Into<String>, lens: Lens<T, F>) -> Self
    where
        F: ContextScanner + Clone + Default + PartialEq + Serialize + Send + Sync + 'static,
    {
        let accessor = TypedField::new(FieldKind::Scanner, lens, decode_context_scanner::<F>);
        Self::with_binding(name, Binding::Field(Arc::new(accessor)))
    }

    pub fn strings_scanner<F>(name: impl Into<String>, lens: Lens<T, F>) -> Self
    where
        F: StringsScanner + Clone + Default + PartialEq + Serialize + Send + Sync + 'static,
    {
        let accessor = TypedField::new(FieldKind::Scanner, lens, decode_strings::<F>);
        Self::with_binding(name, Binding::Field(Arc::new(accessor)))
    }

    /// Field of any type parsed from its string form.
    pub fn parsed<F>(name: impl Into<String>, lens: Lens<T, F>) -> Self
    where
        F: FromStr + Clone + Default + PartialEq + Serialize + Send + Sync + 'static,
        F::Err: Display,
    {
        let accessor = TypedField::new(FieldKind::Parsed, lens, decode_parsed::<F>);
        Self::with_binding(name, Binding::Field(Arc::new(accessor)))
    }

    /// Relation posted as the referent's ID.
    pub fn belongs_to<K, R>(name: impl Into<String>, fk: Lens<T, K>, relation: Lens<T, Option<R>>) -> Self
    where
        K: FromStr + Default + PartialEq + Serialize + Send + Sync + 'static,
        K::Err: Display,
        R: Send + Sync + 'static,
    {
        Self::with_binding(name, Binding::Relation(Arc::new(BelongsTo::new(fk, relation))))
    }

    /// Association posted as a list of IDs; `shell` builds the related
    /// record for each.
    pub fn many_to_many<R, S>(name: impl Into<String>, lens: Lens<T, Vec<R>>, shell: S) -> Self
    where
        R: Serialize + Send + Sync + 'static,
        S: Fn(&str) -> Result<R, String> + Send + Sync + 'static,
    {
        let accessor = ManyToMany::new(lens, Box::new(shell));
        Self::with_binding(name, Binding::Relation(Arc::new(accessor)))
    }

    /// Meta with no field behind it; give it a valuer and/or a setter.
    pub fn virtual_field(name: impl Into<String>) -> Self {
        Self::with_binding(name, Binding::Virtual)
    }

    // ── Builders ────────────────────────────────────────────────────

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Posted alone, this meta does not trigger sibling requirement checks.
    pub fn alone(mut self) -> Self {
        self.alone = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Required status is not checked on this meta directly.
    pub fn proxier(mut self) -> Self {
        self.proxier = true;
        self
    }

    pub fn siblings_check(mut self, check: SiblingsCheck) -> Self {
        self.siblings_check = Some(check);
        self
    }

    pub fn permission(mut self, permission: Arc<dyn Permissioner>) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn valuer<F>(mut self, f: F) -> Self
    where
        F: Fn(&T, &Context) -> Value + Send + Sync + 'static,
    {
        self.valuer = Some(Arc::new(f));
        self
    }

    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut T, &MetaValue, &Context) -> Result<(), String> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(f));
        self
    }

    /// Run `loader` before decoding into this nested meta when the record
    /// is persisted and the nested value is still zero.
    pub fn load_related_before_save<F>(mut self, loader: F) -> Self
    where
        F: Fn(&mut T, &Context) -> Result<(), String> + Send + Sync + 'static,
    {
        self.related_loader = Some(Arc::new(loader));
        self
    }
}

impl<T> Meta<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_text(&self) -> String {
        self.label.clone().unwrap_or_else(|| humanize(&self.name))
    }

    pub fn binding(&self) -> &Binding<T> {
        &self.binding
    }

    pub fn kind(&self) -> FieldKind {
        match &self.binding {
            Binding::Field(a) | Binding::Relation(a) => a.kind(),
            Binding::Nested(n) => n.kind(),
            Binding::Virtual => FieldKind::Virtual,
        }
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_alone(&self) -> bool {
        self.alone
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_proxier(&self) -> bool {
        self.proxier
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.binding, Binding::Relation(_))
    }

    pub fn nested(&self) -> Option<&Arc<dyn NestedAccessor<T>>> {
        match &self.binding {
            Binding::Nested(n) => Some(n),
            _ => None,
        }
    }

    pub fn related_loader(&self) -> Option<&RelatedLoader<T>> {
        self.related_loader.as_ref()
    }

    pub fn permissioner(&self) -> Option<&Arc<dyn Permissioner>> {
        self.permission.as_ref()
    }

    /// `Undef` when no permission is attached.
    pub fn has_permission(&self, mode: PermissionMode, roles: &[String]) -> Perm {
        match &self.permission {
            Some(p) => p.has_permission(mode, roles),
            None => Perm::Undef,
        }
    }

    /// Stored value, ignoring any valuer.
    pub fn field_value(&self, record: &T) -> Value {
        match &self.binding {
            Binding::Field(a) | Binding::Relation(a) => a.value(record),
            Binding::Nested(_) | Binding::Virtual => Value::Null,
        }
    }

    pub fn value(&self, record: &T, ctx: &Context) -> Value {
        if let Some(v) = &self.valuer {
            return v(record, ctx);
        }
        match &self.binding {
            Binding::Field(a) | Binding::Relation(a) => a.value(record),
            Binding::Nested(n) => n.value(record, ctx),
            Binding::Virtual => Value::Null,
        }
    }

    /// Write a leaf value. Read-only metas and nested metas without a
    /// custom setter ignore it.
    pub fn set(&self, record: &mut T, mv: &MetaValue, ctx: &Context) -> Result<(), String> {
        if self.read_only {
            return Ok(());
        }
        if let Some(s) = &self.setter {
            return s(record, mv, ctx);
        }
        match &self.binding {
            Binding::Field(a) | Binding::Relation(a) => a.set(record, mv, ctx),
            Binding::Nested(_) | Binding::Virtual => Ok(()),
        }
    }

    pub fn is_zero(&self, record: &T, ctx: &Context) -> bool {
        match &self.binding {
            Binding::Field(a) | Binding::Relation(a) => a.is_zero(record),
            Binding::Nested(n) => n.is_zero(record),
            Binding::Virtual => is_zero_value(&self.value(record, ctx)),
        }
    }

    pub fn clear(&self, record: &mut T) {
        match &self.binding {
            Binding::Field(a) | Binding::Relation(a) => a.clear(record),
            Binding::Nested(n) => n.clear(record),
            Binding::Virtual => {}
        }
    }

    pub fn info(&self) -> MetaInfo {
        MetaInfo {
            name: self.name.clone(),
            label: self.label_text(),
            required: self.required,
            alone: self.alone,
            proxier: self.proxier,
            siblings_check: self.siblings_check,
            nested: self.nested().map(|n| n.schema()),
        }
    }
}

fn is_zero_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lens;
    use openerp_core::Permission;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Account {
        name: String,
        balance: i64,
        code: Code,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Code(String);

    impl FromStr for Code {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, String> {
            if s.len() == 3 {
                Ok(Code(s.to_uppercase()))
            } else {
                Err(format!("code must have 3 letters, got {s:?}"))
            }
        }
    }

    #[test]
    fn defaults_and_flags() {
        let m = Meta::field("FullName", lens!(Account, name)).required().alone();
        assert_eq!(m.label_text(), "Full Name");
        assert_eq!(m.kind(), FieldKind::Text);
        let info = m.info();
        assert!(info.required && info.alone && info.nested.is_none());
    }

    #[test]
    fn read_only_and_custom_setter() {
        let ctx = Context::new_top(None);
        let mut acc = Account::default();

        let ro = Meta::field("Balance", lens!(Account, balance)).read_only();
        ro.set(&mut acc, &MetaValue::leaf("Balance", "10"), &ctx).unwrap();
        assert_eq!(acc.balance, 0);

        let doubled = Meta::field("Balance", lens!(Account, balance)).setter(|a: &mut Account, mv, _| {
            a.balance = mv.first_string().parse::<i64>().map_err(|e| e.to_string())? * 2;
            Ok(())
        });
        doubled.set(&mut acc, &MetaValue::leaf("Balance", "10"), &ctx).unwrap();
        assert_eq!(acc.balance, 20);
    }

    #[test]
    fn parsed_and_virtual() {
        let ctx = Context::new_top(None);
        let mut acc = Account::default();
        let code = Meta::parsed("Code", lens!(Account, code));
        code.set(&mut acc, &MetaValue::leaf("Code", "brl"), &ctx).unwrap();
        assert_eq!(acc.code, Code("BRL".into()));
        assert!(code.set(&mut acc, &MetaValue::leaf("Code", "x"), &ctx).is_err());

        let v: Meta<Account> = Meta::virtual_field("Display")
            .valuer(|a: &Account, _: &Context| Value::String(format!("{} ({})", a.name, a.code.0)));
        assert!(!v.is_zero(&acc, &ctx));
        assert_eq!(v.value(&acc, &ctx), Value::String(" (BRL)".into()));
    }

    #[test]
    fn permission_is_undefined_without_policy() {
        let m = Meta::field("Name", lens!(Account, name));
        assert_eq!(m.has_permission(PermissionMode::Update, &[]), Perm::Undef);

        let m = m.permission(Arc::new(Permission::new().allow(PermissionMode::Update, &["admin"])));
        assert_eq!(m.has_permission(PermissionMode::Update, &["guest".to_string()]), Perm::Deny);
    }
}
