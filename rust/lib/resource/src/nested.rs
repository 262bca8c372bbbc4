//! Nested documents: an inline struct or a slice of structs described by
//! their own [`Resource`].

use std::sync::Arc;

use openerp_site::{Context, Errors};
use serde_json::Value;

use crate::error::ResourceError;
use crate::field::{FieldKind, Lens};
use crate::meta::{Binding, Meta, NestedAccessor};
use crate::meta_value::MetaValue;
use crate::processor::{DecodeScope, Outcome, Processor};
use crate::resource::{DEFAULT_LAYOUT, Record, Resource};
use crate::schema::MetaSchema;

struct Inline<T, S: Record> {
    lens: Lens<T, S>,
    resource: Arc<Resource<S>>,
}

impl<T, S: Record> NestedAccessor<T> for Inline<T, S> {
    fn kind(&self) -> FieldKind {
        FieldKind::Inline
    }

    fn schema(&self) -> Arc<dyn MetaSchema> {
        self.resource.clone()
    }

    fn decode(&self, record: &mut T, mv: &MetaValue, scope: &DecodeScope<'_>) -> Result<(), ResourceError> {
        let Some(values) = &mv.children else {
            return Ok(());
        };
        if values.disabled {
            return Ok(());
        }
        let mut doc = self.lens.get(record).clone();
        let processor = Processor::nested(&self.resource, scope, values, scope.path.clone());
        match processor.start(&mut doc)? {
            Outcome::Done => *self.lens.get_mut(record) = doc,
            Outcome::Deleted => *self.lens.get_mut(record) = S::default(),
            Outcome::Stopped => {}
        }
        Ok(())
    }

    fn value(&self, record: &T, ctx: &Context) -> Value {
        self.resource
            .render(self.lens.get(record), ctx, DEFAULT_LAYOUT)
            .unwrap_or(Value::Null)
    }

    fn is_zero(&self, record: &T) -> bool {
        self.resource.is_zero(self.lens.get(record))
    }

    fn clear(&self, record: &mut T) {
        *self.lens.get_mut(record) = S::default();
    }
}

/// Elements are matched to posted children by their `id`. Unmatched
/// children become new elements; elements nobody mentions are kept.
struct InlineSlice<T, S: Record> {
    lens: Lens<T, Vec<S>>,
    resource: Arc<Resource<S>>,
}

impl<T, S: Record> NestedAccessor<T> for InlineSlice<T, S> {
    fn kind(&self) -> FieldKind {
        FieldKind::InlineSlice
    }

    fn schema(&self) -> Arc<dyn MetaSchema> {
        self.resource.clone()
    }

    fn decode(&self, record: &mut T, mv: &MetaValue, scope: &DecodeScope<'_>) -> Result<(), ResourceError> {
        let Some(elements) = &mv.children else {
            return Ok(());
        };
        if elements.disabled {
            return Ok(());
        }

        let mut items: Vec<(S, bool)> = self.lens.get(record).iter().cloned().map(|it| (it, false)).collect();
        let mut errors = Errors::new();
        for elem in elements {
            let Some(values) = &elem.children else {
                continue;
            };
            if values.disabled {
                continue;
            }
            let path = format!("{}.{}", scope.path, elem.name);
            let id = values.get_string("id").trim();
            let existing = if id.is_empty() {
                None
            } else {
                items
                    .iter()
                    .position(|(it, _)| !self.resource.is_new(it) && self.resource.render_id(it) == id)
            };
            let mut item = existing.map(|i| items[i].0.clone()).unwrap_or_default();

            match Processor::nested(&self.resource, scope, values, path).start(&mut item) {
                Ok(Outcome::Done) => match existing {
                    Some(i) => items[i].0 = item,
                    None if !self.resource.is_zero(&item) => items.push((item, false)),
                    None => {}
                },
                Ok(Outcome::Deleted) => {
                    if let Some(i) = existing {
                        items[i].1 = true;
                    }
                }
                Ok(Outcome::Stopped) => {}
                Err(ResourceError::Validation(e)) => errors.extend(e),
                Err(e) => return Err(e),
            }
        }
        errors.into_result()?;

        *self.lens.get_mut(record) = items.into_iter().filter(|(_, removed)| !removed).map(|(it, _)| it).collect();
        Ok(())
    }

    fn value(&self, record: &T, ctx: &Context) -> Value {
        Value::Array(
            self.lens
                .get(record)
                .iter()
                .filter_map(|it| self.resource.render(it, ctx, DEFAULT_LAYOUT).ok())
                .collect(),
        )
    }

    fn is_zero(&self, record: &T) -> bool {
        self.lens.get(record).is_empty()
    }

    fn clear(&self, record: &mut T) {
        self.lens.get_mut(record).clear();
    }
}

impl<T: 'static> Meta<T> {
    /// Struct field edited through `resource`'s metas.
    pub fn inline<S: Record>(name: impl Into<String>, lens: Lens<T, S>, resource: Arc<Resource<S>>) -> Self {
        Self::with_binding(name, Binding::Nested(Arc::new(Inline { lens, resource })))
    }

    /// Slice field whose elements are edited through `resource`'s metas.
    pub fn inline_slice<S: Record>(
        name: impl Into<String>,
        lens: Lens<T, Vec<S>>,
        resource: Arc<Resource<S>>,
    ) -> Self {
        Self::with_binding(name, Binding::Nested(Arc::new(InlineSlice { lens, resource })))
    }
}
